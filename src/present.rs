//! Plain text rendering of offer values for synthetic messages and history
use super::offer::{InterestRate, Money, Offer};

/// `$950,000.00`
pub fn format_money(amount: Money) -> String {
    let cents = amount.cents();
    let dollars = (cents / 100).to_string();

    let mut grouped = String::with_capacity(dollars.len() + dollars.len() / 3);
    for (i, ch) in dollars.chars().enumerate() {
        if i > 0 && (dollars.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("${grouped}.{:02}", cents % 100)
}

/// `6.50%`
pub fn format_rate(rate: InterestRate) -> String {
    format!("{rate}%")
}

// 30 day months and 365 day years; the model only ever stores days
pub fn humanize_term(days: u32) -> String {
    let plural = |n: u32, unit: &str| {
        if n == 1 {
            format!("1 {unit}")
        } else {
            format!("{n} {unit}s")
        }
    };

    if days % 365 == 0 {
        plural(days / 365, "year")
    } else if days % 30 == 0 {
        plural(days / 30, "month")
    } else {
        plural(days, "day")
    }
}

pub fn summarize_offer(offer: &Offer) -> String {
    format!(
        "{} at {} for {}",
        format_money(offer.amount()),
        format_rate(offer.interest_rate()),
        humanize_term(offer.term_days())
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_is_grouped() {
        assert_eq!(format_money(Money::from_cents(950_000_00)), "$950,000.00");
        assert_eq!(format_money(Money::from_cents(1_234_567_89)), "$1,234,567.89");
        assert_eq!(format_money(Money::from_cents(5)), "$0.05");
        assert_eq!(format_money(Money::from_cents(100_000)), "$1,000.00");
    }

    #[test]
    fn terms_are_humanized() {
        assert_eq!(humanize_term(365), "1 year");
        assert_eq!(humanize_term(730), "2 years");
        assert_eq!(humanize_term(180), "6 months");
        assert_eq!(humanize_term(30), "1 month");
        assert_eq!(humanize_term(45), "45 days");
        assert_eq!(humanize_term(1), "1 day");
    }

    #[test]
    fn rate_has_percent_sign() {
        assert_eq!(format_rate(InterestRate::from_bps(725)), "7.25%");
    }
}
