//! Offer values and the draft builder used to construct them
use super::error::OfferError;
use std::fmt;
use std::str::FromStr;

pub const MAX_RATE_BPS: u32 = 10_000;

/// An amount of money in integer cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(u64);

/// A percentage held as basis points, 6.5% is `650`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct InterestRate(u32);

impl Money {
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }
    pub const fn cents(&self) -> u64 {
        self.0
    }
}

impl InterestRate {
    pub const fn from_bps(bps: u32) -> Self {
        Self(bps)
    }
    pub const fn bps(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for InterestRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl FromStr for InterestRate {
    type Err = OfferError;

    /// Parses a decimal percentage such as `"7.25"` or `"6.5"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || OfferError::MalformedRate(s.to_string());
        let trimmed = s.trim();
        let (whole, frac) = trimmed.split_once('.').unwrap_or((trimmed, ""));

        if whole.is_empty() || frac.len() > 2 {
            return Err(malformed());
        }
        if !whole.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }

        let whole: u32 = whole.parse().map_err(|_| malformed())?;
        let frac: u32 = match frac.len() {
            0 => 0,
            1 => frac.parse::<u32>().map_err(|_| malformed())? * 10,
            _ => frac.parse().map_err(|_| malformed())?,
        };

        whole
            .checked_mul(100)
            .and_then(|bps| bps.checked_add(frac))
            .map(InterestRate)
            .ok_or_else(malformed)
    }
}

/// A validated loan proposal. Immutable; a counter is always a new `Offer`.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Offer {
    #[n(0)]
    amount: Money,
    #[n(1)]
    interest_rate: InterestRate,
    #[n(2)]
    term_days: u32,
    #[n(3)]
    additional_terms: Option<String>,
}

// Used for constructing offers before validation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OfferDraft {
    amount: Option<Money>,
    interest_rate: Option<InterestRate>,
    term_days: Option<u32>,
    additional_terms: Option<String>,
}

impl Offer {
    pub fn amount(&self) -> Money {
        self.amount
    }
    pub fn interest_rate(&self) -> InterestRate {
        self.interest_rate
    }
    pub fn term_days(&self) -> u32 {
        self.term_days
    }
    pub fn additional_terms(&self) -> Option<&str> {
        self.additional_terms.as_deref()
    }
    /// Re-checks the value ranges. Offers decoded from storage bypass the draft.
    pub fn validate(&self) -> Result<(), OfferError> {
        if self.amount.cents() == 0 {
            return Err(OfferError::ZeroAmount);
        }
        if self.interest_rate.bps() > MAX_RATE_BPS {
            return Err(OfferError::RateOutOfRange(self.interest_rate.bps()));
        }
        if self.term_days == 0 {
            return Err(OfferError::ZeroTerm);
        }
        Ok(())
    }
}

impl OfferDraft {
    /// Start an empty draft
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_amount_cents(mut self, cents: u64) -> Self {
        self.amount = Some(Money::from_cents(cents));
        self
    }
    pub fn set_interest_rate(mut self, rate: InterestRate) -> Self {
        self.interest_rate = Some(rate);
        self
    }
    pub fn set_term_days(mut self, days: u32) -> Self {
        self.term_days = Some(days);
        self
    }
    pub fn set_additional_terms(mut self, terms: impl Into<String>) -> Self {
        let terms = terms.into();
        self.additional_terms = (!terms.trim().is_empty()).then_some(terms);
        self
    }
    /// Checks every field and produces the immutable offer.
    pub fn finalise(self) -> Result<Offer, OfferError> {
        let offer = Offer {
            amount: self.amount.ok_or(OfferError::MissingField("amount"))?,
            interest_rate: self
                .interest_rate
                .ok_or(OfferError::MissingField("interest rate"))?,
            term_days: self.term_days.ok_or(OfferError::MissingField("term"))?,
            additional_terms: self.additional_terms,
        };
        offer.validate()?;

        Ok(offer)
    }
}

impl From<&Offer> for OfferDraft {
    fn from(offer: &Offer) -> Self {
        Self {
            amount: Some(offer.amount),
            interest_rate: Some(offer.interest_rate),
            term_days: Some(offer.term_days),
            additional_terms: offer.additional_terms.clone(),
        }
    }
}

impl<C> minicbor::Encode<C> for Money {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.u64(self.0)?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Money {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        Ok(Money(d.u64()?))
    }
}

impl<C> minicbor::Encode<C> for InterestRate {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.u32(self.0)?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for InterestRate {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        Ok(InterestRate(d.u32()?))
    }
}
