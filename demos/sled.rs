//! Walks one investor/lender negotiation through a sled backed gateway.
//!
//! RUST_LOG=offer_negotiation=debug cargo run --example sled

use offer_negotiation::gateway::store::SledGateway;
use offer_negotiation::{
    EngineConfig, InterestRate, Negotiation, NegotiationEngine, OfferDraft, Participants, Role,
    utils,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = EngineConfig::from_env()?;
    let gateway = Arc::new(SledGateway::open(&config.db_path)?);
    let engine = NegotiationEngine::new(gateway, config);

    let participants = Participants::new(
        utils::new_uuid_to_bech32("user_")?,
        utils::new_uuid_to_bech32("user_")?,
    );
    let negotiation = Negotiation::new(participants.clone(), "property_42")?;

    let negotiation = engine
        .submit_offer(
            &negotiation,
            Role::Investor,
            OfferDraft::new()
                .set_amount_cents(950_000_00)
                .set_interest_rate("6.5".parse()?)
                .set_term_days(365),
            "Opening offer for the Elm Street refinance",
            vec![],
        )
        .await?;

    let investor_offer = negotiation.messages()[0].id().to_string();
    let negotiation = engine
        .counter_offer(
            &negotiation,
            &investor_offer,
            Role::Lender,
            OfferDraft::new()
                .set_amount_cents(900_000_00)
                .set_interest_rate(InterestRate::from_bps(725))
                .set_term_days(365)
                .set_additional_terms("Personal guarantee required"),
            "We can do 900k at 7.25",
            vec![],
        )
        .await?;

    let lender_offer = negotiation
        .current_outstanding_offer()
        .map(|m| m.id().to_string())
        .ok_or_else(|| anyhow::anyhow!("counter left nothing outstanding"))?;
    let negotiation = engine
        .accept_offer(&negotiation, &lender_offer, Role::Investor)
        .await?;

    // reload from storage to show the log round trips
    let reloaded = engine
        .load(negotiation.id(), participants, negotiation.property_ref())
        .await?;
    assert_eq!(reloaded.digest()?, negotiation.digest()?);

    for line in reloaded.history() {
        println!("{line}");
    }

    Ok(())
}
