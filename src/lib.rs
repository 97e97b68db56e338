pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod message;
pub mod negotiation;
pub mod offer;
pub mod present;
pub mod transition;
pub mod utils;

pub use config::EngineConfig;
pub use engine::NegotiationEngine;
pub use error::{NegotiationError, OfferError};
pub use gateway::{GatewayError, NegotiationGateway};
pub use message::{Attachment, MessageStatus, NegotiationMessage, Role};
pub use negotiation::{Negotiation, Participants};
pub use offer::{InterestRate, Money, Offer, OfferDraft};
