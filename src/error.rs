use super::gateway::GatewayError;
use super::message::MessageStatus;
use super::transition::{Transition, TransitionKind};

/// Malformed offer values. Raised locally, never sent to a gateway.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OfferError {
    #[error("Offer amount must be greater than zero")]
    ZeroAmount,
    #[error("Interest rate of {0} basis points is outside 0..=10000")]
    RateOutOfRange(u32),
    #[error("Interest rate '{0}' is not a decimal percentage with at most two decimals")]
    MalformedRate(String),
    #[error("Offer term must be at least one day")]
    ZeroTerm,
    #[error("Offer is missing the {0} field")]
    MissingField(&'static str),
}

#[derive(thiserror::Error, Debug)]
pub enum NegotiationError {
    #[error("Invalid offer: {0}")]
    InvalidOffer(#[from] OfferError),
    #[error("A message without an offer needs content")]
    EmptyContent,
    #[error("Message {message_id} is already {status:?}")]
    AlreadyResolved {
        message_id: String,
        status: MessageStatus,
    },
    #[error("Negotiation {0} has an accepted offer; only chat messages may follow")]
    NegotiationResolved(String),
    #[error("Message {0} was authored by the acting role and cannot be acted on by it")]
    OwnOffer(String),
    #[error("Message {0} is the acting role's own outstanding offer")]
    OwnOfferOutstanding(String),
    #[error("Message {0} does not exist in this negotiation")]
    MessageNotFound(String),
    #[error("Message {0} carries no offer")]
    NotOfferBearing(String),
    #[error("Message log is inconsistent: {0}")]
    CorruptLog(String),
    #[error("Failed to persist {transition:?} on {negotiation_id} (message {message_id:?}): {source}")]
    Persistence {
        negotiation_id: String,
        message_id: Option<String>,
        transition: TransitionKind,
        #[source]
        source: GatewayError,
        planned: Option<Box<Transition>>, // resend with NegotiationEngine::retry
    },
    #[error("Negotiation {negotiation_id} changed underneath us: expected {expected} messages, found {found}")]
    Conflict {
        negotiation_id: String,
        expected: usize,
        found: usize,
    },
    #[error("Response for request {ticket} arrived after it was superseded")]
    StaleResponse { ticket: u64 },
    #[error("Failed to generate identifier: {0}")]
    Identifier(#[source] anyhow::Error),
    #[error("Failed to encode message log: {0}")]
    Codec(String),
}

impl NegotiationError {
    /// Whether retrying the same action could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            NegotiationError::Persistence { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// The transition a retryable failure was planned as. Handing it back to
    /// [`crate::NegotiationEngine::retry`] resends the same message ids, so a
    /// commit that landed without an acknowledgement is not stored twice.
    pub fn into_retry(self) -> Option<Transition> {
        match self {
            NegotiationError::Persistence {
                source,
                planned: Some(planned),
                ..
            } if source.is_transient() => Some(*planned),
            _ => None,
        }
    }
}
