//! Persistence boundary for negotiation logs
//!
//! The engine never owns storage. It hands each planned [`Commit`] to a
//! [`NegotiationGateway`] and only adopts the new log once the gateway
//! acknowledges it.
pub mod memory;
pub mod store;

use super::message::{MessageStatus, NegotiationMessage};
use async_trait::async_trait;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("transient gateway failure: {0}")]
    Transient(String),
    #[error("permanent gateway failure: {0}")]
    Permanent(String),
    #[error("stored log has {found} messages, commit was planned against {expected}")]
    Conflict { expected: usize, found: usize },
    #[error("failed to encode or decode stored log: {0}")]
    Codec(String),
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Append(NegotiationMessage),
    SetStatus {
        message_id: String,
        status: MessageStatus,
    },
}

/// An ordered batch of mutations, planned against a log of `base_len` messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub base_len: usize,
    pub mutations: Vec<Mutation>,
}

impl Commit {
    pub fn new(base_len: usize) -> Self {
        Self {
            base_len,
            mutations: vec![],
        }
    }

    /// True when every mutation is already reflected in `log`, i.e. this is a
    /// retry of a commit that landed.
    pub fn is_applied(&self, log: &[NegotiationMessage]) -> bool {
        !self.mutations.is_empty()
            && self.mutations.iter().all(|mutation| match mutation {
                Mutation::Append(message) => log.iter().any(|m| m.id() == message.id()),
                Mutation::SetStatus { message_id, status } => log
                    .iter()
                    .any(|m| m.id() == message_id && m.status() == *status),
            })
    }

    /// Apply to a stored log. Retries of an applied commit are a no-op and a
    /// log that moved since planning is a conflict. Returns whether anything
    /// changed.
    pub fn apply_to(&self, log: &mut Vec<NegotiationMessage>) -> Result<bool, GatewayError> {
        if self.is_applied(log) {
            return Ok(false);
        }
        if log.len() != self.base_len {
            return Err(GatewayError::Conflict {
                expected: self.base_len,
                found: log.len(),
            });
        }

        let mut staged = log.clone();
        for mutation in &self.mutations {
            apply_mutation(&mut staged, mutation)?;
        }
        *log = staged;

        Ok(true)
    }
}

pub(crate) fn apply_mutation(
    log: &mut Vec<NegotiationMessage>,
    mutation: &Mutation,
) -> Result<(), GatewayError> {
    match mutation {
        Mutation::Append(message) => match log.iter().find(|m| m.id() == message.id()) {
            Some(existing) if existing == message => Ok(()),
            Some(_) => Err(GatewayError::Permanent(format!(
                "message {} already stored with different contents",
                message.id()
            ))),
            None => {
                log.push(message.clone());
                Ok(())
            }
        },
        Mutation::SetStatus { message_id, status } => {
            let message = log
                .iter_mut()
                .find(|m| m.id() == message_id)
                .ok_or_else(|| GatewayError::Permanent(format!("unknown message {message_id}")))?;

            if !message.is_offer_bearing() {
                return Err(GatewayError::Permanent(format!(
                    "message {message_id} carries no offer and has no status to change"
                )));
            }
            if message.status() == *status {
                return Ok(());
            }
            if message.status().is_terminal() {
                return Err(GatewayError::Permanent(format!(
                    "message {message_id} is already {:?}",
                    message.status()
                )));
            }
            message.set_status(*status);
            Ok(())
        }
    }
}

/// What the engine needs from its host application.
#[async_trait]
pub trait NegotiationGateway: Send + Sync {
    /// Persist a new message. Must be idempotent by message id.
    async fn send_message(
        &self,
        negotiation_id: &str,
        message: &NegotiationMessage,
    ) -> Result<(), GatewayError>;

    /// Persist a status transition. Must be idempotent when the status already holds.
    async fn update_message_status(
        &self,
        negotiation_id: &str,
        message_id: &str,
        status: MessageStatus,
    ) -> Result<(), GatewayError>;

    /// The stored log in insertion order. Unknown ids yield an empty log.
    async fn load_messages(&self, negotiation_id: &str)
    -> Result<Vec<NegotiationMessage>, GatewayError>;

    /// Persist a whole transition. The default applies the mutations one at a
    /// time without a version check, so a failure part way leaves a partially
    /// applied commit for [`crate::negotiation::Negotiation::replay`] to repair.
    async fn commit(&self, negotiation_id: &str, commit: &Commit) -> Result<(), GatewayError> {
        for mutation in &commit.mutations {
            match mutation {
                Mutation::Append(message) => self.send_message(negotiation_id, message).await?,
                Mutation::SetStatus { message_id, status } => {
                    self.update_message_status(negotiation_id, message_id, *status)
                        .await?
                }
            }
        }
        Ok(())
    }
}
