//! In-process gateway, for hosts without storage and for exercising failure paths
use super::{Commit, GatewayError, Mutation, NegotiationGateway, apply_mutation};
use crate::message::{MessageStatus, NegotiationMessage};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::trace;

#[derive(Debug, Default)]
pub struct MemoryGateway {
    logs: Mutex<HashMap<String, Vec<NegotiationMessage>>>,
    fail_remaining: AtomicUsize,
    delay_ms: AtomicU64,
    calls: AtomicUsize,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` calls fail with a transient error before touching storage.
    pub fn fail_next(&self, count: usize) {
        self.fail_remaining.store(count, Ordering::SeqCst);
    }

    /// Every call sleeps this long before doing anything.
    pub fn set_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Number of gateway calls seen, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Snapshot of a stored log.
    pub fn stored(&self, negotiation_id: &str) -> Vec<NegotiationMessage> {
        self.with_logs(|logs| logs.get(negotiation_id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    async fn before_call(&self) -> Result<(), GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let injected = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if injected.is_ok() {
            return Err(GatewayError::Transient("injected failure".into()));
        }
        Ok(())
    }

    fn with_logs<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, Vec<NegotiationMessage>>) -> T,
    ) -> Result<T, GatewayError> {
        let mut logs = self
            .logs
            .lock()
            .map_err(|_| GatewayError::Permanent("memory gateway lock poisoned".into()))?;
        Ok(f(&mut logs))
    }
}

#[async_trait]
impl NegotiationGateway for MemoryGateway {
    async fn send_message(
        &self,
        negotiation_id: &str,
        message: &NegotiationMessage,
    ) -> Result<(), GatewayError> {
        self.before_call().await?;
        trace!(negotiation = negotiation_id, message = message.id(), "send_message");

        self.with_logs(|logs| {
            let log = logs.entry(negotiation_id.to_string()).or_default();
            apply_mutation(log, &Mutation::Append(message.clone()))
        })?
    }

    async fn update_message_status(
        &self,
        negotiation_id: &str,
        message_id: &str,
        status: MessageStatus,
    ) -> Result<(), GatewayError> {
        self.before_call().await?;
        trace!(negotiation = negotiation_id, message = message_id, ?status, "update_message_status");

        self.with_logs(|logs| {
            let log = logs.entry(negotiation_id.to_string()).or_default();
            apply_mutation(
                log,
                &Mutation::SetStatus {
                    message_id: message_id.to_string(),
                    status,
                },
            )
        })?
    }

    async fn load_messages(
        &self,
        negotiation_id: &str,
    ) -> Result<Vec<NegotiationMessage>, GatewayError> {
        self.before_call().await?;
        self.with_logs(|logs| logs.get(negotiation_id).cloned().unwrap_or_default())
    }

    async fn commit(&self, negotiation_id: &str, commit: &Commit) -> Result<(), GatewayError> {
        self.before_call().await?;
        trace!(negotiation = negotiation_id, mutations = commit.mutations.len(), "commit");

        self.with_logs(|logs| {
            let log = logs.entry(negotiation_id.to_string()).or_default();
            commit.apply_to(log).map(|_| ())
        })?
    }
}
