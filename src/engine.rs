//! Engine API for negotiation actions
use super::config::EngineConfig;
use super::error::NegotiationError;
use super::gateway::{Commit, GatewayError, Mutation, NegotiationGateway};
use super::message::{Attachment, MessageStatus, Role};
use super::negotiation::{Negotiation, Participants};
use super::offer::OfferDraft;
use super::transition::{self, Transition, TransitionKind};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Validates actions against a negotiation, persists them through the
/// gateway and hands back the updated negotiation.
///
/// Operations never mutate the negotiation they are given. A failed call
/// leaves the caller holding the last acknowledged state.
pub struct NegotiationEngine<G: NegotiationGateway> {
    gateway: Arc<G>,
    config: EngineConfig,
    latest_ticket: AtomicU64,
}

impl<G: NegotiationGateway> NegotiationEngine<G> {
    pub fn new(gateway: Arc<G>, config: EngineConfig) -> Self {
        Self {
            gateway,
            config,
            latest_ticket: AtomicU64::new(0),
        }
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Abandon whatever call is in flight. Its result will be discarded with
    /// [`NegotiationError::StaleResponse`] when the gateway answers.
    pub fn cancel_in_flight(&self) {
        let ticket = self.latest_ticket.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(ticket, "cancelled in-flight request");
    }

    /// Plain chat. Always allowed, never actionable.
    pub async fn send_message(
        &self,
        negotiation: &Negotiation,
        author: Role,
        content: &str,
        attachments: Vec<Attachment>,
    ) -> Result<Negotiation, NegotiationError> {
        let planned = transition::plan_chat(negotiation, author, content, attachments)?;
        self.commit(planned).await
    }

    /// Put a new offer on the table, countering the other side's open offer if there is one.
    pub async fn submit_offer(
        &self,
        negotiation: &Negotiation,
        author: Role,
        draft: OfferDraft,
        content: &str,
        attachments: Vec<Attachment>,
    ) -> Result<Negotiation, NegotiationError> {
        let planned = transition::plan_submit(negotiation, author, draft, content, attachments)?;
        self.commit(planned).await
    }

    pub async fn accept_offer(
        &self,
        negotiation: &Negotiation,
        message_id: &str,
        acting: Role,
    ) -> Result<Negotiation, NegotiationError> {
        let planned = transition::plan_accept(negotiation, message_id, acting)?;
        self.commit(planned).await
    }

    pub async fn reject_offer(
        &self,
        negotiation: &Negotiation,
        message_id: &str,
        acting: Role,
    ) -> Result<Negotiation, NegotiationError> {
        let planned = transition::plan_reject(negotiation, message_id, acting)?;
        self.commit(planned).await
    }

    pub async fn counter_offer(
        &self,
        negotiation: &Negotiation,
        message_id: &str,
        acting: Role,
        draft: OfferDraft,
        content: &str,
        attachments: Vec<Attachment>,
    ) -> Result<Negotiation, NegotiationError> {
        let planned =
            transition::plan_counter(negotiation, message_id, acting, draft, content, attachments)?;
        self.commit(planned).await
    }

    /// Resend a transition taken from [`NegotiationError::into_retry`].
    ///
    /// Planning again would mint new message ids, and a first attempt that
    /// was stored but never acknowledged would then be stored twice.
    pub async fn retry(&self, planned: Transition) -> Result<Negotiation, NegotiationError> {
        debug!(negotiation = planned.next.id(), kind = ?planned.kind, "retrying transition");
        self.commit(planned).await
    }

    /// Fetch a stored log and rebuild the negotiation from it, persisting any
    /// repairs replay had to make.
    pub async fn load(
        &self,
        negotiation_id: &str,
        participants: Participants,
        property_ref: &str,
    ) -> Result<Negotiation, NegotiationError> {
        let persistence = |source: GatewayError| NegotiationError::Persistence {
            negotiation_id: negotiation_id.to_string(),
            message_id: None,
            transition: TransitionKind::Reconcile,
            source,
            planned: None,
        };

        let ticket = self.next_ticket();
        let loaded = self.bounded(self.gateway.load_messages(negotiation_id)).await;
        self.ensure_current(ticket)?;
        let messages = loaded.map_err(persistence)?;

        let (negotiation, repaired) =
            Negotiation::replay(negotiation_id, participants, property_ref, messages)?;
        if repaired.is_empty() {
            return Ok(negotiation);
        }

        warn!(
            negotiation = negotiation_id,
            ?repaired,
            "stored log had partially applied counters"
        );
        let commit = Commit {
            base_len: negotiation.messages().len(),
            mutations: repaired
                .into_iter()
                .map(|message_id| Mutation::SetStatus {
                    message_id,
                    status: MessageStatus::Countered,
                })
                .collect(),
        };
        let stored = self.bounded(self.gateway.commit(negotiation_id, &commit)).await;
        self.ensure_current(ticket)?;
        stored.map_err(persistence)?;

        Ok(negotiation)
    }

    async fn commit(&self, planned: Transition) -> Result<Negotiation, NegotiationError> {
        let ticket = self.next_ticket();
        let negotiation_id = planned.next.id().to_string();
        let negotiation_id = negotiation_id.as_str();

        let outcome = self
            .bounded(self.gateway.commit(negotiation_id, &planned.commit))
            .await;
        self.ensure_current(ticket)?;

        match outcome {
            Ok(()) => {
                info!(
                    negotiation = negotiation_id,
                    kind = ?planned.kind,
                    message = ?planned.message_id,
                    "transition committed"
                );
                Ok(planned.next)
            }
            Err(GatewayError::Conflict { expected, found }) => {
                warn!(negotiation = negotiation_id, expected, found, "stored log moved underneath us");
                Err(NegotiationError::Conflict {
                    negotiation_id: negotiation_id.to_string(),
                    expected,
                    found,
                })
            }
            Err(source) => {
                warn!(
                    negotiation = negotiation_id,
                    kind = ?planned.kind,
                    transient = source.is_transient(),
                    error = %source,
                    "failed to persist transition"
                );
                Err(NegotiationError::Persistence {
                    negotiation_id: negotiation_id.to_string(),
                    message_id: planned.message_id.clone(),
                    transition: planned.kind,
                    source,
                    planned: Some(Box::new(planned)),
                })
            }
        }
    }

    fn next_ticket(&self) -> u64 {
        self.latest_ticket.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn ensure_current(&self, ticket: u64) -> Result<(), NegotiationError> {
        if self.latest_ticket.load(Ordering::SeqCst) != ticket {
            debug!(ticket, "discarding superseded gateway response");
            return Err(NegotiationError::StaleResponse { ticket });
        }
        Ok(())
    }

    // an elapsed timeout is reported like any other transient gateway failure
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, GatewayError>>,
    ) -> Result<T, GatewayError> {
        let limit = self.config.gateway_timeout;
        tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
            Err(GatewayError::Transient(format!(
                "gateway did not answer within {limit:?}"
            )))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::memory::MemoryGateway;
    use crate::offer::InterestRate;
    use std::time::Duration;

    fn engine() -> NegotiationEngine<MemoryGateway> {
        NegotiationEngine::new(Arc::new(MemoryGateway::new()), EngineConfig::default())
    }

    fn draft(cents: u64) -> OfferDraft {
        OfferDraft::new()
            .set_amount_cents(cents)
            .set_interest_rate(InterestRate::from_bps(650))
            .set_term_days(365)
    }

    fn empty() -> Negotiation {
        Negotiation::with_id("neg_engine", Participants::new("alice", "bob"), "prop_1")
    }

    #[tokio::test]
    async fn precondition_failures_skip_the_gateway() {
        let engine = engine();
        let neg = engine
            .submit_offer(&empty(), Role::Investor, draft(1_000_00), "", vec![])
            .await
            .unwrap();
        let calls = engine.gateway().calls();
        let id = neg.messages()[0].id().to_string();

        let res = engine.accept_offer(&neg, &id, Role::Investor).await;

        assert!(matches!(res, Err(NegotiationError::OwnOffer(_))));
        assert_eq!(engine.gateway().calls(), calls);
    }

    #[tokio::test]
    async fn gateway_failure_changes_nothing() {
        let engine = engine();
        engine.gateway().fail_next(1);
        let neg = empty();

        let res = engine.submit_offer(&neg, Role::Investor, draft(1_000_00), "", vec![]).await;

        let err = res.unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(
            err,
            NegotiationError::Persistence {
                transition: TransitionKind::Submit,
                ..
            }
        ));
        assert!(neg.messages().is_empty());
        assert!(engine.gateway().stored(neg.id()).is_empty());
    }

    #[tokio::test]
    async fn retry_resends_the_planned_ids() {
        let engine = engine();
        engine.gateway().fail_next(1);
        let neg = empty();

        let err = engine
            .submit_offer(&neg, Role::Investor, draft(1_000_00), "", vec![])
            .await
            .unwrap_err();
        let planned = err.into_retry().expect("transient failures hand back the plan");
        let planned_id = planned.message_id.clone();

        let neg = engine.retry(planned).await.unwrap();

        assert_eq!(Some(neg.messages()[0].id().to_string()), planned_id);
        assert_eq!(engine.gateway().stored(neg.id()).len(), 1);
    }

    #[tokio::test]
    async fn retry_of_a_landed_commit_is_acknowledged() {
        let engine = engine();
        let neg = engine
            .submit_offer(&empty(), Role::Investor, draft(1_000_00), "", vec![])
            .await
            .unwrap();
        let investor_offer = neg.messages()[0].id().to_string();

        // the counter reaches storage but its acknowledgement never arrives
        let planned =
            transition::plan_counter(&neg, &investor_offer, Role::Lender, draft(900_00), "", vec![])
                .unwrap();
        engine.gateway().commit(neg.id(), &planned.commit).await.unwrap();

        let neg = engine.retry(planned).await.unwrap();

        assert_eq!(neg.awaiting_response_from(), Some(Role::Investor));
        assert_eq!(engine.gateway().stored(neg.id()), neg.messages());
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retryable() {
        let engine = engine();
        let neg = engine
            .submit_offer(&empty(), Role::Investor, draft(1_000_00), "", vec![])
            .await
            .unwrap();
        let id = neg.messages()[0].id().to_string();
        // another writer rejected it already, without moving the log length
        engine
            .gateway()
            .update_message_status(neg.id(), &id, MessageStatus::Rejected)
            .await
            .unwrap();

        let err = engine.accept_offer(&neg, &id, Role::Lender).await.unwrap_err();

        assert!(!err.is_retryable());
        assert!(err.into_retry().is_none());
    }

    #[tokio::test]
    async fn slow_gateway_times_out() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.set_delay(Duration::from_millis(200));
        let engine = NegotiationEngine::new(
            gateway,
            EngineConfig::default().with_gateway_timeout(Duration::from_millis(20)),
        );

        let res = engine
            .send_message(&empty(), Role::Lender, "anyone there?", vec![])
            .await;

        assert!(matches!(res, Err(ref e) if e.is_retryable()));
    }

    #[tokio::test]
    async fn cancelled_call_is_discarded() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.set_delay(Duration::from_millis(50));
        let engine = Arc::new(NegotiationEngine::new(gateway, EngineConfig::default()));

        let in_flight = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .submit_offer(&empty(), Role::Investor, draft(1_000_00), "", vec![])
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        engine.cancel_in_flight();

        let res = in_flight.await.unwrap();
        assert!(matches!(res, Err(NegotiationError::StaleResponse { .. })));
    }

    #[tokio::test]
    async fn load_repairs_and_persists() {
        let engine = engine();
        let neg = empty();
        let investor = crate::message::NegotiationMessage::create(
            Role::Investor,
            "",
            Some(draft(1_000_00)),
            vec![],
        )
        .unwrap();
        let lender =
            crate::message::NegotiationMessage::create(Role::Lender, "", Some(draft(900_00)), vec![])
                .unwrap();
        // a counter whose status update never landed
        engine.gateway().send_message(neg.id(), &investor).await.unwrap();
        engine.gateway().send_message(neg.id(), &lender).await.unwrap();

        let loaded = engine
            .load(neg.id(), Participants::new("alice", "bob"), "prop_1")
            .await
            .unwrap();

        assert_eq!(loaded.awaiting_response_from(), Some(Role::Investor));
        assert_eq!(
            engine.gateway().stored(neg.id())[0].status(),
            MessageStatus::Countered
        );
    }
}
