//! Pure transition planning
//!
//! Every engine action is validated here against the current log and turns
//! into a [`Transition`]: the ordered mutations to persist plus the
//! negotiation as it will look once they are acknowledged. No I/O happens in
//! this module.
use super::error::NegotiationError;
use super::gateway::{Commit, Mutation};
use super::message::{Attachment, MessageStatus, NegotiationMessage, Role};
use super::negotiation::Negotiation;
use super::offer::OfferDraft;
use super::present;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    Chat,
    Submit,
    Accept,
    Reject,
    Counter,
    Reconcile,
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub kind: TransitionKind,
    pub message_id: Option<String>, // the message acted on, or the one appended
    pub commit: Commit,
    pub next: Negotiation,
}

impl Transition {
    fn new(kind: TransitionKind, base: &Negotiation) -> Self {
        Self {
            kind,
            message_id: None,
            commit: Commit::new(base.messages().len()),
            next: base.clone(),
        }
    }

    fn set_status(&mut self, message_id: &str, status: MessageStatus) {
        if let Some(message) = self.next.message_mut(message_id) {
            message.set_status(status);
        }
        self.commit.mutations.push(Mutation::SetStatus {
            message_id: message_id.to_string(),
            status,
        });
    }

    fn append(&mut self, message: NegotiationMessage) {
        self.commit.mutations.push(Mutation::Append(message.clone()));
        self.next.push(message);
    }
}

/// Plain chat is allowed at any point, including after a deal is struck.
pub fn plan_chat(
    negotiation: &Negotiation,
    author: Role,
    content: &str,
    attachments: Vec<Attachment>,
) -> Result<Transition, NegotiationError> {
    let message = NegotiationMessage::create(author, content, None, attachments)?;

    let mut transition = Transition::new(TransitionKind::Chat, negotiation);
    transition.message_id = Some(message.id().to_string());
    transition.append(message);

    Ok(transition)
}

/// A new offer. An outstanding offer from the other role becomes `Countered`.
pub fn plan_submit(
    negotiation: &Negotiation,
    author: Role,
    draft: OfferDraft,
    content: &str,
    attachments: Vec<Attachment>,
) -> Result<Transition, NegotiationError> {
    if negotiation.is_resolved() {
        return Err(NegotiationError::NegotiationResolved(
            negotiation.id().to_string(),
        ));
    }

    let outstanding = negotiation.current_outstanding_offer();
    if let Some(open) = outstanding {
        if open.role() == author {
            return Err(NegotiationError::OwnOfferOutstanding(open.id().to_string()));
        }
    }

    let message = NegotiationMessage::create(author, content, Some(draft), attachments)?;

    // new offer first, so a commit cut short stays repairable by replay
    let mut transition = Transition::new(TransitionKind::Submit, negotiation);
    transition.message_id = Some(message.id().to_string());
    transition.append(message);
    if let Some(open) = outstanding {
        transition.set_status(open.id(), MessageStatus::Countered);
    }

    Ok(transition)
}

pub fn plan_accept(
    negotiation: &Negotiation,
    message_id: &str,
    acting: Role,
) -> Result<Transition, NegotiationError> {
    let target = actionable(negotiation, message_id, acting)?;
    let summary = target.offer().map(present::summarize_offer).unwrap_or_default();
    let notice = NegotiationMessage::synthetic(acting, format!("Offer accepted: {summary}"))?;

    let mut transition = Transition::new(TransitionKind::Accept, negotiation);
    transition.message_id = Some(message_id.to_string());
    transition.set_status(message_id, MessageStatus::Accepted);
    transition.append(notice);

    Ok(transition)
}

/// Rejecting closes the offer but not the negotiation.
pub fn plan_reject(
    negotiation: &Negotiation,
    message_id: &str,
    acting: Role,
) -> Result<Transition, NegotiationError> {
    let target = actionable(negotiation, message_id, acting)?;
    let summary = target.offer().map(present::summarize_offer).unwrap_or_default();
    let notice = NegotiationMessage::synthetic(acting, format!("Offer declined: {summary}"))?;

    let mut transition = Transition::new(TransitionKind::Reject, negotiation);
    transition.message_id = Some(message_id.to_string());
    transition.set_status(message_id, MessageStatus::Rejected);
    transition.append(notice);

    Ok(transition)
}

pub fn plan_counter(
    negotiation: &Negotiation,
    message_id: &str,
    acting: Role,
    draft: OfferDraft,
    content: &str,
    attachments: Vec<Attachment>,
) -> Result<Transition, NegotiationError> {
    actionable(negotiation, message_id, acting)?;
    let message = NegotiationMessage::create(acting, content, Some(draft), attachments)?;

    let mut transition = Transition::new(TransitionKind::Counter, negotiation);
    transition.message_id = Some(message_id.to_string());
    transition.append(message);
    transition.set_status(message_id, MessageStatus::Countered);

    Ok(transition)
}

// Target must exist, carry an offer, still be pending, and belong to the other role
fn actionable<'a>(
    negotiation: &'a Negotiation,
    message_id: &str,
    acting: Role,
) -> Result<&'a NegotiationMessage, NegotiationError> {
    let target = negotiation
        .message(message_id)
        .ok_or_else(|| NegotiationError::MessageNotFound(message_id.to_string()))?;

    if !target.is_offer_bearing() {
        return Err(NegotiationError::NotOfferBearing(message_id.to_string()));
    }
    if target.status().is_terminal() {
        return Err(NegotiationError::AlreadyResolved {
            message_id: message_id.to_string(),
            status: target.status(),
        });
    }
    if target.role() == acting {
        return Err(NegotiationError::OwnOffer(message_id.to_string()));
    }

    Ok(target)
}
