//! Negotiation messages and the roles that author them
use super::error::NegotiationError;
use super::offer::{Offer, OfferDraft};
use super::utils::{self, MESSAGE_HRP};
use chrono::{DateTime, TimeZone, Utc};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    #[n(0)]
    Investor,
    #[n(1)]
    Lender,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Accepted,
    #[n(2)]
    Rejected,
    #[n(3)]
    Countered,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub url: String,
    #[n(3)]
    pub kind: String, // mime type or document category
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct NegotiationMessage {
    #[n(0)]
    id: String,
    #[n(1)]
    role: Role,
    #[n(2)]
    content: String,
    #[n(3)]
    timestamp: TimeStamp<Utc>,
    #[n(4)]
    status: MessageStatus,
    #[n(5)]
    offer: Option<Offer>,
    #[n(6)]
    attachments: Vec<Attachment>,
    #[n(7)]
    synthetic: bool, // inserted by the engine rather than typed by a participant
}

impl Role {
    pub fn other(&self) -> Role {
        match self {
            Role::Investor => Role::Lender,
            Role::Lender => Role::Investor,
        }
    }
    pub fn label(&self) -> &'static str {
        match self {
            Role::Investor => "investor",
            Role::Lender => "lender",
        }
    }
}

impl MessageStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, MessageStatus::Pending)
    }
}

impl Attachment {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        kind: impl Into<String>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            id: utils::new_uuid_to_bech32(utils::ATTACHMENT_HRP)?,
            name: name.into(),
            url: url.into(),
            kind: kind.into(),
        })
    }
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl NegotiationMessage {
    /// Build a new pending message. Nothing is persisted here.
    ///
    /// Content may only be blank when the message carries an offer, and the
    /// offer draft is validated before anything is constructed.
    pub fn create(
        role: Role,
        content: impl Into<String>,
        offer: Option<OfferDraft>,
        attachments: Vec<Attachment>,
    ) -> Result<Self, NegotiationError> {
        let content = content.into();
        let offer = offer.map(OfferDraft::finalise).transpose()?;

        if offer.is_none() && content.trim().is_empty() {
            return Err(NegotiationError::EmptyContent);
        }

        Self::assemble(role, content, offer, attachments, false)
    }

    /// Engine generated notice, e.g. the confirmation restating accepted terms.
    pub(crate) fn synthetic(role: Role, content: String) -> Result<Self, NegotiationError> {
        Self::assemble(role, content, None, Vec::new(), true)
    }

    fn assemble(
        role: Role,
        content: String,
        offer: Option<Offer>,
        attachments: Vec<Attachment>,
        synthetic: bool,
    ) -> Result<Self, NegotiationError> {
        let id = utils::new_uuid_to_bech32(MESSAGE_HRP).map_err(NegotiationError::Identifier)?;

        Ok(Self {
            id,
            role,
            content,
            timestamp: TimeStamp::new(),
            status: MessageStatus::Pending,
            offer,
            attachments,
            synthetic,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn role(&self) -> Role {
        self.role
    }
    pub fn content(&self) -> &str {
        &self.content
    }
    pub fn timestamp(&self) -> &TimeStamp<Utc> {
        &self.timestamp
    }
    pub fn status(&self) -> MessageStatus {
        self.status
    }
    pub fn offer(&self) -> Option<&Offer> {
        self.offer.as_ref()
    }
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }
    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }
    pub fn is_offer_bearing(&self) -> bool {
        self.offer.is_some()
    }
    /// An offer that is still waiting on the other party.
    pub fn is_live_offer(&self) -> bool {
        self.is_offer_bearing() && self.status == MessageStatus::Pending
    }

    // status is the only field that moves after creation
    pub(crate) fn set_status(&mut self, status: MessageStatus) {
        self.status = status;
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OfferError;
    use crate::offer::InterestRate;

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(original.clone()).unwrap();
        let decode: TimeStamp<Utc> = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn offer_message_may_have_blank_content() {
        let draft = OfferDraft::new()
            .set_amount_cents(100_00)
            .set_interest_rate(InterestRate::from_bps(500))
            .set_term_days(90);
        let msg = NegotiationMessage::create(Role::Investor, "", Some(draft), vec![]).unwrap();

        assert!(msg.is_live_offer());
        assert!(!msg.is_synthetic());
        assert!(msg.id().starts_with("msg_1"));
    }

    #[test]
    fn chat_message_needs_content() {
        let res = NegotiationMessage::create(Role::Lender, "  ", None, vec![]);
        assert!(matches!(res, Err(NegotiationError::EmptyContent)));

        let msg = NegotiationMessage::create(Role::Lender, "hello", None, vec![]).unwrap();
        assert_eq!(msg.status(), MessageStatus::Pending);
        assert!(!msg.is_live_offer());
    }

    #[test]
    fn invalid_offer_builds_nothing() {
        let draft = OfferDraft::new()
            .set_amount_cents(100_00)
            .set_interest_rate("150".parse().unwrap())
            .set_term_days(90);
        let res = NegotiationMessage::create(Role::Investor, "too high", Some(draft), vec![]);

        assert!(matches!(
            res,
            Err(NegotiationError::InvalidOffer(OfferError::RateOutOfRange(15_000)))
        ));
    }

    #[test]
    fn roles_alternate() {
        assert_eq!(Role::Investor.other(), Role::Lender);
        assert_eq!(Role::Lender.other(), Role::Investor);
    }
}
