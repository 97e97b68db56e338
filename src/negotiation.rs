//! The negotiation log and the state derived from it
use super::error::NegotiationError;
use super::message::{MessageStatus, NegotiationMessage, Role};
use super::present;
use super::utils::{self, NEGOTIATION_HRP};
use tracing::debug;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Participants {
    #[n(0)]
    pub investor: String,
    #[n(1)]
    pub lender: String,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Negotiation {
    #[n(0)]
    id: String, // bech32 encoded uuid7, "neg_" prefix
    #[n(1)]
    participants: Participants,
    #[n(2)]
    property_ref: String, // id of the property/funding request, owned elsewhere
    #[n(3)]
    messages: Vec<NegotiationMessage>, // append only, insertion order is chronological
}

impl Participants {
    pub fn new(investor: impl Into<String>, lender: impl Into<String>) -> Self {
        Self {
            investor: investor.into(),
            lender: lender.into(),
        }
    }
    pub fn identity(&self, role: Role) -> &str {
        match role {
            Role::Investor => &self.investor,
            Role::Lender => &self.lender,
        }
    }
}

impl Negotiation {
    /// An empty negotiation. It is first persisted when a message is committed.
    pub fn new(
        participants: Participants,
        property_ref: impl Into<String>,
    ) -> Result<Self, NegotiationError> {
        let id = utils::new_uuid_to_bech32(NEGOTIATION_HRP).map_err(NegotiationError::Identifier)?;
        Ok(Self::with_id(id, participants, property_ref))
    }

    pub fn with_id(
        id: impl Into<String>,
        participants: Participants,
        property_ref: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            participants,
            property_ref: property_ref.into(),
            messages: vec![],
        }
    }

    /// Rebuild a negotiation from a persisted log.
    ///
    /// Offers are re-validated and a partially applied counter (an older offer
    /// left pending behind a newer offer from the other role) is repaired to
    /// `Countered`. Returns the ids of the repaired messages.
    pub fn replay(
        id: impl Into<String>,
        participants: Participants,
        property_ref: impl Into<String>,
        messages: Vec<NegotiationMessage>,
    ) -> Result<(Self, Vec<String>), NegotiationError> {
        let mut negotiation = Self::with_id(id, participants, property_ref);
        let mut repaired = vec![];

        for message in messages {
            if let Some(offer) = message.offer() {
                offer.validate()?;
            }
            if negotiation.message(message.id()).is_some() {
                return Err(NegotiationError::CorruptLog(format!(
                    "duplicate message {}",
                    message.id()
                )));
            }
            if !message.is_offer_bearing() && message.status() != MessageStatus::Pending {
                return Err(NegotiationError::CorruptLog(format!(
                    "message {} carries no offer but is {:?}",
                    message.id(),
                    message.status()
                )));
            }
            if message.is_offer_bearing() {
                if negotiation.is_resolved() {
                    return Err(NegotiationError::CorruptLog(format!(
                        "offer {} follows an accepted offer",
                        message.id()
                    )));
                }
                if let Some(previous) = negotiation.live_offer_mut() {
                    if previous.role() == message.role() {
                        return Err(NegotiationError::CorruptLog(format!(
                            "{} follows {} from the same role while it is still pending",
                            message.id(),
                            previous.id()
                        )));
                    }
                    previous.set_status(MessageStatus::Countered);
                    repaired.push(previous.id().to_string());
                }
            }
            negotiation.messages.push(message);
        }

        if !repaired.is_empty() {
            debug!(negotiation = %negotiation.id, ?repaired, "repaired partially applied counters");
        }

        Ok((negotiation, repaired))
    }

    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn participants(&self) -> &Participants {
        &self.participants
    }
    pub fn property_ref(&self) -> &str {
        &self.property_ref
    }
    pub fn messages(&self) -> &[NegotiationMessage] {
        &self.messages
    }
    pub fn message(&self, id: &str) -> Option<&NegotiationMessage> {
        self.messages.iter().find(|m| m.id() == id)
    }
    pub fn offers(&self) -> impl Iterator<Item = &NegotiationMessage> {
        self.messages.iter().filter(|m| m.is_offer_bearing())
    }

    /// The most recent offer-bearing message still pending.
    pub fn current_outstanding_offer(&self) -> Option<&NegotiationMessage> {
        self.offers().last().filter(|m| m.is_live_offer())
    }

    /// The role expected to answer the outstanding offer.
    pub fn awaiting_response_from(&self) -> Option<Role> {
        self.current_outstanding_offer().map(|m| m.role().other())
    }

    pub fn is_resolved(&self) -> bool {
        self.accepted_offer().is_some()
    }

    pub fn accepted_offer(&self) -> Option<&NegotiationMessage> {
        self.messages
            .iter()
            .find(|m| m.status() == MessageStatus::Accepted)
    }

    /// sha256 over the CBOR encoded negotiation.
    pub fn digest(&self) -> Result<String, NegotiationError> {
        let (hash, _) = self.serialize_with_hash()?;
        Ok(hash)
    }

    pub fn serialize_with_hash(&self) -> Result<(String, Vec<u8>), NegotiationError> {
        let cbor = minicbor::to_vec(self).map_err(|e| NegotiationError::Codec(e.to_string()))?;
        let hash = sha256::digest(cbor.as_slice());

        Ok((hash, cbor))
    }

    /// One line per message, oldest first.
    pub fn history(&self) -> Vec<String> {
        self.messages
            .iter()
            .map(|m| {
                let when = m.timestamp().to_datetime_utc().format("%Y-%m-%d %H:%M");
                let who = self.participants.identity(m.role());
                match m.offer() {
                    Some(offer) => format!(
                        "[{when}] {} ({who}) offered {} [{:?}] {}",
                        m.role().label(),
                        present::summarize_offer(offer),
                        m.status(),
                        m.content()
                    ),
                    None => format!("[{when}] {} ({who}): {}", m.role().label(), m.content()),
                }
            })
            .collect()
    }

    pub(crate) fn message_mut(&mut self, id: &str) -> Option<&mut NegotiationMessage> {
        self.messages.iter_mut().find(|m| m.id() == id)
    }

    pub(crate) fn push(&mut self, message: NegotiationMessage) {
        self.messages.push(message);
    }

    fn live_offer_mut(&mut self) -> Option<&mut NegotiationMessage> {
        self.messages
            .iter_mut()
            .rev()
            .find(|m| m.is_offer_bearing())
            .filter(|m| m.is_live_offer())
    }
}
