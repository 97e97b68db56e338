//! Gateway over an embedded sled database
use super::{Commit, GatewayError, Mutation, NegotiationGateway};
use crate::message::{MessageStatus, NegotiationMessage};
use async_trait::async_trait;
use sled::{Batch, Db};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Stores one CBOR encoded message log per negotiation, next to its sha256.
pub struct SledGateway {
    instance: Arc<Db>,
    // serialises read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

fn log_key(negotiation_id: &str) -> String {
    format!("log/{negotiation_id}")
}

fn digest_key(negotiation_id: &str) -> String {
    format!("digest/{negotiation_id}")
}

fn storage_error(err: sled::Error) -> GatewayError {
    match err {
        sled::Error::Io(e) => GatewayError::Transient(e.to_string()),
        other => GatewayError::Permanent(other.to_string()),
    }
}

impl SledGateway {
    pub fn new(instance: Arc<Db>) -> Self {
        Self {
            instance,
            write_lock: Mutex::new(()),
        }
    }

    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, GatewayError> {
        let db = sled::open(path).map_err(storage_error)?;
        Ok(Self::new(Arc::new(db)))
    }

    /// Load the stored log, checking it against its recorded digest.
    fn load_log(&self, negotiation_id: &str) -> Result<Vec<NegotiationMessage>, GatewayError> {
        let Some(cbor) = self
            .instance
            .get(log_key(negotiation_id))
            .map_err(storage_error)?
        else {
            return Ok(vec![]);
        };

        if let Some(recorded) = self
            .instance
            .get(digest_key(negotiation_id))
            .map_err(storage_error)?
        {
            if &recorded[..] != sha256::digest(&cbor[..]).as_bytes() {
                warn!(negotiation = negotiation_id, "stored log does not match its digest");
                return Err(GatewayError::Codec(format!(
                    "digest mismatch for {negotiation_id}"
                )));
            }
        }

        minicbor::decode(&cbor).map_err(|e| GatewayError::Codec(e.to_string()))
    }

    /// Write the log and its digest in one batch.
    fn save_log(
        &self,
        negotiation_id: &str,
        log: &[NegotiationMessage],
    ) -> Result<(), GatewayError> {
        let cbor = minicbor::to_vec(log).map_err(|e| GatewayError::Codec(e.to_string()))?;
        let hash = sha256::digest(cbor.as_slice());

        let mut batch = Batch::default();
        batch.insert(log_key(negotiation_id).as_bytes(), cbor);
        batch.insert(digest_key(negotiation_id).as_bytes(), hash.as_bytes());
        self.instance.apply_batch(batch).map_err(storage_error)?;
        self.instance.flush().map_err(storage_error)?;

        Ok(())
    }

    fn modify<T>(
        &self,
        negotiation_id: &str,
        f: impl FnOnce(&mut Vec<NegotiationMessage>) -> Result<T, GatewayError>,
    ) -> Result<T, GatewayError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| GatewayError::Permanent("sled gateway lock poisoned".into()))?;

        let mut log = self.load_log(negotiation_id)?;
        let before = log.clone();
        let out = f(&mut log)?;
        if log != before {
            self.save_log(negotiation_id, &log)?;
        }
        Ok(out)
    }
}

#[async_trait]
impl NegotiationGateway for SledGateway {
    async fn send_message(
        &self,
        negotiation_id: &str,
        message: &NegotiationMessage,
    ) -> Result<(), GatewayError> {
        self.modify(negotiation_id, |log| {
            super::apply_mutation(log, &Mutation::Append(message.clone()))
        })
    }

    async fn update_message_status(
        &self,
        negotiation_id: &str,
        message_id: &str,
        status: MessageStatus,
    ) -> Result<(), GatewayError> {
        self.modify(negotiation_id, |log| {
            super::apply_mutation(
                log,
                &Mutation::SetStatus {
                    message_id: message_id.to_string(),
                    status,
                },
            )
        })
    }

    async fn load_messages(
        &self,
        negotiation_id: &str,
    ) -> Result<Vec<NegotiationMessage>, GatewayError> {
        self.load_log(negotiation_id)
    }

    async fn commit(&self, negotiation_id: &str, commit: &Commit) -> Result<(), GatewayError> {
        let changed = self.modify(negotiation_id, |log| commit.apply_to(log))?;
        if !changed {
            debug!(negotiation = negotiation_id, "commit already stored, treating as a retry");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use tempfile::tempdir;

    #[tokio::test]
    async fn log_is_shared_through_the_db() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let db = Arc::new(sled::open(temp_dir.path().join("shared.db"))?);
        let message = NegotiationMessage::create(Role::Investor, "hello", None, vec![])?;

        {
            let gateway = SledGateway::new(db.clone());
            gateway.send_message("neg_a", &message).await?;
        }

        let gateway = SledGateway::new(db);
        assert_eq!(gateway.load_messages("neg_a").await?, vec![message]);
        assert!(gateway.load_messages("neg_unknown").await?.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn tampered_log_is_detected() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let db = Arc::new(sled::open(temp_dir.path().join("tamper.db"))?);
        let gateway = SledGateway::new(db.clone());
        let message = NegotiationMessage::create(Role::Lender, "hello", None, vec![])?;
        gateway.send_message("neg_a", &message).await?;

        db.insert(digest_key("neg_a"), "not a digest".as_bytes())?;

        assert!(matches!(
            gateway.load_messages("neg_a").await,
            Err(GatewayError::Codec(_))
        ));
        Ok(())
    }
}
