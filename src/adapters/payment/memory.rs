//! In-process stand-in for the payment processor.
//!
//! Intents live in a map and only change status when a test (or a local
//! operator) says so. Webhook payloads are signed the way the real processor
//! signs them: `sha256=<hex HMAC-SHA256 of the raw body>`.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::{
    adapters::database::memory::ErasedPoisonError,
    domain::IntentStatus,
    ports::payment::{Error, IntentMetadata, PaymentIntent, PaymentPort, WebhookEvent},
};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Clone, Debug)]
struct StoredIntent {
    amount: u32,
    metadata: IntentMetadata,
    status: IntentStatus,
}

#[derive(Clone, Debug)]
pub struct MemoryPaymentProcessor {
    webhook_secret: String,
    intents: Arc<Mutex<HashMap<String, StoredIntent>>>,
    /// Number of upcoming status queries that fail as if the network dropped
    failing_queries: Arc<Mutex<u32>>,
}

impl MemoryPaymentProcessor {
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
            intents: Arc::default(),
            failing_queries: Arc::default(),
        }
    }

    pub fn set_status(&self, external_id: &str, status: IntentStatus) -> Result<(), Error> {
        let mut intents = self.intents.lock()?;
        let intent = intents
            .get_mut(external_id)
            .ok_or_else(|| Error::IntentDoesNotExist(external_id.to_string()))?;
        intent.status = status;
        Ok(())
    }

    pub fn amount(&self, external_id: &str) -> Result<u32, Error> {
        self.intents
            .lock()?
            .get(external_id)
            .map(|intent| intent.amount)
            .ok_or_else(|| Error::IntentDoesNotExist(external_id.to_string()))
    }

    pub fn metadata(&self, external_id: &str) -> Result<IntentMetadata, Error> {
        self.intents
            .lock()?
            .get(external_id)
            .map(|intent| intent.metadata.clone())
            .ok_or_else(|| Error::IntentDoesNotExist(external_id.to_string()))
    }

    /// Make the next `count` status queries fail with [`Error::Unavailable`]
    pub fn fail_next_queries(&self, count: u32) -> Result<(), Error> {
        *self.failing_queries.lock()? = count;
        Ok(())
    }

    /// Signature header value for a webhook body
    pub fn sign(&self, payload: &[u8]) -> Result<String, Error> {
        let mut mac = self.mac()?;
        mac.update(payload);
        Ok(format!(
            "{SIGNATURE_PREFIX}{}",
            hex::encode(mac.finalize().into_bytes())
        ))
    }

    fn mac(&self) -> Result<HmacSha256, Error> {
        HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|err| Error::Adapter(err.to_string().into()))
    }
}

#[async_trait::async_trait]
impl PaymentPort for MemoryPaymentProcessor {
    async fn create_intent(
        &self,
        amount: u32,
        metadata: IntentMetadata,
    ) -> Result<PaymentIntent, Error> {
        let external_id = format!("pi_{}", Uuid::new_v4().simple());
        let client_secret = format!("{external_id}_secret_{}", Uuid::new_v4().simple());
        self.intents.lock()?.insert(
            external_id.clone(),
            StoredIntent {
                amount,
                metadata,
                status: IntentStatus::RequiresPaymentMethod,
            },
        );

        Ok(PaymentIntent {
            external_id,
            client_secret,
        })
    }

    async fn get_intent_status(&self, external_id: &str) -> Result<IntentStatus, Error> {
        {
            let mut failing = self.failing_queries.lock()?;
            if *failing > 0 {
                *failing -= 1;
                return Err(Error::Unavailable("connection reset".to_string()));
            }
        }

        self.intents
            .lock()?
            .get(external_id)
            .map(|intent| intent.status)
            .ok_or_else(|| Error::IntentDoesNotExist(external_id.to_string()))
    }

    fn verify_webhook(&self, payload: &[u8], signature: &str) -> Result<WebhookEvent, Error> {
        let expected = signature
            .strip_prefix(SIGNATURE_PREFIX)
            .and_then(|encoded| hex::decode(encoded).ok())
            .ok_or(Error::InvalidSignature)?;

        let mut mac = self.mac()?;
        mac.update(payload);
        mac.verify_slice(&expected)
            .map_err(|_| Error::InvalidSignature)?;

        serde_json::from_slice(payload).map_err(|err| Error::MalformedPayload(err.to_string()))
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(err: PoisonError<T>) -> Self {
        Self::Adapter(Box::new(ErasedPoisonError::from(err)))
    }
}
