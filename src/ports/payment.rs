//! Payment processor capability.
//!
//! The processor owns the authoritative state of every charge. The engine
//! only ever asks it to start a charge, reads its status back, and checks
//! that webhook deliveries really come from it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::IntentStatus;

#[mockall::automock]
#[async_trait::async_trait]
pub trait PaymentPort: Send + Sync {
    /// Start a charge of `amount` minor currency units
    async fn create_intent(
        &self,
        amount: u32,
        metadata: IntentMetadata,
    ) -> Result<PaymentIntent, Error>;
    async fn get_intent_status(&self, external_id: &str) -> Result<IntentStatus, Error>;
    /// Check the signature of a webhook delivery and parse its event
    fn verify_webhook(&self, payload: &[u8], signature: &str) -> Result<WebhookEvent, Error>;
}

/// Attached to an intent so that the processor's dashboard can be traced back
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IntentMetadata {
    pub user_id: Uuid,
    pub pack_id: Uuid,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentIntent {
    pub external_id: String,
    /// Handed to the client to complete the payment
    pub client_secret: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: WebhookEventKind,
    pub data: WebhookEventData,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct WebhookEventData {
    /// External id of the payment intent
    pub id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub enum WebhookEventKind {
    #[serde(rename = "payment_intent.succeeded")]
    PaymentSucceeded,
    #[serde(rename = "payment_intent.payment_failed")]
    PaymentFailed,
    #[serde(rename = "payment_intent.canceled")]
    PaymentCanceled,
    #[serde(other)]
    Other,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("payment intent {0} does not exist")]
    IntentDoesNotExist(String),

    #[error("invalid webhook signature")]
    InvalidSignature,

    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),

    /// Network or processor-side failure. Worth retrying.
    #[error("payment processor unavailable: {0}")]
    Unavailable(String),

    /// Concrete adapter errors
    ///
    /// This could represent any errors from a concrete adapter that is not part of the domain
    /// model, such as connectivity, configuration, or permission errors.
    #[error("adapter error: {0:?}")]
    Adapter(Box<dyn std::error::Error + Send + Sync>),
}
