use chrono::NaiveDate;
use uuid::Uuid;

use crate::domain::Slot;

/// Outbound messages to users
///
/// Delivery is best-effort. Callers log failures and carry on.
#[mockall::automock]
#[async_trait::async_trait]
pub trait NotificationPort: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), Error>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub recipient: String,
    pub template: Template,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Template {
    AppointmentConfirmed {
        appointment_id: Uuid,
        date: NaiveDate,
        slot: Slot,
        price: u32,
    },
    AppointmentCancelled {
        appointment_id: Uuid,
        date: NaiveDate,
        refunded_points: u32,
    },
    PurchaseCompleted {
        purchase_id: Uuid,
        points_awarded: u32,
    },
}

impl Template {
    pub fn name(&self) -> &'static str {
        match self {
            Template::AppointmentConfirmed { .. } => "appointment_confirmed",
            Template::AppointmentCancelled { .. } => "appointment_cancelled",
            Template::PurchaseCompleted { .. } => "purchase_completed",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid recipient address: {0}")]
    InvalidRecipient(String),

    /// Concrete adapter errors
    ///
    /// This could represent any errors from a concrete adapter that is not part of the domain
    /// model, such as connectivity, configuration, or permission errors.
    #[error("adapter error: {0:?}")]
    Adapter(Box<dyn std::error::Error + Send + Sync>),
}
