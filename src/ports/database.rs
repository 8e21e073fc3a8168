use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::domain::{
    Appointment, AppointmentStatus, Pack, Purchase, PurchaseAward, PurchaseStatus, Slot,
};

/// Document store for appointments, packs and purchases
///
/// Every status change goes through a conditional update that names the
/// statuses it is allowed to start from. Implementations must apply the check
/// and the write as one atomic step.
#[mockall::automock]
#[async_trait::async_trait]
pub trait DatabasePort: Send + Sync {
    /// Store a new appointment
    ///
    /// Fails with [`Error::SlotTaken`] if another active appointment already
    /// holds the same date and slot, and with [`Error::UserLimitReached`] if
    /// its owner already holds `user_limit` active appointments. Both checks
    /// happen together with the insert.
    async fn insert_appointment(
        &self,
        appointment: Appointment,
        user_limit: usize,
    ) -> Result<Appointment, Error>;
    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, Error>;
    /// Hard delete, only used to undo an insert whose unit of work failed
    async fn delete_appointment(&self, appointment_id: Uuid) -> Result<(), Error>;
    async fn active_appointments_on(&self, date: NaiveDate) -> Result<Vec<Appointment>, Error>;
    async fn count_active_appointments_for_user(&self, user_id: Uuid) -> Result<usize, Error>;
    /// Number of active appointments per date between `from` and `until`, inclusive
    ///
    /// Dates without any active appointment may be left out.
    async fn active_appointment_counts(
        &self,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, usize>, Error>;
    /// Move an appointment to `to` if its current status is one of `from`
    ///
    /// Moving into an active status re-checks the slot uniqueness constraint.
    async fn transition_appointment(
        &self,
        appointment_id: Uuid,
        from: Vec<AppointmentStatus>,
        to: AppointmentStatus,
    ) -> Result<Appointment, Error>;

    async fn get_pack(&self, pack_id: Uuid) -> Result<Pack, Error>;

    /// Store a new purchase. References are unique.
    async fn insert_purchase(&self, purchase: Purchase) -> Result<Purchase, Error>;
    async fn get_purchase_by_reference(&self, reference: &str) -> Result<Purchase, Error>;
    /// Claim a purchase for reconciliation by moving it to `processing`
    ///
    /// Allowed from `pending` and `failed`, or from `processing` if the
    /// existing claim is older than `stale_before`. `claim_id` fences every
    /// later write: a taken-over claim can no longer change the purchase.
    async fn claim_purchase(
        &self,
        reference: &str,
        claim_id: Uuid,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Purchase, Error>;
    /// Move a purchase held under `claim_id` from `from` to `to`
    ///
    /// Not usable to reach `succeeded`. Leaving `succeeded` clears the award.
    /// Fails with [`Error::ClaimLost`] if another claim took over.
    async fn update_purchase_status(
        &self,
        reference: &str,
        claim_id: Uuid,
        from: PurchaseStatus,
        to: PurchaseStatus,
    ) -> Result<Purchase, Error>;
    /// Move a `processing` purchase held under `claim_id` to `succeeded` and
    /// record what it awarded
    async fn complete_purchase(
        &self,
        reference: &str,
        claim_id: Uuid,
        award: PurchaseAward,
    ) -> Result<Purchase, Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("appointment {0} does not exist")]
    AppointmentDoesNotExist(Uuid),

    /// Uniqueness violation on (date, slot) among active appointments
    ///
    /// This is how a lost booking race shows up.
    #[error("slot {slot} on {date} is already taken")]
    SlotTaken { date: NaiveDate, slot: Slot },

    #[error("user {user_id} already holds {limit} active appointments")]
    UserLimitReached { user_id: Uuid, limit: usize },

    #[error("appointment {appointment_id} is {current}")]
    AppointmentStatusMismatch {
        appointment_id: Uuid,
        current: AppointmentStatus,
    },

    #[error("pack {0} does not exist")]
    PackDoesNotExist(Uuid),

    #[error("purchase with reference {0} does not exist")]
    PurchaseDoesNotExist(String),

    #[error("purchase with reference {0} already exists")]
    DuplicateReference(String),

    #[error("purchase {reference} is {current}")]
    PurchaseStatusMismatch {
        reference: String,
        current: PurchaseStatus,
    },

    /// The purchase is held by a newer claim than the caller's
    #[error("purchase {0} was claimed by another reconciliation")]
    ClaimLost(String),

    /// Concrete adapter errors
    ///
    /// This could represent any errors from a concrete adapter that is not part of the domain
    /// model, such as connectivity, configuration, or permission errors.
    #[error("adapter error: {0:?}")]
    Adapter(Box<dyn std::error::Error + Send + Sync>),
}
