use std::{borrow::Cow, fmt, sync::Arc};

use chrono::NaiveDate;
use uuid::Uuid;

use crate::{
    config::BookingConfig,
    domain::WindowViolation,
    ports::{
        clock::Clock,
        database,
        notification::{Notification, NotificationPort},
        payment, user,
    },
};

pub mod adjust_points;
pub mod availability;
pub mod book_appointment;
pub mod cancel_appointment;
pub mod initiate_purchase;
pub mod payment_webhook;
pub mod reconcile_purchase;

#[cfg(test)]
mod scenarios;
#[cfg(test)]
mod test_support;

/// Entry point for every use-case
///
/// Each request type has its own `tower::Service` implementation on this
/// struct. Cloning is cheap and clones share all ports.
pub struct DomainLogic<D, U, P, N> {
    database: Arc<D>,
    users: Arc<U>,
    payment: Arc<P>,
    notifier: Arc<N>,
    clock: Arc<dyn Clock>,
    config: Arc<BookingConfig>,
}

impl<D, U, P, N> DomainLogic<D, U, P, N> {
    pub fn new(
        database: Arc<D>,
        users: Arc<U>,
        payment: Arc<P>,
        notifier: Arc<N>,
        clock: Arc<dyn Clock>,
        config: BookingConfig,
    ) -> Self {
        Self {
            database,
            users,
            payment,
            notifier,
            clock,
            config: Arc::new(config),
        }
    }
}

impl<D, U, P, N> Clone for DomainLogic<D, U, P, N> {
    fn clone(&self) -> Self {
        Self {
            database: self.database.clone(),
            users: self.users.clone(),
            payment: self.payment.clone(),
            notifier: self.notifier.clone(),
            clock: self.clock.clone(),
            config: self.config.clone(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(Entity),

    /// Business rule rejection the user can act on
    #[error("policy violation: {0}")]
    PolicyViolation(PolicyReason),

    #[error("{0} is already {1}")]
    AlreadyTerminal(Entity, Cow<'static, str>),

    /// Lost a race for a slot twice in a row
    #[error("slot on {date} was taken concurrently")]
    Conflict { date: NaiveDate },

    /// Another reconciliation holds the purchase, retry later
    #[error("purchase {0} is being processed")]
    InProgress(String),

    #[error("forbidden: {0}")]
    Forbidden(Cow<'static, str>),

    #[error("payment processor error: {0}")]
    ExternalDependency(#[from] payment::Error),

    /// Should never happen. Always logged at error level where raised.
    #[error("invariant violation: {0}")]
    InvariantViolation(Cow<'static, str>),

    #[error("database port error: {0:?}")]
    Database(#[from] database::Error),
    #[error("user port error: {0:?}")]
    User(#[from] user::Error),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Entity {
    User(Uuid),
    Appointment(Uuid),
    Pack(Uuid),
    Purchase(String),
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::User(id) => write!(f, "user {id}"),
            Entity::Appointment(id) => write!(f, "appointment {id}"),
            Entity::Pack(id) => write!(f, "pack {id}"),
            Entity::Purchase(reference) => write!(f, "purchase {reference}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PolicyReason {
    #[error(transparent)]
    BookingWindow(#[from] WindowViolation),
    #[error("active appointment limit of {limit} reached")]
    AppointmentLimitReached { limit: usize },
    #[error("no slot available on {date}")]
    NoSlotAvailable { date: NaiveDate },
    #[error("insufficient points: {required} required, {available} available")]
    InsufficientPoints { required: u32, available: u32 },
    #[error("account is inactive")]
    InactiveAccount,
    #[error("pack is not available for purchase")]
    PackUnavailable,
}

impl PolicyReason {
    /// Stable identifier for clients to branch on
    pub fn code(&self) -> &'static str {
        match self {
            PolicyReason::BookingWindow(WindowViolation::PastDate) => "date_in_past",
            PolicyReason::BookingWindow(WindowViolation::BeyondHorizon { .. }) => {
                "outside_booking_window"
            }
            PolicyReason::BookingWindow(WindowViolation::BeyondExtendedHorizon { .. }) => {
                "outside_extended_booking_window"
            }
            PolicyReason::AppointmentLimitReached { .. } => "appointment_limit_reached",
            PolicyReason::NoSlotAvailable { .. } => "no_slot_available",
            PolicyReason::InsufficientPoints { .. } => "insufficient_points",
            PolicyReason::InactiveAccount => "inactive_account",
            PolicyReason::PackUnavailable => "pack_unavailable",
        }
    }
}

impl From<PolicyReason> for Error {
    fn from(reason: PolicyReason) -> Self {
        Self::PolicyViolation(reason)
    }
}

/// Map "does not exist" adapter errors onto `NotFound`, keep the rest as-is
fn user_error(err: user::Error) -> Error {
    match err {
        user::Error::UserDoesNotExist(user_id) => Error::NotFound(Entity::User(user_id)),
        user::Error::InsufficientBalance { balance, requested } => {
            PolicyReason::InsufficientPoints {
                required: requested,
                available: balance,
            }
            .into()
        }
        other => Error::User(other),
    }
}

fn database_error(err: database::Error) -> Error {
    match err {
        database::Error::AppointmentDoesNotExist(id) => Error::NotFound(Entity::Appointment(id)),
        database::Error::PackDoesNotExist(id) => Error::NotFound(Entity::Pack(id)),
        database::Error::PurchaseDoesNotExist(reference) => {
            Error::NotFound(Entity::Purchase(reference))
        }
        database::Error::ClaimLost(reference) => Error::InProgress(reference),
        database::Error::UserLimitReached { limit, .. } => {
            PolicyReason::AppointmentLimitReached { limit }.into()
        }
        other => Error::Database(other),
    }
}

/// Send a notification, logging instead of failing
async fn notify<N: NotificationPort + ?Sized>(notifier: &N, notification: Notification) {
    let template = notification.template.name();
    if let Err(err) = notifier.send(notification).await {
        tracing::warn!(template, "failed to send notification: {err}");
    }
}
