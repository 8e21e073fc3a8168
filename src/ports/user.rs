use uuid::Uuid;

use crate::domain::User;

/// User accounts and their points ledger
///
/// Balance changes are applied by the store as single atomic increments or
/// decrements, never by writing back a balance read earlier.
#[mockall::automock]
#[async_trait::async_trait]
pub trait UserPort: Send + Sync {
    async fn get_user(&self, user_id: Uuid) -> Result<User, Error>;
    /// Remove points, returning the new balance
    ///
    /// Fails with [`Error::InsufficientBalance`] and leaves the balance alone if
    /// the balance would go below zero.
    async fn debit_points(&self, user_id: Uuid, amount: u32) -> Result<u32, Error>;
    /// Add points, saturating at `u32::MAX`
    async fn credit_points(&self, user_id: Uuid, amount: u32) -> Result<BalanceChange, Error>;
    /// Overwrite the balance, returning the previous one
    async fn set_points(&self, user_id: Uuid, amount: u32) -> Result<u32, Error>;
}

/// Balance around a single ledger operation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BalanceChange {
    pub previous: u32,
    pub current: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Domain-level error when a user does not exist
    #[error("user {0} does not exist")]
    UserDoesNotExist(Uuid),

    /// Trying to remove more points than the user has
    #[error("trying to debit {requested} points from a balance of {balance}")]
    InsufficientBalance { balance: u32, requested: u32 },

    /// Concrete adapter errors
    ///
    /// This could represent any errors from a concrete adapter that is not part of the domain
    /// model, such as connectivity, configuration, or permission errors.
    #[error("adapter error: {0:?}")]
    Adapter(Box<dyn std::error::Error + Send + Sync>),
}
