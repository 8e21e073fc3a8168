use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

/// The part of a user account the booking engine cares about
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
    /// Only ever changed through the points ledger operations
    pub points_balance: u32,
    /// Deactivated accounts are kept, not deleted
    pub active: bool,
}

impl User {
    pub fn new(user_id: Uuid, email: impl Into<String>, points_balance: u32) -> Self {
        Self {
            user_id,
            email: email.into(),
            role: Role::User,
            points_balance,
            active: true,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
