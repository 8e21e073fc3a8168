use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Purchasable bundle of points
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pack {
    pub pack_id: Uuid,
    pub name: String,
    /// Price in minor currency units
    pub price: u32,
    pub points_included: u32,
    pub bonus_points: u32,
    pub free_service_credits: Option<u32>,
    /// Inactive packs stay in the catalog for existing purchases but cannot be bought
    pub active: bool,
}

impl Pack {
    pub fn total_points(&self) -> u32 {
        self.points_included.saturating_add(self.bonus_points)
    }

    pub fn award(&self) -> PurchaseAward {
        PurchaseAward {
            points_awarded: self.points_included,
            bonus_points_awarded: self.bonus_points,
            free_service_credits_awarded: self.free_service_credits.unwrap_or(0),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Pending,
    /// Claimed by an in-flight reconciliation
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Processing => "processing",
            PurchaseStatus::Succeeded => "succeeded",
            PurchaseStatus::Failed => "failed",
            PurchaseStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Amounts recorded on a purchase once it succeeds. Immutable afterwards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseAward {
    pub points_awarded: u32,
    pub bonus_points_awarded: u32,
    pub free_service_credits_awarded: u32,
}

impl PurchaseAward {
    pub fn total_points(&self) -> u32 {
        self.points_awarded.saturating_add(self.bonus_points_awarded)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub purchase_id: Uuid,
    pub user_id: Uuid,
    pub pack_id: Uuid,
    /// Payment processor's identifier for the charge. Unique across purchases.
    pub external_reference: String,
    /// Charged amount in minor currency units
    pub amount: u32,
    pub status: PurchaseStatus,
    pub award: PurchaseAward,
    /// Set whenever a reconciliation claims the purchase
    pub claimed_at: Option<DateTime<Utc>>,
    /// Identifies the reconciliation holding the latest claim
    pub claim_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Purchase {
    pub fn pending(
        user_id: Uuid,
        pack: &Pack,
        external_reference: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            purchase_id: Uuid::new_v4(),
            user_id,
            pack_id: pack.pack_id,
            external_reference,
            amount: pack.price,
            status: PurchaseStatus::Pending,
            award: PurchaseAward::default(),
            claimed_at: None,
            claim_id: None,
            created_at: now,
        }
    }
}

/// Authoritative status of a payment intent at the processor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresAction,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}
