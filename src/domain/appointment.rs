use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{pricing::ServiceType, slot::AllocatedSlot, slot::Slot};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    /// Statuses that hold a slot and count towards a user's appointment limit
    pub const ACTIVE: [AppointmentStatus; 3] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::InProgress,
    ];

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    /// Nothing ever leaves a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::InProgress => "in_progress",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub service_type: ServiceType,
    pub date: NaiveDate,
    pub slot: Slot,
    /// Business-local wall-clock time
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub location: String,
    pub status: AppointmentStatus,
    /// Price paid, in points
    pub price: u32,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Everything needed to create a confirmed appointment in an allocated slot
#[derive(Clone, Debug)]
pub struct NewAppointment {
    pub user_id: Uuid,
    pub service_type: ServiceType,
    pub location: String,
    pub price: u32,
    pub notes: Option<String>,
}

impl Appointment {
    pub fn confirmed(
        new: NewAppointment,
        date: NaiveDate,
        allocated: AllocatedSlot,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            service_type: new.service_type,
            date,
            slot: allocated.slot,
            start_time: allocated.start_time,
            end_time: allocated.end_time,
            location: new.location,
            status: AppointmentStatus::Confirmed,
            price: new.price,
            notes: new.notes,
            created_at: now,
        }
    }
}
