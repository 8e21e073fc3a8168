//! Fixtures shared by the command tests.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio::sync::Notify;
use uuid::Uuid;

use super::DomainLogic;
use crate::{
    adapters::{
        clock::FixedClock, database::memory::MemoryDatabase,
        payment::memory::MemoryPaymentProcessor,
    },
    config::BookingConfig,
    domain::{
        slot::AllocatedSlot, Appointment, IntentStatus, NewAppointment, Pack, Role, ServiceType,
        Slot, User,
    },
    ports::{
        database::DatabasePort,
        payment::{self, IntentMetadata, MockPaymentPort, PaymentIntent, PaymentPort},
    },
};

/// Monday 2025-03-10
pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
}

/// Wednesday 2025-03-12, neither weekend nor holiday
pub fn weekday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 12).unwrap()
}

pub fn seed_user(database: &MemoryDatabase, balance: u32) -> User {
    let user = User::new(Uuid::new_v4(), "driver@example.com", balance);
    database.insert_user(user.clone()).unwrap();
    user
}

pub fn seed_admin(database: &MemoryDatabase) -> User {
    let admin = User {
        role: Role::Admin,
        ..User::new(Uuid::new_v4(), "admin@example.com", 0)
    };
    database.insert_user(admin.clone()).unwrap();
    admin
}

pub fn seed_pack(database: &MemoryDatabase, points_included: u32, bonus_points: u32) -> Pack {
    let pack = Pack {
        pack_id: Uuid::new_v4(),
        name: "Gold".to_string(),
        price: 2500,
        points_included,
        bonus_points,
        free_service_credits: Some(1),
        active: true,
    };
    database.insert_pack(pack.clone()).unwrap();
    pack
}

pub fn appointment_on(date: NaiveDate, slot: Slot, user_id: Uuid) -> Appointment {
    Appointment::confirmed(
        NewAppointment {
            user_id,
            service_type: ServiceType::Basic,
            location: "Depot".to_string(),
            price: 1000,
            notes: None,
        },
        date,
        AllocatedSlot::new(date, slot),
        Utc::now(),
    )
}

/// Store a confirmed appointment, bypassing the per-user limit
pub async fn seed_appointment(
    database: &MemoryDatabase,
    date: NaiveDate,
    slot: Slot,
    user_id: Uuid,
) -> Appointment {
    database
        .insert_appointment(appointment_on(date, slot, user_id), usize::MAX)
        .await
        .unwrap()
}

pub fn test_config() -> BookingConfig {
    BookingConfig {
        payment_retry_delay: std::time::Duration::from_millis(1),
        ..BookingConfig::default()
    }
}

/// Logic over an in-memory store that also serves as the user port
pub fn logic<P, N>(
    database: &MemoryDatabase,
    payment: P,
    notifier: N,
) -> DomainLogic<MemoryDatabase, MemoryDatabase, P, N> {
    DomainLogic::new(
        Arc::new(database.clone()),
        Arc::new(database.clone()),
        Arc::new(payment),
        Arc::new(notifier),
        Arc::new(FixedClock::on(today())),
        test_config(),
    )
}

/// A payment port that must not be touched
pub fn no_payment() -> MockPaymentPort {
    MockPaymentPort::new()
}

/// Processor whose status queries hold until [`GatedProcessor::release`]
#[derive(Clone)]
pub struct GatedProcessor {
    inner: MemoryPaymentProcessor,
    reached: Arc<Notify>,
    gate: Arc<Notify>,
}

impl GatedProcessor {
    pub fn new(inner: MemoryPaymentProcessor) -> Self {
        Self {
            inner,
            reached: Arc::new(Notify::new()),
            gate: Arc::new(Notify::new()),
        }
    }

    /// Wait until a status query is held at the gate
    pub async fn reached(&self) {
        self.reached.notified().await;
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait::async_trait]
impl PaymentPort for GatedProcessor {
    async fn create_intent(
        &self,
        amount: u32,
        metadata: IntentMetadata,
    ) -> Result<PaymentIntent, payment::Error> {
        self.inner.create_intent(amount, metadata).await
    }

    async fn get_intent_status(&self, external_id: &str) -> Result<IntentStatus, payment::Error> {
        self.reached.notify_one();
        self.gate.notified().await;
        self.inner.get_intent_status(external_id).await
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<payment::WebhookEvent, payment::Error> {
        self.inner.verify_webhook(payload, signature)
    }
}
