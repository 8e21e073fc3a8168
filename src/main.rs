//! Local walkthrough of the engine over the in-memory adapters.
//!
//! Seeds one customer and one pack, then books a wash, buys points and
//! settles the payment through a signed webhook, logging every step.

use std::sync::Arc;

use carwash_booking::{
    adapters::{
        clock::SystemClock, database::memory::MemoryDatabase, notification::log::LogNotifier,
        payment::memory::MemoryPaymentProcessor,
    },
    commands::{
        availability::AvailabilityRequest, book_appointment::BookAppointmentRequest,
        initiate_purchase::InitiatePurchaseRequest, payment_webhook::PaymentWebhookRequest,
        DomainLogic,
    },
    config::BookingConfig,
    domain::{classify, DayKind, IntentStatus, Pack, ServiceType, User},
    ports::clock::Clock,
};
use tower::{BoxError, ServiceExt};
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, EnvFilter, Registry};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default().with(filter).with(Layer::new());
    tracing::subscriber::set_global_default(subscriber)?;

    let config = BookingConfig::from_env()?;
    let webhook_secret =
        dotenv::var("BOOKING_WEBHOOK_SECRET").unwrap_or_else(|_| "whsec_local".to_string());

    let database = MemoryDatabase::default();
    let customer = User::new(Uuid::new_v4(), "driver@example.com", 2000);
    database.insert_user(customer.clone())?;
    let pack = Pack {
        pack_id: Uuid::new_v4(),
        name: "Gold".to_string(),
        price: 2500,
        points_included: 2800,
        bonus_points: 500,
        free_service_credits: Some(1),
        active: true,
    };
    database.insert_pack(pack.clone())?;
    let processor = MemoryPaymentProcessor::new(webhook_secret);
    let clock = SystemClock;

    let logic = DomainLogic::new(
        Arc::new(database.clone()),
        Arc::new(database.clone()),
        Arc::new(processor.clone()),
        Arc::new(LogNotifier),
        Arc::new(clock),
        config,
    );

    let date = clock
        .today()
        .iter_days()
        .skip(1)
        .find(|day| classify(*day) == DayKind::Weekday)
        .ok_or("no weekday ahead")?;

    let availability = logic
        .clone()
        .oneshot(AvailabilityRequest {
            date,
            service_type: ServiceType::Basic,
        })
        .await?;
    tracing::info!(
        %date,
        free = availability.free_slots.len(),
        price = availability.price.total,
        "availability"
    );

    let appointment = logic
        .clone()
        .oneshot(BookAppointmentRequest {
            user_id: customer.user_id,
            service_type: ServiceType::Basic,
            date,
            location: "Main street depot".to_string(),
            notes: None,
        })
        .await?;
    tracing::info!(appointment_id = %appointment.id, slot = %appointment.slot, "booked");

    let purchase = logic
        .clone()
        .oneshot(InitiatePurchaseRequest {
            user_id: customer.user_id,
            pack_id: pack.pack_id,
        })
        .await?;

    // Stand in for the customer paying and the processor calling back
    processor.set_status(&purchase.external_id, IntentStatus::Succeeded)?;
    let payload = serde_json::json!({
        "type": "payment_intent.succeeded",
        "data": { "id": purchase.external_id },
    })
    .to_string()
    .into_bytes();
    let signature = processor.sign(&payload)?;
    let outcome = logic
        .clone()
        .oneshot(PaymentWebhookRequest { payload, signature })
        .await?;
    tracing::info!(?outcome, "webhook handled");

    Ok(())
}
