//! End-to-end flows across several commands, including concurrent callers.

use std::{collections::HashSet, sync::Arc};

use chrono::TimeDelta;

use tower::{BoxError, ServiceExt};
use uuid::Uuid;

use super::{
    adjust_points::{AdjustPointsRequest, PointsAdjustment},
    book_appointment::BookAppointmentRequest,
    cancel_appointment::CancelAppointmentRequest,
    initiate_purchase::InitiatePurchaseRequest,
    reconcile_purchase::ReconcilePurchaseRequest,
    test_support::*,
    DomainLogic, Error, PolicyReason,
};
use crate::{
    adapters::{
        clock::FixedClock, database::memory::MemoryDatabase, notification::log::LogNotifier,
        payment::memory::MemoryPaymentProcessor,
    },
    domain::{AppointmentStatus, IntentStatus, PurchaseStatus, ServiceType, Slot},
    ports::{database::DatabasePort, user::UserPort},
};
use speculoos::prelude::*;

fn basic_on(user_id: Uuid, date: chrono::NaiveDate) -> BookAppointmentRequest {
    BookAppointmentRequest {
        user_id,
        service_type: ServiceType::Basic,
        date,
        location: "Depot".to_string(),
        notes: None,
    }
}

#[tokio::test]
async fn test_booking_on_plain_weekday() -> Result<(), BoxError> {
    let database = MemoryDatabase::default();
    let user = seed_user(&database, 2000);
    let domain = logic(&database, no_payment(), LogNotifier);

    let appointment = domain.oneshot(basic_on(user.user_id, weekday())).await?;

    assert_that!(appointment.status).is_equal_to(AppointmentStatus::Confirmed);
    assert_that!(appointment.slot).is_equal_to(Slot::Morning);
    assert_that!(appointment.price).is_equal_to(1000);
    assert_that!(database.get_user(user.user_id).await?.points_balance).is_equal_to(1000);

    Ok(())
}

#[tokio::test]
async fn test_booking_on_full_day() -> Result<(), BoxError> {
    let database = MemoryDatabase::default();
    let user = seed_user(&database, 2000);
    for slot in Slot::ALL {
        seed_appointment(&database, weekday(), slot, Uuid::new_v4()).await;
    }
    let domain = logic(&database, no_payment(), LogNotifier);

    let res = domain.oneshot(basic_on(user.user_id, weekday())).await;

    assert_that!(res).is_err().matches(|err| {
        matches!(err, Error::PolicyViolation(reason) if reason.code() == "no_slot_available")
    });
    assert_that!(database.get_user(user.user_id).await?.points_balance).is_equal_to(2000);

    Ok(())
}

#[tokio::test]
async fn test_booking_far_ahead() -> Result<(), BoxError> {
    let database = MemoryDatabase::default();
    let user = seed_user(&database, 2000);
    let domain = logic(&database, no_payment(), LogNotifier);
    let far_ahead = today() + chrono::Days::new(200);

    let res = domain.oneshot(basic_on(user.user_id, far_ahead)).await;

    assert_that!(res)
        .is_err()
        .matches(|err| err.to_string() == "policy violation: choose a date within 3 months");
    assert_that!(database.get_user(user.user_id).await?.points_balance).is_equal_to(2000);

    Ok(())
}

#[tokio::test]
async fn test_pack_purchase_settles_once() -> Result<(), BoxError> {
    // GIVEN a user buying a 2800 + 500 pack
    let database = MemoryDatabase::default();
    let user = seed_user(&database, 0);
    let pack = seed_pack(&database, 2800, 500);
    let processor = MemoryPaymentProcessor::new("whsec_test");
    let domain = logic(&database, processor.clone(), LogNotifier);
    let intent = domain
        .clone()
        .oneshot(InitiatePurchaseRequest {
            user_id: user.user_id,
            pack_id: pack.pack_id,
        })
        .await?;
    let confirm = || ReconcilePurchaseRequest {
        external_reference: intent.external_id.clone(),
    };

    // WHEN the client confirms before the payment clears, again while that
    // attempt still holds the purchase, and once more after the claim expired
    let early = domain.clone().oneshot(confirm()).await;
    processor.set_status(&intent.external_id, IntentStatus::Succeeded)?;
    let held = domain.clone().oneshot(confirm()).await;
    let later = DomainLogic::new(
        Arc::new(database.clone()),
        Arc::new(database.clone()),
        Arc::new(processor.clone()),
        Arc::new(LogNotifier),
        Arc::new(FixedClock(FixedClock::on(today()).0 + TimeDelta::minutes(11))),
        test_config(),
    );
    let settled = later.clone().oneshot(confirm()).await?;
    let repeated = domain.clone().oneshot(confirm()).await?;

    // THEN points are granted exactly once
    assert_that!(early)
        .is_err()
        .matches(|err| matches!(err, Error::InProgress(_)));
    assert_that!(held)
        .is_err()
        .matches(|err| matches!(err, Error::InProgress(_)));
    assert_that!(settled.points_awarded).is_equal_to(3300);
    assert_that!(settled.already_processed).is_false();
    assert_that!(repeated.points_awarded).is_equal_to(3300);
    assert_that!(repeated.already_processed).is_true();
    assert_that!(database.get_user(user.user_id).await?.points_balance).is_equal_to(3300);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stalled_claimant_cannot_credit_after_takeover() -> Result<(), BoxError> {
    // GIVEN a paid purchase whose first reconciliation hangs at the processor
    let database = MemoryDatabase::default();
    let user = seed_user(&database, 0);
    let pack = seed_pack(&database, 2800, 500);
    let processor = MemoryPaymentProcessor::new("whsec_test");
    let intent = logic(&database, processor.clone(), LogNotifier)
        .oneshot(InitiatePurchaseRequest {
            user_id: user.user_id,
            pack_id: pack.pack_id,
        })
        .await?;
    processor.set_status(&intent.external_id, IntentStatus::Succeeded)?;
    let confirm = || ReconcilePurchaseRequest {
        external_reference: intent.external_id.clone(),
    };
    let gated = GatedProcessor::new(processor.clone());
    let stalled = tokio::spawn(logic(&database, gated.clone(), LogNotifier).oneshot(confirm()));
    gated.reached().await;

    // WHEN a reconciliation past the claim timeout takes over and settles,
    // and only then the first one gets its answer
    let later = DomainLogic::new(
        Arc::new(database.clone()),
        Arc::new(database.clone()),
        Arc::new(processor.clone()),
        Arc::new(LogNotifier),
        Arc::new(FixedClock(FixedClock::on(today()).0 + TimeDelta::minutes(11))),
        test_config(),
    );
    let settled = later.oneshot(confirm()).await?;
    gated.release();
    let resumed = stalled.await??;

    // THEN the pack is credited once
    assert_that!(settled.already_processed).is_false();
    assert_that!(resumed.already_processed).is_true();
    assert_that!(resumed.points_awarded).is_equal_to(3300);
    assert_that!(database.get_user(user.user_id).await?.points_balance).is_equal_to(3300);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bookings_for_last_slot() -> Result<(), BoxError> {
    // GIVEN a day with a single free slot and eight users racing for it
    let database = MemoryDatabase::default();
    for slot in [Slot::Morning, Slot::Midday, Slot::Afternoon] {
        seed_appointment(&database, weekday(), slot, Uuid::new_v4()).await;
    }
    let users: Vec<_> = (0..8).map(|_| seed_user(&database, 2000)).collect();
    let domain = logic(&database, no_payment(), LogNotifier);

    // WHEN they all book at once
    let handles: Vec<_> = users
        .iter()
        .map(|user| tokio::spawn(domain.clone().oneshot(basic_on(user.user_id, weekday()))))
        .collect();
    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await?);
    }

    // THEN
    // * exactly one gets the evening slot
    // * the others are turned away without losing points
    let winners: Vec<_> = results.iter().filter_map(|res| res.as_ref().ok()).collect();
    assert_that!(winners).has_length(1);
    assert_that!(winners[0].slot).is_equal_to(Slot::Evening);
    for err in results.iter().filter_map(|res| res.as_ref().err()) {
        assert_that!(matches!(
            err,
            Error::Conflict { .. } | Error::PolicyViolation(PolicyReason::NoSlotAvailable { .. })
        ))
        .is_true();
    }
    assert_that!(database.active_appointments_on(weekday()).await?).has_length(4);
    let mut total = 0;
    for user in &users {
        total += database.get_user(user.user_id).await?.points_balance;
    }
    assert_that!(total).is_equal_to(8 * 2000 - 1000);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bookings_respect_user_limit() -> Result<(), BoxError> {
    // GIVEN a user one appointment short of the limit
    let database = MemoryDatabase::default();
    let user = seed_user(&database, 5000);
    for day in today().iter_days().skip(1).take(2) {
        seed_appointment(&database, day, Slot::Morning, user.user_id).await;
    }
    let domain = logic(&database, no_payment(), LogNotifier);

    // WHEN they send four bookings at once
    let handles: Vec<_> = (0..4)
        .map(|_| tokio::spawn(domain.clone().oneshot(basic_on(user.user_id, weekday()))))
        .collect();
    let mut booked = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => booked += 1,
            Err(Error::PolicyViolation(PolicyReason::AppointmentLimitReached { .. }))
            | Err(Error::Conflict { .. }) => {}
            Err(err) => return Err(err.into()),
        }
    }

    // THEN only one fits under the limit and only one is paid for
    assert_that!(booked).is_equal_to(1);
    assert_that!(database.count_active_appointments_for_user(user.user_id).await?)
        .is_equal_to(3);
    assert_that!(database.get_user(user.user_id).await?.points_balance).is_equal_to(4000);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bookings_take_distinct_slots() -> Result<(), BoxError> {
    let database = MemoryDatabase::default();
    let users: Vec<_> = (0..4).map(|_| seed_user(&database, 2000)).collect();
    let domain = logic(&database, no_payment(), LogNotifier);

    let handles: Vec<_> = users
        .iter()
        .map(|user| tokio::spawn(domain.clone().oneshot(basic_on(user.user_id, weekday()))))
        .collect();
    let mut slots = HashSet::new();
    for handle in handles {
        if let Ok(appointment) = handle.await? {
            slots.insert(appointment.slot);
        }
    }

    // Every booked slot is held once, whatever the interleaving
    let active = database.active_appointments_on(weekday()).await?;
    assert_that!(slots.len()).is_equal_to(active.len());
    assert_that!(active.len()).is_greater_than_or_equal_to(1);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reconciliations_credit_once() -> Result<(), BoxError> {
    // GIVEN a paid purchase
    let database = MemoryDatabase::default();
    let user = seed_user(&database, 0);
    let pack = seed_pack(&database, 2800, 500);
    let processor = MemoryPaymentProcessor::new("whsec_test");
    let domain = logic(&database, processor.clone(), LogNotifier);
    let intent = domain
        .clone()
        .oneshot(InitiatePurchaseRequest {
            user_id: user.user_id,
            pack_id: pack.pack_id,
        })
        .await?;
    processor.set_status(&intent.external_id, IntentStatus::Succeeded)?;

    // WHEN ten confirmations and webhook retries land together
    let handles: Vec<_> = (0..10)
        .map(|_| {
            tokio::spawn(domain.clone().oneshot(ReconcilePurchaseRequest {
                external_reference: intent.external_id.clone(),
            }))
        })
        .collect();
    let mut fresh = 0;
    for handle in handles {
        match handle.await? {
            Ok(res) if !res.already_processed => fresh += 1,
            Ok(_) | Err(Error::InProgress(_)) => {}
            Err(err) => return Err(err.into()),
        }
    }

    // THEN exactly one of them credited the points
    assert_that!(fresh).is_equal_to(1);
    assert_that!(database.get_user(user.user_id).await?.points_balance).is_equal_to(3300);
    assert_that!(
        database
            .get_purchase_by_reference(&intent.external_id)
            .await?
            .status
    )
    .is_equal_to(PurchaseStatus::Succeeded);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cancellations_refund_once() -> Result<(), BoxError> {
    let database = MemoryDatabase::default();
    let user = seed_user(&database, 1000);
    let domain = logic(&database, no_payment(), LogNotifier);
    let appointment = domain
        .clone()
        .oneshot(basic_on(user.user_id, weekday()))
        .await?;

    let handles: Vec<_> = (0..6)
        .map(|_| {
            tokio::spawn(domain.clone().oneshot(CancelAppointmentRequest {
                appointment_id: appointment.id,
                requestor_id: user.user_id,
            }))
        })
        .collect();
    let mut refunds = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => refunds += 1,
            Err(Error::AlreadyTerminal(..)) => {}
            Err(err) => return Err(err.into()),
        }
    }

    assert_that!(refunds).is_equal_to(1);
    assert_that!(database.get_user(user.user_id).await?.points_balance).is_equal_to(1000);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_debits_never_overdraw() -> Result<(), BoxError> {
    // GIVEN 1000 points and twenty debits of 100
    let database = MemoryDatabase::default();
    let admin = seed_admin(&database);
    let user = seed_user(&database, 1000);
    let domain = logic(&database, no_payment(), LogNotifier);

    let handles: Vec<_> = (0..20)
        .map(|_| {
            tokio::spawn(domain.clone().oneshot(AdjustPointsRequest {
                admin_id: admin.user_id,
                user_id: user.user_id,
                adjustment: PointsAdjustment::Debit(100),
                reason: None,
            }))
        })
        .collect();
    let mut accepted = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => accepted += 1,
            Err(Error::PolicyViolation(PolicyReason::InsufficientPoints { .. })) => {}
            Err(err) => return Err(err.into()),
        }
    }

    // THEN exactly the affordable half goes through
    assert_that!(accepted).is_equal_to(10);
    assert_that!(database.get_user(user.user_id).await?.points_balance).is_equal_to(0);

    Ok(())
}
