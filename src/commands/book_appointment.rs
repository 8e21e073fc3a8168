use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use chrono::NaiveDate;
use tower::Service;
use uuid::Uuid;

use crate::{
    domain::{
        slot::{first_free_slot, AllocatedSlot},
        Appointment, NewAppointment, ServiceType, WindowDecision,
    },
    ports::{
        database::{self, DatabasePort},
        notification::{Notification, NotificationPort, Template},
        payment::PaymentPort,
        user::UserPort,
    },
};

use super::{database_error, notify, user_error, DomainLogic, Error, PolicyReason};

#[derive(Clone, Debug)]
pub struct BookAppointmentRequest {
    pub user_id: Uuid,
    pub service_type: ServiceType,
    pub date: NaiveDate,
    pub location: String,
    pub notes: Option<String>,
}

impl<D, U, P, N> Service<BookAppointmentRequest> for DomainLogic<D, U, P, N>
where
    D: DatabasePort + 'static,
    U: UserPort + 'static,
    P: PaymentPort + 'static,
    N: NotificationPort + 'static,
{
    type Response = Appointment;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: BookAppointmentRequest) -> Self::Future {
        let logic = self.clone();
        Box::pin(async move { logic.book(req).await })
    }
}

impl<D, U, P, N> DomainLogic<D, U, P, N>
where
    D: DatabasePort,
    U: UserPort,
    N: NotificationPort,
{
    /// Booking is "create appointment, then debit". If the debit fails the
    /// appointment is deleted again, so nobody observes one without the other.
    async fn book(&self, req: BookAppointmentRequest) -> Result<Appointment, Error> {
        let today = self.clock.today();
        let user = self.users.get_user(req.user_id).await.map_err(user_error)?;
        if !user.active {
            return Err(PolicyReason::InactiveAccount.into());
        }

        self.check_booking_window(req.date, today).await?;

        // Early rejection only. The insert enforces the limit atomically.
        let active = self
            .database
            .count_active_appointments_for_user(user.user_id)
            .await
            .map_err(database_error)?;
        if active >= self.config.max_active_appointments {
            return Err(PolicyReason::AppointmentLimitReached {
                limit: self.config.max_active_appointments,
            }
            .into());
        }

        let allocated = self.allocate(req.date).await?;

        let price = self.config.prices.price(req.service_type, req.date);
        if user.points_balance < price {
            return Err(PolicyReason::InsufficientPoints {
                required: price,
                available: user.points_balance,
            }
            .into());
        }

        let new = NewAppointment {
            user_id: user.user_id,
            service_type: req.service_type,
            location: req.location,
            price,
            notes: req.notes,
        };
        let appointment = self.insert_in_slot(new, req.date, allocated).await?;

        if let Err(err) = self.users.debit_points(user.user_id, price).await {
            tracing::warn!(
                user_id = %user.user_id,
                appointment_id = %appointment.id,
                "debit failed after booking, removing appointment: {err}"
            );
            self.undo_insert(&appointment).await;
            return Err(user_error(err));
        }

        tracing::info!(
            user_id = %user.user_id,
            appointment_id = %appointment.id,
            date = %appointment.date,
            slot = %appointment.slot,
            price,
            "appointment booked"
        );
        notify(
            self.notifier.as_ref(),
            Notification {
                recipient: user.email,
                template: Template::AppointmentConfirmed {
                    appointment_id: appointment.id,
                    date: appointment.date,
                    slot: appointment.slot,
                    price,
                },
            },
        )
        .await;

        Ok(appointment)
    }

    async fn check_booking_window(&self, date: NaiveDate, today: NaiveDate) -> Result<(), Error> {
        let window = self.config.window;
        match window.check(date, today).map_err(PolicyReason::from)? {
            WindowDecision::Accepted => Ok(()),
            WindowDecision::NeedsOccupancy { from, until } => {
                let counts = self
                    .database
                    .active_appointment_counts(from, until)
                    .await
                    .map_err(database_error)?;
                window
                    .resolve_saturated(date, today, &counts)
                    .map_err(PolicyReason::from)?;
                Ok(())
            }
        }
    }

    async fn allocate(&self, date: NaiveDate) -> Result<AllocatedSlot, Error> {
        let occupied = self
            .database
            .active_appointments_on(date)
            .await
            .map_err(database_error)?;

        first_free_slot(date, occupied.iter().map(|appointment| appointment.slot))
            .ok_or_else(|| PolicyReason::NoSlotAvailable { date }.into())
    }

    /// Insert under the store's slot uniqueness constraint
    ///
    /// A lost race is retried once against a fresh view of the day.
    async fn insert_in_slot(
        &self,
        new: NewAppointment,
        date: NaiveDate,
        allocated: AllocatedSlot,
    ) -> Result<Appointment, Error> {
        let now = self.clock.now();
        let first = Appointment::confirmed(new.clone(), date, allocated, now);
        let limit = self.config.max_active_appointments;
        match self.database.insert_appointment(first, limit).await {
            Ok(appointment) => return Ok(appointment),
            Err(database::Error::SlotTaken { slot, .. }) => {
                tracing::warn!(%date, %slot, "lost slot race, retrying with a fresh view");
            }
            Err(err) => return Err(database_error(err)),
        }

        let allocated = self.allocate(date).await?;
        let second = Appointment::confirmed(new, date, allocated, now);
        match self.database.insert_appointment(second, limit).await {
            Ok(appointment) => Ok(appointment),
            Err(database::Error::SlotTaken { slot, .. }) => {
                tracing::warn!(%date, %slot, "lost slot race twice, giving up");
                Err(Error::Conflict { date })
            }
            Err(err) => Err(database_error(err)),
        }
    }

    async fn undo_insert(&self, appointment: &Appointment) {
        if let Err(err) = self.database.delete_appointment(appointment.id).await {
            tracing::error!(
                appointment_id = %appointment.id,
                "invariant violation: appointment kept without its debit: {err}"
            );
        }
    }
}
