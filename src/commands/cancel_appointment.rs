use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tower::Service;
use uuid::Uuid;

use crate::{
    domain::{Appointment, AppointmentStatus},
    ports::{
        database::{self, DatabasePort},
        notification::{Notification, NotificationPort, Template},
        payment::PaymentPort,
        user::UserPort,
    },
};

use super::{database_error, notify, user_error, DomainLogic, Entity, Error};

pub struct CancelAppointmentRequest {
    pub appointment_id: Uuid,
    /// Owner of the appointment, or an administrator
    pub requestor_id: Uuid,
}

#[derive(Debug, PartialEq, Eq)]
pub struct CancelAppointmentResponse {
    pub appointment_id: Uuid,
    pub refunded_points: u32,
    /// Owner's balance after the refund
    pub new_balance: u32,
}

impl<D, U, P, N> Service<CancelAppointmentRequest> for DomainLogic<D, U, P, N>
where
    D: DatabasePort + 'static,
    U: UserPort + 'static,
    P: PaymentPort + 'static,
    N: NotificationPort + 'static,
{
    type Response = CancelAppointmentResponse;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: CancelAppointmentRequest) -> Self::Future {
        let logic = self.clone();
        Box::pin(async move { logic.cancel(req).await })
    }
}

impl<D, U, P, N> DomainLogic<D, U, P, N>
where
    D: DatabasePort,
    U: UserPort,
    N: NotificationPort,
{
    async fn cancel(
        &self,
        req: CancelAppointmentRequest,
    ) -> Result<CancelAppointmentResponse, Error> {
        let appointment = self
            .database
            .get_appointment(req.appointment_id)
            .await
            .map_err(database_error)?;
        let requestor = self
            .users
            .get_user(req.requestor_id)
            .await
            .map_err(user_error)?;

        // Someone else's appointment looks the same as a missing one
        if appointment.user_id != requestor.user_id && !requestor.is_admin() {
            tracing::warn!(
                appointment_id = %appointment.id,
                requestor_id = %requestor.user_id,
                "cancel attempt on another user's appointment"
            );
            return Err(Error::NotFound(Entity::Appointment(appointment.id)));
        }
        if appointment.status.is_terminal() {
            return Err(already_terminal(&appointment, appointment.status));
        }

        let cancelled = match self
            .database
            .transition_appointment(
                appointment.id,
                AppointmentStatus::ACTIVE.to_vec(),
                AppointmentStatus::Cancelled,
            )
            .await
        {
            Ok(cancelled) => cancelled,
            // Cancelled or completed by someone else in the meantime
            Err(database::Error::AppointmentStatusMismatch { current, .. }) => {
                return Err(already_terminal(&appointment, current));
            }
            Err(err) => return Err(database_error(err)),
        };

        let new_balance = match self
            .users
            .credit_points(appointment.user_id, appointment.price)
            .await
        {
            Ok(change) => change.current,
            Err(err) => {
                tracing::warn!(
                    appointment_id = %appointment.id,
                    "refund failed, restoring appointment: {err}"
                );
                self.undo_cancel(&appointment).await;
                return Err(user_error(err));
            }
        };

        tracing::info!(
            appointment_id = %cancelled.id,
            user_id = %cancelled.user_id,
            refunded = cancelled.price,
            "appointment cancelled"
        );
        self.notify_cancelled(&cancelled).await;

        Ok(CancelAppointmentResponse {
            appointment_id: cancelled.id,
            refunded_points: cancelled.price,
            new_balance,
        })
    }

    async fn undo_cancel(&self, appointment: &Appointment) {
        let restored = self
            .database
            .transition_appointment(
                appointment.id,
                vec![AppointmentStatus::Cancelled],
                appointment.status,
            )
            .await;
        if let Err(err) = restored {
            tracing::error!(
                appointment_id = %appointment.id,
                "invariant violation: appointment cancelled without refund: {err}"
            );
        }
    }

    async fn notify_cancelled(&self, appointment: &Appointment) {
        // The requestor may be an admin, the message goes to the owner
        let owner = match self.users.get_user(appointment.user_id).await {
            Ok(owner) => owner,
            Err(err) => {
                tracing::warn!(
                    appointment_id = %appointment.id,
                    "cannot notify owner of cancellation: {err}"
                );
                return;
            }
        };

        notify(
            self.notifier.as_ref(),
            Notification {
                recipient: owner.email,
                template: Template::AppointmentCancelled {
                    appointment_id: appointment.id,
                    date: appointment.date,
                    refunded_points: appointment.price,
                },
            },
        )
        .await;
    }
}

fn already_terminal(appointment: &Appointment, status: AppointmentStatus) -> Error {
    Error::AlreadyTerminal(Entity::Appointment(appointment.id), status.as_str().into())
}
