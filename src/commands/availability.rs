use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use chrono::NaiveDate;
use tower::Service;

use crate::{
    domain::{slot::free_slots, PriceBreakdown, ServiceType, Slot, WindowViolation},
    ports::{
        database::DatabasePort, notification::NotificationPort, payment::PaymentPort,
        user::UserPort,
    },
};

use super::{database_error, DomainLogic, Error, PolicyReason};

pub struct AvailabilityRequest {
    pub date: NaiveDate,
    pub service_type: ServiceType,
}

#[derive(Debug, PartialEq, Eq)]
pub struct AvailabilityResponse {
    pub date: NaiveDate,
    /// In allocation order, so the first one is what a booking would get
    pub free_slots: Vec<Slot>,
    pub price: PriceBreakdown,
}

impl<D, U, P, N> Service<AvailabilityRequest> for DomainLogic<D, U, P, N>
where
    D: DatabasePort + 'static,
    U: UserPort + 'static,
    P: PaymentPort + 'static,
    N: NotificationPort + 'static,
{
    type Response = AvailabilityResponse;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: AvailabilityRequest) -> Self::Future {
        let logic = self.clone();
        Box::pin(async move { logic.availability(req).await })
    }
}

impl<D, U, P, N> DomainLogic<D, U, P, N>
where
    D: DatabasePort,
{
    async fn availability(&self, req: AvailabilityRequest) -> Result<AvailabilityResponse, Error> {
        if req.date < self.clock.today() {
            return Err(PolicyReason::BookingWindow(WindowViolation::PastDate).into());
        }

        let occupied = self
            .database
            .active_appointments_on(req.date)
            .await
            .map_err(database_error)?;

        Ok(AvailabilityResponse {
            date: req.date,
            free_slots: free_slots(occupied.iter().map(|appointment| appointment.slot)),
            price: self.config.prices.breakdown(req.service_type, req.date),
        })
    }
}
