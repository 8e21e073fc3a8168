use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tower::Service;

use crate::ports::{
    database::DatabasePort,
    notification::NotificationPort,
    payment::{self, PaymentPort, WebhookEventKind},
    user::UserPort,
};

use super::{reconcile_purchase::ReconcilePurchaseResponse, DomainLogic, Error};

/// Raw webhook delivery, exactly as received
pub struct PaymentWebhookRequest {
    pub payload: Vec<u8>,
    /// Value of the processor's signature header
    pub signature: String,
}

#[derive(Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    Reconciled(ReconcilePurchaseResponse),
    /// Valid delivery for an event kind we do not act on
    Ignored,
}

impl<D, U, P, N> Service<PaymentWebhookRequest> for DomainLogic<D, U, P, N>
where
    D: DatabasePort + 'static,
    U: UserPort + 'static,
    P: PaymentPort + 'static,
    N: NotificationPort + 'static,
{
    type Response = WebhookOutcome;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: PaymentWebhookRequest) -> Self::Future {
        let logic = self.clone();
        Box::pin(async move { logic.handle_webhook(req).await })
    }
}

impl<D, U, P, N> DomainLogic<D, U, P, N>
where
    D: DatabasePort,
    U: UserPort,
    P: PaymentPort,
    N: NotificationPort,
{
    async fn handle_webhook(&self, req: PaymentWebhookRequest) -> Result<WebhookOutcome, Error> {
        let event = match self.payment.verify_webhook(&req.payload, &req.signature) {
            Ok(event) => event,
            Err(payment::Error::InvalidSignature) => {
                tracing::warn!("rejected webhook with invalid signature");
                return Err(Error::Forbidden("invalid webhook signature".into()));
            }
            Err(err) => return Err(err.into()),
        };

        match event.kind {
            WebhookEventKind::PaymentSucceeded
            | WebhookEventKind::PaymentFailed
            | WebhookEventKind::PaymentCanceled => {
                tracing::info!(reference = %event.data.id, kind = ?event.kind, "payment webhook");
                // The event is only a hint, the processor is asked again
                let res = self.reconcile(&event.data.id).await?;
                Ok(WebhookOutcome::Reconciled(res))
            }
            WebhookEventKind::Other => {
                tracing::debug!(reference = %event.data.id, "ignoring webhook event");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }
}
