use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tower::Service;
use uuid::Uuid;

use crate::{
    domain::{IntentStatus, Purchase, PurchaseStatus},
    ports::{
        database::{self, DatabasePort},
        notification::{Notification, NotificationPort, Template},
        payment::{self, PaymentPort},
        user::UserPort,
    },
};

use super::{database_error, notify, user_error, DomainLogic, Entity, Error};

#[derive(Clone, Debug)]
pub struct ReconcilePurchaseRequest {
    pub external_reference: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcilePurchaseResponse {
    pub purchase_id: Uuid,
    pub status: PurchaseStatus,
    /// Included plus bonus points. Zero unless the purchase succeeded.
    pub points_awarded: u32,
    /// The purchase had already succeeded before this call
    pub already_processed: bool,
}

impl ReconcilePurchaseResponse {
    fn from_purchase(purchase: &Purchase, already_processed: bool) -> Self {
        Self {
            purchase_id: purchase.purchase_id,
            status: purchase.status,
            points_awarded: purchase.award.total_points(),
            already_processed,
        }
    }
}

impl<D, U, P, N> Service<ReconcilePurchaseRequest> for DomainLogic<D, U, P, N>
where
    D: DatabasePort + 'static,
    U: UserPort + 'static,
    P: PaymentPort + 'static,
    N: NotificationPort + 'static,
{
    type Response = ReconcilePurchaseResponse;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ReconcilePurchaseRequest) -> Self::Future {
        let logic = self.clone();
        Box::pin(async move { logic.reconcile(&req.external_reference).await })
    }
}

impl<D, U, P, N> DomainLogic<D, U, P, N>
where
    D: DatabasePort,
    U: UserPort,
    P: PaymentPort,
    N: NotificationPort,
{
    /// Settle a purchase against the processor's view of its payment
    ///
    /// Only the caller holding the latest claim on the purchase gets to
    /// credit points. Everyone else sees either the settled result or
    /// [`Error::InProgress`].
    pub(super) async fn reconcile(
        &self,
        reference: &str,
    ) -> Result<ReconcilePurchaseResponse, Error> {
        let now = self.clock.now();
        let stale_before = now - self.config.purchase_claim_timeout;

        let purchase = self
            .database
            .get_purchase_by_reference(reference)
            .await
            .map_err(database_error)?;
        match purchase.status {
            PurchaseStatus::Succeeded => {
                return Ok(ReconcilePurchaseResponse::from_purchase(&purchase, true))
            }
            PurchaseStatus::Canceled => return Err(purchase_terminal(reference, purchase.status)),
            PurchaseStatus::Processing
                if purchase
                    .claimed_at
                    .map_or(false, |claimed_at| claimed_at >= stale_before) =>
            {
                return Err(Error::InProgress(reference.to_string()))
            }
            PurchaseStatus::Processing => {
                tracing::warn!(
                    reference,
                    claimed_at = ?purchase.claimed_at,
                    "taking over abandoned purchase claim"
                );
            }
            PurchaseStatus::Pending | PurchaseStatus::Failed => {}
        }

        let claim_id = Uuid::new_v4();
        let claimed = match self
            .database
            .claim_purchase(reference, claim_id, now, stale_before)
            .await
        {
            Ok(claimed) => claimed,
            // Somebody else moved it between the read and the claim
            Err(database::Error::PurchaseStatusMismatch { current, .. }) => {
                return self.settled_elsewhere(reference, current).await;
            }
            Err(err) => return Err(database_error(err)),
        };

        let external = match self.query_intent_status(reference).await {
            Ok(status) => status,
            Err(err) => {
                let release_to = match purchase.status {
                    PurchaseStatus::Failed => PurchaseStatus::Failed,
                    _ => PurchaseStatus::Pending,
                };
                self.release_claim(reference, claim_id, release_to).await;
                return Err(Error::ExternalDependency(err));
            }
        };

        match external {
            IntentStatus::Succeeded => self.credit_purchase(&claimed, claim_id).await,
            IntentStatus::Failed => {
                self.close_purchase(&claimed, claim_id, PurchaseStatus::Failed).await
            }
            IntentStatus::Canceled => {
                self.close_purchase(&claimed, claim_id, PurchaseStatus::Canceled).await
            }
            IntentStatus::RequiresPaymentMethod
            | IntentStatus::RequiresAction
            | IntentStatus::Processing => {
                tracing::info!(reference, ?external, "payment not settled yet");
                Err(Error::InProgress(reference.to_string()))
            }
        }
    }

    async fn settled_elsewhere(
        &self,
        reference: &str,
        current: PurchaseStatus,
    ) -> Result<ReconcilePurchaseResponse, Error> {
        match current {
            PurchaseStatus::Succeeded => {
                let purchase = self
                    .database
                    .get_purchase_by_reference(reference)
                    .await
                    .map_err(database_error)?;
                Ok(ReconcilePurchaseResponse::from_purchase(&purchase, true))
            }
            PurchaseStatus::Canceled => Err(purchase_terminal(reference, current)),
            _ => Err(Error::InProgress(reference.to_string())),
        }
    }

    /// Ask the processor for the intent status, retrying transient failures
    /// with exponential backoff
    async fn query_intent_status(&self, reference: &str) -> Result<IntentStatus, payment::Error> {
        let attempts = self.config.payment_status_attempts.max(1);
        let mut delay = self.config.payment_retry_delay;
        let mut attempt = 1;

        loop {
            match self.payment.get_intent_status(reference).await {
                Ok(status) => return Ok(status),
                Err(err @ (payment::Error::Unavailable(_) | payment::Error::Adapter(_)))
                    if attempt < attempts =>
                {
                    tracing::warn!(
                        reference,
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        "payment status query failed, retrying: {err}"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                Err(err) => {
                    tracing::warn!(reference, attempt, "payment status query failed: {err}");
                    return Err(err);
                }
            }
        }
    }

    async fn credit_purchase(
        &self,
        claimed: &Purchase,
        claim_id: Uuid,
    ) -> Result<ReconcilePurchaseResponse, Error> {
        let reference = claimed.external_reference.as_str();

        let pack = match self.database.get_pack(claimed.pack_id).await {
            Ok(pack) => pack,
            Err(err) => {
                self.release_claim(reference, claim_id, PurchaseStatus::Failed).await;
                return Err(database_error(err));
            }
        };
        let award = pack.award();

        // Settle under the claim before crediting. A reconciliation whose
        // claim was taken over stops here and never reaches the credit.
        let completed = match self
            .database
            .complete_purchase(reference, claim_id, award)
            .await
        {
            Ok(completed) => completed,
            Err(database::Error::ClaimLost(_)) => {
                tracing::warn!(reference, "purchase claim lost before crediting");
                let current = self
                    .database
                    .get_purchase_by_reference(reference)
                    .await
                    .map_err(database_error)?;
                return match current.status {
                    PurchaseStatus::Succeeded => {
                        Ok(ReconcilePurchaseResponse::from_purchase(&current, true))
                    }
                    status => self.settled_elsewhere(reference, status).await,
                };
            }
            Err(err) => {
                self.release_claim(reference, claim_id, PurchaseStatus::Failed).await;
                return Err(database_error(err));
            }
        };

        let new_balance = match self
            .users
            .credit_points(claimed.user_id, award.total_points())
            .await
        {
            Ok(change) => change.current,
            Err(err) => {
                tracing::warn!(reference, "crediting purchase failed: {err}");
                let reverted = self
                    .database
                    .update_purchase_status(
                        reference,
                        claim_id,
                        PurchaseStatus::Succeeded,
                        PurchaseStatus::Failed,
                    )
                    .await;
                if let Err(revert_err) = reverted {
                    tracing::error!(
                        reference,
                        user_id = %claimed.user_id,
                        points = award.total_points(),
                        "invariant violation: purchase succeeded without credit: {revert_err}"
                    );
                    return Err(Error::InvariantViolation(
                        format!("purchase {reference} succeeded without credit").into(),
                    ));
                }
                return Err(user_error(err));
            }
        };

        tracing::info!(
            reference,
            purchase_id = %completed.purchase_id,
            user_id = %completed.user_id,
            points = award.total_points(),
            new_balance,
            "purchase succeeded"
        );
        self.notify_purchase(&completed).await;

        Ok(ReconcilePurchaseResponse::from_purchase(&completed, false))
    }

    async fn close_purchase(
        &self,
        claimed: &Purchase,
        claim_id: Uuid,
        to: PurchaseStatus,
    ) -> Result<ReconcilePurchaseResponse, Error> {
        let closed = self
            .database
            .update_purchase_status(
                &claimed.external_reference,
                claim_id,
                PurchaseStatus::Processing,
                to,
            )
            .await
            .map_err(database_error)?;
        tracing::info!(
            reference = %closed.external_reference,
            status = %closed.status,
            "purchase closed without credit"
        );

        Ok(ReconcilePurchaseResponse::from_purchase(&closed, false))
    }

    /// Give up a claim without having credited anything
    async fn release_claim(&self, reference: &str, claim_id: Uuid, to: PurchaseStatus) {
        let released = self
            .database
            .update_purchase_status(reference, claim_id, PurchaseStatus::Processing, to)
            .await;
        match released {
            Ok(_) => {}
            Err(database::Error::ClaimLost(_)) => {
                tracing::warn!(reference, "purchase claim was taken over, nothing to release");
            }
            Err(err) => {
                tracing::error!(reference, %to, "cannot release purchase claim: {err}");
            }
        }
    }

    async fn notify_purchase(&self, purchase: &Purchase) {
        let user = match self.users.get_user(purchase.user_id).await {
            Ok(user) => user,
            Err(err) => {
                tracing::warn!(
                    purchase_id = %purchase.purchase_id,
                    "cannot notify buyer: {err}"
                );
                return;
            }
        };

        notify(
            self.notifier.as_ref(),
            Notification {
                recipient: user.email,
                template: Template::PurchaseCompleted {
                    purchase_id: purchase.purchase_id,
                    points_awarded: purchase.award.total_points(),
                },
            },
        )
        .await;
    }
}

fn purchase_terminal(reference: &str, status: PurchaseStatus) -> Error {
    Error::AlreadyTerminal(
        Entity::Purchase(reference.to_string()),
        status.as_str().into(),
    )
}
