use std::{
    borrow::Cow,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tower::Service;
use uuid::Uuid;

use crate::ports::{
    database::DatabasePort, notification::NotificationPort, payment::PaymentPort, user::UserPort,
};

use super::{user_error, DomainLogic, Error};

pub struct AdjustPointsRequest {
    pub admin_id: Uuid,
    pub user_id: Uuid,
    pub adjustment: PointsAdjustment,
    pub reason: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointsAdjustment {
    /// Add points, e.g. as a goodwill gesture
    Credit(u32),
    /// Remove points. Never goes below zero.
    Debit(u32),
    /// Overwrite the balance
    Set(u32),
}

impl PointsAdjustment {
    fn default_reason(&self) -> &'static str {
        match self {
            PointsAdjustment::Credit(_) => "Manual credit",
            PointsAdjustment::Debit(_) => "Manual debit",
            PointsAdjustment::Set(_) => "Manual balance override",
        }
    }
}

impl AdjustPointsRequest {
    pub fn reason(&self) -> Cow<'static, str> {
        self.reason
            .as_ref()
            .cloned()
            .map(Into::into)
            .unwrap_or(self.adjustment.default_reason().into())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct AdjustPointsResponse {
    pub user_id: Uuid,
    /// Balance before the adjustment
    pub old_balance: u32,
    /// Balance after the adjustment
    pub new_balance: u32,
}

impl<D, U, P, N> Service<AdjustPointsRequest> for DomainLogic<D, U, P, N>
where
    D: DatabasePort + 'static,
    U: UserPort + 'static,
    P: PaymentPort + 'static,
    N: NotificationPort + 'static,
{
    type Response = AdjustPointsResponse;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: AdjustPointsRequest) -> Self::Future {
        let logic = self.clone();
        Box::pin(async move { logic.adjust_points(req).await })
    }
}

impl<D, U, P, N> DomainLogic<D, U, P, N>
where
    U: UserPort,
{
    async fn adjust_points(&self, req: AdjustPointsRequest) -> Result<AdjustPointsResponse, Error> {
        // Fetch necessary data
        let admin = self.users.get_user(req.admin_id).await.map_err(user_error)?;
        if !admin.is_admin() {
            tracing::warn!(requestor_id = %admin.user_id, "non-admin tried to adjust points");
            return Err(Error::Forbidden("adjusting points requires an admin".into()));
        }

        // Apply the ledger operation. Each one is atomic in the store, so the
        // old balance is derived from its result rather than read beforehand.
        let (old_balance, new_balance) = match req.adjustment {
            PointsAdjustment::Credit(amount) => {
                let change = self
                    .users
                    .credit_points(req.user_id, amount)
                    .await
                    .map_err(user_error)?;
                (change.previous, change.current)
            }
            PointsAdjustment::Debit(amount) => {
                let new = self
                    .users
                    .debit_points(req.user_id, amount)
                    .await
                    .map_err(user_error)?;
                (new.saturating_add(amount), new)
            }
            PointsAdjustment::Set(amount) => {
                let old = self
                    .users
                    .set_points(req.user_id, amount)
                    .await
                    .map_err(user_error)?;
                (old, amount)
            }
        };

        tracing::info!(
            admin_id = %admin.user_id,
            user_id = %req.user_id,
            old_balance,
            new_balance,
            reason = %req.reason(),
            "points adjusted"
        );

        Ok(AdjustPointsResponse {
            user_id: req.user_id,
            old_balance,
            new_balance,
        })
    }
}
