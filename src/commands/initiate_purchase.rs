use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tower::Service;
use uuid::Uuid;

use crate::{
    domain::Purchase,
    ports::{
        database::DatabasePort,
        notification::NotificationPort,
        payment::{IntentMetadata, PaymentPort},
        user::UserPort,
    },
};

use super::{database_error, user_error, DomainLogic, Error, PolicyReason};

pub struct InitiatePurchaseRequest {
    pub user_id: Uuid,
    pub pack_id: Uuid,
}

#[derive(Debug, PartialEq, Eq)]
pub struct InitiatePurchaseResponse {
    pub purchase_id: Uuid,
    /// Reference to pass back when confirming the payment
    pub external_id: String,
    /// Handed to the client to complete the payment with the processor
    pub client_secret: String,
}

impl<D, U, P, N> Service<InitiatePurchaseRequest> for DomainLogic<D, U, P, N>
where
    D: DatabasePort + 'static,
    U: UserPort + 'static,
    P: PaymentPort + 'static,
    N: NotificationPort + 'static,
{
    type Response = InitiatePurchaseResponse;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: InitiatePurchaseRequest) -> Self::Future {
        let logic = self.clone();
        Box::pin(async move { logic.initiate_purchase(req).await })
    }
}

impl<D, U, P, N> DomainLogic<D, U, P, N>
where
    D: DatabasePort,
    U: UserPort,
    P: PaymentPort,
{
    async fn initiate_purchase(
        &self,
        req: InitiatePurchaseRequest,
    ) -> Result<InitiatePurchaseResponse, Error> {
        let user = self.users.get_user(req.user_id).await.map_err(user_error)?;
        if !user.active {
            return Err(PolicyReason::InactiveAccount.into());
        }

        let pack = self
            .database
            .get_pack(req.pack_id)
            .await
            .map_err(database_error)?;
        if !pack.active {
            return Err(PolicyReason::PackUnavailable.into());
        }

        let intent = self
            .payment
            .create_intent(
                pack.price,
                IntentMetadata {
                    user_id: user.user_id,
                    pack_id: pack.pack_id,
                },
            )
            .await?;

        let purchase = Purchase::pending(
            user.user_id,
            &pack,
            intent.external_id.clone(),
            self.clock.now(),
        );
        let purchase = self
            .database
            .insert_purchase(purchase)
            .await
            .map_err(database_error)?;

        tracing::info!(
            user_id = %user.user_id,
            pack_id = %pack.pack_id,
            purchase_id = %purchase.purchase_id,
            reference = %purchase.external_reference,
            amount = purchase.amount,
            "purchase initiated"
        );

        Ok(InitiatePurchaseResponse {
            purchase_id: purchase.purchase_id,
            external_id: intent.external_id,
            client_secret: intent.client_secret,
        })
    }
}
