//! Order placement. The ledger is the only writer of order rows.

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    dispatcher::NotificationDispatcher,
    domain::{Order, ProductKind},
    store::Store,
    Error, Result,
};

pub struct OrderLedger {
    store: Store,
    dispatcher: Arc<NotificationDispatcher>,
    price_per_star: i64,
    min_stars: i64,
    max_stars: i64,
}

impl OrderLedger {
    pub fn new(
        store: Store,
        dispatcher: Arc<NotificationDispatcher>,
        price_per_star: i64,
        min_stars: i64,
        max_stars: i64,
    ) -> Self {
        Self {
            store,
            dispatcher,
            price_per_star,
            min_stars,
            max_stars,
        }
    }

    pub fn min_stars(&self) -> i64 {
        self.min_stars
    }

    pub fn max_stars(&self) -> i64 {
        self.max_stars
    }

    pub fn amount_for(&self, stars: i64) -> i64 {
        stars * self.price_per_star
    }

    /// Persist a new order and hand it to the dispatcher.
    ///
    /// The handlers validate quantity before calling; the bound check is
    /// repeated here because nothing else stands between bad input and
    /// the orders table. Placement succeeds independently of the
    /// notification outcome.
    pub async fn place_order(
        &self,
        user_id: i64,
        username: Option<&str>,
        kind: ProductKind,
        stars: i64,
    ) -> Result<i64> {
        if stars < self.min_stars || stars > self.max_stars {
            return Err(Error::InvalidStars {
                stars,
                min: self.min_stars,
                max: self.max_stars,
            });
        }

        let amount = self.amount_for(stars);
        let order_id = self
            .store
            .create_order(user_id, username, kind, stars, amount)
            .await?;
        info!(order_id, user_id, stars, amount, "order placed");

        match self.store.get_order(order_id).await {
            Ok(Some(order)) => {
                if let Err(e) = self.dispatcher.notify_new_order(&order).await {
                    warn!(order_id, error = %e, "order notification failed");
                }
            }
            Ok(None) => warn!(order_id, "placed order not found for notification"),
            Err(e) => warn!(order_id, error = %e, "order read-back failed"),
        }

        Ok(order_id)
    }

    pub async fn get_order(&self, order_id: i64) -> Result<Option<Order>> {
        self.store.get_order(order_id).await
    }
}
