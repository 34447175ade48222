//! Admin notification delivery with a durable retry queue.
//!
//! A new order triggers an immediate delivery attempt to every eligible
//! admin. If nobody could be reached, one pending row is queued for the
//! order and replayed by `drain_pending` until it goes through. Delivery
//! is at-least-once: overlapping drains (timer + manual `/sync`) may
//! duplicate a message to an admin but never corrupt the queue, because
//! removing an already-removed row is a no-op.

use std::{sync::Arc, time::Duration};

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::{
    domain::{ChatId, Order},
    formatting::{display_name, escape_html, format_amount},
    messaging::port::MessagingPort,
    store::Store,
    Result,
};

/// Outcome of one drain pass, reported back to `/sync` callers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub still_pending: usize,
}

pub struct NotificationDispatcher {
    store: Store,
    messenger: Arc<dyn MessagingPort>,
    /// Admin ids eligible for notifications (excluded ids already
    /// filtered out at construction).
    targets: Vec<i64>,
    send_timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(
        store: Store,
        messenger: Arc<dyn MessagingPort>,
        targets: Vec<i64>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            store,
            messenger,
            targets,
            send_timeout,
        }
    }

    /// Attempt immediate delivery of a new order's notification.
    ///
    /// All sends failed (with at least one recipient attempted) →
    /// exactly one pending row is queued for the order. At least one
    /// success, or zero eligible recipients → nothing is queued.
    /// Transport failures never escape this method; store failures do.
    pub async fn notify_new_order(&self, order: &Order) -> Result<()> {
        if self.targets.is_empty() {
            debug!(order_id = order.id, "no eligible admins, nothing to notify");
            return Ok(());
        }

        let text = order_text(
            order.id,
            order.user_id,
            order.username.as_deref(),
            &order.buy_type,
            order.stars,
            order.amount,
        );
        let delivered = self.send_to_all(&text).await;

        if delivered == 0 {
            warn!(order_id = order.id, "all admin sends failed, queueing for retry");
            self.store.enqueue_pending(order.id).await?;
        } else {
            info!(
                order_id = order.id,
                delivered,
                admins = self.targets.len(),
                "order notification delivered"
            );
        }
        Ok(())
    }

    /// Replay up to `batch_limit` pending notifications, oldest first.
    ///
    /// A row is removed only when every eligible admin received the
    /// message; otherwise its try-counter is bumped and it stays for the
    /// next cycle. There is no retry ceiling; the drain interval is the
    /// tunable. Store failures on one row abort that row only.
    pub async fn drain_pending(&self, batch_limit: i64) -> Result<DrainReport> {
        let rows = self.store.list_pending(batch_limit).await?;
        if rows.is_empty() {
            return Ok(DrainReport::default());
        }

        info!(count = rows.len(), "draining pending notifications");
        let mut report = DrainReport::default();

        for row in rows {
            let text = order_text(
                row.order_id,
                row.user_id,
                row.username.as_deref(),
                &row.buy_type,
                row.stars,
                row.amount,
            );

            let delivered = self.send_to_all(&text).await;
            let full_success = delivered == self.targets.len();

            let outcome = if full_success {
                self.store.remove_pending(row.pending_id).await
            } else {
                self.store.record_attempt(row.pending_id).await
            };
            if let Err(e) = outcome {
                warn!(
                    pending_id = row.pending_id,
                    error = %e,
                    "store update failed for pending row, will retry next cycle"
                );
                report.still_pending += 1;
                continue;
            }

            if full_success {
                info!(
                    order_id = row.order_id,
                    tries = row.tries,
                    "pending notification delivered"
                );
                report.delivered += 1;
            } else {
                debug!(
                    order_id = row.order_id,
                    tries = row.tries + 1,
                    "pending notification still undeliverable"
                );
                report.still_pending += 1;
            }
        }

        Ok(report)
    }

    /// Send `text` to every eligible admin, each attempt bounded by the
    /// configured timeout. Returns how many sends succeeded.
    async fn send_to_all(&self, text: &str) -> usize {
        let mut delivered = 0usize;
        for &admin_id in &self.targets {
            let send = self.messenger.send_html(ChatId(admin_id), text);
            match timeout(self.send_timeout, send).await {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    warn!(admin_id, error = %e, "admin notification send failed");
                }
                Err(_) => {
                    warn!(admin_id, "admin notification send timed out");
                }
            }
        }
        delivered
    }
}

/// Notification body shared by the immediate path and the drain path.
fn order_text(
    order_id: i64,
    user_id: i64,
    username: Option<&str>,
    buy_type: &str,
    stars: i64,
    amount: i64,
) -> String {
    format!(
        "🆕 <b>New order #{order_id}</b>\n\
         Buyer: {buyer} (<code>{user_id}</code>)\n\
         Type: {buy_type}\n\
         Stars: <b>{stars}</b>\n\
         Amount: <b>{amount}</b> so'm",
        buyer = escape_html(&display_name(username, user_id)),
        buy_type = escape_html(buy_type),
        amount = format_amount(amount),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{domain::ProductKind, messaging::testing::RecordingMessenger};
    use std::path::Path;

    const ADMINS: [i64; 2] = [100, 200];

    async fn setup() -> (Store, Arc<RecordingMessenger>, NotificationDispatcher) {
        let store = Store::open(Path::new(":memory:")).await.unwrap();
        let messenger = Arc::new(RecordingMessenger::new());
        let dispatcher = NotificationDispatcher::new(
            store.clone(),
            messenger.clone(),
            ADMINS.to_vec(),
            Duration::from_secs(5),
        );
        (store, messenger, dispatcher)
    }

    async fn place(store: &Store, stars: i64) -> Order {
        let id = store
            .create_order(7, Some("@buyer"), ProductKind::SelfAccount, stars, stars * 210)
            .await
            .unwrap();
        store.get_order(id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn all_sends_failing_queues_exactly_one_pending_row() {
        let (store, messenger, dispatcher) = setup().await;
        messenger.fail_everything(true);

        let order = place(&store, 100).await;
        dispatcher.notify_new_order(&order).await.unwrap();

        let pending = store.list_pending(50).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].order_id, order.id);
        assert_eq!(pending[0].tries, 0);
    }

    #[tokio::test]
    async fn one_successful_send_is_enough_to_skip_the_queue() {
        let (store, messenger, dispatcher) = setup().await;
        messenger.fail_recipient(100);

        let order = place(&store, 100).await;
        dispatcher.notify_new_order(&order).await.unwrap();

        assert!(store.list_pending(50).await.unwrap().is_empty());
        assert_eq!(messenger.sent_count(), 1);
        assert_eq!(messenger.sent()[0].0, 200);
    }

    #[tokio::test]
    async fn zero_eligible_admins_means_nothing_to_notify() {
        let store = Store::open(Path::new(":memory:")).await.unwrap();
        let messenger = Arc::new(RecordingMessenger::new());
        let dispatcher = NotificationDispatcher::new(
            store.clone(),
            messenger.clone(),
            Vec::new(),
            Duration::from_secs(5),
        );

        let order = place(&store, 100).await;
        dispatcher.notify_new_order(&order).await.unwrap();

        assert!(store.list_pending(50).await.unwrap().is_empty());
        assert_eq!(messenger.sent_count(), 0);
    }

    #[tokio::test]
    async fn drain_removes_delivered_rows_and_reports() {
        let (store, messenger, dispatcher) = setup().await;
        messenger.fail_everything(true);

        let order = place(&store, 100).await;
        dispatcher.notify_new_order(&order).await.unwrap();

        messenger.fail_everything(false);
        let report = dispatcher.drain_pending(50).await.unwrap();
        assert_eq!(
            report,
            DrainReport {
                delivered: 1,
                still_pending: 0
            }
        );
        assert!(store.list_pending(50).await.unwrap().is_empty());

        // Both admins got the replayed notification.
        let recipients: Vec<i64> = messenger.sent().iter().map(|(id, _)| *id).collect();
        assert_eq!(recipients, vec![100, 200]);
    }

    #[tokio::test]
    async fn failing_drains_bump_tries_monotonically() {
        let (store, messenger, dispatcher) = setup().await;
        messenger.fail_everything(true);

        let order = place(&store, 100).await;
        dispatcher.notify_new_order(&order).await.unwrap();

        for expected_tries in 1..=3 {
            let report = dispatcher.drain_pending(50).await.unwrap();
            assert_eq!(report.still_pending, 1);
            assert_eq!(report.delivered, 0);

            let pending = store.list_pending(50).await.unwrap();
            assert_eq!(pending[0].tries, expected_tries);
            assert!(pending[0].last_try.is_some());
        }
    }

    #[tokio::test]
    async fn partial_delivery_keeps_the_row_pending() {
        let (store, messenger, dispatcher) = setup().await;
        messenger.fail_everything(true);

        let order = place(&store, 100).await;
        dispatcher.notify_new_order(&order).await.unwrap();

        // One admin reachable is enough for the immediate path, but a
        // drain only clears the row when everyone got the message.
        messenger.fail_everything(false);
        messenger.fail_recipient(200);
        let report = dispatcher.drain_pending(50).await.unwrap();
        assert_eq!(report.still_pending, 1);
        assert_eq!(store.list_pending(50).await.unwrap()[0].tries, 1);
    }

    #[tokio::test]
    async fn drain_is_idempotent_once_the_queue_is_empty() {
        let (store, messenger, dispatcher) = setup().await;
        messenger.fail_everything(true);

        let order = place(&store, 100).await;
        dispatcher.notify_new_order(&order).await.unwrap();

        messenger.fail_everything(false);
        let first = dispatcher.drain_pending(50).await.unwrap();
        assert_eq!(first.delivered, 1);

        let second = dispatcher.drain_pending(50).await.unwrap();
        assert_eq!(second, DrainReport::default());
        assert!(store.list_pending(50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_drains_match_a_sequential_drain() {
        let (store, messenger, dispatcher) = setup().await;
        messenger.fail_everything(true);

        for stars in [50, 60, 70] {
            let order = place(&store, stars).await;
            dispatcher.notify_new_order(&order).await.unwrap();
        }
        assert_eq!(store.list_pending(50).await.unwrap().len(), 3);

        messenger.fail_everything(false);
        let (a, b) = tokio::join!(dispatcher.drain_pending(50), dispatcher.drain_pending(50));
        a.unwrap();
        b.unwrap();

        // At-least-once: duplicates to admins are allowed, but the queue
        // itself must end up exactly empty, with no orphaned rows.
        assert!(store.list_pending(50).await.unwrap().is_empty());
        let raw: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pending_notifications")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(raw, 0);
    }

    #[test]
    fn order_text_escapes_untrusted_names() {
        let text = order_text(9, 7, Some("<b>bad</b>"), "self", 50, 10_500);
        assert!(text.contains("&lt;b&gt;bad&lt;/b&gt;"));
        assert!(text.contains("#9"));
        assert!(text.contains("10 500"));
    }
}
