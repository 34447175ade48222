//! SQLite persistence for users, orders and pending notifications.
//!
//! Pure data access, no policy: retry decisions live in the dispatcher.
//! Every mutation commits immediately; there are no cross-call
//! transactions. A crash between an order insert and the matching
//! pending insert can therefore leave an order that is never retried —
//! a known gap of the immediate-commit design, kept as-is.

use std::path::Path;

use chrono::{DateTime, Local, NaiveDate, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Row, SqlitePool,
};

use crate::{
    domain::{LeaderboardEntry, Order, PendingDelivery, ProductKind, SummaryStats},
    Result,
};

/// Durable store for the three entity types.
///
/// The pool is capped at a single connection, which serializes all
/// writers: inbound handlers, the drain timer and manual drain commands
/// may interleave freely without tripping SQLITE_BUSY.
#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the database at `path` and ensure the
    /// schema exists.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                username TEXT,
                first_seen TEXT,
                seen_channel INTEGER DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER,
                username TEXT,
                buy_type TEXT,
                stars INTEGER,
                amount INTEGER,
                created_at TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS pending_notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                order_id INTEGER,
                tries INTEGER DEFAULT 0,
                last_try TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Upsert a user: insert if unknown, always refresh the username.
    /// Safe to call on every interaction.
    pub async fn ensure_user(&self, user_id: i64, username: Option<&str>) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO users (user_id, username, first_seen, seen_channel) \
             VALUES (?, ?, ?, 0)",
        )
        .bind(user_id)
        .bind(username)
        .bind(today())
        .execute(&self.pool)
        .await?;

        sqlx::query("UPDATE users SET username = ? WHERE user_id = ?")
            .bind(username)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Flip `seen_channel` to true. No-op if already set; never reverts.
    pub async fn mark_channel_seen(&self, user_id: i64) -> Result<()> {
        sqlx::query("UPDATE users SET seen_channel = 1 WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// False for unknown users.
    pub async fn has_seen_channel(&self, user_id: i64) -> Result<bool> {
        let seen: Option<i64> =
            sqlx::query_scalar("SELECT seen_channel FROM users WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(seen == Some(1))
    }

    /// Insert a new order and return its assigned id. `created_at` is
    /// stamped here with the store's clock.
    pub async fn create_order(
        &self,
        user_id: i64,
        username: Option<&str>,
        kind: ProductKind,
        stars: i64,
        amount: i64,
    ) -> Result<i64> {
        let res = sqlx::query(
            "INSERT INTO orders (user_id, username, buy_type, stars, amount, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(username)
        .bind(kind.as_str())
        .bind(stars)
        .bind(amount)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(res.last_insert_rowid())
    }

    pub async fn get_order(&self, order_id: i64) -> Result<Option<Order>> {
        let row = sqlx::query(
            "SELECT id, user_id, username, buy_type, stars, amount, created_at \
             FROM orders WHERE id = ?",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(Order {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            username: row.try_get("username")?,
            buy_type: row.try_get("buy_type")?,
            stars: row.try_get("stars")?,
            amount: row.try_get("amount")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        }))
    }

    /// Queue an order for notification retry. One row per order.
    pub async fn enqueue_pending(&self, order_id: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO pending_notifications (order_id, tries, last_try) VALUES (?, 0, NULL)",
        )
        .bind(order_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a failed delivery attempt: bump `tries`, stamp `last_try`.
    pub async fn record_attempt(&self, pending_id: i64) -> Result<()> {
        sqlx::query("UPDATE pending_notifications SET tries = tries + 1, last_try = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(pending_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete a pending row once delivery succeeded. The row's absence is
    /// the success marker; deleting an already-deleted id is a no-op,
    /// which is what keeps overlapping drains safe.
    pub async fn remove_pending(&self, pending_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM pending_notifications WHERE id = ?")
            .bind(pending_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Pending rows joined with their order data, oldest-enqueued first,
    /// bounded by `limit`.
    pub async fn list_pending(&self, limit: i64) -> Result<Vec<PendingDelivery>> {
        let rows = sqlx::query(
            "SELECT p.id AS pending_id, p.order_id, p.tries, p.last_try, \
                    o.user_id, o.username, o.buy_type, o.stars, o.amount \
             FROM pending_notifications p JOIN orders o ON p.order_id = o.id \
             ORDER BY p.id ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(PendingDelivery {
                    pending_id: row.try_get("pending_id")?,
                    order_id: row.try_get("order_id")?,
                    tries: row.try_get("tries")?,
                    last_try: row.try_get::<Option<DateTime<Utc>>, _>("last_try")?,
                    user_id: row.try_get("user_id")?,
                    username: row.try_get("username")?,
                    buy_type: row.try_get("buy_type")?,
                    stars: row.try_get("stars")?,
                    amount: row.try_get("amount")?,
                })
            })
            .collect()
    }

    /// Top buyers by total stars, descending. Ties resolve in row order.
    pub async fn aggregate_leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>> {
        let rows = sqlx::query(
            "SELECT username, SUM(stars) AS total_stars, SUM(amount) AS total_amount \
             FROM orders GROUP BY user_id ORDER BY total_stars DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(LeaderboardEntry {
                    username: row.try_get("username")?,
                    total_stars: row.try_get("total_stars")?,
                    total_amount: row.try_get("total_amount")?,
                })
            })
            .collect()
    }

    /// Aggregate counters; "today" is the store's current local date at
    /// call time.
    pub async fn summary_stats(&self) -> Result<SummaryStats> {
        let total_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        let users_today: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE first_seen = ?")
                .bind(today())
                .fetch_one(&self.pool)
                .await?;

        let total_orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await?;

        let total_amount: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(amount), 0) FROM orders")
            .fetch_one(&self.pool)
            .await?;

        Ok(SummaryStats {
            total_users,
            users_today,
            total_orders,
            total_amount,
        })
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> Store {
        Store::open(Path::new(":memory:")).await.unwrap()
    }

    #[tokio::test]
    async fn ensure_user_is_idempotent_and_refreshes_username() {
        let store = test_store().await;

        store.ensure_user(1, Some("@old")).await.unwrap();
        store.ensure_user(1, Some("@new")).await.unwrap();
        store.ensure_user(1, Some("@new")).await.unwrap();

        let stats = store.summary_stats().await.unwrap();
        assert_eq!(stats.total_users, 1);

        let name: Option<String> =
            sqlx::query_scalar("SELECT username FROM users WHERE user_id = 1")
                .fetch_one(&store.pool)
                .await
                .unwrap();
        assert_eq!(name.as_deref(), Some("@new"));
    }

    #[tokio::test]
    async fn seen_channel_is_false_for_unknown_and_flips_once() {
        let store = test_store().await;

        assert!(!store.has_seen_channel(42).await.unwrap());

        store.ensure_user(42, None).await.unwrap();
        assert!(!store.has_seen_channel(42).await.unwrap());

        store.mark_channel_seen(42).await.unwrap();
        assert!(store.has_seen_channel(42).await.unwrap());

        // Repeat call stays a no-op.
        store.mark_channel_seen(42).await.unwrap();
        assert!(store.has_seen_channel(42).await.unwrap());
    }

    #[tokio::test]
    async fn orders_get_fresh_ids_and_read_back_unchanged() {
        let store = test_store().await;

        let a = store
            .create_order(1, Some("@a"), ProductKind::SelfAccount, 100, 21_000)
            .await
            .unwrap();
        let b = store
            .create_order(2, None, ProductKind::Gift, 50, 10_500)
            .await
            .unwrap();
        assert!(b > a);

        let order = store.get_order(a).await.unwrap().unwrap();
        assert_eq!(order.id, a);
        assert_eq!(order.user_id, 1);
        assert_eq!(order.username.as_deref(), Some("@a"));
        assert_eq!(order.buy_type, "self");
        assert_eq!(order.stars, 100);
        assert_eq!(order.amount, 21_000);

        assert!(store.get_order(9999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pending_lifecycle_enqueue_attempt_remove() {
        let store = test_store().await;

        let order_id = store
            .create_order(1, Some("@a"), ProductKind::SelfAccount, 100, 21_000)
            .await
            .unwrap();
        store.enqueue_pending(order_id).await.unwrap();

        let pending = store.list_pending(50).await.unwrap();
        assert_eq!(pending.len(), 1);
        let row = &pending[0];
        assert_eq!(row.order_id, order_id);
        assert_eq!(row.tries, 0);
        assert!(row.last_try.is_none());
        assert_eq!(row.stars, 100);
        assert_eq!(row.amount, 21_000);

        store.record_attempt(row.pending_id).await.unwrap();
        store.record_attempt(row.pending_id).await.unwrap();
        let pending = store.list_pending(50).await.unwrap();
        assert_eq!(pending[0].tries, 2);
        assert!(pending[0].last_try.is_some());

        store.remove_pending(row.pending_id).await.unwrap();
        assert!(store.list_pending(50).await.unwrap().is_empty());

        // Deleting an already-deleted id is a no-op.
        store.remove_pending(row.pending_id).await.unwrap();
    }

    #[tokio::test]
    async fn list_pending_is_oldest_first_and_bounded() {
        let store = test_store().await;

        let mut order_ids = Vec::new();
        for i in 0..5 {
            let id = store
                .create_order(i, None, ProductKind::SelfAccount, 50, 10_500)
                .await
                .unwrap();
            store.enqueue_pending(id).await.unwrap();
            order_ids.push(id);
        }

        let pending = store.list_pending(3).await.unwrap();
        assert_eq!(pending.len(), 3);
        let got: Vec<i64> = pending.iter().map(|p| p.order_id).collect();
        assert_eq!(got, order_ids[..3].to_vec());
    }

    #[tokio::test]
    async fn leaderboard_sorts_by_total_stars() {
        let store = test_store().await;

        store
            .create_order(1, Some("@u1"), ProductKind::SelfAccount, 10, 2_100)
            .await
            .unwrap();
        store
            .create_order(1, Some("@u1"), ProductKind::SelfAccount, 5, 1_050)
            .await
            .unwrap();
        store
            .create_order(2, Some("@u2"), ProductKind::Gift, 20, 4_200)
            .await
            .unwrap();

        let top = store.aggregate_leaderboard(5).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].username.as_deref(), Some("@u2"));
        assert_eq!(top[0].total_stars, 20);
        assert_eq!(top[1].username.as_deref(), Some("@u1"));
        assert_eq!(top[1].total_stars, 15);
        assert_eq!(top[1].total_amount, 3_150);
    }

    #[tokio::test]
    async fn summary_stats_counts_todays_users_and_amounts() {
        let store = test_store().await;

        store.ensure_user(1, Some("@a")).await.unwrap();
        store.ensure_user(2, Some("@b")).await.unwrap();
        store.ensure_user(3, Some("@c")).await.unwrap();
        // Backdate one signup.
        sqlx::query("UPDATE users SET first_seen = '2020-01-01' WHERE user_id = 3")
            .execute(&store.pool)
            .await
            .unwrap();

        store
            .create_order(1, Some("@a"), ProductKind::SelfAccount, 100, 300)
            .await
            .unwrap();
        store
            .create_order(2, Some("@b"), ProductKind::Gift, 50, 200)
            .await
            .unwrap();

        let stats = store.summary_stats().await.unwrap();
        assert_eq!(stats.total_users, 3);
        assert_eq!(stats.users_today, 2);
        assert_eq!(stats.total_orders, 2);
        assert_eq!(stats.total_amount, 500);
    }
}
