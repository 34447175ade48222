use chrono::{DateTime, Utc};

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric). For private chats this equals the user id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// What kind of purchase an order is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProductKind {
    /// Stars for the buyer's own account.
    SelfAccount,
    /// Stars gifted to another account.
    Gift,
}

impl ProductKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductKind::SelfAccount => "self",
            ProductKind::Gift => "gift",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "self" => Some(ProductKind::SelfAccount),
            "gift" => Some(ProductKind::Gift),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProductKind::SelfAccount => "For own account",
            ProductKind::Gift => "Gift",
        }
    }
}

/// A placed order. Immutable once created; there is no update or delete path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    /// Display name snapshot at order time; the users table may move on.
    pub username: Option<String>,
    pub buy_type: String,
    pub stars: i64,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

/// A pending admin notification joined with its order fields, as returned
/// by `Store::list_pending`.
#[derive(Clone, Debug)]
pub struct PendingDelivery {
    pub pending_id: i64,
    pub order_id: i64,
    pub tries: i64,
    pub last_try: Option<DateTime<Utc>>,
    pub user_id: i64,
    pub username: Option<String>,
    pub buy_type: String,
    pub stars: i64,
    pub amount: i64,
}

/// One row of the buyers leaderboard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub username: Option<String>,
    pub total_stars: i64,
    pub total_amount: i64,
}

/// Aggregate counters for the admin `/stat` view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SummaryStats {
    pub total_users: i64,
    pub users_today: i64,
    pub total_orders: i64,
    pub total_amount: i64,
}
