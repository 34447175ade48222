/// Core error type for the bot.
///
/// Adapter crates map their specific errors into this type so the core
/// can decide consistently what is user-facing, what is retryable, and
/// what aborts a single record only.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid star quantity {stars}: must be between {min} and {max}")]
    InvalidStars { stars: i64, min: i64, max: i64 },

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, Error>;
