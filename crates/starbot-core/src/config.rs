use std::{env, fs, path::Path, path::PathBuf, time::Duration};

use crate::{errors::Error, Result};

/// Typed configuration for the bot, loaded from the environment
/// (with optional `.env` support).
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,
    /// Admins who receive order notifications and may run admin commands.
    pub admin_ids: Vec<i64>,
    /// Admins excluded from automatic notifications (still allowed to
    /// run admin commands).
    pub excluded_admin_ids: Vec<i64>,

    // Storefront
    pub channel_link: String,
    pub price_per_star: i64,
    pub min_stars: i64,
    pub max_stars: i64,

    // Persistence
    pub db_path: PathBuf,

    // Retry / drain behavior
    pub sync_interval: Duration,
    pub send_timeout: Duration,
    pub pending_batch_limit: i64,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let admin_ids = parse_csv_i64(env_str("ADMIN_IDS"));
        if admin_ids.is_empty() {
            return Err(Error::Config(
                "ADMIN_IDS environment variable is required".to_string(),
            ));
        }
        let excluded_admin_ids = parse_csv_i64(env_str("EXCLUDED_ADMIN_IDS"));

        let channel_link =
            env_str("CHANNEL_LINK").unwrap_or_else(|| "https://t.me/arzonstarslar".to_string());
        let price_per_star = env_i64("PRICE_PER_STAR").unwrap_or(210);
        let min_stars = env_i64("MIN_STARS").unwrap_or(50);
        let max_stars = env_i64("MAX_STARS").unwrap_or(10_000);
        if min_stars <= 0 || max_stars < min_stars {
            return Err(Error::Config(format!(
                "invalid star bounds: MIN_STARS={min_stars} MAX_STARS={max_stars}"
            )));
        }

        let db_path =
            PathBuf::from(env_str("DB_PATH").unwrap_or_else(|| "stars_bot.db".to_string()));

        let sync_interval = Duration::from_secs(env_u64("SYNC_INTERVAL_SECS").unwrap_or(60));
        let send_timeout = Duration::from_secs(env_u64("SEND_TIMEOUT_SECS").unwrap_or(30));
        let pending_batch_limit = env_i64("PENDING_BATCH_LIMIT").unwrap_or(50).max(1);

        Ok(Self {
            telegram_bot_token,
            admin_ids,
            excluded_admin_ids,
            channel_link,
            price_per_star,
            min_stars,
            max_stars,
            db_path,
            sync_interval,
            send_timeout,
            pending_batch_limit,
        })
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id) || self.excluded_admin_ids.contains(&user_id)
    }

    /// Admins eligible for automatic order notifications.
    pub fn notify_targets(&self) -> Vec<i64> {
        self.admin_ids
            .iter()
            .copied()
            .filter(|id| !self.excluded_admin_ids.contains(id))
            .collect()
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_i64(key: &str) -> Option<i64> {
    env_str(key).and_then(|s| s.trim().parse::<i64>().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}
