use std::sync::Arc;

use starbot_core::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    starbot_core::logging::init("starbot");

    let cfg = Arc::new(Config::load()?);

    starbot_telegram::router::run_polling(cfg).await
}
