use std::{collections::HashMap, sync::Arc};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use starbot_core::{
    config::Config,
    dispatcher::NotificationDispatcher,
    domain::ProductKind,
    ledger::OrderLedger,
    messaging::port::MessagingPort,
    scheduler::SyncScheduler,
    store::Store,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub store: Store,
    pub ledger: Arc<OrderLedger>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub messenger: Arc<dyn MessagingPort>,
    pub awaiting: Arc<AwaitingQuantity>,
}

/// Per-chat "waiting for a star amount" state for the buy flow.
#[derive(Default)]
pub struct AwaitingQuantity {
    inner: Mutex<HashMap<i64, ProductKind>>,
}

impl AwaitingQuantity {
    pub async fn set(&self, chat_id: i64, kind: ProductKind) {
        self.inner.lock().await.insert(chat_id, kind);
    }

    pub async fn take(&self, chat_id: i64) -> Option<ProductKind> {
        self.inner.lock().await.remove(&chat_id)
    }
}

pub async fn run_polling(cfg: Arc<Config>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    if let Ok(me) = bot.get_me().await {
        info!(bot = me.username(), "starbot started");
    }
    info!(
        admins = cfg.admin_ids.len(),
        excluded = cfg.excluded_admin_ids.len(),
        db = %cfg.db_path.display(),
        "configuration loaded"
    );

    let store = Store::open(&cfg.db_path).await?;

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let dispatcher = Arc::new(NotificationDispatcher::new(
        store.clone(),
        messenger.clone(),
        cfg.notify_targets(),
        cfg.send_timeout,
    ));
    let ledger = Arc::new(OrderLedger::new(
        store.clone(),
        dispatcher.clone(),
        cfg.price_per_star,
        cfg.min_stars,
        cfg.max_stars,
    ));

    let scheduler = Arc::new(SyncScheduler::new(
        dispatcher.clone(),
        cfg.sync_interval,
        cfg.pending_batch_limit,
    ));
    scheduler.start().await;

    // Replay anything left over from a previous run before polling.
    match dispatcher.drain_pending(cfg.pending_batch_limit).await {
        Ok(report) if report.delivered > 0 || report.still_pending > 0 => {
            info!(
                delivered = report.delivered,
                still_pending = report.still_pending,
                "startup drain finished"
            );
        }
        Ok(_) => {}
        Err(e) => error!(error = %e, "startup drain failed"),
    }

    let state = Arc::new(AppState {
        cfg,
        store,
        ledger,
        dispatcher,
        messenger,
        awaiting: Arc::new(AwaitingQuantity::default()),
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    scheduler.stop().await;
    warn!("polling loop exited");

    Ok(())
}
