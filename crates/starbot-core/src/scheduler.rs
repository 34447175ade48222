//! Periodic drain of the pending-notification queue.
//!
//! The timer and the manual `/sync` command call the identical
//! `drain_pending` operation; the manual path bypasses the timer, it
//! does not replace it.

use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::dispatcher::NotificationDispatcher;

pub struct SyncScheduler {
    dispatcher: Arc<NotificationDispatcher>,
    interval: Duration,
    batch_limit: i64,
    state: tokio::sync::Mutex<Option<RunningTask>>,
}

struct RunningTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl SyncScheduler {
    pub fn new(dispatcher: Arc<NotificationDispatcher>, interval: Duration, batch_limit: i64) -> Self {
        Self {
            dispatcher,
            interval,
            batch_limit,
            state: tokio::sync::Mutex::new(None),
        }
    }

    /// Spawn the drain timer. Restarting an already-running scheduler
    /// replaces the previous task.
    pub async fn start(&self) {
        let mut st = self.state.lock().await;
        if let Some(prev) = st.take() {
            prev.cancel.cancel();
            prev.handle.abort();
        }

        let cancel = CancellationToken::new();
        let dispatcher = self.dispatcher.clone();
        let interval = self.interval;
        let batch_limit = self.batch_limit;
        let cancel_for_task = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick of a tokio interval fires immediately; the
            // binary already drains once at startup, so skip it.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel_for_task.cancelled() => break,
                    _ = ticker.tick() => {
                        match dispatcher.drain_pending(batch_limit).await {
                            Ok(report) if report.delivered > 0 || report.still_pending > 0 => {
                                info!(
                                    delivered = report.delivered,
                                    still_pending = report.still_pending,
                                    "scheduled drain finished"
                                );
                            }
                            Ok(_) => {}
                            Err(e) => error!(error = %e, "scheduled drain failed"),
                        }
                    }
                }
            }
        });

        info!(interval_secs = self.interval.as_secs(), "drain scheduler started");
        *st = Some(RunningTask { cancel, handle });
    }

    pub async fn stop(&self) {
        let mut st = self.state.lock().await;
        if let Some(task) = st.take() {
            task.cancel.cancel();
            task.handle.abort();
            info!("drain scheduler stopped");
        }
    }
}
