//! Periodic and on-demand sync runs.

use crate::engine::SyncEngine;
use crate::error::{SyncError, SyncResult};
use docward_types::SyncScope;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSchedule {
    /// When false, neither the timer nor requests trigger runs.
    pub enabled: bool,
    pub interval: Duration,
    /// Move `Failed` entries back to `Pending` before each timer run.
    pub requeue_failed: bool,
}

impl Default for SyncSchedule {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(300),
            requeue_failed: true,
        }
    }
}

/// Handle to the background sync task.
pub struct SyncScheduler {
    requester: SyncRequester,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SyncScheduler {
    /// Starts the background task. The first timer run happens one interval
    /// after start.
    pub fn start(engine: Arc<SyncEngine>, schedule: SyncSchedule) -> Self {
        let (requests, mut request_rx) = mpsc::channel::<SyncScope>(32);
        let (stop, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let period = schedule.interval.max(Duration::from_millis(1));
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            if schedule.enabled {
                info!(interval = ?period, "sync scheduler started");
            } else {
                info!("sync disabled, scheduler idle");
            }

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    request = request_rx.recv() => match request {
                        Some(scope) if schedule.enabled => run(&engine, &scope, false).await,
                        Some(scope) => debug!(%scope, "sync disabled, ignoring request"),
                        None => break,
                    },
                    _ = ticker.tick(), if schedule.enabled => {
                        run(&engine, &SyncScope::All, schedule.requeue_failed).await;
                    }
                }
            }
            info!("sync scheduler stopped");
        });

        Self {
            requester: SyncRequester { requests },
            stop: Some(stop),
            task,
        }
    }

    pub fn request(&self, scope: SyncScope) -> SyncResult<()> {
        self.requester.request(scope)
    }

    /// A cheap sender for code that only needs to request runs.
    #[must_use]
    pub fn requester(&self) -> SyncRequester {
        self.requester.clone()
    }

    /// Lets the current run finish, then stops.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = self.task.await {
            warn!("sync scheduler ended abnormally: {e}");
        }
    }
}

/// Clonable request side of a [`SyncScheduler`].
#[derive(Clone)]
pub struct SyncRequester {
    requests: mpsc::Sender<SyncScope>,
}

impl SyncRequester {
    /// Asks for a run as soon as the current one (if any) finishes. Never
    /// blocks; a request that does not fit the queue is dropped and left to
    /// the next timer run.
    pub fn request(&self, scope: SyncScope) -> SyncResult<()> {
        match self.requests.try_send(scope) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(scope)) => {
                debug!(%scope, "sync request queue full, deferring to timer");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SyncError::ChannelClosed),
        }
    }
}

async fn run(engine: &SyncEngine, scope: &SyncScope, requeue_failed: bool) {
    if requeue_failed {
        let warehouse = Arc::clone(engine.warehouse());
        match tokio::task::spawn_blocking(move || warehouse.requeue_failed()).await {
            Ok(Ok(moved)) => debug!(moved, "requeued failed entries"),
            Ok(Err(e)) => warn!("failed to requeue entries: {e}"),
            Err(e) => warn!("requeue task failed: {e}"),
        }
    }
    match engine.sync(scope).await {
        Ok(attempts) => debug!(%scope, backends = attempts.len(), "sync run finished"),
        Err(e) => warn!(%scope, "sync run failed: {e}"),
    }
}
