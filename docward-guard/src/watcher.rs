//! Polling filesystem watcher.
//!
//! Rescans the roots on a fixed interval and diffs against the previous scan.
//! The first scan reports every in-scope file as created, so documents that
//! were altered while the daemon was down are re-checked at startup.

use crate::pool::{Dispatch, EventKind, EventSink};
use crate::policy::FilenameFilter;
use crate::scan::{FileState, collect_files};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub struct PollingWatcher {
    roots: Vec<PathBuf>,
    interval: Duration,
    filter: FilenameFilter,
    known: HashMap<PathBuf, FileState>,
}

impl PollingWatcher {
    pub fn new(roots: Vec<PathBuf>, interval: Duration, filter: FilenameFilter) -> Self {
        Self {
            roots,
            interval,
            filter,
            known: HashMap::new(),
        }
    }

    /// Scans once and returns the changes since the previous scan, in path
    /// order. Removed files are forgotten without an event.
    pub async fn poll(&mut self) -> Vec<(PathBuf, EventKind)> {
        let roots = self.roots.clone();
        let filter = self.filter.clone();
        let files = match tokio::task::spawn_blocking(move || collect_files(&roots, &filter)).await
        {
            Ok(files) => files,
            Err(e) => {
                warn!("directory scan failed: {e}");
                return Vec::new();
            }
        };
        self.apply(files)
    }

    fn apply(&mut self, files: Vec<(PathBuf, FileState)>) -> Vec<(PathBuf, EventKind)> {
        let mut changes = Vec::new();
        let mut seen = HashMap::with_capacity(files.len());

        for (path, state) in files {
            match self.known.get(&path) {
                None => changes.push((path.clone(), EventKind::Created)),
                Some(previous) if *previous != state => {
                    changes.push((path.clone(), EventKind::Modified));
                }
                Some(_) => {}
            }
            seen.insert(path, state);
        }

        let removed = self.known.keys().filter(|p| !seen.contains_key(*p)).count();
        if removed > 0 {
            debug!(removed, "files disappeared since last scan");
        }
        self.known = seen;
        changes
    }

    /// Runs the watcher on its own task until stopped.
    pub fn spawn(mut self, sink: EventSink) -> WatcherHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(roots = self.roots.len(), interval = ?self.interval, "polling watcher started");

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        for (path, kind) in self.poll().await {
                            if sink.on_event(path, kind) == Dispatch::Closed {
                                debug!("event sink closed, stopping watcher");
                                return;
                            }
                        }
                    }
                }
            }
            info!("polling watcher stopped");
        });
        WatcherHandle { stop: Some(stop_tx), task }
    }
}

pub struct WatcherHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = self.task.await {
            warn!("watcher task ended abnormally: {e}");
        }
    }
}
