//! Bounded worker pool in front of [`ProtectionLoop::protect`].
//!
//! The watcher hands paths to an [`EventSink`], which only filters and
//! enqueues. `max_concurrency` workers pull from the shared queue. A path
//! that is already queued is not queued twice.

use crate::guard::ProtectionLoop;
use crate::policy::FilenameFilter;
use dashmap::DashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Filesystem change kinds delivered by a watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Created,
    Modified,
    Moved,
}

/// What happened to an event handed to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Queued,
    /// Same path already waiting in the queue.
    Coalesced,
    /// Rejected by the filename filter.
    Filtered,
    /// Queue full; the event was dropped.
    Dropped,
    /// The pool is shutting down.
    Closed,
}

/// Non-blocking entry point for watchers. Cheap to clone.
#[derive(Clone)]
pub struct EventSink {
    queue: Arc<Mutex<Option<mpsc::Sender<PathBuf>>>>,
    pending: Arc<DashSet<PathBuf>>,
    filter: Arc<FilenameFilter>,
}

impl EventSink {
    /// Never blocks on the workers.
    pub fn on_event(&self, path: PathBuf, kind: EventKind) -> Dispatch {
        if !self.filter.is_in_scope(&path) {
            trace!(path = %path.display(), ?kind, "event filtered");
            return Dispatch::Filtered;
        }
        if !self.pending.insert(path.clone()) {
            trace!(path = %path.display(), ?kind, "event coalesced");
            return Dispatch::Coalesced;
        }

        let queue = self.queue.lock().unwrap();
        let Some(sender) = queue.as_ref() else {
            self.pending.remove(&path);
            return Dispatch::Closed;
        };
        match sender.try_send(path) {
            Ok(()) => Dispatch::Queued,
            Err(TrySendError::Full(path)) => {
                self.pending.remove(&path);
                warn!(path = %path.display(), ?kind, "protection queue full, dropping event");
                Dispatch::Dropped
            }
            Err(TrySendError::Closed(path)) => {
                self.pending.remove(&path);
                Dispatch::Closed
            }
        }
    }

    /// Number of paths queued and not yet picked up.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn close(&self) {
        self.queue.lock().unwrap().take();
    }
}

/// Running worker pool.
pub struct GuardHandle {
    sink: EventSink,
    workers: Vec<JoinHandle<()>>,
}

impl GuardHandle {
    #[must_use]
    pub fn sink(&self) -> EventSink {
        self.sink.clone()
    }

    /// Stops accepting events and waits until every queued and in-flight
    /// path has been handled.
    pub async fn shutdown(self) {
        self.sink.close();
        for worker in self.workers {
            if let Err(e) = worker.await {
                warn!("protection worker ended abnormally: {e}");
            }
        }
        info!("protection workers drained");
    }
}

impl ProtectionLoop {
    /// Starts the worker pool. Must be called inside a tokio runtime.
    pub fn spawn(self: Arc<Self>) -> GuardHandle {
        let capacity = self.policy.queue_capacity.max(1);
        let concurrency = self.policy.max_concurrency.max(1);
        let (tx, rx) = mpsc::channel::<PathBuf>(capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let pending = Arc::new(DashSet::new());

        let workers = (0..concurrency)
            .map(|worker| {
                let guard = Arc::clone(&self);
                let rx = Arc::clone(&rx);
                let pending = Arc::clone(&pending);
                tokio::spawn(async move {
                    loop {
                        let next = rx.lock().await.recv().await;
                        let Some(path) = next else {
                            break;
                        };
                        pending.remove(&path);
                        let result = guard.protect(&path).await;
                        debug!(worker, path = %path.display(), outcome = ?result.outcome(), "event handled");
                    }
                })
            })
            .collect();

        info!(workers = concurrency, queue = capacity, "protection workers started");
        GuardHandle {
            sink: EventSink {
                queue: Arc::new(Mutex::new(Some(tx))),
                pending,
                filter: Arc::new(self.policy.filter.clone()),
            },
            workers,
        }
    }
}
