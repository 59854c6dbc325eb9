//! Batch upload of pending warehouse entries.

use crate::backend::RemoteBackend;
use crate::error::{SyncError, SyncResult};
use docward_types::{
    ContentHash, EntryKey, LogNotifier, Notifier, SyncAttempt, SyncAttemptStatus, SyncScope, WarehouseEntry,
};
use docward_warehouse::{Warehouse, WarehouseError, WarehouseResult};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Most failures listed in an attempt's `detail`.
const MAX_DETAIL_ITEMS: usize = 5;

/// Per-item retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Pause before attempt `attempt` (1-based): nothing before the first,
    /// then `base_delay` doubling each time, capped at `max_delay`.
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 2);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Upload outcome of one backend over one batch.
#[derive(Default)]
struct Tally {
    attempted: usize,
    succeeded: usize,
    errors: Vec<String>,
}

impl Tally {
    fn detail(&self) -> Option<String> {
        if self.errors.is_empty() {
            return None;
        }
        let mut detail = self.errors[..self.errors.len().min(MAX_DETAIL_ITEMS)].join("; ");
        if self.errors.len() > MAX_DETAIL_ITEMS {
            detail.push_str(&format!("; and {} more", self.errors.len() - MAX_DETAIL_ITEMS));
        }
        Some(detail)
    }
}

/// Pushes pending entries to every configured backend.
pub struct SyncEngine {
    warehouse: Arc<Warehouse>,
    backends: Vec<Arc<dyn RemoteBackend>>,
    retry: RetryPolicy,
    call_timeout: Duration,
    notifier: Arc<dyn Notifier>,
    run_lock: Mutex<()>,
}

impl SyncEngine {
    pub fn new(warehouse: Arc<Warehouse>, backends: Vec<Arc<dyn RemoteBackend>>) -> Self {
        Self {
            warehouse,
            backends,
            retry: RetryPolicy::default(),
            call_timeout: Duration::from_secs(30),
            notifier: Arc::new(LogNotifier),
            run_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    #[must_use]
    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    #[must_use]
    pub fn warehouse(&self) -> &Arc<Warehouse> {
        &self.warehouse
    }

    /// Uploads every pending entry in `scope` and returns one attempt per
    /// backend. Runs never overlap.
    ///
    /// A misconfigured backend yields a single `Failed` attempt; the entries
    /// it would have taken stay `Pending`. A backend that rejects its
    /// credentials mid-run is treated the same and gets no further uploads. An entry is
    /// marked `Synced` once every backend that accepts it has it, and
    /// `Failed` as soon as one of them gives up.
    pub async fn sync(&self, scope: &SyncScope) -> SyncResult<Vec<SyncAttempt>> {
        let _run = self.run_lock.lock().await;
        let started = Instant::now();

        let entries = {
            let scope = scope.clone();
            self.blocking(move |w| w.list_pending(&scope)).await?
        };
        if self.backends.is_empty() {
            debug!(%scope, pending = entries.len(), "no sync backends configured");
            return Ok(Vec::new());
        }

        let mut config_errors: Vec<Option<String>> = self
            .backends
            .iter()
            .map(|b| b.check_config().err().map(|e| e.to_string()))
            .collect();
        let mut tallies: Vec<Tally> = self.backends.iter().map(|_| Tally::default()).collect();

        for entry in &entries {
            self.sync_entry(entry, &mut config_errors, &mut tallies).await;
        }

        let duration = started.elapsed();
        let mut attempts = Vec::with_capacity(self.backends.len());
        for ((backend, config_error), tally) in
            self.backends.iter().zip(&config_errors).zip(&tallies)
        {
            let attempt = match config_error {
                Some(e) => {
                    let accepted = entries.iter().filter(|entry| backend.accepts(entry)).count();
                    warn!(backend = backend.name(), "sync skipped: {e}");
                    SyncAttempt::config_failure(scope, backend.name(), accepted, e.as_str())
                }
                None => {
                    let attempt = SyncAttempt::new(
                        scope,
                        backend.name(),
                        tally.attempted,
                        tally.succeeded,
                        duration,
                    );
                    match tally.detail() {
                        Some(detail) => attempt.with_detail(detail),
                        None => attempt,
                    }
                }
            };
            self.finish_attempt(&attempt).await;
            attempts.push(attempt);
        }
        Ok(attempts)
    }

    async fn sync_entry(
        &self,
        entry: &WarehouseEntry,
        config_errors: &mut [Option<String>],
        tallies: &mut [Tally],
    ) {
        let key = entry.key();
        let hint = key.locator_hint();
        let mut locator: Option<String> = None;
        let mut failure: Option<String> = None;
        let mut blocked = false;

        for ((backend, config_error), tally) in
            self.backends.iter().zip(config_errors.iter_mut()).zip(tallies.iter_mut())
        {
            if !backend.accepts(entry) {
                continue;
            }
            if config_error.is_some() {
                blocked = true;
                continue;
            }
            tally.attempted += 1;
            match self.upload_with_retry(backend.as_ref(), &hint, entry.content()).await {
                Ok(remote) => {
                    tally.succeeded += 1;
                    locator.get_or_insert(remote);
                }
                Err(SyncError::Config(reason)) => {
                    warn!(
                        backend = backend.name(),
                        key = %key,
                        "backend rejected its configuration: {reason}"
                    );
                    *config_error = Some(SyncError::Config(reason).to_string());
                    blocked = true;
                }
                Err(e) => {
                    warn!(backend = backend.name(), key = %key, "upload failed: {e}");
                    tally.errors.push(format!("{hint}: {e}"));
                    failure.get_or_insert_with(|| format!("{}: {e}", backend.name()));
                }
            }
        }

        let uploaded = entry.content_hash().clone();
        let marked = match (failure, locator) {
            (Some(reason), _) => self.mark(key.clone(), uploaded, Err(reason)).await,
            (None, _) if blocked => return,
            (None, Some(remote)) => self.mark(key.clone(), uploaded, Ok(remote)).await,
            (None, None) => {
                debug!(%key, "no backend accepts entry");
                return;
            }
        };
        match marked {
            Ok(()) => {}
            Err(SyncError::Storage(WarehouseError::NotFound(_))) => {
                debug!(%key, "entry removed during sync");
            }
            Err(e) => warn!(%key, "failed to update sync status: {e}"),
        }
    }

    /// Calls `upload` until it succeeds, fails for good, or runs out of
    /// attempts. Each call is bounded by the call timeout.
    async fn upload_with_retry(
        &self,
        backend: &dyn RemoteBackend,
        hint: &str,
        content: &[u8],
    ) -> SyncResult<String> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let delay = self.retry.delay_before(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let result = match tokio::time::timeout(self.call_timeout, backend.upload(hint, content))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(SyncError::Timeout),
            };
            match result {
                Ok(remote) => return Ok(remote),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    debug!(backend = backend.name(), hint, attempt, "upload failed, retrying: {e}");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Records the outcome for one entry. `Ok` carries the remote locator,
    /// `Err` the failure reason. Ignored by the warehouse when the stored
    /// content no longer hashes to `uploaded`.
    async fn mark(
        &self,
        key: EntryKey,
        uploaded: ContentHash,
        outcome: Result<String, String>,
    ) -> SyncResult<()> {
        self.blocking(move |w| match outcome {
            Ok(remote) => w.mark_synced(&key, &uploaded, &remote).map(|_| ()),
            Err(reason) => w.mark_failed(&key, &uploaded, &reason).map(|_| ()),
        })
        .await
    }

    async fn finish_attempt(&self, attempt: &SyncAttempt) {
        info!(
            backend = %attempt.backend,
            scope = %attempt.entry_ref,
            status = %attempt.status,
            attempted = attempt.files_attempted,
            succeeded = attempt.files_succeeded,
            duration_ms = attempt.duration.as_millis() as u64,
            "sync attempt finished"
        );
        if attempt.status != SyncAttemptStatus::Success {
            self.notifier.notify(&format!(
                "Sync to {} {}: {}/{} files uploaded{}",
                attempt.backend,
                attempt.status,
                attempt.files_succeeded,
                attempt.files_attempted,
                attempt
                    .detail
                    .as_deref()
                    .map(|d| format!(" ({d})"))
                    .unwrap_or_default()
            ));
        }

        let record = attempt.clone();
        if let Err(e) = self
            .blocking(move |w| w.audit().record_sync_attempt(&record))
            .await
        {
            warn!(backend = %attempt.backend, "failed to record sync attempt: {e}");
        }
    }

    async fn blocking<T, F>(&self, f: F) -> SyncResult<T>
    where
        F: FnOnce(&Warehouse) -> WarehouseResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let warehouse = Arc::clone(&self.warehouse);
        tokio::task::spawn_blocking(move || f(&warehouse))
            .await
            .map_err(|e| SyncError::Storage(WarehouseError::Storage(format!("task failed: {e}"))))?
            .map_err(SyncError::from)
    }
}
