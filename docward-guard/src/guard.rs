//! The protection decision for a single path.

use crate::error::{GuardError, GuardResult};
use crate::policy::{ProtectionPolicy, RegistrationPolicy};
use docward_fingerprint::{Fingerprint, StructuralSignature};
use docward_types::{
    LogNotifier, NewEntry, Notifier, ProtectionEvent, ProtectionOutcome, WarehouseEntry,
};
use docward_warehouse::{PutChange, PutMode, Warehouse, WarehouseError, WarehouseResult};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Called after a document has been stored as a new canonical entry.
///
/// Runs on a worker task; implementations must not block.
pub trait RegistrationHook: Send + Sync {
    fn on_registered(&self, entry: &WarehouseEntry);
}

/// What `protect` did with a path.
#[derive(Debug, Clone, PartialEq)]
pub enum Protection {
    /// Filtered out by name, type or size. Nothing was recorded.
    OutOfScope,
    /// Vanished, locked or unwritable. Nothing was recorded.
    Aborted,
    /// Evaluated and written to the audit log.
    Evaluated(ProtectionEvent),
}

impl Protection {
    /// `OutOfScope` counts as `Ignored`; an aborted path has no outcome.
    #[must_use]
    pub fn outcome(&self) -> Option<ProtectionOutcome> {
        match self {
            Self::OutOfScope => Some(ProtectionOutcome::Ignored),
            Self::Aborted => None,
            Self::Evaluated(event) => Some(event.outcome),
        }
    }

    #[must_use]
    pub fn event(&self) -> Option<&ProtectionEvent> {
        match self {
            Self::Evaluated(event) => Some(event),
            _ => None,
        }
    }
}

/// Compares observed documents against the warehouse and restores them.
pub struct ProtectionLoop {
    pub(crate) warehouse: Arc<Warehouse>,
    pub(crate) policy: ProtectionPolicy,
    notifier: Arc<dyn Notifier>,
    pub(crate) hook: Option<Arc<dyn RegistrationHook>>,
}

impl ProtectionLoop {
    pub fn new(warehouse: Arc<Warehouse>, policy: ProtectionPolicy) -> Self {
        Self {
            warehouse,
            policy,
            notifier: Arc::new(LogNotifier),
            hook: None,
        }
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    #[must_use]
    pub fn with_registration_hook(mut self, hook: Arc<dyn RegistrationHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    #[must_use]
    pub fn policy(&self) -> &ProtectionPolicy {
        &self.policy
    }

    #[must_use]
    pub fn warehouse(&self) -> &Arc<Warehouse> {
        &self.warehouse
    }

    /// Evaluates one path and restores it if it drifted from its canonical
    /// version. Never fails: problems are logged and the event dropped.
    pub async fn protect(&self, path: &Path) -> Protection {
        let started = Instant::now();

        if !self.policy.filter.is_in_scope(path) {
            return Protection::OutOfScope;
        }
        let Some(filename) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            return Protection::OutOfScope;
        };

        let Some(current) = self.read_current(path).await else {
            return Protection::Aborted;
        };
        let Some(current) = current else {
            return Protection::OutOfScope;
        };

        let classified = self.classify(current, filename.clone()).await;
        let (fingerprint, canonical, current) = match classified {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(path = %path.display(), "classification failed, dropping event: {e}");
                return Protection::Aborted;
            }
        };
        let entity_id = fingerprint.entity_id.clone();

        let mut event = match canonical {
            Some(canonical) if canonical.content() == current.as_slice() => {
                debug!(path = %path.display(), "document matches canonical version");
                ProtectionEvent::new(path, entity_id, ProtectionOutcome::Ignored, started.elapsed())
            }
            Some(canonical) => {
                if !self.write_with_retry(path, canonical.content()).await {
                    return Protection::Aborted;
                }
                let elapsed = started.elapsed();
                info!(
                    path = %path.display(),
                    source = %canonical.key(),
                    elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                    "restored canonical document"
                );
                self.notifier.notify(&format!(
                    "Restored {} from canonical entry {} ({})",
                    path.display(),
                    canonical.key(),
                    canonical.display_label
                ));
                ProtectionEvent::new(path, entity_id, ProtectionOutcome::Restored, elapsed)
            }
            None => ProtectionEvent::new(path, entity_id, ProtectionOutcome::NoMatch, started.elapsed()),
        };

        if event.outcome == ProtectionOutcome::NoMatch {
            event.registered = self.handle_unmatched(path, &fingerprint, filename, current).await;
        }

        let audit = self.warehouse.audit().clone();
        let record = event.clone();
        match tokio::task::spawn_blocking(move || audit.record_protection(&record)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(path = %path.display(), "failed to record protection event: {e}"),
            Err(e) => warn!(path = %path.display(), "audit task failed: {e}"),
        }
        Protection::Evaluated(event)
    }

    /// Reads the file. `None` aborts, `Some(None)` means out of scope.
    async fn read_current(&self, path: &Path) -> Option<Option<Vec<u8>>> {
        for attempt in 1..=2 {
            match tokio::fs::metadata(path).await {
                Ok(meta) if !meta.is_file() => return Some(None),
                Ok(meta) if meta.len() > self.policy.max_document_bytes => {
                    debug!(path = %path.display(), size = meta.len(), "document over size limit");
                    return Some(None);
                }
                Ok(_) => match tokio::fs::read(path).await {
                    Ok(bytes) => return Some(Some(bytes)),
                    Err(e) if e.kind() == ErrorKind::NotFound => return None,
                    Err(e) => debug!(path = %path.display(), attempt, "read failed: {e}"),
                },
                Err(e) if e.kind() == ErrorKind::NotFound => return None,
                Err(e) => debug!(path = %path.display(), attempt, "stat failed: {e}"),
            }
            if attempt == 1 {
                tokio::time::sleep(self.policy.retry_delay).await;
            }
        }
        None
    }

    /// Overwrites `path`, retrying once. Returns false if both tries failed.
    async fn write_with_retry(&self, path: &Path, content: &[u8]) -> bool {
        match tokio::fs::write(path, content).await {
            Ok(()) => return true,
            Err(e) => debug!(path = %path.display(), "restore write failed, retrying: {e}"),
        }
        tokio::time::sleep(self.policy.retry_delay).await;
        match tokio::fs::write(path, content).await {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %path.display(), "restore write failed, dropping event: {e}");
                false
            }
        }
    }

    /// Extracts the fingerprint and resolves the canonical entry off the
    /// async runtime. Hands the content back to the caller.
    async fn classify(
        &self,
        content: Vec<u8>,
        filename: String,
    ) -> GuardResult<(Fingerprint, Option<Arc<WarehouseEntry>>, Vec<u8>)> {
        let warehouse = Arc::clone(&self.warehouse);
        let policy = self.policy.clone();
        tokio::task::spawn_blocking(move || {
            let fingerprint = docward_fingerprint::extract(&content);
            let canonical = resolve_canonical(&warehouse, &policy, &fingerprint, &filename, &content);
            (fingerprint, canonical, content)
        })
        .await
        .map_err(|e| GuardError::Task(e.to_string()))
    }

    /// Applies the registration policy to a classified document that matched
    /// nothing. Returns true if it was stored.
    async fn handle_unmatched(
        &self,
        path: &Path,
        fingerprint: &Fingerprint,
        filename: String,
        content: Vec<u8>,
    ) -> bool {
        let Some(entity_id) = fingerprint.entity_id.clone() else {
            debug!(path = %path.display(), "unclassified document, no canonical match");
            return false;
        };
        if self.policy.registration == RegistrationPolicy::Operator {
            info!(
                path = %path.display(),
                entity = %entity_id,
                "unknown document awaiting operator registration"
            );
            return false;
        }

        let new = NewEntry::new(entity_id, filename, fingerprint.display_label.clone(), content);
        match self.put_blocking(new, PutMode::InsertOnly).await {
            Ok(result) if result.change == PutChange::Inserted => {
                info!(path = %path.display(), key = %result.entry.key(), "auto-registered new document");
                if let Some(hook) = &self.hook {
                    hook.on_registered(&result.entry);
                }
                true
            }
            Ok(_) => false,
            Err(GuardError::Warehouse(WarehouseError::DuplicateRejected { .. })) => {
                debug!(path = %path.display(), "entry registered concurrently");
                false
            }
            Err(e) => {
                warn!(path = %path.display(), "auto-registration failed: {e}");
                false
            }
        }
    }

    pub(crate) async fn put_blocking(
        &self,
        new: NewEntry,
        mode: PutMode,
    ) -> GuardResult<docward_warehouse::PutResult> {
        self.blocking(move |warehouse| warehouse.put(new, mode)).await
    }

    pub(crate) async fn blocking<T, F>(&self, f: F) -> GuardResult<T>
    where
        F: FnOnce(&Warehouse) -> WarehouseResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let warehouse = Arc::clone(&self.warehouse);
        tokio::task::spawn_blocking(move || f(&warehouse))
            .await
            .map_err(|e| GuardError::Task(e.to_string()))?
            .map_err(GuardError::from)
    }
}

/// Finds the canonical version of a document.
///
/// 1. the entry with the same entity code and file name;
/// 2. another file of the same entity with a matching structure;
/// 3. a bounded scan over the rest of the mirror, same file name first.
///
/// Steps 2 and 3 compare at the restore threshold.
fn resolve_canonical(
    warehouse: &Warehouse,
    policy: &ProtectionPolicy,
    fingerprint: &Fingerprint,
    filename: &str,
    content: &[u8],
) -> Option<Arc<WarehouseEntry>> {
    let same_entity = fingerprint
        .entity_id
        .as_ref()
        .map(|id| warehouse.get_by_id(id))
        .unwrap_or_default();

    if let Some(exact) = same_entity.iter().find(|e| e.filename == filename) {
        return Some(Arc::clone(exact));
    }

    let target = StructuralSignature::of(content)?;
    let matches = |entry: &Arc<WarehouseEntry>| {
        StructuralSignature::of(entry.content())
            .is_some_and(|sig| target.matches(&sig, policy.restore_threshold))
    };

    if let Some(sibling) = same_entity.iter().find(|e| matches(*e)) {
        return Some(Arc::clone(sibling));
    }

    warehouse
        .mirror()
        .scan_candidates(filename, policy.max_scan_entries)
        .into_iter()
        .filter(|e| fingerprint.entity_id.as_ref() != Some(&e.entity_id))
        .find(|e| matches(e))
}
