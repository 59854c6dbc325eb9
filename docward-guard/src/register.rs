//! Operator registration of canonical documents.

use crate::error::{GuardError, GuardResult};
use crate::guard::ProtectionLoop;
use crate::scan::collect_files;
use docward_fingerprint::StructuralSignature;
use docward_types::{EntryKey, NewEntry, WarehouseEntry};
use docward_warehouse::{PutChange, PutMode, WarehouseError};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Result of registering one file.
#[derive(Debug, Clone)]
pub struct RegistrationReport {
    pub path: PathBuf,
    pub entry: WarehouseEntry,
    pub change: PutChange,
    /// Closest other entry sharing the document's template, if any.
    pub same_template_as: Option<EntryKey>,
}

/// Result of registering a directory tree.
#[derive(Debug, Default)]
pub struct DirectoryReport {
    pub registered: Vec<RegistrationReport>,
    pub skipped: Vec<(PathBuf, GuardError)>,
}

impl ProtectionLoop {
    /// Stores `path` as the canonical version of its document.
    ///
    /// `Upsert` replaces an existing entry; `InsertOnly` leaves it alone and
    /// fails with `DuplicateRejected`.
    pub async fn register_file(
        &self,
        path: &Path,
        mode: PutMode,
    ) -> GuardResult<RegistrationReport> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| GuardError::InvalidPath {
                path: path.to_path_buf(),
            })?;

        let size = tokio::fs::metadata(path).await?.len();
        let limit = self.policy.max_document_bytes;
        if size > limit {
            return Err(GuardError::TooLarge {
                path: path.to_path_buf(),
                size,
                limit,
            });
        }
        let content = tokio::fs::read(path).await?;

        let threshold = self.policy.template_threshold;
        let scan_limit = self.policy.max_scan_entries;
        let owned_path = path.to_path_buf();
        let (new, same_template_as) = tokio::task::spawn_blocking({
            let warehouse = std::sync::Arc::clone(&self.warehouse);
            move || -> GuardResult<_> {
                let fingerprint = docward_fingerprint::extract(&content);
                let entity_id = fingerprint
                    .entity_id
                    .ok_or(GuardError::Unclassified { path: owned_path })?;
                let new = NewEntry::new(entity_id, filename, fingerprint.display_label, content);
                let key = new.key();
                let same_template_as = StructuralSignature::of(&new.content).and_then(|target| {
                    warehouse
                        .mirror()
                        .scan_candidates(&key.filename, scan_limit)
                        .into_iter()
                        .filter(|e| e.key() != key)
                        .filter_map(|e| {
                            let score = StructuralSignature::of(e.content())?.jaccard(&target);
                            (score > threshold).then(|| (score, e.key()))
                        })
                        .max_by(|a, b| a.0.total_cmp(&b.0))
                        .map(|(_, key)| key)
                });
                Ok((new, same_template_as))
            }
        })
        .await
        .map_err(|e| GuardError::Task(e.to_string()))??;

        let result = self.put_blocking(new, mode).await?;
        if result.change != PutChange::Unchanged {
            if let Some(hook) = &self.hook {
                hook.on_registered(&result.entry);
            }
        }
        info!(
            path = %path.display(),
            key = %result.entry.key(),
            change = ?result.change,
            template = ?same_template_as.as_ref().map(ToString::to_string),
            "registered document"
        );

        Ok(RegistrationReport {
            path: path.to_path_buf(),
            entry: result.entry,
            change: result.change,
            same_template_as,
        })
    }

    /// Registers every in-scope file under `dir`. Failures are collected,
    /// not propagated.
    pub async fn register_dir(&self, dir: &Path, mode: PutMode) -> GuardResult<DirectoryReport> {
        let roots = vec![dir.to_path_buf()];
        let filter = self.policy.filter.clone();
        let files = tokio::task::spawn_blocking(move || collect_files(&roots, &filter))
            .await
            .map_err(|e| GuardError::Task(e.to_string()))?;

        let mut report = DirectoryReport::default();
        for (path, _) in files {
            match self.register_file(&path, mode).await {
                Ok(registered) => report.registered.push(registered),
                Err(e @ GuardError::Warehouse(WarehouseError::DuplicateRejected { .. })) => {
                    debug!(path = %path.display(), "already registered: {e}");
                    report.skipped.push((path, e));
                }
                Err(e) => {
                    warn!(path = %path.display(), "skipping document: {e}");
                    report.skipped.push((path, e));
                }
            }
        }
        info!(
            dir = %dir.display(),
            registered = report.registered.len(),
            skipped = report.skipped.len(),
            "directory registration finished"
        );
        Ok(report)
    }
}
