//! Tunables of the protection loop.

use docward_fingerprint::{RESTORE_THRESHOLD, TEMPLATE_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;

/// What to do with a classified document that matches nothing stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationPolicy {
    /// Store it as the canonical version (insert-only).
    Auto,
    /// Record `NoMatch` and leave it to the operator.
    Operator,
}

/// Cheap name-based decision of whether a path is worth reading.
///
/// A file is in scope when no path component is an excluded directory, its
/// extension is listed, and, if any name rules are configured, its
/// lowercased name starts with a prefix or contains a keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameFilter {
    pub extensions: Vec<String>,
    pub name_prefixes: Vec<String>,
    pub name_keywords: Vec<String>,
    pub excluded_dirs: Vec<String>,
}

impl Default for FilenameFilter {
    fn default() -> Self {
        Self {
            extensions: vec!["xml".into()],
            name_prefixes: vec!["etax".into()],
            name_keywords: vec!["xml".into(), "tax".into(), "thue".into(), "vat".into()],
            excluded_dirs: Vec::new(),
        }
    }
}

impl FilenameFilter {
    #[must_use]
    pub fn is_in_scope(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(OsStr::to_str) else {
            return false;
        };
        if self.is_excluded(path) {
            return false;
        }

        let extension_ok = path
            .extension()
            .and_then(OsStr::to_str)
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)));
        if !extension_ok {
            return false;
        }

        if self.name_prefixes.is_empty() && self.name_keywords.is_empty() {
            return true;
        }
        let name = name.to_lowercase();
        self.name_prefixes.iter().any(|p| name.starts_with(p.as_str()))
            || self.name_keywords.iter().any(|k| name.contains(k.as_str()))
    }

    /// True if any directory component of `path` is excluded.
    #[must_use]
    pub fn is_excluded(&self, path: &Path) -> bool {
        if self.excluded_dirs.is_empty() {
            return false;
        }
        path.parent().is_some_and(|dir| {
            dir.components().any(|c| {
                let c = c.as_os_str();
                self.excluded_dirs.iter().any(|ex| OsStr::new(ex) == c)
            })
        })
    }
}

/// Everything that varies between deployments of the loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtectionPolicy {
    pub filter: FilenameFilter,
    /// Structural match needed to restore from another entry.
    pub restore_threshold: f64,
    /// Structural match reported as "same template" at registration.
    pub template_threshold: f64,
    pub registration: RegistrationPolicy,
    pub max_concurrency: usize,
    pub queue_capacity: usize,
    /// Pause before the single retry of a failed read or write.
    pub retry_delay: Duration,
    /// Most entries examined by one structural scan.
    pub max_scan_entries: usize,
    pub max_document_bytes: u64,
}

impl ProtectionPolicy {
    /// Defaults for everything except the registration policy, which has
    /// no safe default.
    #[must_use]
    pub fn new(registration: RegistrationPolicy) -> Self {
        Self {
            filter: FilenameFilter::default(),
            restore_threshold: RESTORE_THRESHOLD,
            template_threshold: TEMPLATE_THRESHOLD,
            registration,
            max_concurrency: 10,
            queue_capacity: 1024,
            retry_delay: Duration::from_millis(250),
            max_scan_entries: 10_000,
            max_document_bytes: 16 * 1024 * 1024,
        }
    }
}
