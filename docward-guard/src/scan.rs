use crate::policy::FilenameFilter;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// Modification time and size of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FileState {
    pub modified: Option<SystemTime>,
    pub size: u64,
}

/// Recursively lists in-scope files under `roots`. Unreadable directories
/// are skipped. Blocking.
pub(crate) fn collect_files(roots: &[PathBuf], filter: &FilenameFilter) -> Vec<(PathBuf, FileState)> {
    let mut found = Vec::new();
    let mut stack: Vec<PathBuf> = roots.to_vec();

    while let Some(dir) = stack.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %dir.display(), "skipping unreadable directory: {e}");
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if meta.is_dir() {
                if !is_excluded_dir(&path, filter) {
                    stack.push(path);
                }
            } else if meta.is_file() && filter.is_in_scope(&path) {
                found.push((
                    path,
                    FileState {
                        modified: meta.modified().ok(),
                        size: meta.len(),
                    },
                ));
            }
        }
    }
    found.sort_by(|a, b| a.0.cmp(&b.0));
    found
}

fn is_excluded_dir(dir: &Path, filter: &FilenameFilter) -> bool {
    dir.file_name()
        .is_some_and(|name| filter.excluded_dirs.iter().any(|ex| name == ex.as_str()))
}
