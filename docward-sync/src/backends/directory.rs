use crate::backend::RemoteBackend;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Mirrors documents into a local or mounted folder as
/// `<root>/<entity_id>/<filename>`.
#[derive(Debug, Clone)]
pub struct DirectoryBackend {
    name: String,
    root: PathBuf,
}

impl DirectoryBackend {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn target(&self, locator_hint: &str) -> SyncResult<PathBuf> {
        let relative = Path::new(locator_hint);
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(SyncError::Backend(format!("invalid locator hint: {locator_hint}")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl RemoteBackend for DirectoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn check_config(&self) -> SyncResult<()> {
        if self.root.as_os_str().is_empty() {
            return Err(SyncError::Config(format!("{}: no target directory set", self.name)));
        }
        Ok(())
    }

    async fn upload(&self, locator_hint: &str, content: &[u8]) -> SyncResult<String> {
        let target = self.target(locator_hint)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::Backend(format!("failed to create {}: {e}", parent.display())))?;
        }

        let mut partial = target.clone().into_os_string();
        partial.push(".partial");
        let partial = PathBuf::from(partial);
        tokio::fs::write(&partial, content)
            .await
            .map_err(|e| SyncError::Backend(format!("failed to write {}: {e}", partial.display())))?;
        tokio::fs::rename(&partial, &target)
            .await
            .map_err(|e| SyncError::Backend(format!("failed to move {}: {e}", target.display())))?;

        debug!(target = %target.display(), bytes = content.len(), "mirrored document");
        Ok(format!("file://{}", target.display()))
    }
}
