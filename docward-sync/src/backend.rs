//! Remote backend interface.

use crate::error::SyncResult;
use async_trait::async_trait;
use docward_types::WarehouseEntry;

/// A place canonical documents are copied to.
///
/// The engine only ever calls [`upload`](RemoteBackend::upload); the other
/// methods let it skip work that cannot succeed.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Short name recorded in sync attempts.
    fn name(&self) -> &str;

    /// Fails with `SyncError::Config` if the backend cannot work at all.
    fn check_config(&self) -> SyncResult<()> {
        Ok(())
    }

    /// Whether this backend stores `entry`. Defaults to everything.
    fn accepts(&self, _entry: &WarehouseEntry) -> bool {
        true
    }

    /// Stores `content` under `locator_hint` (`<entity_id>/<filename>`) and
    /// returns where it ended up.
    async fn upload(&self, locator_hint: &str, content: &[u8]) -> SyncResult<String>;
}
