use std::time::Duration;

use async_trait::async_trait;
use porcupin_core::PorcupinError;

/// The small contract the backup engine requires of the content-addressed
/// node. Implementations are presumed concurrent-safe; the caller (the pin
/// manager) is responsible for the per-attempt deadline and retry policy
/// around `pin`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Recursively pin `cid`, aborting if `deadline` elapses first.
    async fn pin(&self, cid: &str, deadline: Duration) -> Result<(), PorcupinError>;

    async fn unpin(&self, cid: &str) -> Result<(), PorcupinError>;

    /// Cumulative size in bytes of the object behind `cid`.
    async fn stat(&self, cid: &str) -> Result<u64, PorcupinError>;

    async fn is_pinned(&self, cid: &str) -> Result<bool, PorcupinError>;

    /// Unpin everything the node currently holds, calling `progress` once
    /// per item as it completes. Returns the count unpinned so far even if
    /// an error cut the sweep short.
    async fn unpin_all(
        &self,
        progress: &(dyn Fn(u64) + Send + Sync),
    ) -> (u64, Option<PorcupinError>);

    async fn garbage_collect(&self) -> Result<(), PorcupinError>;

    fn repo_path(&self) -> &str;
}
