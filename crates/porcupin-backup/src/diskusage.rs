use std::path::Path;

use serde::{Deserialize, Serialize};

/// A point-in-time disk usage reading for the blob store's repo path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskUsageSample {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

impl DiskUsageSample {
    pub fn used_pct(&self) -> u8 {
        if self.total_bytes == 0 {
            return 0;
        }
        ((self.used_bytes as u128 * 100) / self.total_bytes as u128) as u8
    }
}

/// The signal the core requires from a platform-specific disk-usage
/// sampler; the sampler itself (statvfs, `du`, …) is out of scope (§1).
pub trait DiskUsageProbe: Send + Sync {
    fn sample(&self, repo_path: &Path) -> std::io::Result<DiskUsageSample>;
}
