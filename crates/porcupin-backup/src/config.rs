use std::time::Duration;

use porcupin_core::constants;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IpfsConfig {
    pub repo_path: String,
    pub pin_timeout_secs: u64,
    pub max_file_size_bytes: u64,
    /// Gateway used for HEAD probes and metadata-JSON fetch-over-gateway.
    /// Not named in the external indexer surface; added because both need
    /// *some* gateway and none is specified upstream.
    pub gateway_url: String,
    /// Local Kubo control-API base.
    pub api_base: String,
}

impl Default for IpfsConfig {
    fn default() -> Self {
        Self {
            repo_path: String::new(),
            pin_timeout_secs: constants::DEFAULT_PIN_TIMEOUT.as_secs(),
            max_file_size_bytes: constants::DEFAULT_MAX_FILE_SIZE_BYTES,
            gateway_url: "https://ipfs.io".to_string(),
            api_base: "http://127.0.0.1:5001".to_string(),
        }
    }
}

impl IpfsConfig {
    pub fn pin_timeout(&self) -> Duration {
        Duration::from_secs(self.pin_timeout_secs)
    }

    /// Per-attempt deadline: the configured pin timeout, clamped to the
    /// hard ceiling.
    pub fn per_attempt_deadline(&self) -> Duration {
        Duration::from_secs(self.pin_timeout_secs.min(constants::MAX_PIN_DEADLINE.as_secs()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub max_concurrency: usize,
    /// `0` means unlimited.
    pub max_storage_gb: u64,
    pub storage_warning_pct: u8,
    pub min_free_disk_space_gb: u64,
    pub sync_owned: bool,
    pub sync_created: bool,
    pub max_retries: i64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            max_concurrency: constants::DEFAULT_MAX_CONCURRENCY,
            max_storage_gb: 0,
            storage_warning_pct: constants::DEFAULT_STORAGE_WARNING_PCT,
            min_free_disk_space_gb: constants::DEFAULT_MIN_FREE_DISK_SPACE_GB,
            sync_owned: true,
            sync_created: true,
            max_retries: constants::DEFAULT_MAX_RETRIES,
        }
    }
}

impl BackupConfig {
    pub fn max_storage_bytes(&self) -> u64 {
        self.max_storage_gb.saturating_mul(1024 * 1024 * 1024)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TzktConfig {
    pub base_url: String,
}

impl Default for TzktConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.tzkt.io".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ipfs: IpfsConfig,
    pub backup: BackupConfig,
    pub tzkt: TzktConfig,
}
