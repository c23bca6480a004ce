use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A blockchain address the daemon watches for new or acquired tokens.
///
/// Mutated only by the synchronizer (the cursor) and by the external
/// management path (alias, sync flags); callers must tolerate an account
/// disappearing between the start and end of a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub address: String,
    pub alias: Option<String>,
    pub sync_owned: bool,
    pub sync_created: bool,
    /// Greatest indexer head level this account has been synchronized
    /// through. `0` means never synced.
    pub last_synced_level: i64,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl Account {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            alias: None,
            sync_owned: true,
            sync_created: true,
            last_synced_level: 0,
            last_synced_at: None,
        }
    }
}

/// A unique `(contract, token_id)` pair discovered through some account.
///
/// `wallet_address` records discovery provenance only — it is not
/// re-derived when the same token is later observed through a different
/// account, and must never be treated as an ownership signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: i64,
    pub contract: String,
    pub token_id: String,
    pub wallet_address: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub creator: Option<String>,
    pub artifact_uri: Option<String>,
    pub display_uri: Option<String>,
    pub thumbnail_uri: Option<String>,
    pub raw_metadata: Option<String>,
}

/// The role a pinned asset plays for its owning token — drives the fixed
/// order assets are enumerated and queued in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetRole {
    Artifact,
    Display,
    Thumbnail,
    Format,
    Metadata,
}

impl AssetRole {
    pub fn as_str(self) -> &'static str {
        match self {
            AssetRole::Artifact => "artifact",
            AssetRole::Display => "display",
            AssetRole::Thumbnail => "thumbnail",
            AssetRole::Format => "format",
            AssetRole::Metadata => "metadata",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "artifact" => AssetRole::Artifact,
            "display" => AssetRole::Display,
            "thumbnail" => AssetRole::Thumbnail,
            "format" => AssetRole::Format,
            "metadata" => AssetRole::Metadata,
            _ => return None,
        })
    }
}

/// Lifecycle state of a `PinIntent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinStatus {
    Pending,
    Pinned,
    Failed,
    FailedUnavailable,
}

impl PinStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PinStatus::Pending => "pending",
            PinStatus::Pinned => "pinned",
            PinStatus::Failed => "failed",
            PinStatus::FailedUnavailable => "failed_unavailable",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => PinStatus::Pending,
            "pinned" => PinStatus::Pinned,
            "failed" => PinStatus::Failed,
            "failed_unavailable" => PinStatus::FailedUnavailable,
            _ => return None,
        })
    }

    /// `true` for the two failure states a scanner may bring back to `pending`.
    pub fn is_retriable_failure(self) -> bool {
        matches!(self, PinStatus::Failed | PinStatus::FailedUnavailable)
    }
}

/// The core's record that a URI should be preserved; carries its lifecycle
/// status. `uri` is unique across the entire store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinIntent {
    pub id: i64,
    pub uri: String,
    pub token_id: i64,
    pub role: AssetRole,
    pub mime_type: Option<String>,
    pub size_bytes: Option<i64>,
    pub status: PinStatus,
    pub retry_count: i64,
    pub error_msg: Option<String>,
    pub pinned_at: Option<DateTime<Utc>>,
}

impl PinIntent {
    /// A `pinned` intent always carries a size and a pin timestamp.
    pub fn invariant_pinned_implies_sized(&self) -> bool {
        if self.status != PinStatus::Pinned {
            return true;
        }
        self.pinned_at.is_some() && self.size_bytes.unwrap_or(0) > 0
    }

    /// A failure state always carries a non-empty reason.
    pub fn invariant_failed_implies_error_msg(&self) -> bool {
        if !self.status.is_retriable_failure() {
            return true;
        }
        self.error_msg.as_deref().is_some_and(|m| !m.is_empty())
    }
}

/// A small key/value bag for process-wide state such as the cached disk
/// usage sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
}
