use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

/// Orchestrator lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Starting,
    Syncing,
    Watching,
    Paused,
    Stopped,
}

impl EngineState {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineState::Starting => "starting",
            EngineState::Syncing => "syncing",
            EngineState::Watching => "watching",
            EngineState::Paused => "paused",
            EngineState::Stopped => "stopped",
        }
    }
}

/// A point-in-time snapshot of progress, safe to hand to any observer.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub state: &'static str,
    pub message: String,
    pub paused: bool,
    pub current_account: Option<String>,
    pub current_item: Option<String>,
    pub processed_nfts: u64,
    pub total_nfts: u64,
    pub pinned_assets: u64,
    pub failed_assets: u64,
    pub already_pinned: u64,
    pub total_assets: u64,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub pending_retries: u64,
}

/// Shared, atomics-backed counters updated throughout a cycle, plus the
/// single critical section (`message`/`current_*`) any consumer reads a
/// coherent snapshot of.
pub struct ProgressCounters {
    processed_nfts: AtomicU64,
    total_nfts: AtomicU64,
    pinned_assets: AtomicU64,
    failed_assets: AtomicU64,
    already_pinned: AtomicU64,
    total_assets: AtomicU64,
    pending_retries: AtomicU64,
    inner: RwLock<Inner>,
}

struct Inner {
    state: EngineState,
    message: String,
    paused: bool,
    current_account: Option<String>,
    current_item: Option<String>,
    last_sync_at: Option<DateTime<Utc>>,
}

impl ProgressCounters {
    pub fn new() -> Self {
        Self {
            processed_nfts: AtomicU64::new(0),
            total_nfts: AtomicU64::new(0),
            pinned_assets: AtomicU64::new(0),
            failed_assets: AtomicU64::new(0),
            already_pinned: AtomicU64::new(0),
            total_assets: AtomicU64::new(0),
            pending_retries: AtomicU64::new(0),
            inner: RwLock::new(Inner {
                state: EngineState::Starting,
                message: "starting".to_string(),
                paused: false,
                current_account: None,
                current_item: None,
                last_sync_at: None,
            }),
        }
    }

    pub fn set_state(&self, state: EngineState, message: impl Into<String>) {
        let mut inner = self.inner.write().unwrap();
        inner.state = state;
        inner.message = message.into();
    }

    pub fn set_paused(&self, paused: bool) {
        self.inner.write().unwrap().paused = paused;
    }

    pub fn set_current(&self, account: Option<String>, item: Option<String>) {
        let mut inner = self.inner.write().unwrap();
        inner.current_account = account;
        inner.current_item = item;
    }

    pub fn set_last_sync_at(&self, ts: DateTime<Utc>) {
        self.inner.write().unwrap().last_sync_at = Some(ts);
    }

    pub fn set_pending_retries(&self, count: u64) {
        self.pending_retries.store(count, Ordering::Relaxed);
    }

    pub fn reset_cycle_counters(&self) {
        self.processed_nfts.store(0, Ordering::Relaxed);
        self.total_nfts.store(0, Ordering::Relaxed);
        self.pinned_assets.store(0, Ordering::Relaxed);
        self.failed_assets.store(0, Ordering::Relaxed);
        self.already_pinned.store(0, Ordering::Relaxed);
        self.total_assets.store(0, Ordering::Relaxed);
    }

    pub fn incr_processed_nfts(&self) {
        self.processed_nfts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_total_nfts(&self, n: u64) {
        self.total_nfts.fetch_add(n, Ordering::Relaxed);
    }

    pub fn incr_pinned_assets(&self) {
        self.pinned_assets.fetch_add(1, Ordering::Relaxed);
        self.total_assets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_failed_assets(&self) {
        self.failed_assets.fetch_add(1, Ordering::Relaxed);
        self.total_assets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_already_pinned(&self) {
        self.already_pinned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let inner = self.inner.read().unwrap();
        StatusSnapshot {
            state: inner.state.as_str(),
            message: inner.message.clone(),
            paused: inner.paused,
            current_account: inner.current_account.clone(),
            current_item: inner.current_item.clone(),
            processed_nfts: self.processed_nfts.load(Ordering::Relaxed),
            total_nfts: self.total_nfts.load(Ordering::Relaxed),
            pinned_assets: self.pinned_assets.load(Ordering::Relaxed),
            failed_assets: self.failed_assets.load(Ordering::Relaxed),
            already_pinned: self.already_pinned.load(Ordering::Relaxed),
            total_assets: self.total_assets.load(Ordering::Relaxed),
            last_sync_at: inner.last_sync_at,
            pending_retries: self.pending_retries.load(Ordering::Relaxed),
        }
    }
}

impl Default for ProgressCounters {
    fn default() -> Self {
        Self::new()
    }
}
