use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use porcupin_core::PorcupinError;

use crate::store::BlobStore;

struct State {
    pinned: HashMap<String, u64>,
}

/// In-memory `BlobStore` double for exercising the pin manager and
/// synchronizer without a real Kubo daemon.
///
/// `fail_cids` simulates a generic non-deadline failure; `deadline_cids`
/// simulates the deadline-class failure the retry classifier must detect.
/// Both are checked before `pin` ever touches `pinned`, so a cid can be
/// made to fail deterministically across every attempt.
pub struct MemoryBlobStore {
    state: Mutex<State>,
    default_size: u64,
    fail_cids: HashSet<String>,
    deadline_cids: HashSet<String>,
    repo_path: String,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                pinned: HashMap::new(),
            }),
            default_size: 1024,
            fail_cids: HashSet::new(),
            deadline_cids: HashSet::new(),
            repo_path: "/tmp/porcupin-test-repo".to_string(),
        }
    }

    pub fn with_default_size(mut self, size: u64) -> Self {
        self.default_size = size;
        self
    }

    pub fn with_failing_cid(mut self, cid: impl Into<String>) -> Self {
        self.fail_cids.insert(cid.into());
        self
    }

    pub fn with_deadline_cid(mut self, cid: impl Into<String>) -> Self {
        self.deadline_cids.insert(cid.into());
        self
    }

    pub fn pinned_cids(&self) -> Vec<String> {
        self.state.lock().unwrap().pinned.keys().cloned().collect()
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn pin(&self, cid: &str, _deadline: Duration) -> Result<(), PorcupinError> {
        if self.deadline_cids.contains(cid) {
            return Err(PorcupinError::Deadline);
        }
        if self.fail_cids.contains(cid) {
            return Err(PorcupinError::Network("simulated pin failure".into()));
        }
        self.state
            .lock()
            .unwrap()
            .pinned
            .insert(cid.to_string(), self.default_size);
        Ok(())
    }

    async fn unpin(&self, cid: &str) -> Result<(), PorcupinError> {
        self.state.lock().unwrap().pinned.remove(cid);
        Ok(())
    }

    async fn stat(&self, cid: &str) -> Result<u64, PorcupinError> {
        self.state
            .lock()
            .unwrap()
            .pinned
            .get(cid)
            .copied()
            .ok_or_else(|| PorcupinError::NotFound(cid.to_string()))
    }

    async fn is_pinned(&self, cid: &str) -> Result<bool, PorcupinError> {
        Ok(self.state.lock().unwrap().pinned.contains_key(cid))
    }

    async fn unpin_all(
        &self,
        progress: &(dyn Fn(u64) + Send + Sync),
    ) -> (u64, Option<PorcupinError>) {
        let cids: Vec<String> = self.pinned_cids();
        let mut count = 0u64;
        for cid in cids {
            self.state.lock().unwrap().pinned.remove(&cid);
            count += 1;
            progress(count);
        }
        (count, None)
    }

    async fn garbage_collect(&self) -> Result<(), PorcupinError> {
        Ok(())
    }

    fn repo_path(&self) -> &str {
        &self.repo_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pin_then_stat_then_unpin() {
        let store = MemoryBlobStore::new().with_default_size(2048);
        store.pin("bafyabc", Duration::from_secs(1)).await.unwrap();
        assert!(store.is_pinned("bafyabc").await.unwrap());
        assert_eq!(store.stat("bafyabc").await.unwrap(), 2048);
        store.unpin("bafyabc").await.unwrap();
        assert!(!store.is_pinned("bafyabc").await.unwrap());
    }

    #[tokio::test]
    async fn deadline_cid_reports_deadline_error() {
        let store = MemoryBlobStore::new().with_deadline_cid("bafyslow");
        let err = store.pin("bafyslow", Duration::from_secs(1)).await.unwrap_err();
        assert!(err.is_deadline());
    }

    #[tokio::test]
    async fn failing_cid_reports_non_deadline_error() {
        let store = MemoryBlobStore::new().with_failing_cid("bafybad");
        let err = store.pin("bafybad", Duration::from_secs(1)).await.unwrap_err();
        assert!(!err.is_deadline());
    }

    #[tokio::test]
    async fn unpin_all_drains_everything_and_reports_progress() {
        let store = MemoryBlobStore::new();
        store.pin("a", Duration::from_secs(1)).await.unwrap();
        store.pin("b", Duration::from_secs(1)).await.unwrap();
        let ticks = Mutex::new(Vec::new());
        let (count, err) = store.unpin_all(&|n| ticks.lock().unwrap().push(n)).await;
        assert_eq!(count, 2);
        assert!(err.is_none());
        assert_eq!(*ticks.lock().unwrap(), vec![1, 2]);
        assert!(store.pinned_cids().is_empty());
    }
}
