use std::sync::Arc;

use porcupin_blobstore::BlobStore;
use porcupin_core::PorcupinError;
use porcupin_store::StoreHandle;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Phase of a clear-data sweep, named in §6's emitted-events surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearPhase {
    Unpinning,
    GarbageCollect,
    ClearingDb,
    Complete,
    Error,
}

impl ClearPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            ClearPhase::Unpinning => "unpinning",
            ClearPhase::GarbageCollect => "garbage_collect",
            ClearPhase::ClearingDb => "clearing_db",
            ClearPhase::Complete => "complete",
            ClearPhase::Error => "error",
        }
    }
}

/// One `clear:*` lifecycle event. `unpinned_count` is only meaningful during
/// `Unpinning`; `error` only during `Error`.
#[derive(Debug, Clone)]
pub struct ClearEvent {
    pub phase: ClearPhase,
    pub unpinned_count: Option<u64>,
    pub error: Option<String>,
}

impl ClearEvent {
    fn phase(phase: ClearPhase) -> Self {
        Self {
            phase,
            unpinned_count: None,
            error: None,
        }
    }

    fn progress(count: u64) -> Self {
        Self {
            phase: ClearPhase::Unpinning,
            unpinned_count: Some(count),
            error: None,
        }
    }

    fn error(message: String) -> Self {
        Self {
            phase: ClearPhase::Error,
            unpinned_count: None,
            error: Some(message),
        }
    }
}

/// Fire-and-forget emitter for `clear:*` events — any out-of-core-scope
/// consumer (the REST facade, the dashboard) subscribes independently; a
/// sweep proceeds whether or not anyone is listening (`broadcast::Sender`
/// only errors when there are zero receivers, which we ignore).
#[derive(Clone)]
pub struct ClearEvents {
    tx: broadcast::Sender<ClearEvent>,
}

impl ClearEvents {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(64);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClearEvent> {
        self.tx.subscribe()
    }

    fn emit(&self, event: ClearEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for ClearEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// Bulk-delete everything the backup engine has accumulated: unpin every cid
/// the blob store holds, garbage-collect it, then wipe the local `tokens`/
/// `pin_intents` rows. Accounts are untouched — they are externally managed.
///
/// Per §9's open question on clearing: deletion by id (here, wholesale) is
/// authoritative regardless of whether the blob store still has bytes under
/// some other uri; the blob store's own GC is the reconciler, which is why
/// `garbage_collect` runs unconditionally as the second phase even though
/// `unpin_all` already dropped every pin it knew about.
pub async fn clear_data(
    store: &Arc<StoreHandle>,
    blobstore: &Arc<dyn BlobStore>,
    events: &ClearEvents,
) -> Result<(), PorcupinError> {
    events.emit(ClearEvent::phase(ClearPhase::Unpinning));
    let events_for_progress = events.clone();
    let (unpinned, unpin_err) = blobstore
        .unpin_all(&move |count| events_for_progress.emit(ClearEvent::progress(count)))
        .await;
    info!(unpinned, "clear-data: unpin sweep finished");
    if let Some(e) = unpin_err {
        warn!(error = %e, "clear-data: unpin_all reported an error, continuing to gc/clear anyway");
    }

    events.emit(ClearEvent::phase(ClearPhase::GarbageCollect));
    if let Err(e) = blobstore.garbage_collect().await {
        warn!(error = %e, "clear-data: garbage collect failed, continuing to clear db anyway");
    }

    events.emit(ClearEvent::phase(ClearPhase::ClearingDb));
    if let Err(e) = store.clear_all().await {
        let msg = e.to_string();
        events.emit(ClearEvent::error(msg));
        return Err(e);
    }

    events.emit(ClearEvent::phase(ClearPhase::Complete));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use porcupin_blobstore::MemoryBlobStore;
    use porcupin_core::{AssetRole, Token};
    use std::time::Duration;

    #[tokio::test]
    async fn clear_data_unpins_gcs_and_wipes_db() {
        let store = Arc::new(StoreHandle::open_in_memory().unwrap());
        let blobstore: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());

        let token_id = store
            .upsert_token(Token {
                id: 0,
                contract: "KT1x".into(),
                token_id: "1".into(),
                wallet_address: "tz1abc".into(),
                name: None,
                description: None,
                creator: None,
                artifact_uri: Some("ipfs://A".into()),
                display_uri: None,
                thumbnail_uri: None,
                raw_metadata: None,
            })
            .await
            .unwrap();
        store
            .load_or_create_pin_intent("ipfs://A", token_id, AssetRole::Artifact)
            .await
            .unwrap();
        blobstore.pin("A", Duration::from_secs(1)).await.unwrap();

        let events = ClearEvents::new();
        let mut rx = events.subscribe();

        clear_data(&store, &blobstore, &events).await.unwrap();

        assert!(store.get_token_by_key("KT1x", "1").await.unwrap().is_none());
        assert!(store
            .get_pin_intent_by_uri("ipfs://A")
            .await
            .unwrap()
            .is_none());

        let mut phases = Vec::new();
        let mut progress_ticks = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let Some(n) = event.unpinned_count {
                progress_ticks.push(n);
            } else {
                phases.push(event.phase);
            }
        }
        assert_eq!(progress_ticks, vec![1]);
        assert_eq!(
            phases,
            vec![
                ClearPhase::Unpinning,
                ClearPhase::GarbageCollect,
                ClearPhase::ClearingDb,
                ClearPhase::Complete,
            ]
        );
    }
}
