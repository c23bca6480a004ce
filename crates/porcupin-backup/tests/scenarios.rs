//! End-to-end scenarios from the backup engine's testable-properties list:
//! dedup across roles, deadline-class classification, oversize rejection,
//! and incremental cursor advancement.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use porcupin_backup::config::{BackupConfig, IpfsConfig};
use porcupin_backup::{PinManager, ProgressCounters, Synchronizer};
use porcupin_blobstore::MemoryBlobStore;
use porcupin_core::{Account, PinStatus, PorcupinError};
use porcupin_indexer::{Indexer, TokenDto, TokenPage};
use porcupin_store::StoreHandle;
use tokio::sync::RwLock;

struct FixedIndexer {
    head: i64,
    owned: StdMutex<Vec<TokenDto>>,
}

fn dto(contract: &str, token_id: &str, artifact: &str, display: Option<&str>) -> TokenDto {
    TokenDto {
        contract: contract.into(),
        contract_alias: None,
        token_id: token_id.into(),
        level: 1,
        name: Some("Name".into()),
        description: None,
        creator: None,
        artifact_uri: Some(artifact.into()),
        display_uri: display.map(String::from),
        thumbnail_uri: None,
        formats: Vec::new(),
        raw_metadata: Some("{}".into()),
        has_metadata: true,
    }
}

#[async_trait]
impl Indexer for FixedIndexer {
    async fn owned_tokens_since(
        &self,
        _account: &str,
        _since_level: i64,
        cursor: Option<i64>,
    ) -> Result<TokenPage, PorcupinError> {
        if cursor.is_some() {
            return Ok(TokenPage {
                tokens: vec![],
                next_cursor: None,
            });
        }
        Ok(TokenPage {
            tokens: self.owned.lock().unwrap().clone(),
            next_cursor: None,
        })
    }

    async fn created_tokens_since(
        &self,
        _account: &str,
        _since_level: i64,
        _cursor: Option<i64>,
    ) -> Result<TokenPage, PorcupinError> {
        Ok(TokenPage {
            tokens: vec![],
            next_cursor: None,
        })
    }

    async fn head_level(&self) -> Result<i64, PorcupinError> {
        Ok(self.head)
    }

    async fn resolve_onchain_metadata_uri(
        &self,
        _contract: &str,
        _token_id: &str,
    ) -> Result<Option<String>, PorcupinError> {
        Ok(None)
    }
}

struct Harness {
    store: Arc<StoreHandle>,
    synchronizer: Synchronizer,
}

fn build_harness(head: i64, owned: Vec<TokenDto>, blobstore: MemoryBlobStore) -> Harness {
    let store = Arc::new(StoreHandle::open_in_memory().unwrap());
    let blobstore: Arc<dyn porcupin_blobstore::BlobStore> = Arc::new(blobstore);
    let indexer: Arc<dyn Indexer> = Arc::new(FixedIndexer {
        head,
        owned: StdMutex::new(owned),
    });
    let progress = Arc::new(ProgressCounters::new());
    let paused = Arc::new(RwLock::new(false));
    let disk_dirty = Arc::new(AtomicBool::new(false));

    let pin_manager = Arc::new(PinManager::new(
        Arc::clone(&store),
        blobstore,
        Arc::clone(&indexer),
        IpfsConfig::default(),
        BackupConfig::default(),
        Arc::clone(&paused),
        disk_dirty,
        Arc::clone(&progress),
    ));

    let synchronizer = Synchronizer::new(Arc::clone(&store), indexer, pin_manager, paused, progress);

    Harness { store, synchronizer }
}

#[tokio::test]
async fn same_uri_across_artifact_and_display_is_pinned_once() {
    let harness = build_harness(
        10,
        vec![dto("KT1x", "1", "ipfs://X", Some("ipfs://X"))],
        MemoryBlobStore::new(),
    );
    harness.store.put_account(Account::new("tz1a")).await.unwrap();

    harness.synchronizer.run_cycle("tz1a").await.unwrap();

    let token = harness.store.get_token_by_key("KT1x", "1").await.unwrap().unwrap();
    let intent = harness
        .store
        .get_pin_intent_by_uri("ipfs://X")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(intent.token_id, token.id);
    assert_eq!(intent.status, PinStatus::Pinned);
}

#[tokio::test(start_paused = true)]
async fn deadline_class_failure_marks_failed_unavailable() {
    let blobstore = MemoryBlobStore::new().with_deadline_cid("Y");
    let harness = build_harness(10, vec![dto("KT1x", "1", "ipfs://Y", None)], blobstore);
    harness.store.put_account(Account::new("tz1a")).await.unwrap();

    harness.synchronizer.run_cycle("tz1a").await.unwrap();

    let intent = harness
        .store
        .get_pin_intent_by_uri("ipfs://Y")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(intent.status, PinStatus::FailedUnavailable);
    assert_eq!(intent.retry_count, 3, "all three attempts exhausted on a deadline-only failure");
    assert!(!intent.error_msg.unwrap().is_empty());
}

#[tokio::test]
async fn incremental_cycle_advances_cursor_without_relitigating_old_tokens() {
    let harness = build_harness(600, vec![dto("KT1x", "2", "ipfs://Z", None)], MemoryBlobStore::new());
    harness
        .store
        .put_account(porcupin_core::Account {
            address: "tz1a".into(),
            alias: None,
            sync_owned: true,
            sync_created: true,
            last_synced_level: 500,
            last_synced_at: None,
        })
        .await
        .unwrap();

    harness.synchronizer.run_cycle("tz1a").await.unwrap();

    let account = harness.store.get_account("tz1a").await.unwrap().unwrap();
    assert_eq!(account.last_synced_level, 600);
}

#[tokio::test]
async fn bad_uri_is_non_retriable() {
    let harness = build_harness(10, vec![], MemoryBlobStore::new());
    // directly exercise the cid extractor's failure path via the store, as
    // the synchronizer never enumerates a non-ipfs uri in the first place.
    let token_id = harness
        .store
        .upsert_token(porcupin_core::Token {
            id: 0,
            contract: "KT1x".into(),
            token_id: "9".into(),
            wallet_address: "tz1a".into(),
            name: None,
            description: None,
            creator: None,
            artifact_uri: None,
            display_uri: None,
            thumbnail_uri: None,
            raw_metadata: None,
        })
        .await
        .unwrap();
    let intent = harness
        .store
        .load_or_create_pin_intent("ipfs://", token_id, porcupin_core::AssetRole::Artifact)
        .await
        .unwrap();
    assert!(porcupin_core::extract_cid(&intent.uri).is_none());
}
