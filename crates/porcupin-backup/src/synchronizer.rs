use std::collections::HashSet;
use std::sync::Arc;

use porcupin_core::PorcupinError;
use porcupin_indexer::{Indexer, TokenDto, TokenPage};
use porcupin_store::StoreHandle;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::pin_manager::{CycleDedup, PinManager};
use crate::status::ProgressCounters;

/// Result of driving one account through a sync cycle (§4.3).
#[derive(Debug)]
pub enum CycleOutcome {
    /// The account row was gone by the time the cycle started; nothing to do.
    AccountMissing,
    /// Both corpora were pulled (or skipped by the account's flags) and the
    /// cursor was advanced to the snapshotted head.
    Success { new_level: i64 },
    /// Pagination against the indexer failed; the cursor was left untouched.
    Failed(String),
}

/// Drives one account through `(owned + created) since cursor`, handing
/// every discovered token to the pin manager and advancing the account's
/// cursor only once the whole cycle has succeeded.
pub struct Synchronizer {
    store: Arc<StoreHandle>,
    indexer: Arc<dyn Indexer>,
    pin_manager: Arc<PinManager>,
    paused: Arc<RwLock<bool>>,
    progress: Arc<ProgressCounters>,
}

impl Synchronizer {
    pub fn new(
        store: Arc<StoreHandle>,
        indexer: Arc<dyn Indexer>,
        pin_manager: Arc<PinManager>,
        paused: Arc<RwLock<bool>>,
        progress: Arc<ProgressCounters>,
    ) -> Self {
        Self {
            store,
            indexer,
            pin_manager,
            paused,
            progress,
        }
    }

    /// Run one full cycle for `address`. See §4.3 steps 1–9.
    pub async fn run_cycle(&self, address: &str) -> Result<CycleOutcome, PorcupinError> {
        let Some(account) = self.store.get_account(address).await? else {
            debug!(%address, "account vanished before cycle start, aborting silently");
            return Ok(CycleOutcome::AccountMissing);
        };

        // Step 2: snapshot the head before fetching so concurrent new events
        // don't silently skip the cursor forward. A failed head lookup
        // falls back to 0 — `advance_account_cursor`'s MAX() makes that a
        // harmless no-op against the existing cursor, which is exactly the
        // "don't advance on failure" behavior §7 requires for head-level
        // errors.
        let head = match self.indexer.head_level().await {
            Ok(h) => h,
            Err(e) => {
                warn!(%address, error = %e, "head level lookup failed, falling back to full cycle");
                0
            }
        };

        let since_level = account.last_synced_level;
        let mut seen_keys: HashSet<(String, String)> = HashSet::new();
        let dedup: Arc<CycleDedup> = Arc::new(tokio::sync::Mutex::new(HashSet::new()));
        let mut tasks: JoinSet<Result<(), PorcupinError>> = JoinSet::new();

        if account.sync_owned {
            if let Err(e) = self
                .drain_corpus(
                    address,
                    since_level,
                    Corpus::Owned,
                    &mut seen_keys,
                    &dedup,
                    &mut tasks,
                )
                .await
            {
                self.drain_tasks(&mut tasks).await;
                return Ok(CycleOutcome::Failed(e.to_string()));
            }
        }

        if account.sync_created {
            if let Err(e) = self
                .drain_corpus(
                    address,
                    since_level,
                    Corpus::Created,
                    &mut seen_keys,
                    &dedup,
                    &mut tasks,
                )
                .await
            {
                self.drain_tasks(&mut tasks).await;
                return Ok(CycleOutcome::Failed(e.to_string()));
            }
        }

        // Step 8: wait for all C4 work for this cycle, unless paused.
        self.drain_tasks(&mut tasks).await;

        let advanced = self.store.advance_account_cursor(address, head).await?;
        if !advanced {
            debug!(%address, "account deleted mid-cycle, cursor not advanced");
        }
        self.progress.set_last_sync_at(chrono::Utc::now());
        Ok(CycleOutcome::Success { new_level: head })
    }

    /// Paginate one corpus to completion, spawning one concurrent
    /// `process_token` task per newly-seen `(contract, token_id)`.
    async fn drain_corpus(
        &self,
        address: &str,
        since_level: i64,
        corpus: Corpus,
        seen_keys: &mut HashSet<(String, String)>,
        dedup: &Arc<CycleDedup>,
        tasks: &mut JoinSet<Result<(), PorcupinError>>,
    ) -> Result<(), PorcupinError> {
        let mut cursor: Option<i64> = None;
        let mut page_count = 0u64;

        loop {
            if *self.paused.read().await {
                debug!(%address, ?corpus, "paused mid-pagination, stopping corpus drain");
                return Ok(());
            }

            let TokenPage { tokens, next_cursor } = match corpus {
                Corpus::Owned => {
                    self.indexer
                        .owned_tokens_since(address, since_level, cursor)
                        .await?
                }
                Corpus::Created => {
                    self.indexer
                        .created_tokens_since(address, since_level, cursor)
                        .await?
                }
            };

            page_count += 1;
            let fresh: Vec<TokenDto> = tokens
                .into_iter()
                .filter(|t| seen_keys.insert((t.contract.clone(), t.token_id.clone())))
                .filter(porcupin_indexer::passes_prefilter)
                .collect();

            self.progress.incr_total_nfts(fresh.len() as u64);

            for token in fresh {
                let pin_manager = Arc::clone(&self.pin_manager);
                let dedup = Arc::clone(dedup);
                let wallet = address.to_string();
                tasks.spawn(async move { pin_manager.process_token(token, &wallet, &dedup).await });
            }

            match next_cursor {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }

        debug!(%address, ?corpus, pages = page_count, "corpus drained");
        Ok(())
    }

    /// Await every spawned `process_token` task; a single token's error
    /// does not fail the cycle (§7: per-token failures are local), it is
    /// only logged.
    async fn drain_tasks(&self, tasks: &mut JoinSet<Result<(), PorcupinError>>) {
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "token processing failed, continuing cycle"),
                Err(e) => warn!(error = %e, "token processing task panicked"),
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Corpus {
    Owned,
    Created,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use porcupin_blobstore::MemoryBlobStore;
    use porcupin_core::Account;
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex as StdMutex;

    struct FakeIndexer {
        head: i64,
        owned: StdMutex<Vec<TokenDto>>,
    }

    fn dto(contract: &str, token_id: &str, artifact: &str) -> TokenDto {
        TokenDto {
            contract: contract.into(),
            contract_alias: None,
            token_id: token_id.into(),
            level: 1,
            name: Some("Name".into()),
            description: None,
            creator: None,
            artifact_uri: Some(artifact.into()),
            display_uri: None,
            thumbnail_uri: None,
            formats: Vec::new(),
            raw_metadata: Some("{}".into()),
            has_metadata: true,
        }
    }

    #[async_trait]
    impl Indexer for FakeIndexer {
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

    async fn make_synchronizer(
        indexer: Arc<dyn Indexer>,
    ) -> (Synchronizer, Arc<StoreHandle>, Arc<PinManager>) {
        let store = Arc::new(StoreHandle::open_in_memory().unwrap());
        let blobstore = Arc::new(MemoryBlobStore::new());
        let progress = Arc::new(ProgressCounters::new());
        let paused = Arc::new(RwLock::new(false));
        let disk_dirty = Arc::new(AtomicBool::new(false));
        let pin_manager = Arc::new(PinManager::new(
            Arc::clone(&store),
            blobstore,
            Arc::clone(&indexer),
            crate::config::IpfsConfig::default(),
            crate::config::BackupConfig::default(),
            Arc::clone(&paused),
            disk_dirty,
            Arc::clone(&progress),
        ));
        let sync = Synchronizer::new(
            Arc::clone(&store),
            indexer,
            Arc::clone(&pin_manager),
            paused,
            progress,
        );
        (sync, store, pin_manager)
    }

    #[tokio::test]
    async fn empty_account_full_cycle_advances_cursor_with_no_tokens() {
        let indexer = Arc::new(FakeIndexer {
            head: 100,
            owned: StdMutex::new(vec![]),
        });
        let (sync, store, _pm) = make_synchronizer(indexer).await;
        store.put_account(Account::new("tz1abc")).await.unwrap();

        let outcome = sync.run_cycle("tz1abc").await.unwrap();
        match outcome {
            CycleOutcome::Success { new_level } => assert_eq!(new_level, 100),
            other => panic!("expected success, got {other:?}"),
        }
        let account = store.get_account("tz1abc").await.unwrap().unwrap();
        assert_eq!(account.last_synced_level, 100);
    }

    #[tokio::test]
    async fn missing_account_aborts_silently() {
        let indexer = Arc::new(FakeIndexer {
            head: 100,
            owned: StdMutex::new(vec![]),
        });
        let (sync, _store, _pm) = make_synchronizer(indexer).await;
        let outcome = sync.run_cycle("ghost").await.unwrap();
        assert!(matches!(outcome, CycleOutcome::AccountMissing));
    }

    #[tokio::test]
    async fn single_token_two_uris_both_pin() {
        let indexer = Arc::new(FakeIndexer {
            head: 50,
            owned: StdMutex::new(vec![dto("KT1x", "1", "ipfs://A")]),
        });
        let (sync, store, _pm) = make_synchronizer(indexer).await;
        store.put_account(Account::new("tz1abc")).await.unwrap();

        sync.run_cycle("tz1abc").await.unwrap();

        let token = store.get_token_by_key("KT1x", "1").await.unwrap().unwrap();
        let intent = store
            .get_pin_intent_by_uri("ipfs://A")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(intent.token_id, token.id);
        assert_eq!(intent.status, porcupin_core::PinStatus::Pinned);
    }
}
