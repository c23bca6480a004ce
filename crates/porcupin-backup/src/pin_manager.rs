use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use porcupin_blobstore::BlobStore;
use porcupin_core::{constants, extract_cid, is_ipfs_uri, AssetRole, PinStatus, PorcupinError};
use porcupin_indexer::{Indexer, TokenDto};
use porcupin_store::StoreHandle;
use reqwest::Client;
use tokio::sync::{Mutex as AsyncMutex, RwLock, Semaphore};
use tracing::{debug, warn};

/// URIs already processed earlier in the current sync cycle, shared across
/// however many tokens the synchronizer is driving through the pool
/// concurrently (§4.4 step 7b dedup is per-cycle, not per-token).
pub type CycleDedup = AsyncMutex<HashSet<String>>;

use crate::config::{BackupConfig, IpfsConfig};
use crate::status::ProgressCounters;

/// Outcome of processing one URI, distinguishing "move on to the next URI"
/// from "storage cap breached — abandon the rest of this token".
enum UriOutcome {
    Continue,
    AbortToken,
}

/// For one token: persist it, enumerate its IPFS URIs, deduplicate, and pin
/// each under concurrency and resource guards.
///
/// The semaphore permit is held for the HEAD probe, the pin call, the stat
/// call and the state write together — the unit of concurrency is one URI
/// in flight end to end, not one token.
pub struct PinManager {
    store: Arc<StoreHandle>,
    blobstore: Arc<dyn BlobStore>,
    indexer: Arc<dyn Indexer>,
    http: Client,
    ipfs: IpfsConfig,
    backup: BackupConfig,
    semaphore: Arc<Semaphore>,
    pub paused: Arc<RwLock<bool>>,
    pub disk_dirty: Arc<AtomicBool>,
    progress: Arc<ProgressCounters>,
}

impl PinManager {
    pub fn new(
        store: Arc<StoreHandle>,
        blobstore: Arc<dyn BlobStore>,
        indexer: Arc<dyn Indexer>,
        ipfs: IpfsConfig,
        backup: BackupConfig,
        paused: Arc<RwLock<bool>>,
        disk_dirty: Arc<AtomicBool>,
        progress: Arc<ProgressCounters>,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(backup.max_concurrency));
        Self {
            store,
            blobstore,
            indexer,
            http: Client::new(),
            ipfs,
            backup,
            semaphore,
            paused,
            disk_dirty,
            progress,
        }
    }

    async fn is_paused(&self) -> bool {
        *self.paused.read().await
    }

    /// The blob store this pin manager drives, for the orchestrator's
    /// clear-data operation (§6), which needs `unpin_all`/`garbage_collect`
    /// directly rather than through the per-URI pin path.
    pub fn blobstore(&self) -> &Arc<dyn BlobStore> {
        &self.blobstore
    }

    async fn storage_cap_breached(&self) -> Result<bool, PorcupinError> {
        let cap = self.backup.max_storage_bytes();
        if cap == 0 {
            return Ok(false);
        }
        let used = self.store.sum_pinned_bytes().await?;
        Ok(used as u64 >= cap)
    }

    async fn auto_pause(&self) {
        *self.paused.write().await = true;
        warn!("storage cap breached, auto-pausing");
    }

    /// Process one token discovered by the synchronizer. `cycle_dedup`
    /// tracks URIs already visited earlier in the same sync cycle, shared
    /// with however many other tokens are in flight concurrently.
    pub async fn process_token(
        &self,
        token: TokenDto,
        wallet_address: &str,
        cycle_dedup: &CycleDedup,
    ) -> Result<(), PorcupinError> {
        if self.is_paused().await || self.storage_cap_breached().await? {
            return Ok(());
        }

        let mut token = token;
        if !token.has_metadata {
            if let Some(recovered) = self.try_recover_onchain_metadata(&token).await {
                token = recovered;
            }
        }

        if !token_has_any_ipfs_uri(&token) {
            debug!(contract = %token.contract, token_id = %token.token_id, "no ipfs uri, skipping");
            return Ok(());
        }

        let token_row_id = self
            .store
            .upsert_token(porcupin_core::Token {
                id: 0,
                contract: token.contract.clone(),
                token_id: token.token_id.clone(),
                wallet_address: wallet_address.to_string(),
                name: token.name.clone(),
                description: token.description.clone(),
                creator: token.creator.clone(),
                artifact_uri: token.artifact_uri.clone(),
                display_uri: token.display_uri.clone(),
                thumbnail_uri: token.thumbnail_uri.clone(),
                raw_metadata: token.raw_metadata.clone(),
            })
            .await?;

        self.progress.incr_processed_nfts();

        for (role, uri) in enumerate_candidate_uris(&token) {
            match self
                .process_uri(role, uri, token_row_id, cycle_dedup)
                .await?
            {
                UriOutcome::Continue => {}
                UriOutcome::AbortToken => break,
            }
        }

        Ok(())
    }

    async fn process_uri(
        &self,
        role: AssetRole,
        uri: String,
        token_row_id: i64,
        cycle_dedup: &CycleDedup,
    ) -> Result<UriOutcome, PorcupinError> {
        if !is_ipfs_uri(&uri) {
            return Ok(UriOutcome::Continue);
        }
        if !cycle_dedup.lock().await.insert(uri.clone()) {
            return Ok(UriOutcome::Continue);
        }

        let intent = self
            .store
            .load_or_create_pin_intent(&uri, token_row_id, role)
            .await?;
        if intent.status == PinStatus::Pinned {
            self.progress.incr_already_pinned();
            return Ok(UriOutcome::Continue);
        }

        if self.storage_cap_breached().await? {
            self.store
                .mark_failed(intent.id, PinStatus::Failed, "storage cap exceeded".to_string())
                .await?;
            self.progress.incr_failed_assets();
            self.auto_pause().await;
            return Ok(UriOutcome::AbortToken);
        }

        self.pin_intent(&intent.uri, intent.id).await?;
        Ok(UriOutcome::Continue)
    }

    /// The shared §4.4 step 7c–k sub-procedure: extract the cid, probe
    /// size/mime over the gateway, and drive the pin attempt. Used both by
    /// `process_uri` for a freshly enumerated URI and directly by the
    /// retry/scanner worker (§4.5) against an already-`pending` intent.
    pub async fn pin_intent(&self, uri: &str, intent_id: i64) -> Result<(), PorcupinError> {
        let Some(cid) = extract_cid(uri) else {
            self.store
                .mark_failed_terminal(intent_id, "could not extract content id".to_string())
                .await?;
            self.progress.incr_failed_assets();
            return Ok(());
        };

        if self.is_paused().await {
            return Ok(());
        }
        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("semaphore never closed");

        let probe = self.head_probe(&cid).await;
        if let Some((mime_type, content_length)) = probe {
            if content_length > self.ipfs.max_file_size_bytes {
                self.store
                    .mark_failed_terminal(
                        intent_id,
                        format!(
                            "asset size {content_length} exceeds max_file_size {}",
                            self.ipfs.max_file_size_bytes
                        ),
                    )
                    .await?;
                self.progress.incr_failed_assets();
                return Ok(());
            }
            self.store.update_probe_result(intent_id, mime_type).await?;
        }

        self.pin_with_retry(&cid, intent_id).await
    }

    /// Drives the pin attempts for one URI: up to three, 1s/2s backoff
    /// between them, bumping `retry_count` with every failing attempt (step
    /// k) and leaving the final attempt's classification — `failed` or
    /// `failed_unavailable` — as the intent's resting status.
    async fn pin_with_retry(&self, cid: &str, intent_id: i64) -> Result<(), PorcupinError> {
        let deadline = self.ipfs.per_attempt_deadline();

        for (attempt, delay) in std::iter::once(Duration::ZERO)
            .chain(constants::PIN_RETRY_DELAYS_SECS.iter().map(|s| Duration::from_secs(*s)))
            .enumerate()
        {
            if attempt > 0 {
                tokio::time::sleep(delay).await;
            }

            match self.blobstore.pin(cid, deadline).await {
                Ok(()) => {
                    let size = self.blobstore.stat(cid).await.unwrap_or(0);
                    self.store.mark_pinned(intent_id, size as i64, None).await?;
                    self.disk_dirty.store(true, Ordering::Relaxed);
                    self.progress.incr_pinned_assets();
                    return Ok(());
                }
                Err(e) => {
                    let status = if e.is_deadline() {
                        PinStatus::FailedUnavailable
                    } else {
                        PinStatus::Failed
                    };
                    self.store
                        .mark_failed(intent_id, status, e.to_string())
                        .await?;
                    if attempt as u32 + 1 == constants::PIN_RETRY_ATTEMPTS {
                        self.progress.incr_failed_assets();
                        return Ok(());
                    }
                }
            }
        }

        unreachable!("loop always returns by the final attempt")
    }

    /// HEAD probe against the configured gateway. Failure is swallowed —
    /// it only forfeits the opportunistic size/mime capture.
    async fn head_probe(&self, cid: &str) -> Option<(Option<String>, u64)> {
        let url = format!("{}/ipfs/{}", self.ipfs.gateway_url.trim_end_matches('/'), cid);
        let resp = tokio::time::timeout(
            constants::HEAD_PROBE_TIMEOUT,
            self.http.head(&url).send(),
        )
        .await
        .ok()?
        .ok()?;

        let mime_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content_length = resp
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);

        Some((mime_type, content_length))
    }

    /// On-chain metadata recovery: resolve + fetch-over-gateway, both
    /// bounded by `METADATA_RECOVERY_TIMEOUT`. Returns `None` on any
    /// failure — the caller treats that as "skip the token", not an error.
    async fn try_recover_onchain_metadata(&self, token: &TokenDto) -> Option<TokenDto> {
        let result = tokio::time::timeout(constants::METADATA_RECOVERY_TIMEOUT, async {
            let uri = self
                .indexer
                .resolve_onchain_metadata_uri(&token.contract, &token.token_id)
                .await
                .ok()??;
            let cid = extract_cid(&uri)?;
            let url = format!("{}/ipfs/{}", self.ipfs.gateway_url.trim_end_matches('/'), cid);
            let body = self.http.get(&url).send().await.ok()?.text().await.ok()?;
            let value: serde_json::Value = serde_json::from_str(&body).ok()?;
            Some(value)
        })
        .await
        .ok()?;

        let metadata = result?;
        let get_str = |key: &str| metadata.get(key).and_then(|v| v.as_str()).map(str::to_string);
        let formats = metadata
            .get("formats")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|f| f.get("uri").and_then(|u| u.as_str()).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let mut recovered = token.clone();
        recovered.has_metadata = true;
        recovered.raw_metadata = Some(metadata.to_string());
        recovered.name = get_str("name").or(recovered.name);
        recovered.description = get_str("description").or(recovered.description);
        recovered.artifact_uri = get_str("artifactUri").or(recovered.artifact_uri);
        recovered.display_uri = get_str("displayUri").or(recovered.display_uri);
        recovered.thumbnail_uri = get_str("thumbnailUri").or(recovered.thumbnail_uri);
        if !formats.is_empty() {
            recovered.formats = formats;
        }
        Some(recovered)
    }
}

fn token_has_any_ipfs_uri(token: &TokenDto) -> bool {
    [&token.artifact_uri, &token.display_uri, &token.thumbnail_uri]
        .into_iter()
        .flatten()
        .any(|u| is_ipfs_uri(u))
        || token.formats.iter().any(|u| is_ipfs_uri(u))
}

/// Fixed enumeration order: artifact, display (if distinct from artifact),
/// thumbnail (if distinct from artifact), then each format in input order.
fn enumerate_candidate_uris(token: &TokenDto) -> Vec<(AssetRole, String)> {
    let mut out = Vec::new();
    if let Some(artifact) = &token.artifact_uri {
        out.push((AssetRole::Artifact, artifact.clone()));
    }
    if let Some(display) = &token.display_uri {
        if token.artifact_uri.as_deref() != Some(display.as_str()) {
            out.push((AssetRole::Display, display.clone()));
        }
    }
    if let Some(thumb) = &token.thumbnail_uri {
        if token.artifact_uri.as_deref() != Some(thumb.as_str()) {
            out.push((AssetRole::Thumbnail, thumb.clone()));
        }
    }
    for format in &token.formats {
        out.push((AssetRole::Format, format.clone()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dto(artifact: Option<&str>, display: Option<&str>, thumb: Option<&str>) -> TokenDto {
        TokenDto {
            contract: "KT1x".into(),
            contract_alias: None,
            token_id: "1".into(),
            level: 1,
            name: None,
            description: None,
            creator: None,
            artifact_uri: artifact.map(String::from),
            display_uri: display.map(String::from),
            thumbnail_uri: thumb.map(String::from),
            formats: Vec::new(),
            raw_metadata: Some("{}".into()),
            has_metadata: true,
        }
    }

    #[test]
    fn distinct_display_and_thumbnail_are_both_enumerated() {
        let token = dto(Some("ipfs://A"), Some("ipfs://B"), Some("ipfs://C"));
        let uris = enumerate_candidate_uris(&token);
        assert_eq!(
            uris,
            vec![
                (AssetRole::Artifact, "ipfs://A".to_string()),
                (AssetRole::Display, "ipfs://B".to_string()),
                (AssetRole::Thumbnail, "ipfs://C".to_string()),
            ]
        );
    }

    #[test]
    fn display_same_as_artifact_is_not_duplicated() {
        let token = dto(Some("ipfs://X"), Some("ipfs://X"), None);
        let uris = enumerate_candidate_uris(&token);
        assert_eq!(uris, vec![(AssetRole::Artifact, "ipfs://X".to_string())]);
    }

    #[test]
    fn formats_are_enumerated_in_input_order() {
        let mut token = dto(None, None, None);
        token.formats = vec!["ipfs://F1".into(), "ipfs://F2".into()];
        let uris = enumerate_candidate_uris(&token);
        assert_eq!(
            uris,
            vec![
                (AssetRole::Format, "ipfs://F1".to_string()),
                (AssetRole::Format, "ipfs://F2".to_string()),
            ]
        );
    }
}
