use std::time::Duration;

use async_trait::async_trait;
use porcupin_core::PorcupinError;
use reqwest::Client;
use tracing::{debug, warn};

use crate::store::BlobStore;

/// Reference `BlobStore` over Kubo's local HTTP RPC API.
///
/// Deliberately minimal: the blob-storage backend's internals are out of
/// scope, but the orchestrator needs something concrete to construct.
/// Every method is a single unauthenticated POST against the daemon's
/// local control socket, the way Kubo's own `ipfs` CLI talks to itself.
pub struct KuboHttpBlobStore {
    api_base: String,
    repo_path: String,
    http: Client,
}

impl KuboHttpBlobStore {
    pub fn new(api_base: impl Into<String>, repo_path: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            repo_path: repo_path.into(),
            http: Client::new(),
        }
    }

    async fn rpc_post(&self, path: &str, query: &[(&str, &str)]) -> Result<String, PorcupinError> {
        let url = format!("{}{}", self.api_base, path);
        let resp = self
            .http
            .post(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| PorcupinError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(PorcupinError::Network(format!(
                "kubo rpc {path} returned {status}: {body}"
            )));
        }

        resp.text()
            .await
            .map_err(|e| PorcupinError::Network(e.to_string()))
    }
}

#[async_trait]
impl BlobStore for KuboHttpBlobStore {
    async fn pin(&self, cid: &str, deadline: Duration) -> Result<(), PorcupinError> {
        let fut = self.rpc_post("/api/v0/pin/add", &[("arg", cid), ("recursive", "true")]);
        match tokio::time::timeout(deadline, fut).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(PorcupinError::Deadline),
        }
    }

    async fn unpin(&self, cid: &str) -> Result<(), PorcupinError> {
        self.rpc_post("/api/v0/pin/rm", &[("arg", cid)]).await?;
        Ok(())
    }

    async fn stat(&self, cid: &str) -> Result<u64, PorcupinError> {
        let body = self
            .rpc_post("/api/v0/object/stat", &[("arg", cid)])
            .await?;
        let value: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| PorcupinError::Serialization(e.to_string()))?;
        value
            .get("CumulativeSize")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| PorcupinError::Serialization("missing CumulativeSize".into()))
    }

    async fn is_pinned(&self, cid: &str) -> Result<bool, PorcupinError> {
        let url_path = "/api/v0/pin/ls";
        let result = self
            .rpc_post(url_path, &[("arg", cid), ("type", "recursive")])
            .await;
        match result {
            Ok(_) => Ok(true),
            Err(PorcupinError::Network(msg)) if msg.contains("not pinned") => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn unpin_all(
        &self,
        progress: &(dyn Fn(u64) + Send + Sync),
    ) -> (u64, Option<PorcupinError>) {
        let listing = match self.rpc_post("/api/v0/pin/ls", &[("type", "recursive")]).await {
            Ok(body) => body,
            Err(e) => return (0, Some(e)),
        };

        let cids: Vec<String> = listing
            .lines()
            .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
            .filter_map(|v| v.get("Keys").and_then(|k| k.as_object()).cloned())
            .flat_map(|keys| keys.keys().cloned().collect::<Vec<_>>())
            .collect();

        let mut count = 0u64;
        for cid in cids {
            if let Err(e) = self.unpin(&cid).await {
                warn!(%cid, error = %e, "unpin_all: failed to unpin, stopping sweep");
                return (count, Some(e));
            }
            count += 1;
            progress(count);
        }
        debug!(count, "unpin_all completed");
        (count, None)
    }

    async fn garbage_collect(&self) -> Result<(), PorcupinError> {
        self.rpc_post("/api/v0/repo/gc", &[]).await?;
        Ok(())
    }

    fn repo_path(&self) -> &str {
        &self.repo_path
    }
}
