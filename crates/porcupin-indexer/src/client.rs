use std::time::Duration;

use async_trait::async_trait;
use porcupin_core::{constants, PorcupinError};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::model::{BalanceRow, BigmapKeyEntry, ContractInfo, RawToken, TokenDto, TokenPage};

/// The indexer operations the synchronizer and scanner depend on.
///
/// Kept as a trait (rather than a bare struct, mirroring the wallet's
/// single concrete `WalletRpcClient`) so tests can swap in a canned
/// in-memory double without touching the network.
#[async_trait]
pub trait Indexer: Send + Sync {
    async fn owned_tokens_since(
        &self,
        account: &str,
        since_level: i64,
        cursor: Option<i64>,
    ) -> Result<TokenPage, PorcupinError>;

    async fn created_tokens_since(
        &self,
        account: &str,
        since_level: i64,
        cursor: Option<i64>,
    ) -> Result<TokenPage, PorcupinError>;

    async fn head_level(&self) -> Result<i64, PorcupinError>;

    async fn resolve_onchain_metadata_uri(
        &self,
        contract: &str,
        token_id: &str,
    ) -> Result<Option<String>, PorcupinError>;
}

/// REST client for the tzkt-shaped token indexer, over plain `reqwest`.
pub struct IndexerClient {
    base_url: String,
    http: Client,
}

impl IndexerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: Client::new(),
        }
    }

    /// GET `path` with bounded exponential backoff: three attempts total,
    /// doubling from one second, honoring a `Retry-After` header on 429.
    async fn get_with_retry<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, PorcupinError> {
        let url = format!("{}{}", self.base_url, path);
        let mut delay = constants::INDEXER_RETRY_BASE;

        for attempt in 1..=constants::INDEXER_RETRY_ATTEMPTS {
            let result = self.http.get(&url).query(query).send().await;
            match result {
                Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => {
                    let retry_after = resp
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|h| h.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .unwrap_or_else(|| delay.as_secs());
                    if attempt == constants::INDEXER_RETRY_ATTEMPTS {
                        return Err(PorcupinError::RateLimited {
                            retry_after_secs: retry_after,
                        });
                    }
                    warn!(attempt, retry_after, %url, "indexer rate-limited, backing off");
                    tokio::time::sleep(Duration::from_secs(retry_after)).await;
                    continue;
                }
                Ok(resp) if resp.status().is_success() => {
                    return resp
                        .json::<T>()
                        .await
                        .map_err(|e| PorcupinError::Serialization(e.to_string()));
                }
                Ok(resp) => {
                    let status = resp.status();
                    if attempt == constants::INDEXER_RETRY_ATTEMPTS {
                        return Err(PorcupinError::Network(format!(
                            "indexer returned {status} for {url}"
                        )));
                    }
                    debug!(attempt, %status, %url, "indexer request failed, retrying");
                }
                Err(e) => {
                    if attempt == constants::INDEXER_RETRY_ATTEMPTS {
                        return Err(PorcupinError::Network(e.to_string()));
                    }
                    debug!(attempt, error = %e, %url, "indexer request error, retrying");
                }
            }
            tokio::time::sleep(delay).await;
            delay *= 2;
        }

        unreachable!("loop always returns by the final attempt")
    }

    /// Turn a page of raw balance rows into a `TokenPage`, computing the
    /// next cursor as the max row id seen (empty-or-short page ends pagination).
    fn page_from_balances(rows: Vec<BalanceRow>) -> TokenPage {
        let full_page = rows.len() as u32 == constants::INDEXER_PAGE_SIZE;
        let next_cursor = if full_page {
            rows.iter().map(|r| r.id).max()
        } else {
            None
        };
        let tokens = rows
            .into_iter()
            .map(|r| TokenDto::from_raw(r.token.clone(), r.token.last_level.unwrap_or(0)))
            .collect();
        TokenPage { tokens, next_cursor }
    }

    fn page_from_tokens(rows: Vec<RawToken>) -> TokenPage {
        let full_page = rows.len() as u32 == constants::INDEXER_PAGE_SIZE;
        let next_cursor = if full_page {
            rows.iter().map(|r| r.id).max()
        } else {
            None
        };
        let tokens = rows
            .into_iter()
            .map(|r| {
                let level = r.first_level.unwrap_or(0);
                TokenDto::from_raw(r, level)
            })
            .collect();
        TokenPage { tokens, next_cursor }
    }
}

#[async_trait]
impl Indexer for IndexerClient {
    async fn owned_tokens_since(
        &self,
        account: &str,
        since_level: i64,
        cursor: Option<i64>,
    ) -> Result<TokenPage, PorcupinError> {
        let limit = constants::INDEXER_PAGE_SIZE.to_string();
        let mut query = vec![
            ("account", account.to_string()),
            ("balance.ne", "0".to_string()),
            ("limit", limit),
            ("sort.asc", "id".to_string()),
        ];
        if let Some(c) = cursor {
            query.push(("id.gt", c.to_string()));
        }
        if since_level > 0 {
            query.push(("lastLevel.gt", since_level.to_string()));
        }
        let rows: Vec<BalanceRow> = self.get_with_retry("/v1/tokens/balances", &query).await?;
        Ok(Self::page_from_balances(rows))
    }

    async fn created_tokens_since(
        &self,
        account: &str,
        since_level: i64,
        cursor: Option<i64>,
    ) -> Result<TokenPage, PorcupinError> {
        let limit = constants::INDEXER_PAGE_SIZE.to_string();
        let mut query = vec![
            ("firstMinter", account.to_string()),
            ("limit", limit),
            ("sort.asc", "id".to_string()),
        ];
        if let Some(c) = cursor {
            query.push(("id.gt", c.to_string()));
        }
        if since_level > 0 {
            query.push(("firstLevel.gt", since_level.to_string()));
        }
        let rows: Vec<RawToken> = self.get_with_retry("/v1/tokens", &query).await?;
        Ok(Self::page_from_tokens(rows))
    }

    async fn head_level(&self) -> Result<i64, PorcupinError> {
        let resp: crate::model::HeadLevelResponse =
            self.get_with_retry("/v1/head", &[]).await?;
        Ok(resp.level)
    }

    /// Walk the contract's `token_metadata` big-map to find the entry for
    /// `token_id`, then hex-decode its URI out of the empty key (or
    /// `metadata` as a fallback).
    async fn resolve_onchain_metadata_uri(
        &self,
        contract: &str,
        token_id: &str,
    ) -> Result<Option<String>, PorcupinError> {
        let info: ContractInfo = self
            .get_with_retry(&format!("/v1/contracts/{contract}"), &[])
            .await?;
        let Some(bigmap_id) = info.bigmaps.token_metadata else {
            return Ok(None);
        };

        let entries: Vec<BigmapKeyEntry> = self
            .get_with_retry(
                "/v1/bigmaps/keys",
                &[
                    ("bigmap", bigmap_id.to_string()),
                    ("key", token_id.to_string()),
                ],
            )
            .await?;

        let Some(entry) = entries.into_iter().next() else {
            return Ok(None);
        };

        let hex_value = entry
            .value
            .token_info
            .get("")
            .or_else(|| entry.value.token_info.get("metadata"));

        let Some(hex_value) = hex_value else {
            return Ok(None);
        };

        let bytes = hex::decode(hex_value)
            .map_err(|e| PorcupinError::Serialization(format!("bad metadata hex: {e}")))?;
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }
}
