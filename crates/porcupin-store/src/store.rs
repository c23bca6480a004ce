use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use porcupin_core::{Account, AssetRole, PinIntent, PinStatus, PorcupinError, Token};
use rusqlite::{params, Connection, OptionalExtension};

use crate::rows::{account_from_row, fmt_ts, pin_intent_from_row, token_from_row};
use crate::schema::ensure_schema;

fn storage_err(e: impl std::fmt::Display) -> PorcupinError {
    PorcupinError::Storage(e.to_string())
}

/// Durable record of tracked accounts, discovered tokens, per-URI pin
/// intents and small key/value settings.
///
/// Every method runs the actual SQLite call on a blocking-pool thread via
/// `tokio::task::spawn_blocking` — `rusqlite::Connection` is not `Sync`,
/// unlike the teacher's `sled::Tree`, so a single connection behind a
/// mutex is the direct analogue of the teacher's shared `Arc<StateDb>`
/// handle (see `DESIGN.md`).
#[derive(Clone)]
pub struct StoreHandle {
    conn: Arc<Mutex<Connection>>,
}

impl StoreHandle {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PorcupinError> {
        let conn = Connection::open(path).map_err(storage_err)?;
        ensure_schema(&conn).map_err(storage_err)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self, PorcupinError> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        ensure_schema(&conn).map_err(storage_err)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T, PorcupinError>
    where
        F: FnOnce(&Connection) -> Result<T, PorcupinError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().expect("store mutex poisoned");
            f(&guard)
        })
        .await
        .map_err(|e| PorcupinError::Storage(format!("blocking task panicked: {e}")))?
    }

    // ── Accounts ─────────────────────────────────────────────────────────────

    pub async fn get_account(&self, address: &str) -> Result<Option<Account>, PorcupinError> {
        let address = address.to_string();
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT * FROM accounts WHERE address = ?1",
                params![address],
                account_from_row,
            )
            .optional()
            .map_err(storage_err)
        })
        .await
    }

    pub async fn put_account(&self, account: Account) -> Result<(), PorcupinError> {
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO accounts (address, alias, sync_owned, sync_created, last_synced_level, last_synced_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(address) DO UPDATE SET
                    alias = excluded.alias,
                    sync_owned = excluded.sync_owned,
                    sync_created = excluded.sync_created",
                params![
                    account.address,
                    account.alias,
                    account.sync_owned as i64,
                    account.sync_created as i64,
                    account.last_synced_level,
                    fmt_ts(account.last_synced_at),
                ],
            )
            .map_err(storage_err)?;
            Ok(())
        })
        .await
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>, PorcupinError> {
        self.blocking(|conn| {
            let mut stmt = conn
                .prepare("SELECT rowid, * FROM accounts ORDER BY rowid ASC")
                .map_err(storage_err)?;
            let rows = stmt
                .query_map([], account_from_row)
                .map_err(storage_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(storage_err)
        })
        .await
    }

    /// Advance `last_synced_level` to `new_level` and stamp `last_synced_at`.
    /// Returns `false` if the account no longer exists (it may have been
    /// deleted by the external management path mid-cycle). Never moves the
    /// cursor backwards.
    pub async fn advance_account_cursor(
        &self,
        address: &str,
        new_level: i64,
    ) -> Result<bool, PorcupinError> {
        let address = address.to_string();
        let now = fmt_ts(Some(Utc::now()));
        self.blocking(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE accounts SET last_synced_level = MAX(last_synced_level, ?1), last_synced_at = ?2
                     WHERE address = ?3",
                    params![new_level, now, address],
                )
                .map_err(storage_err)?;
            Ok(changed > 0)
        })
        .await
    }

    /// Accounts whose last successful cycle is older than `threshold` (or
    /// that have never synced), for the retry worker's health-check nudge.
    pub async fn list_stale_accounts(
        &self,
        threshold: Duration,
    ) -> Result<Vec<Account>, PorcupinError> {
        let cutoff = fmt_ts(Some(Utc::now() - chrono::Duration::from_std(threshold).unwrap_or_default()));
        self.blocking(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT rowid, * FROM accounts
                     WHERE last_synced_at IS NULL OR last_synced_at < ?1
                     ORDER BY rowid ASC",
                )
                .map_err(storage_err)?;
            let rows = stmt
                .query_map(params![cutoff], account_from_row)
                .map_err(storage_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(storage_err)
        })
        .await
    }

    // ── Tokens ───────────────────────────────────────────────────────────────

    /// Insert or upsert-by-`(contract, token_id)`, returning the row id.
    pub async fn upsert_token(&self, token: Token) -> Result<i64, PorcupinError> {
        self.blocking(move |conn| {
            conn.query_row(
                "INSERT INTO tokens
                    (contract, token_id, wallet_address, name, description, creator,
                     artifact_uri, display_uri, thumbnail_uri, raw_metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(contract, token_id) DO UPDATE SET
                    name = excluded.name,
                    description = excluded.description,
                    creator = excluded.creator,
                    artifact_uri = excluded.artifact_uri,
                    display_uri = excluded.display_uri,
                    thumbnail_uri = excluded.thumbnail_uri,
                    raw_metadata = excluded.raw_metadata
                 RETURNING id",
                params![
                    token.contract,
                    token.token_id,
                    token.wallet_address,
                    token.name,
                    token.description,
                    token.creator,
                    token.artifact_uri,
                    token.display_uri,
                    token.thumbnail_uri,
                    token.raw_metadata,
                ],
                |row| row.get(0),
            )
            .map_err(storage_err)
        })
        .await
    }

    pub async fn get_token_by_key(
        &self,
        contract: &str,
        token_id: &str,
    ) -> Result<Option<Token>, PorcupinError> {
        let contract = contract.to_string();
        let token_id = token_id.to_string();
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT * FROM tokens WHERE contract = ?1 AND token_id = ?2",
                params![contract, token_id],
                token_from_row,
            )
            .optional()
            .map_err(storage_err)
        })
        .await
    }

    // ── Pin intents ──────────────────────────────────────────────────────────

    pub async fn get_pin_intent_by_uri(
        &self,
        uri: &str,
    ) -> Result<Option<PinIntent>, PorcupinError> {
        let uri = uri.to_string();
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT * FROM pin_intents WHERE uri = ?1",
                params![uri],
                pin_intent_from_row,
            )
            .optional()
            .map_err(storage_err)
        })
        .await
    }

    /// Load the `PinIntent` for `uri`, creating a fresh `pending` row if one
    /// doesn't exist yet.
    pub async fn load_or_create_pin_intent(
        &self,
        uri: &str,
        token_id: i64,
        role: AssetRole,
    ) -> Result<PinIntent, PorcupinError> {
        let uri_owned = uri.to_string();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO pin_intents (uri, token_id, role, status, retry_count)
                 VALUES (?1, ?2, ?3, 'pending', 0)
                 ON CONFLICT(uri) DO NOTHING",
                params![uri_owned, token_id, role.as_str()],
            )
            .map_err(storage_err)?;
            conn.query_row(
                "SELECT * FROM pin_intents WHERE uri = ?1",
                params![uri_owned],
                pin_intent_from_row,
            )
            .map_err(storage_err)
        })
        .await
    }

    pub async fn mark_pinned(
        &self,
        id: i64,
        size_bytes: i64,
        mime_type: Option<String>,
    ) -> Result<(), PorcupinError> {
        let now = fmt_ts(Some(Utc::now()));
        self.blocking(move |conn| {
            conn.execute(
                "UPDATE pin_intents SET status = 'pinned', size_bytes = ?1, pinned_at = ?2,
                    mime_type = COALESCE(?3, mime_type), error_msg = NULL
                 WHERE id = ?4",
                params![size_bytes, now, mime_type, id],
            )
            .map_err(storage_err)?;
            Ok(())
        })
        .await
    }

    /// Transition to a failure state, bumping `retry_count` and recording a
    /// bounded `error_msg`.
    pub async fn mark_failed(
        &self,
        id: i64,
        status: PinStatus,
        error_msg: String,
    ) -> Result<(), PorcupinError> {
        let status = status.as_str();
        let mut msg = error_msg;
        if msg.len() > porcupin_core::constants::MAX_ERROR_MSG_LEN {
            msg.truncate(porcupin_core::constants::MAX_ERROR_MSG_LEN);
        }
        self.blocking(move |conn| {
            conn.execute(
                "UPDATE pin_intents SET status = ?1, error_msg = ?2, retry_count = retry_count + 1
                 WHERE id = ?3",
                params![status, msg, id],
            )
            .map_err(storage_err)?;
            Ok(())
        })
        .await
    }

    /// Like `mark_failed`, but for failures the error taxonomy classifies as
    /// non-retriable (bad URI, oversize asset): jumps `retry_count` straight
    /// to the sentinel so the retry scanner never re-queues it.
    pub async fn mark_failed_terminal(
        &self,
        id: i64,
        error_msg: String,
    ) -> Result<(), PorcupinError> {
        let mut msg = error_msg;
        if msg.len() > porcupin_core::constants::MAX_ERROR_MSG_LEN {
            msg.truncate(porcupin_core::constants::MAX_ERROR_MSG_LEN);
        }
        self.blocking(move |conn| {
            conn.execute(
                "UPDATE pin_intents SET status = 'failed', error_msg = ?1, retry_count = ?2
                 WHERE id = ?3",
                params![msg, porcupin_core::constants::NON_RETRIABLE_RETRY_COUNT, id],
            )
            .map_err(storage_err)?;
            Ok(())
        })
        .await
    }

    pub async fn update_probe_result(
        &self,
        id: i64,
        mime_type: Option<String>,
    ) -> Result<(), PorcupinError> {
        self.blocking(move |conn| {
            conn.execute(
                "UPDATE pin_intents SET mime_type = ?1 WHERE id = ?2",
                params![mime_type, id],
            )
            .map_err(storage_err)?;
            Ok(())
        })
        .await
    }

    pub async fn reset_to_pending(&self, id: i64) -> Result<(), PorcupinError> {
        self.blocking(move |conn| {
            conn.execute(
                "UPDATE pin_intents SET status = 'pending' WHERE id = ?1",
                params![id],
            )
            .map_err(storage_err)?;
            Ok(())
        })
        .await
    }

    /// Up to `limit` `pending` intents, oldest id first.
    pub async fn scan_pending(&self, limit: usize) -> Result<Vec<PinIntent>, PorcupinError> {
        self.blocking(move |conn| {
            let mut stmt = conn
                .prepare("SELECT * FROM pin_intents WHERE status = 'pending' ORDER BY id ASC LIMIT ?1")
                .map_err(storage_err)?;
            let rows = stmt
                .query_map(params![limit as i64], pin_intent_from_row)
                .map_err(storage_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(storage_err)
        })
        .await
    }

    /// `failed`/`failed_unavailable` intents with room left under `max_retries`.
    pub async fn scan_retriable_failed(
        &self,
        max_retries: i64,
    ) -> Result<Vec<PinIntent>, PorcupinError> {
        self.blocking(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT * FROM pin_intents
                     WHERE status IN ('failed', 'failed_unavailable') AND retry_count < ?1
                     ORDER BY id ASC",
                )
                .map_err(storage_err)?;
            let rows = stmt
                .query_map(params![max_retries], pin_intent_from_row)
                .map_err(storage_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(storage_err)
        })
        .await
    }

    /// Total bytes already pinned, for the storage-cap check ahead of
    /// queuing a new pin.
    pub async fn sum_pinned_bytes(&self) -> Result<i64, PorcupinError> {
        self.blocking(|conn| {
            conn.query_row(
                "SELECT COALESCE(SUM(size_bytes), 0) FROM pin_intents WHERE status = 'pinned'",
                [],
                |row| row.get(0),
            )
            .map_err(storage_err)
        })
        .await
    }

    /// Delete pin intents by id. Deletion is authoritative regardless of
    /// whether the blob store still holds the bytes under that uri — the
    /// blob store's own garbage collection is the reconciler.
    pub async fn delete_pin_intents(&self, ids: Vec<i64>) -> Result<usize, PorcupinError> {
        self.blocking(move |conn| {
            let mut deleted = 0;
            for id in ids {
                deleted += conn
                    .execute("DELETE FROM pin_intents WHERE id = ?1", params![id])
                    .map_err(storage_err)?;
            }
            Ok(deleted)
        })
        .await
    }

    /// Wipe every `pin_intents` and `tokens` row. Used by the clear-data
    /// operation after the blob store has been unpinned and GC'd; accounts
    /// themselves are untouched (they are externally managed, not rediscovered
    /// by a backup cycle).
    pub async fn clear_all(&self) -> Result<(), PorcupinError> {
        self.blocking(|conn| {
            conn.execute_batch("DELETE FROM pin_intents; DELETE FROM tokens;")
                .map_err(storage_err)
        })
        .await
    }

    // ── Settings ─────────────────────────────────────────────────────────────

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>, PorcupinError> {
        let key = key.to_string();
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_err)
        })
        .await
    }

    pub async fn put_setting(&self, key: &str, value: &str) -> Result<(), PorcupinError> {
        let key = key.to_string();
        let value = value.to_string();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .map_err(storage_err)?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn account_round_trip() {
        let store = StoreHandle::open_in_memory().unwrap();
        store.put_account(Account::new("tz1abc")).await.unwrap();
        let acc = store.get_account("tz1abc").await.unwrap().unwrap();
        assert_eq!(acc.last_synced_level, 0);
        assert!(acc.sync_owned && acc.sync_created);
    }

    #[tokio::test]
    async fn cursor_advances_monotonically() {
        let store = StoreHandle::open_in_memory().unwrap();
        store.put_account(Account::new("tz1abc")).await.unwrap();
        store.advance_account_cursor("tz1abc", 100).await.unwrap();
        store.advance_account_cursor("tz1abc", 50).await.unwrap();
        let acc = store.get_account("tz1abc").await.unwrap().unwrap();
        assert_eq!(acc.last_synced_level, 100);
    }

    #[tokio::test]
    async fn cursor_advance_on_missing_account_reports_false() {
        let store = StoreHandle::open_in_memory().unwrap();
        let changed = store.advance_account_cursor("ghost", 10).await.unwrap();
        assert!(!changed);
    }

    #[tokio::test]
    async fn token_upsert_by_unique_key() {
        let store = StoreHandle::open_in_memory().unwrap();
        let t = Token {
            id: 0,
            contract: "KT1x".into(),
            token_id: "1".into(),
            wallet_address: "tz1abc".into(),
            name: Some("Foo".into()),
            description: None,
            creator: None,
            artifact_uri: Some("ipfs://a".into()),
            display_uri: None,
            thumbnail_uri: None,
            raw_metadata: None,
        };
        let id1 = store.upsert_token(t.clone()).await.unwrap();
        let mut t2 = t;
        t2.name = Some("Bar".into());
        let id2 = store.upsert_token(t2).await.unwrap();
        assert_eq!(id1, id2);
        let fetched = store.get_token_by_key("KT1x", "1").await.unwrap().unwrap();
        assert_eq!(fetched.name.as_deref(), Some("Bar"));
    }

    #[tokio::test]
    async fn pin_intent_uri_is_unique() {
        let store = StoreHandle::open_in_memory().unwrap();
        let token_id = store
            .upsert_token(Token {
                id: 0,
                contract: "KT1x".into(),
                token_id: "1".into(),
                wallet_address: "tz1abc".into(),
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

        let i1 = store
            .load_or_create_pin_intent("ipfs://X", token_id, AssetRole::Artifact)
            .await
            .unwrap();
        let i2 = store
            .load_or_create_pin_intent("ipfs://X", token_id, AssetRole::Display)
            .await
            .unwrap();
        assert_eq!(i1.id, i2.id);
        assert_eq!(i2.role, AssetRole::Artifact, "role is not overwritten by a later load");
    }

    #[tokio::test]
    async fn mark_pinned_then_scan_retriable_failed_excludes_it() {
        let store = StoreHandle::open_in_memory().unwrap();
        let token_id = store
            .upsert_token(Token {
                id: 0,
                contract: "KT1x".into(),
                token_id: "1".into(),
                wallet_address: "tz1abc".into(),
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
        let intent = store
            .load_or_create_pin_intent("ipfs://Y", token_id, AssetRole::Artifact)
            .await
            .unwrap();
        store.mark_failed(intent.id, PinStatus::Failed, "boom".into()).await.unwrap();
        let retriable = store.scan_retriable_failed(5).await.unwrap();
        assert_eq!(retriable.len(), 1);
        assert_eq!(retriable[0].retry_count, 1);

        store.reset_to_pending(intent.id).await.unwrap();
        store.mark_pinned(intent.id, 1024, Some("image/png".into())).await.unwrap();
        let retriable = store.scan_retriable_failed(5).await.unwrap();
        assert!(retriable.is_empty());
        assert_eq!(store.sum_pinned_bytes().await.unwrap(), 1024);
    }
}
