use chrono::{DateTime, Utc};
use porcupin_core::{Account, AssetRole, PinIntent, PinStatus, Token};
use rusqlite::{Row, Result as SqlResult};

pub fn account_from_row(row: &Row) -> SqlResult<Account> {
    Ok(Account {
        address: row.get("address")?,
        alias: row.get("alias")?,
        sync_owned: row.get::<_, i64>("sync_owned")? != 0,
        sync_created: row.get::<_, i64>("sync_created")? != 0,
        last_synced_level: row.get("last_synced_level")?,
        last_synced_at: parse_ts(row.get::<_, Option<String>>("last_synced_at")?),
    })
}

pub fn token_from_row(row: &Row) -> SqlResult<Token> {
    Ok(Token {
        id: row.get("id")?,
        contract: row.get("contract")?,
        token_id: row.get("token_id")?,
        wallet_address: row.get("wallet_address")?,
        name: row.get("name")?,
        description: row.get("description")?,
        creator: row.get("creator")?,
        artifact_uri: row.get("artifact_uri")?,
        display_uri: row.get("display_uri")?,
        thumbnail_uri: row.get("thumbnail_uri")?,
        raw_metadata: row.get("raw_metadata")?,
    })
}

pub fn pin_intent_from_row(row: &Row) -> SqlResult<PinIntent> {
    let role_str: String = row.get("role")?;
    let status_str: String = row.get("status")?;
    Ok(PinIntent {
        id: row.get("id")?,
        uri: row.get("uri")?,
        token_id: row.get("token_id")?,
        role: AssetRole::from_str(&role_str).unwrap_or(AssetRole::Metadata),
        mime_type: row.get("mime_type")?,
        size_bytes: row.get("size_bytes")?,
        status: PinStatus::from_str(&status_str).unwrap_or(PinStatus::Pending),
        retry_count: row.get("retry_count")?,
        error_msg: row.get("error_msg")?,
        pinned_at: parse_ts(row.get::<_, Option<String>>("pinned_at")?),
    })
}

pub fn parse_ts(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn fmt_ts(ts: Option<DateTime<Utc>>) -> Option<String> {
    ts.map(|t| t.to_rfc3339())
}
