use serde::Deserialize;

/// `contract` sub-object on a raw indexer token/balance row.
#[derive(Debug, Clone, Deserialize)]
pub struct ContractRef {
    pub address: String,
    pub alias: Option<String>,
}

/// A token as the indexer's REST surface actually shapes it: identity
/// fields at the top level, the off-chain metadata blob opaque under
/// `metadata`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawToken {
    pub id: i64,
    pub contract: ContractRef,
    #[serde(rename = "tokenId")]
    pub token_id: String,
    #[serde(rename = "firstMinter")]
    pub first_minter: Option<String>,
    #[serde(rename = "firstLevel")]
    pub first_level: Option<i64>,
    #[serde(rename = "lastLevel")]
    pub last_level: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

/// One row of the "balances" listing: a holding of `token` by some account.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceRow {
    pub id: i64,
    pub token: RawToken,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeadLevelResponse {
    pub level: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractBigmaps {
    pub token_metadata: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractInfo {
    pub bigmaps: ContractBigmaps,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BigmapKeyValue {
    pub token_info: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BigmapKeyEntry {
    pub value: BigmapKeyValue,
}

/// A token handed from C2 to the pin manager: identity plus whatever
/// display fields could be read out of its metadata blob (or none, if
/// metadata hasn't resolved yet).
#[derive(Debug, Clone)]
pub struct TokenDto {
    pub contract: String,
    pub contract_alias: Option<String>,
    pub token_id: String,
    /// `lastLevel` for an owned-corpus row, `firstLevel` for a created-corpus row.
    pub level: i64,
    pub name: Option<String>,
    pub description: Option<String>,
    pub creator: Option<String>,
    pub artifact_uri: Option<String>,
    pub display_uri: Option<String>,
    pub thumbnail_uri: Option<String>,
    pub formats: Vec<String>,
    pub raw_metadata: Option<String>,
    pub has_metadata: bool,
}

impl TokenDto {
    pub fn from_raw(raw: RawToken, level: i64) -> Self {
        let has_metadata = raw.metadata.is_some();
        let meta = raw.metadata.unwrap_or(serde_json::Value::Null);
        let get_str = |key: &str| -> Option<String> {
            meta.get(key).and_then(|v| v.as_str()).map(str::to_string)
        };
        let formats = meta
            .get("formats")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|f| f.get("uri").and_then(|u| u.as_str()).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            contract: raw.contract.address,
            contract_alias: raw.contract.alias,
            token_id: raw.token_id,
            level,
            name: get_str("name"),
            description: get_str("description"),
            creator: get_str("creators").or_else(|| get_str("creator")),
            artifact_uri: get_str("artifactUri"),
            display_uri: get_str("displayUri"),
            thumbnail_uri: get_str("thumbnailUri"),
            formats,
            raw_metadata: if has_metadata {
                Some(meta.to_string())
            } else {
                None
            },
            has_metadata,
        }
    }
}

/// One page of a cursor-paginated listing, plus the cursor to continue from.
#[derive(Debug, Clone)]
pub struct TokenPage {
    pub tokens: Vec<TokenDto>,
    pub next_cursor: Option<i64>,
}

/// A push event delivered over the realtime subscription channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealtimeEvent {
    NewToken {
        contract: String,
        token_id: String,
        account: String,
        level: i64,
    },
    Transfer {
        contract: String,
        token_id: String,
        account: String,
        level: i64,
    },
    HeadAdvanced {
        level: i64,
    },
}
