use porcupin_core::is_ipfs_uri;

use crate::model::TokenDto;

/// Contracts known to be NFT collections regardless of what their metadata
/// looks like yet. Empty by default; a deployment can extend this via
/// configuration before wiring the synchronizer (left as a constant here
/// since the adapter itself carries no config surface).
const CURATED_ALLOW_LIST: &[&str] = &[];

const ALIAS_SUBSTRINGS: &[&str] = &["nft", "collectible", "art", "gallery"];

/// Pre-filter a candidate token before it reaches the pin manager.
///
/// Rules are applied in order and the first match wins; a token that
/// matches none of them is excluded.
pub fn passes_prefilter(token: &TokenDto) -> bool {
    if has_any_ipfs_uri(token) {
        return true;
    }
    if CURATED_ALLOW_LIST.contains(&token.contract.as_str()) {
        return true;
    }
    if let Some(alias) = &token.contract_alias {
        let lower = alias.to_lowercase();
        if ALIAS_SUBSTRINGS.iter().any(|s| lower.contains(s)) {
            return true;
        }
    }
    if !token.has_metadata {
        return true;
    }
    false
}

fn has_any_ipfs_uri(token: &TokenDto) -> bool {
    [&token.artifact_uri, &token.display_uri, &token.thumbnail_uri]
        .into_iter()
        .flatten()
        .any(|u| is_ipfs_uri(u))
        || token.formats.iter().any(|u| is_ipfs_uri(u))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_token() -> TokenDto {
        TokenDto {
            contract: "KT1unknown".into(),
            contract_alias: None,
            token_id: "1".into(),
            level: 1,
            name: None,
            description: None,
            creator: None,
            artifact_uri: None,
            display_uri: None,
            thumbnail_uri: None,
            formats: Vec::new(),
            raw_metadata: Some("{}".into()),
            has_metadata: true,
        }
    }

    #[test]
    fn includes_when_ipfs_uri_present() {
        let mut t = bare_token();
        t.artifact_uri = Some("ipfs://bafy".into());
        assert!(passes_prefilter(&t));
    }

    #[test]
    fn includes_when_alias_matches_known_substring() {
        let mut t = bare_token();
        t.contract_alias = Some("Some NFT Gallery".into());
        assert!(passes_prefilter(&t));
    }

    #[test]
    fn includes_when_metadata_absent_for_later_recovery() {
        let mut t = bare_token();
        t.has_metadata = false;
        t.contract_alias = Some("Unrelated Label".into());
        assert!(passes_prefilter(&t));
    }

    #[test]
    fn excludes_when_no_rule_matches() {
        let mut t = bare_token();
        t.contract_alias = Some("Totally Unrelated Co".into());
        assert!(!passes_prefilter(&t));
    }
}
