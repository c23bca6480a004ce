/// Extract the canonical content id from an IPFS-style URI.
///
/// Accepts `ipfs://{cid}[/path][?query]` or any URI containing `/ipfs/{cid}[/path]`
/// (gateway form). Returns `None` if the URI carries no IPFS content id.
pub fn extract_cid(uri: &str) -> Option<String> {
    let rest = if let Some(stripped) = uri.strip_prefix("ipfs://") {
        stripped
    } else if let Some(idx) = uri.find("/ipfs/") {
        &uri[idx + "/ipfs/".len()..]
    } else {
        return None;
    };

    let rest = rest.split('?').next().unwrap_or("");
    let cid = rest.split('/').next().unwrap_or("");

    if cid.is_empty() {
        None
    } else {
        Some(cid.to_string())
    }
}

/// Whether a URI is a candidate for pinning at all (scheme `ipfs://` or a
/// path containing `/ipfs/`), independent of whether a cid could be
/// extracted from it.
pub fn is_ipfs_uri(uri: &str) -> bool {
    uri.starts_with("ipfs://") || uri.contains("/ipfs/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_ipfs_scheme() {
        assert_eq!(extract_cid("ipfs://bafyabc123"), Some("bafyabc123".into()));
    }

    #[test]
    fn strips_path_and_query() {
        assert_eq!(
            extract_cid("ipfs://bafyabc123/metadata.json?x=1"),
            Some("bafyabc123".into())
        );
    }

    #[test]
    fn extracts_from_gateway_path() {
        assert_eq!(
            extract_cid("https://ipfs.io/ipfs/bafyxyz/thumb.png"),
            Some("bafyxyz".into())
        );
    }

    #[test]
    fn non_ipfs_uri_returns_none() {
        assert_eq!(extract_cid("https://example.com/image.png"), None);
    }

    #[test]
    fn empty_remainder_returns_none() {
        assert_eq!(extract_cid("ipfs://"), None);
        assert_eq!(extract_cid("https://host/ipfs/"), None);
    }

    #[test]
    fn is_ipfs_uri_detection() {
        assert!(is_ipfs_uri("ipfs://cid"));
        assert!(is_ipfs_uri("https://gw.example/ipfs/cid"));
        assert!(!is_ipfs_uri("https://example.com/cid.png"));
    }
}
