//! Cache key generation

use reqwest::Method;
use sha2::{Digest, Sha256};
use url::Url;

/// Canonical request identity: method plus absolute URL.
///
/// The URL is already normalized by parsing (lowercase scheme/host, default
/// port dropped); the fragment never reaches the origin so it is stripped.
pub fn request_key(method: &Method, url: &Url) -> String {
    format!("{} {}", method.as_str(), canonical_url(url))
}

/// Absolute URL with the fragment removed
pub fn canonical_url(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.to_string()
}

/// File name for a body stored outside SQLite: SHA-256 of the request key.
pub fn blob_name(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_request_key_includes_method() {
        let u = url("https://example.com/a");
        assert_eq!(request_key(&Method::GET, &u), "GET https://example.com/a");
        assert_ne!(request_key(&Method::GET, &u), request_key(&Method::POST, &u));
    }

    #[test]
    fn test_request_key_ignores_fragment() {
        let key1 = request_key(&Method::GET, &url("https://example.com/page#top"));
        let key2 = request_key(&Method::GET, &url("https://example.com/page"));
        assert_eq!(key1, key2);
    }

    #[test]
    fn test_request_key_normalizes_host_and_port() {
        let key1 = request_key(&Method::GET, &url("HTTPS://Example.COM:443/x"));
        let key2 = request_key(&Method::GET, &url("https://example.com/x"));
        assert_eq!(key1, key2);
    }

    #[test]
    fn test_request_key_keeps_query() {
        let key1 = request_key(&Method::GET, &url("https://example.com/x?lat=1"));
        let key2 = request_key(&Method::GET, &url("https://example.com/x?lat=2"));
        assert_ne!(key1, key2);
    }

    #[test]
    fn test_blob_name_deterministic() {
        assert_eq!(blob_name("GET https://a/"), blob_name("GET https://a/"));
        assert_ne!(blob_name("GET https://a/"), blob_name("GET https://b/"));
        assert_eq!(blob_name("x").len(), 64);
    }
}
