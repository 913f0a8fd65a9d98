pub mod circuit_breaker;
pub mod fallback;
pub mod health;
pub mod retry;

pub use circuit_breaker::CircuitBreaker;
pub use health::HealthChecker;
pub use retry::with_retry;

/// First 8 hex chars of the MD5 digest of an upstream URL, used as the
/// stable cache-key component for circuit-breaker and health-status entries.
pub fn url_hash8(url: &str) -> String {
    let digest = md5::compute(url.as_bytes());
    format!("{digest:x}")[..8].to_string()
}

#[cfg(test)]
mod hash_tests {
    use super::*;

    #[test]
    fn url_hash8_is_eight_hex_chars_and_stable() {
        let a = url_hash8("http://upstream-1:8080");
        let b = url_hash8("http://upstream-1:8080");
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_urls_produce_different_hashes() {
        assert_ne!(url_hash8("http://a"), url_hash8("http://b"));
    }
}
