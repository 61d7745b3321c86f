//! Digest keys for cache entries.

use sha2::{Digest, Sha256};

/// Compute the storage key for a logical cache key.
///
/// Returns the lowercase hex SHA-256 of the key bytes (64 chars).
pub fn compute_cache_key(logical_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(logical_key.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_stability() {
        let hash1 = compute_cache_key("https://example.com");
        let hash2 = compute_cache_key("https://example.com");
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_different_payload() {
        let get = compute_cache_key("https://example.com/api");
        let post = compute_cache_key("https://example.com/api{\"page\":1}");
        assert_ne!(get, post);
    }

    #[test]
    fn test_hash_format() {
        let hash = compute_cache_key("https://example.com");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_hash_empty_key() {
        assert_eq!(
            compute_cache_key(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
