//! In-memory cache of hashed-but-uncommitted passwords.
//!
//! Entries live between `register` and a successful (or expired)
//! `verify_email_token`. Nothing is written to disk: a process restart drops
//! every pending registration, and the next verify attempt for those emails
//! fails with a credential cache miss.

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Prefix of every cache key.
const CACHE_KEY_PREFIX: &str = "verification_code:";

/// Derive the cache key for an email.
///
/// The email is hashed exactly as given; callers normalize beforehand.
pub fn cache_key(email: &str) -> String {
    let digest = Sha256::digest(email.as_bytes());
    format!("{CACHE_KEY_PREFIX}{}", hex::encode(digest))
}

/// Thread-safe map from cache key to pending password hash.
///
/// Each operation touches a single key; there is no cross-key atomicity.
#[derive(Debug, Default)]
pub struct PendingCredentialCache {
    entries: Mutex<HashMap<String, String>>,
}

impl PendingCredentialCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a hash, replacing any previous one for the key.
    pub fn put(&self, key: &str, password_hash: &str) {
        self.entries
            .lock()
            .insert(key.to_string(), password_hash.to_string());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    /// Remove an entry. Returns whether one was present.
    pub fn delete(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn cache_key_format() {
        let key = cache_key("a@x.com");
        assert!(key.starts_with("verification_code:"));
        // prefix + 64 hex chars
        assert_eq!(key.len(), CACHE_KEY_PREFIX.len() + 64);
        assert!(key[CACHE_KEY_PREFIX.len()..]
            .chars()
            .all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn cache_key_known_value() {
        // sha256("") is a fixed, published digest
        assert_eq!(
            cache_key(""),
            "verification_code:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn cache_key_is_deterministic() {
        assert_eq!(cache_key("a@x.com"), cache_key("a@x.com"));
    }

    #[test]
    fn cache_key_does_not_normalize() {
        assert_ne!(cache_key("a@x.com"), cache_key("A@x.com"));
        assert_ne!(cache_key("a@x.com"), cache_key(" a@x.com"));
    }

    #[test]
    fn cache_key_has_no_collisions_in_sample() {
        let mut rng = rand::thread_rng();
        let mut emails = HashSet::new();
        while emails.len() < 5_000 {
            let local: String = (0..rng.gen_range(1..16))
                .map(|_| rng.sample(rand::distributions::Alphanumeric) as char)
                .collect();
            emails.insert(format!("{local}@example.com"));
        }

        let keys: HashSet<_> = emails.iter().map(|e| cache_key(e)).collect();
        assert_eq!(keys.len(), emails.len());
    }

    #[test]
    fn put_overwrites_previous_value() {
        let cache = PendingCredentialCache::new();
        let key = cache_key("a@x.com");

        cache.put(&key, "first");
        cache.put(&key, "second");

        assert_eq!(cache.get(&key).as_deref(), Some("second"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn delete_is_idempotent() {
        let cache = PendingCredentialCache::new();
        cache.put("k", "v");

        assert!(cache.delete("k"));
        assert!(!cache.delete("k"));
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn instances_are_isolated() {
        let a = PendingCredentialCache::new();
        let b = PendingCredentialCache::new();
        a.put("k", "v");
        assert!(a.contains("k"));
        assert!(!b.contains("k"));
    }

    #[test]
    fn concurrent_access_from_many_threads() {
        let cache = Arc::new(PendingCredentialCache::new());

        std::thread::scope(|s| {
            for t in 0..8 {
                let cache = Arc::clone(&cache);
                s.spawn(move || {
                    for i in 0..500 {
                        let key = format!("user{t}-{i}");
                        cache.put(&key, "hash");
                        assert_eq!(cache.get(&key).as_deref(), Some("hash"));
                        if i % 2 == 0 {
                            cache.delete(&key);
                        }
                    }
                    // Contended key shared by every thread
                    cache.put("shared", &format!("thread{t}"));
                });
            }
        });

        assert_eq!(cache.len(), 8 * 250 + 1);
        assert!(cache.get("shared").unwrap().starts_with("thread"));
    }
}
