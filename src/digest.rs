//! Content addressing for region and key names
//!
//! Arbitrary key and region strings are mapped to filesystem-safe,
//! bounded-length directory names by hashing. Digests are memoized in a
//! small bounded per-process cache so hot keys do not pay the hashing cost
//! on every operation.

use lru::LruCache;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// Region name used when the caller passes no region.
pub const DEFAULT_REGION: &str = "Default";

/// Fixed digest for the empty key.
///
/// A sentinel rather than `digest("")`, so an empty key can never collide
/// with a real key whose hash happens to match.
pub const EMPTY_KEY_DIGEST: &str = "00000000000000000000000000000000";

const DIGEST_BYTES: usize = 16;

/// Normalize a caller-supplied region name.
///
/// Empty or whitespace-only regions collapse to [`DEFAULT_REGION`], so every
/// spelling of "no region" shares one directory.
#[must_use]
pub fn normalize_region(region: Option<&str>) -> &str {
    match region {
        Some(region) if !region.trim().is_empty() => region,
        _ => DEFAULT_REGION,
    }
}

/// 128-bit hex digest of a name.
#[must_use]
pub fn digest(name: &str) -> String {
    if name.is_empty() {
        return EMPTY_KEY_DIGEST.to_string();
    }
    let hash = Sha256::digest(name.as_bytes());
    hex::encode(&hash[..DIGEST_BYTES])
}

struct MemoEntry {
    digest: String,
    cached_at: Instant,
}

/// Bounded, time-expiring memoization of [`digest`].
///
/// Thread-safe; concurrent readers from multiple threads share one cache per
/// process. Losing entries only costs a re-hash.
pub struct DigestCache {
    memo: RwLock<LruCache<String, MemoEntry>>,
    ttl: Duration,
}

impl DigestCache {
    const DEFAULT_CAPACITY: usize = 1024;
    const DEFAULT_TTL: Duration = Duration::from_secs(300);

    /// Create a cache with the given capacity and entry lifetime.
    ///
    /// A zero capacity falls back to the default.
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .unwrap_or(NonZeroUsize::new(Self::DEFAULT_CAPACITY).expect("default is non-zero"));
        Self {
            memo: RwLock::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Digest `name`, reusing a memoized result when it is still fresh.
    pub fn digest(&self, name: &str) -> String {
        {
            let mut memo = self.memo.write();
            if let Some(entry) = memo.get(name) {
                if entry.cached_at.elapsed() < self.ttl {
                    return entry.digest.clone();
                }
                memo.pop(name);
            }
        }

        let computed = digest(name);
        self.memo.write().put(
            name.to_string(),
            MemoEntry {
                digest: computed.clone(),
                cached_at: Instant::now(),
            },
        );
        computed
    }
}

impl Default for DigestCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY, Self::DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn digest_is_deterministic_and_bounded() {
        let a = digest("some-key");
        let b = digest("some-key");
        assert_eq!(a, b);
        assert_eq!(a.len(), DIGEST_BYTES * 2);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn long_keys_map_to_fixed_length() {
        let long_key = "k".repeat(10_000);
        assert_eq!(digest(&long_key).len(), DIGEST_BYTES * 2);
    }

    #[test]
    fn empty_key_uses_sentinel() {
        assert_eq!(digest(""), EMPTY_KEY_DIGEST);
        assert_ne!(digest(""), {
            let hash = Sha256::digest(b"");
            hex::encode(&hash[..DIGEST_BYTES])
        });
    }

    #[test]
    fn region_normalization() {
        assert_eq!(normalize_region(None), DEFAULT_REGION);
        assert_eq!(normalize_region(Some("")), DEFAULT_REGION);
        assert_eq!(normalize_region(Some("   ")), DEFAULT_REGION);
        assert_eq!(normalize_region(Some("users")), "users");
    }

    #[test]
    fn memo_returns_same_digest() {
        let cache = DigestCache::default();
        assert_eq!(cache.digest("key"), digest("key"));
        assert_eq!(cache.digest("key"), digest("key"));
    }

    #[test]
    fn memo_expires_entries() {
        let cache = DigestCache::new(8, Duration::from_millis(50));
        let first = cache.digest("key");
        thread::sleep(Duration::from_millis(80));
        // Stale entry is recomputed, not reused
        assert_eq!(cache.digest("key"), first);
    }

    #[test]
    fn memo_is_bounded() {
        let cache = DigestCache::new(2, Duration::from_secs(60));
        cache.digest("a");
        cache.digest("b");
        cache.digest("c");
        assert!(cache.memo.read().len() <= 2);
    }
}
