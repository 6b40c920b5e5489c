//! In-process accelerator fronting the repository
//!
//! A bounded per-process cache of resolved entries, so hot reads skip the
//! directory scan and file copy. Residency is capped at `max_item_lifetime`
//! even for entries whose policy outlives it; that bound is what limits how
//! stale one process's view of another process's writes can become. Losing
//! the accelerator's contents is always harmless.

use crate::repo::StoredEntry;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use lru::LruCache;
use parking_lot::RwLock;
use std::num::NonZeroUsize;
use std::time::Duration;

/// In-memory facade over resolved cache entries.
///
/// Constructor-injected into the engine; implementations must tolerate
/// concurrent `get`/`put`/`remove` from multiple threads.
pub trait Accelerator: Send + Sync {
    /// Look up a resident entry.
    fn get(&self, key: &str, region: &str) -> Option<StoredEntry>;
    /// Make an entry resident. `expires_at` is the entry's policy
    /// expiration; `None` means the policy never expires. Implementations
    /// may evict sooner.
    fn put(&self, key: &str, region: &str, entry: StoredEntry, expires_at: Option<DateTime<Utc>>);
    /// Evict an entry.
    fn remove(&self, key: &str, region: &str);
}

struct Slot {
    entry: StoredEntry,
    expires_at: DateTime<Utc>,
}

/// Default [`Accelerator`]: thread-safe LRU with per-slot expiration capped
/// at `max_item_lifetime` from insertion.
pub struct LruAccelerator {
    slots: RwLock<LruCache<(String, String), Slot>>,
    max_item_lifetime: Duration,
}

impl LruAccelerator {
    /// Default capacity in entries.
    pub const DEFAULT_CAPACITY: usize = 1024;
    /// Default residency cap.
    pub const DEFAULT_MAX_ITEM_LIFETIME: Duration = Duration::from_secs(5);

    /// Create an accelerator with the given capacity and residency cap.
    ///
    /// A zero capacity falls back to the default.
    #[must_use]
    pub fn new(capacity: usize, max_item_lifetime: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .unwrap_or(NonZeroUsize::new(Self::DEFAULT_CAPACITY).expect("default is non-zero"));
        Self {
            slots: RwLock::new(LruCache::new(capacity)),
            max_item_lifetime,
        }
    }

    fn slot_key(key: &str, region: &str) -> (String, String) {
        (region.to_string(), key.to_string())
    }
}

impl Default for LruAccelerator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY, Self::DEFAULT_MAX_ITEM_LIFETIME)
    }
}

impl Accelerator for LruAccelerator {
    fn get(&self, key: &str, region: &str) -> Option<StoredEntry> {
        let slot_key = Self::slot_key(key, region);
        let mut slots = self.slots.write();
        if let Some(slot) = slots.get(&slot_key) {
            if Utc::now() < slot.expires_at {
                return Some(slot.entry.clone());
            }
            slots.pop(&slot_key);
        }
        None
    }

    fn put(&self, key: &str, region: &str, entry: StoredEntry, expires_at: Option<DateTime<Utc>>) {
        let lifetime_cap = Utc::now()
            + ChronoDuration::from_std(self.max_item_lifetime).unwrap_or(ChronoDuration::MAX);
        // Residency never exceeds the lifetime cap, whatever the policy says.
        let expires_at = match expires_at {
            Some(policy_expiry) => policy_expiry.min(lifetime_cap),
            None => lifetime_cap,
        };
        self.slots
            .write()
            .put(Self::slot_key(key, region), Slot { entry, expires_at });
    }

    fn remove(&self, key: &str, region: &str) {
        self.slots.write().pop(&Self::slot_key(key, region));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{EntryHandle, EntryName};
    use crate::policy::CachePolicy;
    use std::path::Path;
    use std::thread;

    fn entry(payload: &[u8]) -> StoredEntry {
        let name = EntryName::encode(Utc::now(), &CachePolicy::Infinite);
        StoredEntry {
            handle: EntryHandle::new(Path::new("/cache/r/k"), name),
            bytes: payload.to_vec(),
        }
    }

    #[test]
    fn basic_roundtrip() {
        let accel = LruAccelerator::default();
        accel.put("k", "r", entry(b"v"), None);
        assert_eq!(accel.get("k", "r").unwrap().bytes, b"v");
        assert!(accel.get("k", "other").is_none());
    }

    #[test]
    fn remove_evicts() {
        let accel = LruAccelerator::default();
        accel.put("k", "r", entry(b"v"), None);
        accel.remove("k", "r");
        assert!(accel.get("k", "r").is_none());
    }

    #[test]
    fn lifetime_cap_bounds_residency() {
        let accel = LruAccelerator::new(8, Duration::from_millis(50));
        // Policy expiry far in the future; residency cap still applies.
        let far = Utc::now() + ChronoDuration::days(365);
        accel.put("k", "r", entry(b"v"), Some(far));
        assert!(accel.get("k", "r").is_some());
        thread::sleep(Duration::from_millis(80));
        assert!(accel.get("k", "r").is_none());
    }

    #[test]
    fn policy_expiry_wins_when_sooner() {
        let accel = LruAccelerator::new(8, Duration::from_secs(60));
        let soon = Utc::now() + ChronoDuration::milliseconds(40);
        accel.put("k", "r", entry(b"v"), Some(soon));
        thread::sleep(Duration::from_millis(80));
        assert!(accel.get("k", "r").is_none());
    }

    #[test]
    fn capacity_is_bounded() {
        let accel = LruAccelerator::new(2, Duration::from_secs(60));
        accel.put("a", "r", entry(b"1"), None);
        accel.put("b", "r", entry(b"2"), None);
        accel.put("c", "r", entry(b"3"), None);
        assert!(accel.get("a", "r").is_none());
        assert!(accel.get("b", "r").is_some());
        assert!(accel.get("c", "r").is_some());
    }

    #[test]
    fn concurrent_access_does_not_corrupt() {
        let accel = std::sync::Arc::new(LruAccelerator::new(64, Duration::from_secs(60)));
        let mut threads = Vec::new();
        for t in 0..4 {
            let accel = std::sync::Arc::clone(&accel);
            threads.push(thread::spawn(move || {
                for i in 0..100 {
                    let key = format!("k{}", i % 8);
                    accel.put(&key, "r", entry(format!("{t}:{i}").as_bytes()), None);
                    let _ = accel.get(&key, "r");
                    if i % 10 == 0 {
                        accel.remove(&key, "r");
                    }
                }
            }));
        }
        for t in threads {
            t.join().unwrap();
        }
    }
}
