//! Cache engine orchestrating the accelerator, repository, and codec
//!
//! Each operation is a short synchronous protocol over the collaborators;
//! no long-lived state machine. Read paths never surface storage faults: a
//! cache is optional infrastructure, so anything that goes wrong on a read
//! collapses to a miss and the caller recomputes.

use crate::accelerator::{Accelerator, LruAccelerator};
use crate::digest::normalize_region;
use crate::error::Result;
use crate::policy::CachePolicy;
use crate::repo::{Repository, StoredEntry};
use crate::serializer::{FramedCodec, Payload, PayloadCodec};
use crate::sweeper::{CleanupSettings, CleanupSweeper};
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Generic cache call surface.
///
/// `region` of `None` (or an empty string) addresses the default region.
pub trait Cache {
    /// Fetch the current value for a key, or `None` on any kind of miss.
    fn get(&self, key: &str, region: Option<&str>) -> Option<Payload>;
    /// Store a value under a policy. Errors only after the write retry
    /// budget is exhausted.
    fn set(
        &self,
        key: &str,
        region: Option<&str>,
        payload: &Payload,
        policy: CachePolicy,
    ) -> Result<()>;
    /// Soft-delete the current entry and return its previous value. A
    /// missing or `NotRemovable` entry is a no-op returning `None`.
    fn remove(&self, key: &str, region: Option<&str>) -> Option<Payload>;
    /// Whether a current, valid value exists for the key.
    fn contains(&self, key: &str, region: Option<&str>) -> bool;
    /// Fetch several keys at once; misses are simply absent from the map.
    fn get_values(&self, keys: &[&str], region: Option<&str>) -> BTreeMap<String, Payload>;
    /// Remove every removable entry in every region. Administrative and
    /// non-atomic.
    fn clear(&self);
}

/// Disk-backed cache engine.
///
/// Instances in the same or different processes may share one repository
/// root; consistency between them is eventual, bounded by the accelerator's
/// `max_item_lifetime`.
pub struct FileCache {
    repo: Arc<Repository>,
    accelerator: Box<dyn Accelerator>,
    codec: Box<dyn PayloadCodec>,
    // Held for its Drop: stops the background sweep and runs a final pass.
    _sweeper: Option<CleanupSweeper>,
}

impl FileCache {
    /// Builder with defaults.
    #[must_use]
    pub fn builder(root: impl Into<PathBuf>) -> FileCacheBuilder {
        FileCacheBuilder::new(root)
    }

    /// The shared repository this engine reads and writes.
    #[must_use]
    pub fn repository(&self) -> &Arc<Repository> {
        &self.repo
    }

    /// Store `payload` unless the key already holds a value, returning
    /// whichever value ends up visible.
    pub fn add_or_get_existing(
        &self,
        key: &str,
        region: Option<&str>,
        payload: &Payload,
        policy: CachePolicy,
    ) -> Result<Payload> {
        if let Some(existing) = self.get(key, region) {
            return Ok(existing);
        }
        self.set(key, region, payload, policy)?;
        Ok(payload.clone())
    }

    /// Number of keys with a currently retrievable value in `region`.
    #[must_use]
    pub fn count(&self, region: Option<&str>) -> usize {
        let region = normalize_region(region);
        let keys = self.repo.enumerate_keys(region);
        keys.iter()
            .filter(|key| self.contains(key.as_str(), Some(region)))
            .count()
    }

    /// Resolve the current entry from the repository, refreshing access
    /// time for sliding entries and repopulating the accelerator. Any
    /// failure is a miss.
    fn resolve(&self, key: &str, region: &str) -> Option<StoredEntry> {
        let now = Utc::now();
        match self.repo.read_current(key, region, now) {
            Ok(Some(entry)) => {
                if entry.handle.policy().is_sliding() {
                    if let Err(e) = self.repo.set_last_access_time(&entry.handle, now) {
                        tracing::debug!(key, "failed to refresh access time: {e}");
                    }
                }
                let expires_at = entry.handle.policy().expires_at(now);
                self.accelerator.put(key, region, entry.clone(), expires_at);
                Some(entry)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(key, region, "read failed, treating as miss: {e}");
                None
            }
        }
    }

    fn decode(&self, entry: &StoredEntry) -> Option<Payload> {
        match self.codec.decode(&entry.bytes) {
            Ok(payload) => Some(payload),
            Err(e) => {
                tracing::debug!(entry = %entry.handle.name.name, "undecodable payload, treating as miss: {e}");
                None
            }
        }
    }
}

impl Cache for FileCache {
    fn get(&self, key: &str, region: Option<&str>) -> Option<Payload> {
        let region = normalize_region(region);
        if let Some(entry) = self.accelerator.get(key, region) {
            if entry.handle.policy().is_sliding() {
                if let Err(e) = self.repo.set_last_access_time(&entry.handle, Utc::now()) {
                    tracing::debug!(key, "failed to refresh access time: {e}");
                }
            }
            return self.decode(&entry);
        }
        self.resolve(key, region)
            .and_then(|entry| self.decode(&entry))
    }

    fn set(
        &self,
        key: &str,
        region: Option<&str>,
        payload: &Payload,
        policy: CachePolicy,
    ) -> Result<()> {
        let region = normalize_region(region);
        let now = Utc::now();
        let bytes = self.codec.encode(payload)?;
        // The creation timestamp in the entry name doubles as the initial
        // access time; the sidecar appears on first read.
        let handle = self.repo.write(key, region, &bytes, &policy)?;
        let expires_at = policy.expires_at(now);
        self.accelerator
            .put(key, region, StoredEntry { handle, bytes }, expires_at);
        Ok(())
    }

    fn remove(&self, key: &str, region: Option<&str>) -> Option<Payload> {
        let region = normalize_region(region);
        let entry = self.resolve(key, region)?;
        if entry.handle.policy().is_not_removable() {
            return None;
        }
        if let Err(e) = self.repo.mark_deleted(&entry.handle) {
            tracing::debug!(key, region, "failed to tombstone entry: {e}");
            return None;
        }
        self.accelerator.remove(key, region);
        self.decode(&entry)
    }

    fn contains(&self, key: &str, region: Option<&str>) -> bool {
        self.get(key, region).is_some()
    }

    fn get_values(&self, keys: &[&str], region: Option<&str>) -> BTreeMap<String, Payload> {
        let mut values = BTreeMap::new();
        for key in keys {
            if values.contains_key(*key) {
                continue;
            }
            if let Some(payload) = self.get(key, region) {
                values.insert((*key).to_string(), payload);
            }
        }
        values
    }

    fn clear(&self) {
        for region in self.repo.enumerate_regions() {
            for key in self.repo.enumerate_keys(&region) {
                self.remove(&key, Some(&region));
            }
        }
    }
}

/// Builder for [`FileCache`].
pub struct FileCacheBuilder {
    root: PathBuf,
    cleanup: CleanupSettings,
    accelerator: Option<Box<dyn Accelerator>>,
    accelerator_capacity: usize,
    max_item_lifetime: Duration,
    codec: Option<Box<dyn PayloadCodec>>,
}

impl FileCacheBuilder {
    /// Start a builder for a cache rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cleanup: CleanupSettings::default(),
            accelerator: None,
            accelerator_capacity: LruAccelerator::DEFAULT_CAPACITY,
            max_item_lifetime: LruAccelerator::DEFAULT_MAX_ITEM_LIFETIME,
            codec: None,
        }
    }

    /// Replace the cleanup schedule.
    #[must_use]
    pub fn cleanup(mut self, settings: CleanupSettings) -> Self {
        self.cleanup = settings;
        self
    }

    /// Cap on accelerator residency; bounds cross-instance staleness.
    #[must_use]
    pub fn max_item_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_item_lifetime = lifetime;
        self
    }

    /// Accelerator capacity in entries (ignored with a custom accelerator).
    #[must_use]
    pub fn accelerator_capacity(mut self, capacity: usize) -> Self {
        self.accelerator_capacity = capacity;
        self
    }

    /// Inject a custom accelerator.
    #[must_use]
    pub fn accelerator(mut self, accelerator: Box<dyn Accelerator>) -> Self {
        self.accelerator = Some(accelerator);
        self
    }

    /// Inject a custom payload codec.
    #[must_use]
    pub fn codec(mut self, codec: Box<dyn PayloadCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Build the engine, validating the root eagerly.
    ///
    /// # Errors
    ///
    /// Fails when the root cannot be created or written.
    pub fn build(self) -> Result<FileCache> {
        let repo = Arc::new(Repository::new(self.root)?);
        let sweeper = if self.cleanup.cleanup_period.is_some() {
            Some(CleanupSweeper::start(Arc::clone(&repo), &self.cleanup)?)
        } else {
            None
        };
        let accelerator = self.accelerator.unwrap_or_else(|| {
            Box::new(LruAccelerator::new(
                self.accelerator_capacity,
                self.max_item_lifetime,
            ))
        });
        let codec = self.codec.unwrap_or_else(|| Box::new(FramedCodec));
        Ok(FileCache {
            repo,
            accelerator,
            codec,
            _sweeper: sweeper,
        })
    }
}
