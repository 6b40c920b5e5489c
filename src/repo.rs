//! Filesystem repository for cache entries
//!
//! Maps `(region, key)` pairs to directories under a shared root:
//!
//! ```text
//! root/<digest(region)>/<digest(key)>/<encoded entry filename>
//! ```
//!
//! Every write lands as a brand-new immutable file, renamed into place from
//! a staging path, so concurrent writers from any number of processes never
//! corrupt each other. Deletion is two-phase: a tombstone sidecar first,
//! physical removal later by the cleanup sweep. Each hashed directory keeps
//! a small `.name` marker recording the literal region or key name so
//! enumeration can reverse the content addressing.

use crate::digest::DigestCache;
use crate::entry::{CACHE_EXTENSION, EntryHandle, EntryName};
use crate::error::{Error, Result};
use crate::policy::CachePolicy;
use crate::retry::{RetryConfig, with_retry};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

const NAME_MARKER: &str = ".name";

/// Reverse-lookup metadata stored alongside hashed directory names.
#[derive(Debug, Serialize, Deserialize)]
struct NameMarker {
    name: String,
}

/// A current entry resolved by [`Repository::read_current`]: the decoded
/// handle plus a full copy of the payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    /// Handle of the entry file the bytes were read from.
    pub handle: EntryHandle,
    /// Payload bytes.
    pub bytes: Vec<u8>,
}

/// Filesystem-backed entry store shared across processes.
///
/// All operations are synchronous, blocking filesystem calls. No lock guards
/// cross-process writers; correctness rests on immutable per-write files and
/// two-phase deletion.
pub struct Repository {
    root: PathBuf,
    digests: DigestCache,
    retry: RetryConfig,
    sweep_guard: Mutex<()>,
}

impl Repository {
    /// Open a repository at `root`, creating it if needed.
    ///
    /// # Errors
    ///
    /// An unusable root is a construction-time failure, never deferred to
    /// first use.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| Error::io(e, &root, "create_dir_all"))?;
        Ok(Self {
            root,
            digests: DigestCache::default(),
            retry: RetryConfig::default(),
            sweep_guard: Mutex::new(()),
        })
    }

    /// The filesystem root all entries live under.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn region_dir(&self, region: &str) -> PathBuf {
        self.root.join(self.digests.digest(region))
    }

    fn key_dir(&self, key: &str, region: &str) -> PathBuf {
        self.region_dir(region).join(self.digests.digest(key))
    }

    fn ensure_marked_dir(&self, dir: &Path, literal: &str) -> Result<()> {
        fs::create_dir_all(dir).map_err(|e| Error::io(e, dir, "create_dir_all"))?;
        let marker = dir.join(NAME_MARKER);
        if !marker.exists() {
            let json = serde_json::to_vec(&NameMarker {
                name: literal.to_string(),
            })
            .map_err(|e| Error::serialization(format!("failed to encode name marker: {e}")))?;
            fs::write(&marker, json).map_err(|e| Error::io(e, &marker, "write"))?;
        }
        Ok(())
    }

    fn read_marker(dir: &Path) -> Option<String> {
        let content = fs::read(dir.join(NAME_MARKER)).ok()?;
        let marker: NameMarker = serde_json::from_slice(&content).ok()?;
        Some(marker.name)
    }

    /// List hashed subdirectories of `parent`, reversed through their
    /// markers. Directories without a readable marker are skipped.
    fn enumerate_marked_dirs(parent: &Path) -> Vec<String> {
        let Ok(entries) = fs::read_dir(parent) else {
            return Vec::new();
        };
        let mut names = Vec::new();
        for entry in entries.filter_map(std::result::Result::ok) {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if let Some(name) = Self::read_marker(&path) {
                names.push(name);
            }
        }
        names.sort();
        names
    }

    /// Literal names of all known regions.
    #[must_use]
    pub fn enumerate_regions(&self) -> Vec<String> {
        Self::enumerate_marked_dirs(&self.root)
    }

    /// Literal names of all known keys in `region`.
    #[must_use]
    pub fn enumerate_keys(&self, region: &str) -> Vec<String> {
        Self::enumerate_marked_dirs(&self.region_dir(region))
    }

    /// Candidate entry files for a key, newest first.
    ///
    /// Filenames that do not decode are noise (staging files, sidecars,
    /// foreign debris) and are skipped, never fatal.
    pub fn enumerate_entries(&self, key: &str, region: &str) -> Result<Vec<EntryHandle>> {
        let dir = self.key_dir(key, region);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(e, &dir, "read_dir")),
        };

        let mut handles = Vec::new();
        for entry in entries.filter_map(std::result::Result::ok) {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if !name.ends_with(CACHE_EXTENSION) {
                continue;
            }
            match EntryName::parse(name) {
                Ok(parsed) => handles.push(EntryHandle::new(&dir, parsed)),
                Err(e) => {
                    tracing::debug!(file = name, "skipping malformed entry name: {e}");
                }
            }
        }
        // Newest first; name order is chronological by construction.
        handles.sort_by(|a, b| b.name.name.cmp(&a.name.name));
        Ok(handles)
    }

    /// Write a new immutable entry for `(region, key)`.
    ///
    /// The payload is staged next to its final location and renamed into
    /// place, so a concurrent reader either sees the whole entry or none of
    /// it. Transient failures are retried on a fixed budget before the error
    /// propagates.
    pub fn write(
        &self,
        key: &str,
        region: &str,
        bytes: &[u8],
        policy: &CachePolicy,
    ) -> Result<EntryHandle> {
        self.ensure_marked_dir(&self.region_dir(region), region)?;
        let dir = self.key_dir(key, region);
        self.ensure_marked_dir(&dir, key)?;

        let encoded = EntryName::encode(Utc::now(), policy);
        let handle = EntryHandle::new(&dir, encoded);
        let staging = handle.path.with_extension("tmp");

        with_retry(&self.retry, || {
            let mut file =
                fs::File::create(&staging).map_err(|e| Error::io(e, &staging, "create"))?;
            file.write_all(bytes)
                .map_err(|e| Error::io(e, &staging, "write"))?;
            file.sync_all()
                .map_err(|e| Error::io(e, &staging, "sync"))?;
            drop(file);
            fs::rename(&staging, &handle.path).map_err(|e| Error::io(e, &handle.path, "rename"))
        })?;

        Ok(handle)
    }

    /// Read the full payload of an entry.
    pub fn read(&self, handle: &EntryHandle) -> Result<Vec<u8>> {
        fs::read(&handle.path).map_err(|e| Error::io(e, &handle.path, "read"))
    }

    /// Resolve the current valid entry for `(region, key)` at `now`.
    ///
    /// The winner is the lexicographically greatest entry file; `None` when
    /// there is no entry, the winner is tombstoned, it has expired, or its
    /// file vanished between enumeration and read (a sweep race, treated as
    /// a miss).
    pub fn read_current(
        &self,
        key: &str,
        region: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<StoredEntry>> {
        let Some(handle) = self.enumerate_entries(key, region)?.into_iter().next() else {
            return Ok(None);
        };
        if self.is_deleted(&handle) {
            return Ok(None);
        }

        let last_access = if handle.policy().is_sliding() {
            self.last_access_time(&handle)
        } else {
            now
        };
        if handle.policy().is_expired(last_access, now) {
            return Ok(None);
        }

        match self.read(&handle) {
            Ok(bytes) => Ok(Some(StoredEntry { handle, bytes })),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Soft-delete an entry by dropping a tombstone sidecar next to it.
    ///
    /// The entry file itself is untouched; physical removal is the sweep's
    /// job.
    pub fn mark_deleted(&self, handle: &EntryHandle) -> Result<()> {
        let tombstone = handle.tombstone_path();
        fs::write(&tombstone, []).map_err(|e| Error::io(e, &tombstone, "write"))
    }

    /// Whether an entry carries a tombstone.
    #[must_use]
    pub fn is_deleted(&self, handle: &EntryHandle) -> bool {
        handle.tombstone_path().exists()
    }

    /// Last access time of an entry.
    ///
    /// Falls back to the creation timestamp encoded in the entry name when
    /// no access has been recorded yet.
    #[must_use]
    pub fn last_access_time(&self, handle: &EntryHandle) -> DateTime<Utc> {
        fs::read_to_string(handle.access_time_path())
            .ok()
            .and_then(|text| text.trim().parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or(handle.name.timestamp)
    }

    /// Record an access at `time`.
    ///
    /// The record is a sidecar file visible to every instance sharing the
    /// root. Access time is monotonically non-decreasing; an older `time`
    /// than the recorded one is a no-op.
    pub fn set_last_access_time(&self, handle: &EntryHandle, time: DateTime<Utc>) -> Result<()> {
        if time < self.last_access_time(handle) {
            return Ok(());
        }
        let path = handle.access_time_path();
        fs::write(&path, time.timestamp_millis().to_string())
            .map_err(|e| Error::io(e, &path, "write"))
    }

    /// Physically delete entry files and their sidecars. Best effort: used
    /// only by the sweep, individual failures are logged and retried on the
    /// next pass.
    pub fn delete_files(&self, handles: &[EntryHandle]) {
        for handle in handles {
            for path in [
                handle.path.clone(),
                handle.tombstone_path(),
                handle.access_time_path(),
            ] {
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        tracing::warn!(path = %path.display(), "failed to delete cache file: {e}");
                    }
                }
            }
            tracing::debug!(entry = %handle.name.name, "deleted obsolete cache entry");
        }
    }

    /// One cleanup pass over the whole repository.
    ///
    /// Per key, everything older than the newest entry is obsolete. The
    /// newest entry joins the obsolete set when it is tombstoned or has been
    /// expired for longer than `grace`; `NotRemovable` winners are exempt.
    /// `grace` of `None` keeps expired current entries forever. Emptied key
    /// and region directories are removed.
    ///
    /// Guarded by a process-local mutex so sweeps within one process never
    /// overlap; races with sweeps in other processes resolve through
    /// idempotent, failure-swallowing deletes.
    pub fn sweep(&self, grace: Option<Duration>) {
        let _guard = self.sweep_guard.lock();
        let now = Utc::now();

        for region in self.enumerate_regions() {
            for key in self.enumerate_keys(&region) {
                self.sweep_key(&key, &region, now, grace);
            }
            self.cleanup_region_dir(&self.region_dir(&region));
        }
    }

    fn sweep_key(&self, key: &str, region: &str, now: DateTime<Utc>, grace: Option<Duration>) {
        let key_dir = self.key_dir(key, region);
        let Ok(mut entries) = self.enumerate_entries(key, region) else {
            return;
        };
        if entries.is_empty() {
            self.cleanup_key_dir(&key_dir);
            return;
        }

        let winner = entries.remove(0);
        let mut obsolete = entries;

        if !winner.policy().is_not_removable() {
            if self.is_deleted(&winner) {
                obsolete.push(winner);
            } else if let Some(grace) = grace {
                let last_access = if winner.policy().is_sliding() {
                    self.last_access_time(&winner)
                } else {
                    now
                };
                let past_grace = winner
                    .policy()
                    .expires_at(last_access)
                    .and_then(|at| chrono::Duration::from_std(grace).ok().map(|g| at + g))
                    .is_some_and(|deadline| deadline < now);
                if past_grace {
                    obsolete.push(winner);
                }
            }
        }

        self.delete_files(&obsolete);
        self.cleanup_key_dir(&key_dir);
    }

    /// Remove a key directory once no entry files remain in it, clearing the
    /// marker and any orphaned sidecars first.
    fn cleanup_key_dir(&self, dir: &Path) {
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        let mut leftovers = Vec::new();
        for entry in entries.filter_map(std::result::Result::ok) {
            let name = entry.file_name();
            if name
                .to_str()
                .is_some_and(|n| EntryName::parse(n).is_ok() || n.ends_with(".tmp"))
            {
                // Live entry or in-flight write; directory stays.
                return;
            }
            leftovers.push(entry.path());
        }
        for path in leftovers {
            let _ = fs::remove_file(&path);
        }
        let _ = fs::remove_dir(dir);
    }

    /// Remove a region directory once it has no key directories left.
    fn cleanup_region_dir(&self, dir: &Path) {
        let Ok(mut entries) = fs::read_dir(dir) else {
            return;
        };
        if entries.any(|e| e.is_ok_and(|e| e.path().is_dir())) {
            return;
        }
        let _ = fs::remove_file(dir.join(NAME_MARKER));
        let _ = fs::remove_dir(dir);
    }
}
