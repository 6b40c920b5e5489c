//! Entry filename codec
//!
//! Every write produces one immutable file whose name encodes the creation
//! instant, the full policy, and a random disambiguator:
//!
//! ```text
//! <ts:016X>.<sliding-ms:016X>.<absolute-ms:016X>.<priority>.<seed>.cache
//! ```
//!
//! Timestamps are fixed-width most-significant-first hex, so lexicographic
//! ordering of names equals chronological ordering and picking the current
//! entry never requires opening file contents.

use crate::error::{Error, Result};
use crate::policy::CachePolicy;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Extension shared by all entry files.
pub const CACHE_EXTENSION: &str = "cache";

const TOKEN_COUNT: usize = 6;
const HEX_WIDTH: usize = 16;
const SEED_LEN: usize = 4;

/// Suffix of the soft-delete sidecar next to an entry file.
pub const TOMBSTONE_SUFFIX: &str = "deleted";

/// Suffix of the last-access-time sidecar next to an entry file.
pub const ACCESS_TIME_SUFFIX: &str = "atime";

/// A decoded entry filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryName {
    /// The encoded filename, including extension.
    pub name: String,
    /// Creation instant encoded in the name.
    pub timestamp: DateTime<Utc>,
    /// Policy reconstructed from the name.
    pub policy: CachePolicy,
}

impl EntryName {
    /// Encode a new entry filename for `timestamp` and `policy`.
    ///
    /// The seed token is random and carries no meaning beyond preventing
    /// collisions between writers landing at the same millisecond.
    #[must_use]
    pub fn encode(timestamp: DateTime<Utc>, policy: &CachePolicy) -> Self {
        let ts_ms = epoch_millis(timestamp);
        let (sliding_ms, absolute_ms, priority) = match policy {
            CachePolicy::NotRemovable => (0, 0, 1),
            CachePolicy::Absolute(at) => (0, epoch_millis(*at), 0),
            CachePolicy::Sliding(window) => (duration_millis(*window), 0, 0),
            CachePolicy::Infinite => (0, 0, 0),
        };
        let seed_source = uuid::Uuid::new_v4().simple().to_string();
        let seed = &seed_source[..SEED_LEN];
        let name = format!(
            "{ts_ms:016X}.{sliding_ms:016X}.{absolute_ms:016X}.{priority}.{seed}.{CACHE_EXTENSION}"
        );
        Self {
            name,
            timestamp,
            policy: policy.clone(),
        }
    }

    /// Decode an entry filename.
    ///
    /// # Errors
    ///
    /// Returns a [`Error::Serialization`] on wrong token count, wrong
    /// extension, or an unparseable field. Callers enumerating directories
    /// treat that as noise and skip the file.
    pub fn parse(name: &str) -> Result<Self> {
        let tokens: Vec<&str> = name.split('.').collect();
        if tokens.len() != TOKEN_COUNT {
            return Err(Error::serialization(format!(
                "invalid entry name {name:?}: expected {TOKEN_COUNT} dot separated tokens"
            )));
        }
        if tokens[TOKEN_COUNT - 1] != CACHE_EXTENSION {
            return Err(Error::serialization(format!(
                "invalid entry name {name:?}: expected .{CACHE_EXTENSION} extension"
            )));
        }

        let ts_ms = parse_hex(name, tokens[0])?;
        let sliding_ms = parse_hex(name, tokens[1])?;
        let absolute_ms = parse_hex(name, tokens[2])?;
        if tokens[3].len() != 1 {
            return Err(Error::serialization(format!(
                "invalid priority token in {name:?}"
            )));
        }
        let priority: u8 = tokens[3]
            .parse()
            .map_err(|_| Error::serialization(format!("invalid priority token in {name:?}")))?;

        let timestamp = from_epoch_millis(name, ts_ms)?;

        // Precedence: NotRemovable > absolute > sliding > infinite.
        let policy = if priority == 1 {
            CachePolicy::NotRemovable
        } else if absolute_ms != 0 {
            CachePolicy::Absolute(from_epoch_millis(name, absolute_ms)?)
        } else if sliding_ms != 0 {
            CachePolicy::Sliding(Duration::from_millis(sliding_ms))
        } else {
            CachePolicy::Infinite
        };

        Ok(Self {
            name: name.to_string(),
            timestamp,
            policy,
        })
    }
}

/// A decoded entry name bound to its on-disk location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHandle {
    /// Absolute path of the entry file.
    pub path: PathBuf,
    /// Decoded filename.
    pub name: EntryName,
}

impl EntryHandle {
    /// Bind a decoded name to the directory holding its file.
    #[must_use]
    pub fn new(directory: &Path, name: EntryName) -> Self {
        Self {
            path: directory.join(&name.name),
            name,
        }
    }

    /// Path of the soft-delete sidecar for this entry.
    #[must_use]
    pub fn tombstone_path(&self) -> PathBuf {
        sidecar(&self.path, TOMBSTONE_SUFFIX)
    }

    /// Path of the last-access-time sidecar for this entry.
    #[must_use]
    pub fn access_time_path(&self) -> PathBuf {
        sidecar(&self.path, ACCESS_TIME_SUFFIX)
    }

    /// Policy encoded in the entry name.
    #[must_use]
    pub fn policy(&self) -> &CachePolicy {
        &self.name.policy
    }
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

fn epoch_millis(instant: DateTime<Utc>) -> u64 {
    u64::try_from(instant.timestamp_millis()).unwrap_or(0)
}

fn duration_millis(window: Duration) -> u64 {
    u64::try_from(window.as_millis()).unwrap_or(u64::MAX)
}

// Unpadded hex would break the lexicographic-equals-chronological ordering
// guarantee, so anything but the fixed width is rejected as foreign.
fn parse_hex(name: &str, token: &str) -> Result<u64> {
    if token.len() != HEX_WIDTH {
        return Err(Error::serialization(format!(
            "invalid hex token {token:?} in {name:?}: expected {HEX_WIDTH} digits"
        )));
    }
    u64::from_str_radix(token, 16)
        .map_err(|_| Error::serialization(format!("invalid hex token {token:?} in {name:?}")))
}

fn from_epoch_millis(name: &str, millis: u64) -> Result<DateTime<Utc>> {
    let millis = i64::try_from(millis)
        .map_err(|_| Error::serialization(format!("timestamp out of range in {name:?}")))?;
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| Error::serialization(format!("timestamp out of range in {name:?}")))
}
