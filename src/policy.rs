//! Entry lifetime policies and expiration computation

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;

/// Lifetime rule attached to a cache entry.
///
/// The variants are mutually exclusive by construction, which encodes the
/// precedence order `NotRemovable` > absolute > sliding > infinite directly
/// in the type instead of evaluating record fields in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachePolicy {
    /// Never expires and is immune to explicit removal and cleanup deletion.
    NotRemovable,
    /// Valid until a fixed instant, irrespective of access.
    Absolute(DateTime<Utc>),
    /// Valid for a window that restarts on every read.
    Sliding(Duration),
    /// Never expires, but can be explicitly removed.
    Infinite,
}

impl CachePolicy {
    /// Compute the instant at which an entry under this policy expires.
    ///
    /// `last_access` is the most recent access time for sliding entries and
    /// is ignored by every other variant. `None` means the entry never
    /// expires. Pure; reads no clock.
    #[must_use]
    pub fn expires_at(&self, last_access: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::NotRemovable | Self::Infinite => None,
            Self::Absolute(instant) => Some(*instant),
            Self::Sliding(window) => {
                let window = ChronoDuration::from_std(*window).unwrap_or(ChronoDuration::MAX);
                last_access.checked_add_signed(window)
            }
        }
    }

    /// Whether an entry under this policy is expired at `now`.
    #[must_use]
    pub fn is_expired(&self, last_access: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.expires_at(last_access).is_some_and(|at| at < now)
    }

    /// Whether reads must refresh the entry's last-access time.
    #[must_use]
    pub fn is_sliding(&self) -> bool {
        matches!(self, Self::Sliding(_))
    }

    /// Whether the entry is immune to removal and cleanup.
    #[must_use]
    pub fn is_not_removable(&self) -> bool {
        matches!(self, Self::NotRemovable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn not_removable_never_expires() {
        let policy = CachePolicy::NotRemovable;
        assert_eq!(policy.expires_at(at(100)), None);
        assert!(!policy.is_expired(at(100), at(i64::from(i32::MAX))));
    }

    #[test]
    fn infinite_never_expires_but_is_removable() {
        let policy = CachePolicy::Infinite;
        assert_eq!(policy.expires_at(at(100)), None);
        assert!(!policy.is_not_removable());
    }

    #[test]
    fn absolute_ignores_access_time() {
        let policy = CachePolicy::Absolute(at(500));
        assert_eq!(policy.expires_at(at(100)), Some(at(500)));
        assert_eq!(policy.expires_at(at(499)), Some(at(500)));
        assert!(!policy.is_expired(at(0), at(500)));
        assert!(policy.is_expired(at(0), at(501)));
    }

    #[test]
    fn sliding_tracks_last_access() {
        let policy = CachePolicy::Sliding(Duration::from_secs(60));
        assert_eq!(policy.expires_at(at(100)), Some(at(160)));
        assert_eq!(policy.expires_at(at(200)), Some(at(260)));
        assert!(policy.is_expired(at(100), at(161)));
        assert!(!policy.is_expired(at(200), at(161)));
    }

    #[test]
    fn expiration_is_pure() {
        let policy = CachePolicy::Sliding(Duration::from_secs(5));
        let access = at(42);
        assert_eq!(policy.expires_at(access), policy.expires_at(access));
    }
}
