//! Disk-backed key/value cache shareable across processes
//!
//! An embeddable cache whose entries live as files under a common
//! filesystem root. Independent instances, whether threads or whole processes,
//! coordinate through nothing but that root:
//!
//! - every write is a brand-new immutable file whose name encodes its
//!   creation instant and policy, so the lexicographically greatest name is
//!   always the current value and writers never corrupt each other
//! - removal is two-phase: a tombstone sidecar hides the entry at once,
//!   physical deletion happens later under a grace period so in-flight
//!   reads are never cut off
//! - a background sweep retires superseded, tombstoned, and long-expired
//!   files
//! - a bounded in-process accelerator fronts the repository, its residency
//!   capped so cross-process staleness stays bounded too
//!
//! # Example
//!
//! ```no_run
//! use filecache::{Cache, CachePolicy, FileCache, Payload};
//!
//! # fn main() -> filecache::Result<()> {
//! let cache = FileCache::builder("/var/cache/myapp").build()?;
//! cache.set("greeting", None, &Payload::new("text.v1", b"hello".to_vec()),
//!           CachePolicy::Infinite)?;
//! assert!(cache.contains("greeting", None));
//! # Ok(())
//! # }
//! ```

pub mod accelerator;
pub mod digest;
pub mod engine;
pub mod entry;
mod error;
pub mod policy;
pub mod repo;
pub mod retry;
pub mod serializer;
pub mod sweeper;

// Re-export error types at crate root
pub use error::{Error, Result};

// Re-export main types
pub use accelerator::{Accelerator, LruAccelerator};
pub use engine::{Cache, FileCache, FileCacheBuilder};
pub use entry::{EntryHandle, EntryName};
pub use policy::CachePolicy;
pub use repo::{Repository, StoredEntry};
pub use serializer::{FramedCodec, Payload, PayloadCodec};
pub use sweeper::{CleanupSettings, CleanupSweeper};
