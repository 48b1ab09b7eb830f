//! Virtual file descriptors.
//!
//! A [`DescTable`] hands out small integer ids for resources served by
//! pluggable [`IoBackend`] drivers (files, devices, debugged processes,
//! in-memory buffers...) and exposes one read/write/seek contract over all of
//! them. An optional per-descriptor [`CacheOverlay`] lets callers "write" to a
//! target without mutating it.
//!
//! The table is single-threaded: callers sharing it across threads must
//! serialize access themselves.

pub mod backend;
#[cfg(feature = "mem-backend")]
pub mod backends;
pub mod cache;
pub mod config;
mod debug;
pub mod desc;
mod exchange;
pub mod flags;
pub mod ids;
mod io;
pub mod map;
pub mod slots;
pub mod table;

pub use backend::{BackendRegistry, BackendResolver, IoBackend, OpenRequest};
pub use cache::CacheOverlay;
pub use config::DescTableConfig;
pub use debug::OwnerQueryError;
pub use desc::{Desc, OwnerState};
pub use flags::{BackendCapabilities, Perm, Whence};
pub use ids::{ContextId, DescId};
pub use map::{CleanupHook, IoMap, MapList};
pub use slots::IdSlots;
pub use table::DescTable;

use thiserror::Error;

pub type VfdResult<T> = std::result::Result<T, VfdError>;

/// Returned by [`DescTable::seek`] when the seek could not be performed.
pub const SEEK_FAILED: u64 = u64::MAX;

/// Returned by [`DescTable::size`] for block devices, whose size is not probed.
pub const SIZE_UNBOUNDED: u64 = u64::MAX;

/// Lowest id handed out by a default table. `0..=2` stay free for the
/// standard streams.
pub const DEFAULT_FIRST_ID: u32 = 3;

/// Exclusive upper bound of the id space; every id fits in a non-negative `i32`.
pub const ID_CEILING: u32 = 0x8000_0000;

/// Error type for external users
#[derive(Error, Copy, Clone, Debug, PartialEq, Eq)]
pub enum VfdError {
    /// Every id of the table's range is in use
    #[error("descriptor ids exhausted")]
    Exhausted,
    /// No live descriptor is registered under the given id
    #[error("invalid descriptor")]
    InvalidDesc,
    /// The record was not created by this table's allocator
    #[error("descriptor not owned by this table")]
    NotOwned,
    /// The descriptor has no backend attached
    #[error("descriptor has no backend")]
    NoBackend,
    /// No registered backend accepts the locator
    #[error("no backend for locator")]
    NoResolver,
    /// The backend does not implement the requested operation
    #[error("operation not supported by backend")]
    Unsupported,
    /// The descriptor's permissions forbid the operation
    #[error("permission denied")]
    PermissionDenied,
    /// The backend attempted the operation and failed
    #[error("backend failure")]
    BackendFailure,
    /// The provided data is invalid
    #[error("invalid input")]
    InvalidInput,
}
