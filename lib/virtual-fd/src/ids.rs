//! Core identifier types.

use core::sync::atomic::{AtomicU64, Ordering};

/// Identifier of an open descriptor inside a [`DescTable`](crate::DescTable).
///
/// Ids handed out by a table are always below `0x8000_0000`, so the raw value
/// can be handed to code that uses a signed integer (with negative values
/// meaning "no descriptor").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[repr(transparent)]
#[display("{_0}")]
pub struct DescId(pub u32);

impl DescId {
    /// Get the raw id value.
    #[inline]
    pub fn get(self) -> u32 {
        self.0
    }

    /// The id as a signed integer, as used by callers that reserve negative
    /// values for error codes. Ids outside the table range map to `-1`.
    #[inline]
    pub fn as_fd(self) -> i32 {
        i32::try_from(self.0).unwrap_or(-1)
    }
}

/// Identity of a [`DescTable`](crate::DescTable).
///
/// Descriptors keep one of these as a non-owning back-reference to the table
/// they were registered in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, derive_more::Display)]
#[repr(transparent)]
#[display("table#{_0}")]
pub struct ContextId(u64);

impl ContextId {
    pub(crate) fn next() -> Self {
        static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}
