//! Debuggee introspection through debug-capable backends.

use crate::flags::BackendCapabilities;
use crate::ids::DescId;
use crate::{Desc, DescTable, IoBackend};
use std::sync::Arc;
use thiserror::Error;

/// Why an owner pid/tid query produced no id. Each case maps to a distinct
/// negative code; `-1` and `-2` are left to the backends.
#[derive(Error, Copy, Clone, Debug, PartialEq, Eq)]
pub enum OwnerQueryError {
    #[error("no such descriptor")]
    NoDesc,
    #[error("descriptor has no backend")]
    NoBackend,
    #[error("backend is not a debug backend")]
    NotDebug,
    #[error("backend does not report owner ids")]
    Unsupported,
}

impl OwnerQueryError {
    pub fn code(self) -> i32 {
        match self {
            OwnerQueryError::NoDesc => -3,
            OwnerQueryError::NoBackend => -4,
            OwnerQueryError::NotDebug => -5,
            OwnerQueryError::Unsupported => -6,
        }
    }
}

impl DescTable {
    /// Whether the descriptor is served by a debug backend.
    pub fn is_debug(&self, id: DescId) -> bool {
        self.get(id)
            .and_then(Desc::backend)
            .map(|backend| backend.is_debug())
            .unwrap_or(false)
    }

    /// Process id of the debuggee behind the descriptor.
    pub fn owner_pid(&self, id: DescId) -> Result<i32, OwnerQueryError> {
        let (desc, backend) = self.debug_backend(id, BackendCapabilities::OWNER_PID)?;
        Ok(backend.owner_pid(desc))
    }

    /// Thread id of the debuggee behind the descriptor.
    pub fn owner_tid(&self, id: DescId) -> Result<i32, OwnerQueryError> {
        let (desc, backend) = self.debug_backend(id, BackendCapabilities::OWNER_TID)?;
        Ok(backend.owner_tid(desc))
    }

    /// [`DescTable::owner_pid`] with failures folded into the negative codes.
    pub fn owner_pid_raw(&self, id: DescId) -> i32 {
        self.owner_pid(id).unwrap_or_else(OwnerQueryError::code)
    }

    /// [`DescTable::owner_tid`] with failures folded into the negative codes.
    pub fn owner_tid_raw(&self, id: DescId) -> i32 {
        self.owner_tid(id).unwrap_or_else(OwnerQueryError::code)
    }

    fn debug_backend(
        &self,
        id: DescId,
        cap: BackendCapabilities,
    ) -> Result<(&Desc, &Arc<dyn IoBackend>), OwnerQueryError> {
        let desc = self.get(id).ok_or(OwnerQueryError::NoDesc)?;
        let backend = desc.backend().ok_or(OwnerQueryError::NoBackend)?;
        if !backend.is_debug() {
            return Err(OwnerQueryError::NotDebug);
        }
        if !backend.capabilities().contains(cap) {
            return Err(OwnerQueryError::Unsupported);
        }
        Ok((desc, backend))
    }
}
