//! Backend-facing driver interface.
//!
//! A backend implements some subset of the operations below and advertises
//! which ones through [`IoBackend::capabilities`]. The table checks the
//! advertised set before every call, so the default method bodies are only
//! reached by a backend that lies about its capabilities.

use crate::flags::{BackendCapabilities, Perm, Whence};
use crate::{Desc, DescTable, VfdError, VfdResult};
use std::fmt;
use std::sync::{Arc, RwLock};

/// Arguments handed to [`IoBackend::open`].
pub struct OpenRequest<'a> {
    /// Table the new descriptor will be registered in. Backends allocate the
    /// record through [`DescTable::create`] or [`DescTable::allocate_bare`].
    pub table: &'a mut DescTable,
    /// The backend being asked to open, as resolved by the table.
    pub backend: &'a Arc<dyn IoBackend>,
    pub locator: &'a str,
    pub perm: Perm,
    pub mode: u32,
}

pub trait IoBackend: fmt::Debug + Send + Sync + 'static {
    /// Short driver name, used in diagnostics.
    fn name(&self) -> &str;

    fn capabilities(&self) -> BackendCapabilities;

    /// Whether the backend talks to a debugged process.
    fn is_debug(&self) -> bool {
        false
    }

    /// Whether this backend serves `locator`. Consulted by [`BackendRegistry`].
    fn accepts(&self, _locator: &str) -> bool {
        false
    }

    /// Builds a descriptor for `req.locator`. The returned record is
    /// registered by the table, which also fills in the backend, locator and
    /// display name if they were left empty.
    fn open(&self, _req: OpenRequest<'_>) -> VfdResult<Desc> {
        Err(VfdError::Unsupported)
    }

    /// Releases the resource behind `desc`, including its owner state.
    ///
    /// Returns `0` on success and a nonzero value on failure, the way
    /// `close(2)` does. This is the opposite polarity of the other boolean
    /// queries in this trait.
    fn close(&self, _desc: &mut Desc) -> i32 {
        -1
    }

    /// Reads at the backend's current position.
    fn read(&self, _desc: &mut Desc, _buf: &mut [u8]) -> VfdResult<usize> {
        Err(VfdError::Unsupported)
    }

    /// Writes at the backend's current position.
    fn write(&self, _desc: &mut Desc, _buf: &[u8]) -> VfdResult<usize> {
        Err(VfdError::Unsupported)
    }

    /// Moves the backend's position and returns the new absolute offset.
    fn seek(&self, _desc: &mut Desc, _offset: u64, _whence: Whence) -> VfdResult<u64> {
        Err(VfdError::Unsupported)
    }

    fn is_block_device(&self, _desc: &Desc) -> bool {
        false
    }

    /// Process id of the debuggee behind `desc`.
    fn owner_pid(&self, _desc: &Desc) -> i32 {
        -1
    }

    /// Thread id of the debuggee behind `desc`.
    fn owner_tid(&self, _desc: &Desc) -> i32 {
        -1
    }
}

/// Picks the backend that serves a locator.
pub trait BackendResolver: Send + Sync {
    fn resolve(&self, locator: &str) -> Option<Arc<dyn IoBackend>>;
}

/// Resolver asking each registered backend, in registration order, whether it
/// accepts the locator.
#[derive(Default)]
pub struct BackendRegistry {
    backends: RwLock<Vec<Arc<dyn IoBackend>>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, backend: Arc<dyn IoBackend>) -> VfdResult<()> {
        let mut backends = self
            .backends
            .write()
            .map_err(|_| VfdError::BackendFailure)?;
        if backends.iter().any(|b| b.name() == backend.name()) {
            return Err(VfdError::InvalidInput);
        }
        tracing::debug!(backend = backend.name(), "registered io backend");
        backends.push(backend);
        Ok(())
    }

    pub fn names(&self) -> Vec<String> {
        match self.backends.read() {
            Ok(backends) => backends.iter().map(|b| b.name().to_string()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl BackendResolver for BackendRegistry {
    fn resolve(&self, locator: &str) -> Option<Arc<dyn IoBackend>> {
        let backends = self.backends.read().ok()?;
        backends.iter().find(|b| b.accepts(locator)).cloned()
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.names())
            .finish()
    }
}
