//! The per-resource descriptor record.

use crate::cache::CacheOverlay;
use crate::flags::Perm;
use crate::ids::{ContextId, DescId};
use crate::IoBackend;
use std::any::Any;
use std::sync::Arc;

/// Driver-owned payload attached to a descriptor. Backends release it in
/// their `close` implementation.
pub type OwnerState = Box<dyn Any + Send>;

/// One open resource.
///
/// Records are created by a [`DescTable`](crate::DescTable), which assigns the
/// id, and become reachable through the table once registered.
#[derive(derive_more::Debug)]
pub struct Desc {
    pub(crate) id: DescId,
    pub(crate) context: Option<ContextId>,
    pub(crate) backend: Option<Arc<dyn IoBackend>>,
    #[debug(ignore)]
    state: Option<OwnerState>,
    perm: Perm,
    mode: u32,
    pub(crate) locator: Option<String>,
    pub(crate) display_name: Option<String>,
    referrer: Option<String>,
    #[debug(ignore)]
    pub(crate) cache: CacheOverlay,
}

impl Desc {
    pub(crate) fn new(
        id: DescId,
        context: ContextId,
        backend: Option<Arc<dyn IoBackend>>,
        locator: Option<String>,
        perm: Perm,
        mode: u32,
        state: Option<OwnerState>,
    ) -> Self {
        Self {
            id,
            context: Some(context),
            backend,
            state,
            perm,
            mode,
            locator,
            display_name: None,
            referrer: None,
            cache: CacheOverlay::default(),
        }
    }

    pub fn id(&self) -> DescId {
        self.id
    }

    /// The table this descriptor belongs to.
    pub fn context(&self) -> Option<ContextId> {
        self.context
    }

    pub fn backend(&self) -> Option<&Arc<dyn IoBackend>> {
        self.backend.as_ref()
    }

    pub fn set_backend(&mut self, backend: Arc<dyn IoBackend>) {
        self.backend = Some(backend);
    }

    pub fn perm(&self) -> Perm {
        self.perm
    }

    pub fn set_perm(&mut self, perm: Perm) {
        self.perm = perm;
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    /// The locator the backend was resolved from.
    pub fn locator(&self) -> Option<&str> {
        self.locator.as_deref()
    }

    pub fn set_locator(&mut self, locator: impl Into<String>) {
        self.locator = Some(locator.into());
    }

    /// Human readable name; falls back to the locator.
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref().or(self.locator())
    }

    pub fn set_display_name(&mut self, name: impl Into<String>) {
        self.display_name = Some(name.into());
    }

    pub fn referrer(&self) -> Option<&str> {
        self.referrer.as_deref()
    }

    pub fn set_referrer(&mut self, referrer: impl Into<String>) {
        self.referrer = Some(referrer.into());
    }

    pub fn state_ref<T: 'static>(&self) -> Option<&T> {
        self.state.as_ref()?.downcast_ref::<T>()
    }

    pub fn state_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.state.as_mut()?.downcast_mut::<T>()
    }

    pub fn set_state(&mut self, state: OwnerState) {
        self.state = Some(state);
    }

    pub fn take_state(&mut self) -> Option<OwnerState> {
        self.state.take()
    }

    /// Bytes written to this descriptor while caching was enabled.
    pub fn cache(&self) -> &CacheOverlay {
        &self.cache
    }
}
