//! The descriptor table: id allocation, registration, open/close and teardown.

use crate::backend::{BackendResolver, IoBackend, OpenRequest};
use crate::config::DescTableConfig;
use crate::desc::{Desc, OwnerState};
use crate::flags::{BackendCapabilities, Perm};
use crate::ids::{ContextId, DescId};
use crate::map::{CleanupHook, IoMap, MapList};
use crate::slots::IdSlots;
use crate::{VfdError, VfdResult};
use backtrace::Backtrace;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

pub struct DescTable {
    id: ContextId,
    config: DescTableConfig,
    pub(crate) files: IdSlots<Desc>,
    resolver: Arc<dyn BackendResolver>,
    pub(crate) active: Option<DescId>,
    pub(crate) cache_enabled: bool,
    pub(crate) maps: MapList,
    hooks: Vec<Box<dyn CleanupHook>>,
    /// Ids reserved while a backend is inside [`DescTable::open`].
    opening: Option<Vec<DescId>>,
}

impl DescTable {
    pub fn new(config: DescTableConfig, resolver: Arc<dyn BackendResolver>) -> Self {
        let (base, ceiling) = config.id_range();
        Self {
            id: ContextId::next(),
            cache_enabled: config.cache_enabled,
            config,
            files: IdSlots::new(base, ceiling),
            resolver,
            active: None,
            maps: MapList::default(),
            hooks: Vec::new(),
            opening: None,
        }
    }

    pub fn context_id(&self) -> ContextId {
        self.id
    }

    pub fn config(&self) -> &DescTableConfig {
        &self.config
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache_enabled
    }

    /// Turns the write cache on or off for every descriptor. Turning it off
    /// discards all cached bytes.
    pub fn set_cache_enabled(&mut self, enabled: bool) {
        if self.cache_enabled && !enabled {
            for (_, desc) in self.files.iter_mut() {
                desc.cache.clear();
            }
        }
        self.cache_enabled = enabled;
    }

    /// The descriptor most recently made current, if it is still open.
    pub fn active(&self) -> Option<DescId> {
        self.active
    }

    pub fn set_active(&mut self, id: DescId) -> VfdResult<()> {
        if !self.contains(id) {
            return Err(VfdError::InvalidDesc);
        }
        self.active = Some(id);
        Ok(())
    }

    pub fn maps(&self) -> &MapList {
        &self.maps
    }

    pub fn maps_mut(&mut self) -> &mut MapList {
        &mut self.maps
    }

    pub fn add_map(&mut self, map: IoMap) {
        self.maps.push(map);
    }

    /// Registers a manager that is told to drop stale descriptor ids after
    /// every successful close.
    pub fn add_cleanup_hook(&mut self, hook: Box<dyn CleanupHook>) {
        self.hooks.push(hook);
    }

    /// Allocates an id and builds a descriptor for `backend`. The descriptor
    /// is not reachable through the table until [`DescTable::register`]ed.
    pub fn create(
        &mut self,
        backend: Arc<dyn IoBackend>,
        locator: &str,
        perm: Perm,
        mode: u32,
        state: Option<OwnerState>,
    ) -> VfdResult<Desc> {
        if locator.is_empty() {
            return Err(VfdError::InvalidInput);
        }
        let id = self.reserve_id()?;
        Ok(Desc::new(
            id,
            self.id,
            Some(backend),
            Some(locator.to_string()),
            perm,
            mode,
            state,
        ))
    }

    /// Allocates an id for a backend that fills in the rest of the record
    /// itself. Backend, locator and display name are left empty.
    pub fn allocate_bare(&mut self, perm: Perm, state: Option<OwnerState>) -> VfdResult<Desc> {
        let id = self.reserve_id()?;
        Ok(Desc::new(id, self.id, None, None, perm, 0, state))
    }

    fn reserve_id(&mut self) -> VfdResult<DescId> {
        let id = DescId(self.files.allocate().ok_or(VfdError::Exhausted)?);
        if let Some(opening) = self.opening.as_mut() {
            opening.push(id);
        }
        Ok(id)
    }

    /// Gives back the id of a descriptor that was created but never registered.
    pub fn discard(&mut self, desc: Desc) {
        if desc.context == Some(self.id) && self.files.get(desc.id.0).is_none() {
            self.files.release(desc.id.0);
        }
    }

    /// Makes a created descriptor reachable under its id.
    pub fn register(&mut self, mut desc: Desc) -> VfdResult<DescId> {
        match desc.context {
            None => desc.context = Some(self.id),
            Some(other) if other != self.id => {
                self.usage_error(desc.id, &format!("fd {} belongs to {other}", desc.id));
                return Err(VfdError::NotOwned);
            }
            Some(_) => {}
        }
        let id = desc.id;
        if self.files.get(id.0).is_some() {
            self.usage_error(id, &format!("fd {id} is already registered"));
            return Err(VfdError::NotOwned);
        }
        if self.files.bind(id.0, desc).is_err() {
            self.usage_error(id, &format!("fd {id} was probably not generated by this table"));
            return Err(VfdError::NotOwned);
        }
        debug!(fd = id.0, "registered descriptor");
        Ok(id)
    }

    /// Resolves a backend for `locator`, lets it open the resource and
    /// registers the result.
    #[instrument(level = "debug", skip(self), err)]
    pub fn open(&mut self, locator: &str, perm: Perm, mode: u32) -> VfdResult<DescId> {
        if locator.is_empty() {
            return Err(VfdError::InvalidInput);
        }
        let backend = self
            .resolver
            .resolve(locator)
            .ok_or(VfdError::NoResolver)?;
        if !backend
            .capabilities()
            .contains(BackendCapabilities::OPEN | BackendCapabilities::CLOSE)
        {
            return Err(VfdError::Unsupported);
        }
        let outer = self.opening.replace(Vec::new());
        let opened = backend.open(OpenRequest {
            table: &mut *self,
            backend: &backend,
            locator,
            perm,
            mode,
        });
        let reserved = std::mem::replace(&mut self.opening, outer).unwrap_or_default();

        let result = match opened {
            Ok(mut desc) => {
                if desc.backend.is_none() {
                    desc.backend = Some(backend.clone());
                }
                if desc.locator.is_none() {
                    desc.locator = Some(locator.to_string());
                }
                if desc.display_name.is_none() {
                    desc.display_name = Some(locator.to_string());
                }
                self.register(desc)
            }
            Err(err) => Err(err),
        };
        self.release_unbound(&reserved);
        result
    }

    /// Gives back ids reserved during an open that never got a registered
    /// descriptor.
    fn release_unbound(&mut self, reserved: &[DescId]) {
        for &id in reserved {
            if self.files.is_allocated(id.0) && self.files.get(id.0).is_none() {
                self.files.release(id.0);
                debug!(fd = id.0, "released id left unbound by open");
            }
        }
    }

    /// Drops a descriptor without asking its backend to close it.
    pub fn remove(&mut self, id: DescId) -> VfdResult<()> {
        let desc = self.files.release(id.0).ok_or(VfdError::InvalidDesc)?;
        if self.active == Some(id) {
            self.active = None;
        }
        debug!(fd = id.0, backend = ?desc.backend.as_ref().map(|b| b.name()), "removed descriptor");
        Ok(())
    }

    /// Closes the descriptor through its backend, removes it and purges the
    /// maps and hooks that referenced it. On failure the descriptor stays open.
    #[instrument(level = "debug", skip_all, fields(fd = id.0), err)]
    pub fn close(&mut self, id: DescId) -> VfdResult<()> {
        let desc = self.files.get_mut(id.0).ok_or(VfdError::InvalidDesc)?;
        let backend = desc.backend.clone().ok_or(VfdError::NoBackend)?;
        if !backend.capabilities().contains(BackendCapabilities::CLOSE) {
            return Err(VfdError::Unsupported);
        }
        if backend.close(desc) != 0 {
            return Err(VfdError::BackendFailure);
        }
        self.remove(id)?;
        self.cleanup_closed();
        Ok(())
    }

    fn cleanup_closed(&mut self) {
        let files = &self.files;
        let is_live = |id: DescId| files.get(id.0).is_some();
        let purged = self.maps.purge(&is_live);
        if purged > 0 {
            debug!(purged, "purged maps of closed descriptors");
        }
        for hook in self.hooks.iter_mut() {
            hook.purge(&is_live);
        }
    }

    pub fn get(&self, id: DescId) -> Option<&Desc> {
        self.files.get(id.0)
    }

    pub fn get_mut(&mut self, id: DescId) -> Option<&mut Desc> {
        self.files.get_mut(id.0)
    }

    /// Looks up a raw descriptor number; negative values never match.
    pub fn lookup(&self, fd: i32) -> Option<&Desc> {
        u32::try_from(fd).ok().and_then(|fd| self.files.get(fd))
    }

    pub fn contains(&self, id: DescId) -> bool {
        self.files.get(id.0).is_some()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn ids(&self) -> Vec<DescId> {
        self.files.iter().map(|(id, _)| DescId(id)).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Desc> {
        self.files.iter().map(|(_, desc)| desc)
    }

    /// Closes every descriptor, ignoring failures, and starts over with an
    /// empty id store. Maps and cleanup hooks are left alone. Returns how many
    /// descriptors were dropped.
    #[instrument(level = "debug", skip(self))]
    pub fn shutdown(&mut self) -> usize {
        self.files.for_each(|fd, desc| {
            let Some(backend) = desc.backend.clone() else {
                return true;
            };
            if backend.capabilities().contains(BackendCapabilities::CLOSE)
                && backend.close(desc) != 0
            {
                warn!(fd, backend = backend.name(), "close failed during shutdown");
            }
            true
        });
        let dropped = self.files.len();
        let (base, ceiling) = self.config.id_range();
        self.files = IdSlots::new(base, ceiling);
        self.active = None;
        dropped
    }

    fn usage_error(&self, id: DescId, reason: &str) {
        error!(
            fd = id.0,
            table = %self.id,
            "you are using this API incorrectly: {reason}"
        );
        error!("{:?}", Backtrace::new());
    }
}

impl fmt::Debug for DescTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescTable")
            .field("id", &self.id)
            .field("descs", &self.ids())
            .field("active", &self.active)
            .field("cache_enabled", &self.cache_enabled)
            .field("maps", &self.maps.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BackendRegistry;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct Closable {
        fail_close: bool,
        fail_open: bool,
        /// When nonzero, opened records claim this id instead of their own.
        alias: AtomicU32,
        closes: AtomicUsize,
    }

    impl IoBackend for Closable {
        fn name(&self) -> &str {
            "closable"
        }

        fn capabilities(&self) -> BackendCapabilities {
            BackendCapabilities::OPEN | BackendCapabilities::CLOSE
        }

        fn accepts(&self, locator: &str) -> bool {
            locator.starts_with("closable://")
        }

        fn open(&self, req: OpenRequest<'_>) -> VfdResult<Desc> {
            let mut desc =
                req.table
                    .create(req.backend.clone(), req.locator, req.perm, req.mode, None)?;
            if self.fail_open {
                return Err(VfdError::BackendFailure);
            }
            match self.alias.load(Ordering::SeqCst) {
                0 => {}
                alias => desc.id = DescId(alias),
            }
            Ok(desc)
        }

        fn close(&self, _desc: &mut Desc) -> i32 {
            self.closes.fetch_add(1, Ordering::SeqCst);
            i32::from(self.fail_close)
        }
    }

    fn table_with(backend: Arc<dyn IoBackend>) -> DescTable {
        let registry = BackendRegistry::new();
        registry.register(backend).unwrap();
        DescTable::new(DescTableConfig::default(), Arc::new(registry))
    }

    #[test]
    fn created_descriptor_is_hidden_until_registered() {
        let backend: Arc<dyn IoBackend> = Arc::new(Closable::default());
        let mut table = table_with(backend.clone());

        let desc = table
            .create(backend, "closable://a", Perm::READ, 0, None)
            .unwrap();
        let id = desc.id();
        assert_eq!(id, DescId(3));
        assert!(table.get(id).is_none());

        assert_eq!(table.register(desc), Ok(id));
        assert_eq!(table.get(id).unwrap().locator(), Some("closable://a"));
        assert_eq!(table.get(id).unwrap().context(), Some(table.context_id()));
    }

    #[test]
    fn create_rejects_empty_locator() {
        let backend: Arc<dyn IoBackend> = Arc::new(Closable::default());
        let mut table = table_with(backend.clone());
        assert_eq!(
            table.create(backend, "", Perm::READ, 0, None).unwrap_err(),
            VfdError::InvalidInput
        );
    }

    #[test]
    fn discard_returns_the_id() {
        let backend: Arc<dyn IoBackend> = Arc::new(Closable::default());
        let mut table = table_with(backend.clone());
        let desc = table
            .create(backend.clone(), "closable://a", Perm::READ, 0, None)
            .unwrap();
        table.discard(desc);
        let again = table
            .create(backend, "closable://b", Perm::READ, 0, None)
            .unwrap();
        assert_eq!(again.id(), DescId(3));
    }

    #[test]
    fn exhausted_table_cannot_create() {
        let backend: Arc<dyn IoBackend> = Arc::new(Closable::default());
        let config = DescTableConfig {
            first_id: 3,
            id_ceiling: 4,
            cache_enabled: false,
        };
        let mut table = DescTable::new(config, Arc::new(BackendRegistry::new()));
        table
            .create(backend.clone(), "closable://a", Perm::READ, 0, None)
            .unwrap();
        assert_eq!(
            table
                .create(backend, "closable://b", Perm::READ, 0, None)
                .unwrap_err(),
            VfdError::Exhausted
        );
    }

    #[tracing_test::traced_test]
    #[test]
    fn registering_a_foreign_descriptor_is_reported() {
        let backend: Arc<dyn IoBackend> = Arc::new(Closable::default());
        let mut ours = table_with(backend.clone());
        let mut theirs = table_with(backend.clone());

        let foreign = theirs
            .create(backend, "closable://x", Perm::READ, 0, None)
            .unwrap();
        assert_eq!(ours.register(foreign), Err(VfdError::NotOwned));
        assert!(ours.is_empty());
        assert!(logs_contain("you are using this API incorrectly"));
    }

    #[tracing_test::traced_test]
    #[test]
    fn registering_an_unallocated_id_is_reported() {
        let backend: Arc<dyn IoBackend> = Arc::new(Closable::default());
        let mut table = table_with(backend);
        let mut desc = table.allocate_bare(Perm::READ, None).unwrap();
        desc.context = None;
        desc.id = DescId(42);

        assert_eq!(table.register(desc), Err(VfdError::NotOwned));
        assert!(logs_contain("fd 42 was probably not generated by this table"));
    }

    #[test]
    fn failed_open_gives_back_reserved_ids() {
        let flaky = Arc::new(Closable {
            fail_open: true,
            ..Default::default()
        });
        let mut table = table_with(flaky);
        for _ in 0..3 {
            assert_eq!(
                table.open("closable://x", Perm::READ, 0),
                Err(VfdError::BackendFailure)
            );
        }
        let desc = table.allocate_bare(Perm::READ, None).unwrap();
        assert_eq!(desc.id(), DescId(3));
    }

    #[tracing_test::traced_test]
    #[test]
    fn open_gives_back_the_id_when_registration_fails() {
        let backend = Arc::new(Closable::default());
        let mut table = table_with(backend.clone());
        let first = table.open("closable://a", Perm::READ, 0).unwrap();

        backend.alias.store(first.get(), Ordering::SeqCst);
        assert_eq!(
            table.open("closable://b", Perm::READ, 0),
            Err(VfdError::NotOwned)
        );
        assert!(logs_contain("fd 3 is already registered"));
        assert!(!logs_contain("probably not generated"));
        assert_eq!(table.get(first).unwrap().locator(), Some("closable://a"));

        backend.alias.store(0, Ordering::SeqCst);
        assert_eq!(table.open("closable://c", Perm::READ, 0), Ok(DescId(4)));
    }

    #[test]
    fn close_polarity_nonzero_means_failure() {
        let failing = Arc::new(Closable {
            fail_close: true,
            ..Default::default()
        });
        let mut table = table_with(failing.clone());
        let id = table.open("closable://x", Perm::READ, 0).unwrap();

        assert_eq!(table.close(id), Err(VfdError::BackendFailure));
        assert_eq!(failing.closes.load(Ordering::SeqCst), 1);
        assert!(table.contains(id));

        let working = Arc::new(Closable::default());
        let mut table = table_with(working.clone());
        let id = table.open("closable://x", Perm::READ, 0).unwrap();
        assert_eq!(table.close(id), Ok(()));
        assert!(table.get(id).is_none());
    }

    #[test]
    fn remove_clears_active_descriptor() {
        let mut table = table_with(Arc::new(Closable::default()));
        let a = table.open("closable://a", Perm::READ, 0).unwrap();
        let b = table.open("closable://b", Perm::READ, 0).unwrap();
        table.set_active(a).unwrap();

        table.remove(b).unwrap();
        assert_eq!(table.active(), Some(a));
        table.remove(a).unwrap();
        assert_eq!(table.active(), None);
        assert_eq!(table.remove(a), Err(VfdError::InvalidDesc));
        assert_eq!(table.set_active(a), Err(VfdError::InvalidDesc));
    }

    #[test]
    fn lookup_by_raw_fd() {
        let mut table = table_with(Arc::new(Closable::default()));
        let id = table.open("closable://a", Perm::READ, 0).unwrap();
        assert_eq!(table.lookup(id.as_fd()).map(Desc::id), Some(id));
        assert!(table.lookup(-1).is_none());
        assert!(table.lookup(0).is_none());
    }

    #[test]
    fn shutdown_closes_everything_and_ignores_failures() {
        let failing = Arc::new(Closable {
            fail_close: true,
            ..Default::default()
        });
        let mut table = table_with(failing.clone());
        for name in ["closable://a", "closable://b", "closable://c"] {
            table.open(name, Perm::READ, 0).unwrap();
        }
        let first = table.ids()[0];
        table.set_active(first).unwrap();

        assert_eq!(table.shutdown(), 3);
        assert_eq!(failing.closes.load(Ordering::SeqCst), 3);
        assert!(table.is_empty());
        assert_eq!(table.active(), None);
        assert!(table.get(first).is_none());

        let reopened = table.open("closable://d", Perm::READ, 0).unwrap();
        assert_eq!(reopened, DescId(3));
    }
}
