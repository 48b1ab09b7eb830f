//! Address-space maps that reference descriptors by id, and the cleanup hooks
//! run after a descriptor is closed.

use crate::flags::Perm;
use crate::ids::DescId;

/// A mapping of `size` bytes of a descriptor at virtual address `addr`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IoMap {
    pub desc: DescId,
    pub perm: Perm,
    pub addr: u64,
    pub size: u64,
}

impl IoMap {
    pub fn new(desc: DescId, perm: Perm, addr: u64, size: u64) -> Self {
        Self {
            desc,
            perm,
            addr,
            size,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapList {
    maps: Vec<IoMap>,
}

impl MapList {
    pub fn push(&mut self, map: IoMap) {
        self.maps.push(map);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, IoMap> {
        self.maps.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, IoMap> {
        self.maps.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Removes every map whose descriptor is no longer live. Returns how many
    /// maps were dropped.
    pub fn purge(&mut self, is_live: &dyn Fn(DescId) -> bool) -> usize {
        let before = self.maps.len();
        self.maps.retain(|map| is_live(map.desc));
        before - self.maps.len()
    }
}

/// External manager (sections, symbol caches...) that holds descriptor ids
/// and must forget the ones that were closed.
pub trait CleanupHook: Send {
    fn purge(&mut self, is_live: &dyn Fn(DescId) -> bool);
}
