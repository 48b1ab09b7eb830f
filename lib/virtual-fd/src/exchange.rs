use crate::flags::Perm;
use crate::ids::DescId;
use crate::io::desc_size;
use crate::{DescTable, VfdError, VfdResult, SIZE_UNBOUNDED};
use tracing::debug;

impl DescTable {
    /// Swaps the ids of two open descriptors.
    ///
    /// Afterwards the descriptor formerly reachable at `a` is reachable at `b`
    /// and vice versa. With caching enabled the caches stay with the ids and
    /// are trimmed to the size of their new descriptor. Maps keep their
    /// executable bit but lose any read/write permission the descriptor now
    /// behind them does not grant.
    pub fn exchange(&mut self, a: DescId, b: DescId) -> VfdResult<()> {
        let perm_a = self.get(a).ok_or(VfdError::InvalidDesc)?.perm();
        let perm_b = self.get(b).ok_or(VfdError::InvalidDesc)?.perm();
        if a == b {
            return Ok(());
        }

        self.files.swap(a.0, b.0);
        for id in [a, b] {
            if let Some(desc) = self.files.get_mut(id.0) {
                desc.id = id;
            }
        }

        if self.cache_enabled {
            self.swap_caches(a, b);
        }

        self.active = match self.active {
            Some(id) if id == a => Some(b),
            Some(id) if id == b => Some(a),
            other => other,
        };

        for map in self.maps.iter_mut() {
            if map.desc == b {
                map.perm &= perm_a | Perm::EXEC;
            } else if map.desc == a {
                map.perm &= perm_b | Perm::EXEC;
            }
        }
        debug!(a = a.0, b = b.0, "exchanged descriptors");
        Ok(())
    }

    fn swap_caches(&mut self, a: DescId, b: DescId) {
        let Some(cache_a) = self.files.get_mut(a.0).map(|d| std::mem::take(&mut d.cache)) else {
            return;
        };
        let Some(desc_b) = self.files.get_mut(b.0) else {
            return;
        };
        let cache_b = std::mem::replace(&mut desc_b.cache, cache_a);
        if let Some(desc_a) = self.files.get_mut(a.0) {
            desc_a.cache = cache_b;
        }

        for id in [a, b] {
            if let Some(desc) = self.files.get_mut(id.0) {
                let size = desc_size(desc);
                if size != SIZE_UNBOUNDED {
                    desc.cache.truncate(size);
                }
            }
        }
    }
}
