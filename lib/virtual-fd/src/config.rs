use crate::{DEFAULT_FIRST_ID, ID_CEILING};

#[derive(Clone, Debug)]
pub struct DescTableConfig {
    /// Lowest id handed out.
    pub first_id: u32,
    /// Exclusive upper bound of the id range. Clamped to [`ID_CEILING`].
    pub id_ceiling: u32,
    /// Initial state of the write cache switch.
    pub cache_enabled: bool,
}

impl DescTableConfig {
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub(crate) fn id_range(&self) -> (u32, u32) {
        let ceiling = self.id_ceiling.min(ID_CEILING);
        (self.first_id.min(ceiling), ceiling)
    }
}

impl Default for DescTableConfig {
    fn default() -> Self {
        Self {
            first_id: DEFAULT_FIRST_ID,
            id_ceiling: ID_CEILING,
            cache_enabled: false,
        }
    }
}
