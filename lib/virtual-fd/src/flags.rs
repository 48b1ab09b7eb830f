use bitflags::bitflags;

bitflags! {
    /// Access permissions of a descriptor or of a map backed by one.
    ///
    /// The bit values are shared with the map and section managers and must
    /// not change.
    pub struct Perm: u32 {
        const READ = 1;
        const WRITE = 2;
        const EXEC = 4;
        const RW = Self::READ.bits | Self::WRITE.bits;
        const RWX = Self::READ.bits | Self::WRITE.bits | Self::EXEC.bits;
    }
}

impl Default for Perm {
    fn default() -> Self {
        Perm::empty()
    }
}

bitflags! {
    /// Operations a backend implements. Anything missing here is treated as
    /// "unsupported" and never invoked.
    pub struct BackendCapabilities: u32 {
        const OPEN = 1 << 0;
        const CLOSE = 1 << 1;
        const READ = 1 << 2;
        const WRITE = 1 << 3;
        const SEEK = 1 << 4;
        const BLOCK_DEVICE = 1 << 5;
        const OWNER_PID = 1 << 6;
        const OWNER_TID = 1 << 7;
    }
}

/// Reference point of a seek. Relative offsets are passed as `u64` and
/// reinterpreted as signed by the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Whence {
    Set,
    Cur,
    End,
}
