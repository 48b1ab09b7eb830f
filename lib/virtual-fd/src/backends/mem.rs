//! Zero-filled in-memory buffers, opened as `malloc://<size>`.
//!
//! The size is decimal or `0x`-prefixed hexadecimal. Buffers have a fixed
//! length: writes past the end are cut short.

use crate::backend::{IoBackend, OpenRequest};
use crate::flags::{BackendCapabilities, Whence};
use crate::{Desc, VfdError, VfdResult};

pub const MEM_SCHEME: &str = "malloc://";

#[derive(Debug, Default)]
pub struct MemBackend;

#[derive(Debug)]
struct MemBuffer {
    data: Vec<u8>,
    pos: u64,
}

impl MemBackend {
    pub fn new() -> Self {
        Self
    }

    /// Contents of the buffer behind a descriptor opened by this backend.
    pub fn contents(desc: &Desc) -> Option<&[u8]> {
        desc.state_ref::<MemBuffer>().map(|buf| buf.data.as_slice())
    }

    fn parse_size(locator: &str) -> VfdResult<usize> {
        let raw = locator
            .strip_prefix(MEM_SCHEME)
            .ok_or(VfdError::InvalidInput)?
            .trim();
        let size = match raw.strip_prefix("0x") {
            Some(hex) => usize::from_str_radix(hex, 16),
            None => raw.parse::<usize>(),
        };
        size.map_err(|_| VfdError::InvalidInput)
    }

    /// A zero-filled buffer of `size` bytes, or `InvalidInput` if it cannot
    /// be allocated.
    fn zeroed(size: usize) -> VfdResult<Vec<u8>> {
        let mut data = Vec::new();
        data.try_reserve_exact(size).map_err(|_| VfdError::InvalidInput)?;
        data.resize(size, 0);
        Ok(data)
    }

    fn buffer(desc: &mut Desc) -> VfdResult<&mut MemBuffer> {
        desc.state_mut::<MemBuffer>().ok_or(VfdError::InvalidDesc)
    }
}

impl IoBackend for MemBackend {
    fn name(&self) -> &str {
        "malloc"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::OPEN
            | BackendCapabilities::CLOSE
            | BackendCapabilities::READ
            | BackendCapabilities::WRITE
            | BackendCapabilities::SEEK
    }

    fn accepts(&self, locator: &str) -> bool {
        locator.starts_with(MEM_SCHEME)
    }

    fn open(&self, req: OpenRequest<'_>) -> VfdResult<Desc> {
        let size = Self::parse_size(req.locator)?;
        let buffer = MemBuffer {
            data: Self::zeroed(size)?,
            pos: 0,
        };
        req.table.create(
            req.backend.clone(),
            req.locator,
            req.perm,
            req.mode,
            Some(Box::new(buffer)),
        )
    }

    fn close(&self, desc: &mut Desc) -> i32 {
        match desc.take_state() {
            Some(_) => 0,
            None => 1,
        }
    }

    fn read(&self, desc: &mut Desc, buf: &mut [u8]) -> VfdResult<usize> {
        let mem = Self::buffer(desc)?;
        let start = usize::try_from(mem.pos).unwrap_or(usize::MAX).min(mem.data.len());
        let n = buf.len().min(mem.data.len() - start);
        buf[..n].copy_from_slice(&mem.data[start..start + n]);
        mem.pos += n as u64;
        Ok(n)
    }

    fn write(&self, desc: &mut Desc, buf: &[u8]) -> VfdResult<usize> {
        let mem = Self::buffer(desc)?;
        let start = usize::try_from(mem.pos).unwrap_or(usize::MAX).min(mem.data.len());
        let n = buf.len().min(mem.data.len() - start);
        mem.data[start..start + n].copy_from_slice(&buf[..n]);
        mem.pos += n as u64;
        Ok(n)
    }

    fn seek(&self, desc: &mut Desc, offset: u64, whence: Whence) -> VfdResult<u64> {
        let mem = Self::buffer(desc)?;
        let pos = match whence {
            Whence::Set => Some(offset),
            Whence::Cur => mem.pos.checked_add_signed(offset as i64),
            Whence::End => (mem.data.len() as u64).checked_add_signed(offset as i64),
        };
        mem.pos = pos.ok_or(VfdError::InvalidInput)?;
        Ok(mem.pos)
    }
}
