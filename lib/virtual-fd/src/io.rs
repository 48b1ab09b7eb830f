//! Read/write/seek over a registered descriptor, including the write cache.
//!
//! These calls report failure through their return value only: `0` bytes,
//! an empty buffer or [`SEEK_FAILED`]. "The backend cannot do this" and "the
//! backend tried and failed" look the same to the caller; the reason is
//! emitted as a trace event.

use crate::flags::{BackendCapabilities, Perm, Whence};
use crate::ids::DescId;
use crate::{Desc, DescTable, IoBackend, VfdError, VfdResult, SEEK_FAILED, SIZE_UNBOUNDED};
use std::sync::Arc;
use tracing::trace;

fn backend_of(desc: &Desc, cap: BackendCapabilities) -> Option<Arc<dyn IoBackend>> {
    let backend = desc.backend.clone()?;
    backend.capabilities().contains(cap).then_some(backend)
}

fn seek_desc(desc: &mut Desc, offset: u64, whence: Whence) -> u64 {
    let Some(backend) = backend_of(desc, BackendCapabilities::SEEK) else {
        return SEEK_FAILED;
    };
    match backend.seek(desc, offset, whence) {
        Ok(pos) => pos,
        Err(err) => {
            trace!(fd = desc.id.0, %err, "seek failed");
            SEEK_FAILED
        }
    }
}

fn is_readable(desc: &Desc) -> bool {
    backend_of(desc, BackendCapabilities::READ).is_some() && desc.perm().contains(Perm::READ)
}

fn is_block_device(desc: &Desc) -> bool {
    backend_of(desc, BackendCapabilities::BLOCK_DEVICE)
        .map(|backend| backend.is_block_device(desc))
        .unwrap_or(false)
}

impl DescTable {
    /// Writes `buf` at the descriptor's current offset and returns how many
    /// bytes were taken.
    ///
    /// With caching enabled the bytes go to the descriptor's overlay and the
    /// backend is never touched, so the write permission is not required.
    pub fn write(&mut self, id: DescId, buf: &[u8]) -> usize {
        if buf.is_empty() {
            return 0;
        }
        let cache_enabled = self.cache_enabled;
        let Some(desc) = self.files.get_mut(id.0) else {
            trace!(fd = id.0, "write to unknown descriptor");
            return 0;
        };
        let Some(backend) = backend_of(desc, BackendCapabilities::WRITE) else {
            trace!(fd = id.0, "backend cannot write");
            return 0;
        };
        if cache_enabled {
            let offset = seek_desc(desc, 0, Whence::Cur);
            trace!(fd = id.0, offset, len = buf.len(), "write diverted to cache");
            return desc.cache.write(offset, buf);
        }
        if !desc.perm().contains(Perm::WRITE) {
            trace!(fd = id.0, "descriptor is not writable");
            return 0;
        }
        match backend.write(desc, buf) {
            Ok(written) => written,
            Err(err) => {
                trace!(fd = id.0, %err, "backend write failed");
                0
            }
        }
    }

    /// Reads into `buf` from the descriptor's current offset. Returns the
    /// number of bytes read.
    ///
    /// A read that fills the whole buffer is patched with the bytes cached
    /// for the same range, so it reflects earlier cached writes.
    pub fn read_into(&mut self, id: DescId, buf: &mut [u8]) -> usize {
        if buf.is_empty() {
            return 0;
        }
        let cache_enabled = self.cache_enabled;
        let Some(desc) = self.files.get_mut(id.0) else {
            trace!(fd = id.0, "read from unknown descriptor");
            return 0;
        };
        let Some(backend) = backend_of(desc, BackendCapabilities::READ) else {
            trace!(fd = id.0, "backend cannot read");
            return 0;
        };
        if !desc.perm().contains(Perm::READ) {
            trace!(fd = id.0, "descriptor is not readable");
            return 0;
        }
        let offset = seek_desc(desc, 0, Whence::Cur);
        let read = match backend.read(desc, buf) {
            Ok(read) => read.min(buf.len()),
            Err(err) => {
                trace!(fd = id.0, %err, "backend read failed");
                return 0;
            }
        };
        if read == buf.len() && cache_enabled {
            desc.cache.patch(offset, buf);
        }
        read
    }

    /// Reads up to `len` bytes from the descriptor's current offset.
    ///
    /// The buffer is only allocated once the descriptor is known to be
    /// readable; a `len` that cannot be allocated reads nothing.
    pub fn read(&mut self, id: DescId, len: usize) -> Vec<u8> {
        if len == 0 || !self.files.get(id.0).is_some_and(is_readable) {
            return Vec::new();
        }
        let mut buf = Vec::new();
        if buf.try_reserve_exact(len).is_err() {
            trace!(fd = id.0, len, "read buffer could not be allocated");
            return Vec::new();
        }
        buf.resize(len, 0);
        let read = self.read_into(id, &mut buf);
        buf.truncate(read);
        buf
    }

    /// Moves the descriptor's offset. Returns [`SEEK_FAILED`] if the backend
    /// cannot seek.
    pub fn seek(&mut self, id: DescId, offset: u64, whence: Whence) -> u64 {
        match self.files.get_mut(id.0) {
            Some(desc) => seek_desc(desc, offset, whence),
            None => SEEK_FAILED,
        }
    }

    /// Size of the resource behind the descriptor.
    ///
    /// Block devices report [`SIZE_UNBOUNDED`] instead of being probed. Other
    /// descriptors are sized by seeking to the end and back; a failed seek back
    /// is not reported.
    pub fn size(&mut self, id: DescId) -> u64 {
        let Some(desc) = self.files.get_mut(id.0) else {
            return 0;
        };
        desc_size(desc)
    }

    pub fn is_block_device(&self, id: DescId) -> bool {
        self.files.get(id.0).map(is_block_device).unwrap_or(false)
    }

    /// Seeks to `addr` and reads `len` bytes there. Nothing is read unless
    /// the seek lands exactly on `addr`.
    pub fn read_at(&mut self, id: DescId, addr: u64, len: usize) -> Vec<u8> {
        if addr == SEEK_FAILED || self.seek(id, addr, Whence::Set) != addr {
            return Vec::new();
        }
        self.read(id, len)
    }

    /// Seeks to `addr` and writes `buf` there. Nothing is written unless the
    /// seek lands exactly on `addr`.
    pub fn write_at(&mut self, id: DescId, addr: u64, buf: &[u8]) -> usize {
        if addr == SEEK_FAILED || self.seek(id, addr, Whence::Set) != addr {
            return 0;
        }
        self.write(id, buf)
    }

    /// Cached `(offset, bytes)` runs of a descriptor.
    pub fn cache_ranges(&self, id: DescId) -> Vec<(u64, Vec<u8>)> {
        self.files
            .get(id.0)
            .map(|desc| {
                desc.cache
                    .ranges()
                    .map(|(at, run)| (at, run.to_vec()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Forgets everything cached for one descriptor.
    pub fn cache_drop(&mut self, id: DescId) -> bool {
        match self.files.get_mut(id.0) {
            Some(desc) => {
                desc.cache.clear();
                true
            }
            None => false,
        }
    }

    /// Writes the descriptor's cached bytes through to its backend and empties
    /// the cache. The descriptor must be writable. Returns the number of bytes
    /// written; on failure the cache is kept as it was.
    pub fn cache_commit(&mut self, id: DescId) -> VfdResult<usize> {
        let desc = self.files.get_mut(id.0).ok_or(VfdError::InvalidDesc)?;
        let backend = desc.backend.clone().ok_or(VfdError::NoBackend)?;
        if !backend
            .capabilities()
            .contains(BackendCapabilities::WRITE | BackendCapabilities::SEEK)
        {
            return Err(VfdError::Unsupported);
        }
        if !desc.perm().contains(Perm::WRITE) {
            return Err(VfdError::PermissionDenied);
        }
        if desc.cache.is_empty() {
            return Ok(0);
        }

        let cache = std::mem::take(&mut desc.cache);
        let saved = seek_desc(desc, 0, Whence::Cur);
        let mut total = 0;
        let mut failed = false;
        for (at, run) in cache.ranges() {
            let written = if seek_desc(desc, at, Whence::Set) == at {
                backend.write(desc, run).unwrap_or(0)
            } else {
                0
            };
            if written != run.len() {
                failed = true;
                break;
            }
            total += written;
        }
        if saved != SEEK_FAILED {
            seek_desc(desc, saved, Whence::Set);
        }
        if failed {
            desc.cache = cache;
            return Err(VfdError::BackendFailure);
        }
        tracing::debug!(fd = id.0, bytes = total, "committed cached writes");
        Ok(total)
    }
}

pub(crate) fn desc_size(desc: &mut Desc) -> u64 {
    if backend_of(desc, BackendCapabilities::SEEK).is_none() {
        return 0;
    }
    if is_block_device(desc) {
        return SIZE_UNBOUNDED;
    }
    let offset = seek_desc(desc, 0, Whence::Cur);
    let size = seek_desc(desc, 0, Whence::End);
    seek_desc(desc, offset, Whence::Set);
    size
}
