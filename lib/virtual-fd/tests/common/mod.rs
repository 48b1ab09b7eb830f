#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use virtual_fd::{
    BackendCapabilities, BackendRegistry, Desc, DescTable, DescTableConfig, IoBackend,
    OpenRequest, VfdError, VfdResult, Whence,
};

pub const SCHEME: &str = "rec://";

/// Size of every buffer opened through [`Recorder`].
pub const FILE_LEN: usize = 32;

/// Backend over a fixed `0, 1, 2, ...` byte pattern that counts the writes it
/// receives.
#[derive(Debug)]
pub struct Recorder {
    pub caps: BackendCapabilities,
    pub block_device: bool,
    pub debug: bool,
    pub short_reads: bool,
    pub bare_open: bool,
    pub writes: AtomicUsize,
    pub closes: AtomicUsize,
}

#[derive(Debug)]
struct Pattern {
    data: Vec<u8>,
    pos: u64,
}

impl Default for Recorder {
    fn default() -> Self {
        Self {
            caps: BackendCapabilities::OPEN
                | BackendCapabilities::CLOSE
                | BackendCapabilities::READ
                | BackendCapabilities::WRITE
                | BackendCapabilities::SEEK
                | BackendCapabilities::BLOCK_DEVICE,
            block_device: false,
            debug: false,
            short_reads: false,
            bare_open: false,
            writes: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }
}

impl Recorder {
    pub fn contents(desc: &Desc) -> Vec<u8> {
        desc.state_ref::<Pattern>()
            .map(|p| p.data.clone())
            .unwrap_or_default()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn pattern(desc: &mut Desc) -> VfdResult<&mut Pattern> {
        desc.state_mut::<Pattern>().ok_or(VfdError::InvalidDesc)
    }
}

impl IoBackend for Recorder {
    fn name(&self) -> &str {
        "rec"
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.caps
    }

    fn is_debug(&self) -> bool {
        self.debug
    }

    fn accepts(&self, locator: &str) -> bool {
        locator.starts_with(SCHEME)
    }

    fn open(&self, req: OpenRequest<'_>) -> VfdResult<Desc> {
        let state = Box::new(Pattern {
            data: (0..FILE_LEN as u8).collect(),
            pos: 0,
        });
        if self.bare_open {
            return req.table.allocate_bare(req.perm, Some(state));
        }
        req.table.create(
            req.backend.clone(),
            req.locator,
            req.perm,
            req.mode,
            Some(state),
        )
    }

    fn close(&self, desc: &mut Desc) -> i32 {
        self.closes.fetch_add(1, Ordering::SeqCst);
        desc.take_state();
        0
    }

    fn read(&self, desc: &mut Desc, buf: &mut [u8]) -> VfdResult<usize> {
        let short = self.short_reads;
        let p = Self::pattern(desc)?;
        let start = (p.pos as usize).min(p.data.len());
        let mut n = buf.len().min(p.data.len() - start);
        if short && n > 0 {
            n -= 1;
        }
        buf[..n].copy_from_slice(&p.data[start..start + n]);
        p.pos += n as u64;
        Ok(n)
    }

    fn write(&self, desc: &mut Desc, buf: &[u8]) -> VfdResult<usize> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let p = Self::pattern(desc)?;
        let start = (p.pos as usize).min(p.data.len());
        let n = buf.len().min(p.data.len() - start);
        p.data[start..start + n].copy_from_slice(&buf[..n]);
        p.pos += n as u64;
        Ok(n)
    }

    fn seek(&self, desc: &mut Desc, offset: u64, whence: Whence) -> VfdResult<u64> {
        let p = Self::pattern(desc)?;
        p.pos = match whence {
            Whence::Set => offset,
            Whence::Cur => p.pos.wrapping_add(offset),
            Whence::End => (p.data.len() as u64).wrapping_add(offset),
        };
        Ok(p.pos)
    }

    fn is_block_device(&self, _desc: &Desc) -> bool {
        self.block_device
    }

    fn owner_pid(&self, _desc: &Desc) -> i32 {
        4242
    }

    fn owner_tid(&self, _desc: &Desc) -> i32 {
        4243
    }
}

pub fn table_with(backends: Vec<Arc<dyn IoBackend>>, cache_enabled: bool) -> DescTable {
    let registry = BackendRegistry::new();
    for backend in backends {
        registry.register(backend).unwrap();
    }
    DescTable::new(
        DescTableConfig::default().with_cache(cache_enabled),
        Arc::new(registry),
    )
}

pub fn recorder_table(recorder: Arc<Recorder>, cache_enabled: bool) -> DescTable {
    table_with(vec![recorder as Arc<dyn IoBackend>], cache_enabled)
}
