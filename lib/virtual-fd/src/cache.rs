//! Sparse write overlay.
//!
//! While caching is enabled, writes to a descriptor land here instead of the
//! backend, and reads are patched with whatever the overlay holds for the
//! requested range. Runs are kept sorted, non-overlapping and non-adjacent.

use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheOverlay {
    runs: BTreeMap<u64, Vec<u8>>,
}

impl CacheOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Number of cached bytes.
    pub fn len(&self) -> u64 {
        self.runs.values().map(|run| run.len() as u64).sum()
    }

    pub fn clear(&mut self) {
        self.runs.clear();
    }

    /// Records `data` at `offset`, overriding earlier writes to the same bytes.
    /// Returns the number of bytes stored; data that would extend past
    /// `u64::MAX` is dropped.
    pub fn write(&mut self, offset: u64, data: &[u8]) -> usize {
        let room = (u64::MAX - offset).min(data.len() as u64) as usize;
        let data = &data[..room];
        if data.is_empty() {
            return 0;
        }
        let end = offset + data.len() as u64;

        let touching: Vec<u64> = self
            .runs
            .range(..=end)
            .rev()
            .take_while(|(start, run)| **start + run.len() as u64 >= offset)
            .map(|(start, _)| *start)
            .collect();

        let mut merged_start = offset;
        let mut merged_end = end;
        for start in &touching {
            let run_end = start + self.runs[start].len() as u64;
            merged_start = merged_start.min(*start);
            merged_end = merged_end.max(run_end);
        }

        let mut merged = vec![0u8; (merged_end - merged_start) as usize];
        for start in touching {
            if let Some(run) = self.runs.remove(&start) {
                let at = (start - merged_start) as usize;
                merged[at..at + run.len()].copy_from_slice(&run);
            }
        }
        let at = (offset - merged_start) as usize;
        merged[at..at + data.len()].copy_from_slice(data);
        self.runs.insert(merged_start, merged);
        data.len()
    }

    /// Overwrites the bytes of `buf`, which holds data read at `offset`, with
    /// any cached bytes in that range. Returns how many bytes were patched.
    pub fn patch(&self, offset: u64, buf: &mut [u8]) -> usize {
        if buf.is_empty() {
            return 0;
        }
        let end = offset.saturating_add(buf.len() as u64);
        let mut patched = 0;
        for (start, run) in self.runs.range(..end).rev() {
            let run_end = start + run.len() as u64;
            if run_end <= offset {
                break;
            }
            let from = (*start).max(offset);
            let to = run_end.min(end);
            let src = &run[(from - start) as usize..(to - start) as usize];
            let dst = (from - offset) as usize;
            buf[dst..dst + src.len()].copy_from_slice(src);
            patched += src.len();
        }
        patched
    }

    /// Drops every cached byte at or beyond `size`.
    pub fn truncate(&mut self, size: u64) {
        let _ = self.runs.split_off(&size);
        if let Some((start, run)) = self.runs.iter_mut().next_back() {
            let keep = size - start;
            if (run.len() as u64) > keep {
                run.truncate(keep as usize);
            }
        }
    }

    /// Cached runs in ascending offset order.
    pub fn ranges(&self) -> impl Iterator<Item = (u64, &[u8])> {
        self.runs.iter().map(|(start, run)| (*start, run.as_slice()))
    }
}
