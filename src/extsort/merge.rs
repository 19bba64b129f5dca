//! K-way merge of sorted fixed-size-record streams, driven by a binary
//! min-heap keyed on the caller's comparator.
//!
//! Each run is memory-mapped rather than read through a buffered
//! stream: the merge cursor only ever moves forward through a run, so
//! pages ahead of it are worth prefetching and pages behind it are
//! worth dropping immediately, which a plain sequential read gives the
//! OS no way to express.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::error::{Error, Result};

/// Read-ahead/drop-behind granularity for run madvise windowing.
const WINDOW: usize = 256 * 1024;

/// A sorted run, mapped read-only. `next_record` advances a
/// monotonic cursor, advising the kernel to prefetch the window ahead
/// of it and discard the window already consumed behind it.
pub(crate) struct RunReader {
    mmap: Mmap,
    pos: usize,
    advised_to: usize,
    discarded_to: usize,
}

impl RunReader {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: run files are private temp files written once by
        // `form_runs`/`merge_group` and never mutated while a reader
        // is open.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::Mmap(e.to_string()))?;
        let mut reader = Self { mmap, pos: 0, advised_to: 0, discarded_to: 0 };
        reader.advise_ahead();
        Ok(reader)
    }

    fn advise_ahead(&mut self) {
        let target = (self.pos + WINDOW).min(self.mmap.len());
        if target > self.advised_to {
            advise_will_need(&self.mmap, self.advised_to, target - self.advised_to);
            self.advised_to = target;
        }
    }

    fn discard_behind(&mut self) {
        let target = self.pos - (self.pos % WINDOW);
        if target > self.discarded_to {
            advise_dont_need(&self.mmap, self.discarded_to, target - self.discarded_to);
            self.discarded_to = target;
        }
    }

    /// Copies out the next `record_size` bytes, or `None` at the run's end.
    fn next_record(&mut self, record_size: usize) -> Option<Vec<u8>> {
        if self.pos + record_size > self.mmap.len() {
            return None;
        }
        let start = self.pos;
        self.pos += record_size;
        self.advise_ahead();
        self.discard_behind();
        Some(self.mmap[start..start + record_size].to_vec())
    }
}

#[cfg(unix)]
fn advise_will_need(mmap: &Mmap, offset: usize, len: usize) {
    if len == 0 {
        return;
    }
    let _ = mmap.advise_range(memmap2::Advice::WillNeed, offset, len);
}

#[cfg(unix)]
fn advise_dont_need(mmap: &Mmap, offset: usize, len: usize) {
    if len == 0 {
        return;
    }
    // SAFETY: DontNeed only discards already-consumed pages behind the
    // forward-only merge cursor; they are never read again via this mapping.
    let _ = unsafe { mmap.unchecked_advise_range(memmap2::UncheckedAdvice::DontNeed, offset, len) };
}

#[cfg(not(unix))]
fn advise_will_need(_mmap: &Mmap, _offset: usize, _len: usize) {}

#[cfg(not(unix))]
fn advise_dont_need(_mmap: &Mmap, _offset: usize, _len: usize) {}

struct Entry {
    run: usize,
    record: Vec<u8>,
}

fn sift_down<C: Fn(&[u8], &[u8]) -> std::cmp::Ordering>(heap: &mut [Entry], mut i: usize, cmp: &C) {
    let n = heap.len();
    loop {
        let l = 2 * i + 1;
        let r = 2 * i + 2;
        let mut smallest = i;
        if l < n && cmp(&heap[l].record, &heap[smallest].record) == std::cmp::Ordering::Less {
            smallest = l;
        }
        if r < n && cmp(&heap[r].record, &heap[smallest].record) == std::cmp::Ordering::Less {
            smallest = r;
        }
        if smallest == i {
            break;
        }
        heap.swap(i, smallest);
        i = smallest;
    }
}

fn sift_up<C: Fn(&[u8], &[u8]) -> std::cmp::Ordering>(heap: &mut [Entry], mut i: usize, cmp: &C) {
    while i > 0 {
        let parent = (i - 1) / 2;
        if cmp(&heap[i].record, &heap[parent].record) == std::cmp::Ordering::Less {
            heap.swap(i, parent);
            i = parent;
        } else {
            break;
        }
    }
}

fn heap_push<C: Fn(&[u8], &[u8]) -> std::cmp::Ordering>(heap: &mut Vec<Entry>, e: Entry, cmp: &C) {
    heap.push(e);
    let i = heap.len() - 1;
    sift_up(heap, i, cmp);
}

fn heap_pop<C: Fn(&[u8], &[u8]) -> std::cmp::Ordering>(heap: &mut Vec<Entry>, cmp: &C) -> Option<Entry> {
    if heap.is_empty() {
        return None;
    }
    let last = heap.len() - 1;
    heap.swap(0, last);
    let top = heap.pop();
    if !heap.is_empty() {
        sift_down(heap, 0, cmp);
    }
    top
}

/// Merges `readers` (each already sorted under `cmp`) into a single
/// sorted stream, invoking `emit` once per record in sorted order.
pub(crate) fn k_way_merge<C, E>(mut readers: Vec<RunReader>, record_size: usize, cmp: C, mut emit: E) -> Result<()>
where
    C: Fn(&[u8], &[u8]) -> std::cmp::Ordering,
    E: FnMut(&[u8]) -> Result<()>,
{
    let mut heap: Vec<Entry> = Vec::with_capacity(readers.len());
    for (i, r) in readers.iter_mut().enumerate() {
        if let Some(record) = r.next_record(record_size) {
            heap_push(&mut heap, Entry { run: i, record }, &cmp);
        }
    }
    while let Some(top) = heap_pop(&mut heap, &cmp) {
        emit(&top.record)?;
        if let Some(record) = readers[top.run].next_record(record_size) {
            heap_push(&mut heap, Entry { run: top.run, record }, &cmp);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn run_file(dir: &Path, name: &str, vals: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(vals).unwrap();
        path
    }

    #[test]
    fn merges_sorted_single_byte_runs() {
        let dir = tempfile::tempdir().unwrap();
        let readers = vec![
            RunReader::open(&run_file(dir.path(), "a", &[1, 4, 7])).unwrap(),
            RunReader::open(&run_file(dir.path(), "b", &[2, 3, 9])).unwrap(),
            RunReader::open(&run_file(dir.path(), "c", &[0, 5])).unwrap(),
        ];
        let mut out = Vec::new();
        k_way_merge(readers, 1, |a, b| a.cmp(b), |rec| {
            out.push(rec[0]);
            Ok(())
        })
        .unwrap();
        assert_eq!(out, vec![0, 1, 2, 3, 4, 5, 7, 9]);
    }

    #[test]
    fn empty_runs_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let readers = vec![
            RunReader::open(&run_file(dir.path(), "a", &[])).unwrap(),
            RunReader::open(&run_file(dir.path(), "b", &[1, 2])).unwrap(),
        ];
        let mut out = Vec::new();
        k_way_merge(readers, 1, |a, b| a.cmp(b), |rec| {
            out.push(rec[0]);
            Ok(())
        })
        .unwrap();
        assert_eq!(out, vec![1, 2]);
    }

    #[test]
    fn advises_windows_across_a_run_longer_than_one_window() {
        let dir = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..WINDOW * 3).map(|i| (i % 256) as u8).collect();
        let mut reader = RunReader::open(&run_file(dir.path(), "big", &data)).unwrap();
        let mut last = None;
        while let Some(rec) = reader.next_record(1) {
            last = Some(rec[0]);
        }
        assert_eq!(last, Some(data[data.len() - 1]));
    }
}
