//! External merge sort over a flat file of fixed-size records, in
//! bounded memory: in-memory run formation via a background block
//! writer, then a k-way merge driven by a min-heap over memory-mapped
//! runs, in as many passes as needed to collapse every run into one.
//! Each run is read through [`merge::RunReader`], which windows its
//! madvise hints so the merge's forward-only cursor keeps resident
//! memory bounded regardless of run size.

mod block_writer;
mod merge;

pub use block_writer::BlockWriter;

use merge::RunReader;

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;

const IOBLK: usize = 64 * 1024;

/// Sorts the fixed-`record_size`-byte records in the file at `path`
/// in place, under `cmp`, using at most `mem_budget_bytes` of buffered
/// memory per run. Stable only up to what `cmp` distinguishes: ties
/// keep their relative order within a run, but may be reordered across
/// runs (the underlying heap is not required to be stable across equal
/// keys from different runs).
pub fn sort_file<C>(path: &Path, record_size: usize, mem_budget_bytes: usize, cmp: C) -> Result<()>
where
    C: Fn(&[u8], &[u8]) -> std::cmp::Ordering + Copy,
{
    assert!(record_size > 0, "record_size must be positive");
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let sortblk = (mem_budget_bytes / record_size).max(1) * record_size;

    let mut runs = form_runs(path, record_size, sortblk, cmp, dir)?;
    if runs.is_empty() {
        return Ok(());
    }

    let k = ((mem_budget_bytes.saturating_sub(2 * IOBLK)) / (2 * IOBLK)).max(2);

    while runs.len() > 1 {
        let mut next_runs = Vec::new();
        for group in runs.chunks(k) {
            next_runs.push(merge_group(group, record_size, cmp, dir)?);
        }
        for run in runs {
            let _ = fs::remove_file(run);
        }
        runs = next_runs;
    }

    fs::rename(&runs[0], path)?;
    Ok(())
}

fn form_runs<C>(
    path: &Path,
    record_size: usize,
    sortblk: usize,
    cmp: C,
    dir: &Path,
) -> Result<Vec<PathBuf>>
where
    C: Fn(&[u8], &[u8]) -> std::cmp::Ordering,
{
    let mut input = BufReader::new(File::open(path)?);
    let mut runs = Vec::new();
    let mut chunk = vec![0u8; sortblk];

    loop {
        let mut filled = 0;
        while filled < chunk.len() {
            let n = input.read(&mut chunk[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            break;
        }
        let usable = (filled / record_size) * record_size;
        let mut records: Vec<&[u8]> = chunk[..usable].chunks(record_size).collect();
        records.sort_by(|a, b| cmp(a, b));

        let run_path = tempfile::Builder::new()
            .prefix("extsort-run-")
            .tempfile_in(dir)?
            .into_temp_path()
            .keep()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        {
            let mut writer = BlockWriter::new(File::create(&run_path)?, IOBLK);
            for rec in &records {
                writer.write(rec)?;
            }
            writer.close()?;
        }
        runs.push(run_path);

        if filled < chunk.len() {
            break;
        }
    }
    Ok(runs)
}

fn merge_group<C>(group: &[PathBuf], record_size: usize, cmp: C, dir: &Path) -> Result<PathBuf>
where
    C: Fn(&[u8], &[u8]) -> std::cmp::Ordering,
{
    let readers: Vec<RunReader> = group.iter().map(|p| RunReader::open(p)).collect::<Result<_>>()?;

    let out_path = tempfile::Builder::new()
        .prefix("extsort-merged-")
        .tempfile_in(dir)?
        .into_temp_path()
        .keep()
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    let mut writer = BufWriter::new(File::create(&out_path)?);
    merge::k_way_merge(readers, record_size, cmp, |rec| {
        writer.write_all(rec)?;
        Ok(())
    })?;
    writer.flush()?;
    Ok(out_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read as _;

    #[test]
    fn sorts_single_byte_records_across_many_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let mut data: Vec<u8> = (0..200u32).map(|i| (200 - i) as u8).collect();
        data.truncate(200);
        std::fs::write(&path, &data).unwrap();

        sort_file(&path, 1, 32, |a, b| a.cmp(b)).unwrap();

        let mut out = Vec::new();
        File::open(&path).unwrap().read_to_end(&mut out).unwrap();
        let mut expected = data;
        expected.sort();
        assert_eq!(out, expected);
    }

    #[test]
    fn sorts_multi_byte_records_by_first_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let mut data = Vec::new();
        for v in [5u32, 1, 4, 2, 3, 0] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        std::fs::write(&path, &data).unwrap();

        sort_file(&path, 4, 8, |a, b| {
            u32::from_le_bytes(a.try_into().unwrap()).cmp(&u32::from_le_bytes(b.try_into().unwrap()))
        })
        .unwrap();

        let mut out = Vec::new();
        File::open(&path).unwrap().read_to_end(&mut out).unwrap();
        let got: Vec<u32> = out.chunks(4).map(|c| u32::from_le_bytes(c.try_into().unwrap())).collect();
        assert_eq!(got, vec![0, 1, 2, 3, 4, 5]);
    }
}
