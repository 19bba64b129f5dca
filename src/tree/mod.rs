//! Ties the offline construction pipeline together: sort every record's
//! HTM id alongside its row number, physically reorder the record file
//! to match, build the in-memory node forest over the sorted ids, and
//! serialize it to a tree file next to the records.
//!
//! Each stage is its own module, grounded separately: [`tree_gen`] (node
//! partitioning), [`tree_compress`] (wire format), [`tree_search`] (query
//! traversal), [`scan_fallback`] (no-tree linear path).

pub mod layout;
pub mod scan_fallback;
pub mod tree_compress;
pub mod tree_gen;
pub mod tree_search;

pub use tree_gen::MAX_TREE_LEVEL;
pub use tree_search::{MatchedRange, TreeReader};

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::entry_store::{EntryStore, FieldDesc};
use crate::error::Result;
use crate::extsort;
use crate::htm_id;

const ID_ROW_SIZE: usize = 16;

/// Owns a record store and its optional tree mapping together, so a
/// long-running query process can pin both in memory with one call.
pub struct TreeHandle {
    entries: EntryStore,
    tree: Option<TreeReader>,
    locked: bool,
}

impl TreeHandle {
    #[must_use]
    pub fn new(entries: EntryStore, tree: Option<TreeReader>) -> Self {
        Self { entries, tree, locked: false }
    }

    /// Opens the record file at `entries_path` and, if present, the tree
    /// file at `tree_path`.
    pub fn open(entries_path: &Path, stride: usize, fields: Vec<FieldDesc>, tree_path: &Path) -> Result<Self> {
        let entries = EntryStore::open_file(entries_path, stride, fields)?;
        let tree = TreeReader::open_file(tree_path).ok();
        Ok(Self::new(entries, tree))
    }

    #[must_use]
    pub fn entries(&self) -> &EntryStore {
        &self.entries
    }

    #[must_use]
    pub fn tree(&self) -> Option<&TreeReader> {
        self.tree.as_ref()
    }

    /// `mlock`s the tree mapping unconditionally, and the record mapping
    /// too if its size is at or below `datathresh` bytes. Matches the
    /// construction tool's `--lock-in-memory` contract: small record
    /// sets ride along with the (always small) tree in the working set;
    /// large ones are left to the page cache.
    pub fn lock_in_memory(&mut self, datathresh: u64) -> Result<()> {
        if let Some(tree) = &self.tree {
            tree.lock_in_memory()?;
        }
        if self.entries.byte_len() as u64 <= datathresh {
            self.entries.lock_in_memory()?;
        }
        self.locked = true;
        Ok(())
    }
}

impl Drop for TreeHandle {
    fn drop(&mut self) {
        if self.locked {
            let _ = self.entries.unlock_memory();
            if let Some(tree) = &self.tree {
                let _ = tree.unlock_memory();
            }
        }
    }
}

/// Builds a tree file for the records in `entries`, reordering `entries`
/// in place (by rewriting the file at `entries_path`) so that record
/// order matches ascending level-20 HTM id. `leafthresh` subtrees smaller
/// than this collapse to leaves; skip tree construction entirely (per
/// spec.md §6's `--tree-min`) when `entries.len()` is small -- the caller
/// decides that, this function always builds.
pub fn build_tree_file(
    entries_path: &Path,
    entries: &EntryStore,
    tree_path: &Path,
    mem_budget_bytes: usize,
    leafthresh: u64,
) -> Result<()> {
    let n = entries.len();
    log::debug!("tree build: sorting {n} records by HTM id");

    let pairs_path = entries_path.with_extension("idrow.scr");
    {
        let mut out = BufWriter::new(File::create(&pairs_path)?);
        for row in 0..n {
            let id = htm_id::id(&entries.point(row)?, MAX_TREE_LEVEL)?;
            out.write_all(&id.to_le_bytes())?;
            out.write_all(&(row as u64).to_le_bytes())?;
        }
        out.flush()?;
    }

    extsort::sort_file(&pairs_path, ID_ROW_SIZE, mem_budget_bytes, |a, b| {
        i64::from_le_bytes(a[0..8].try_into().unwrap()).cmp(&i64::from_le_bytes(b[0..8].try_into().unwrap()))
    })?;

    let pair_bytes = std::fs::read(&pairs_path)?;
    std::fs::remove_file(&pairs_path)?;
    let mut ids: Vec<i64> = Vec::with_capacity(n);
    let mut order: Vec<usize> = Vec::with_capacity(n);
    for chunk in pair_bytes.chunks_exact(ID_ROW_SIZE) {
        ids.push(i64::from_le_bytes(chunk[0..8].try_into().unwrap()));
        order.push(u64::from_le_bytes(chunk[8..16].try_into().unwrap()) as usize);
    }

    let stride = entries.stride();
    let mut reordered = vec![0u8; stride * n];
    for (new_row, &old_row) in order.iter().enumerate() {
        let rec = entries.record(old_row)?;
        reordered[new_row * stride..(new_row + 1) * stride].copy_from_slice(rec);
    }
    std::fs::write(entries_path, &reordered)?;

    log::debug!("tree build: partitioning {n} sorted ids, leafthresh {leafthresh}");
    let roots = tree_gen::build(&ids, leafthresh);
    for (ridx, root) in roots.iter().enumerate() {
        if let Some(node) = root {
            let per_lod: Vec<(u8, u32)> = node.blockinfo.iter().map(|b| (b.depth, b.size)).collect();
            log::debug!("tree build: root {ridx} layout (depth, bytes) per LOD, largest block first: {per_lod:?}");
        }
    }

    let mut out = BufWriter::new(File::create(tree_path)?);
    tree_compress::compress(&roots, leafthresh, n as u64, &mut out)?;
    out.flush()?;
    log::debug!("tree build: wrote tree file {}", tree_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry_store::{FieldDesc, FieldType};
    use crate::vec3::V3;

    fn write_entries(dir: &Path, points: &[V3]) -> std::path::PathBuf {
        let path = dir.join("records.bin");
        let mut bytes = Vec::new();
        for p in points {
            bytes.extend_from_slice(&p.x.to_le_bytes());
            bytes.extend_from_slice(&p.y.to_le_bytes());
            bytes.extend_from_slice(&p.z.to_le_bytes());
        }
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn xyz_fields() -> Vec<FieldDesc> {
        vec![
            FieldDesc { name: "x".into(), ty: FieldType::F64, offset: 0 },
            FieldDesc { name: "y".into(), ty: FieldType::F64, offset: 8 },
            FieldDesc { name: "z".into(), ty: FieldType::F64, offset: 16 },
        ]
    }

    #[test]
    fn built_tree_total_count_matches_record_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut points = Vec::new();
        for i in 0..200 {
            let lon = (i as f64) * 1.37;
            let lat = ((i as f64) * 0.61).sin() * 80.0;
            points.push(crate::vec3::SphericalCoord::new(lon, lat).to_v3());
        }
        let entries_path = write_entries(dir.path(), &points);
        let entries = EntryStore::open_file(&entries_path, 24, xyz_fields()).unwrap();
        let tree_path = dir.path().join("records.htm");

        build_tree_file(&entries_path, &entries, &tree_path, 64 * 1024, 4).unwrap();

        let reader = TreeReader::open_file(&tree_path).unwrap();
        assert_eq!(reader.total_count(), points.len() as u64);
    }

    #[test]
    fn lock_in_memory_is_a_no_op_on_owned_backing() {
        let points = vec![V3::new(1.0, 0.0, 0.0)];
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&points[0].x.to_le_bytes());
        bytes.extend_from_slice(&points[0].y.to_le_bytes());
        bytes.extend_from_slice(&points[0].z.to_le_bytes());
        let entries = EntryStore::from_bytes(bytes, 24, xyz_fields()).unwrap();
        let mut handle = TreeHandle::new(entries, None);
        handle.lock_in_memory(1024).unwrap();
    }

    #[test]
    fn reordered_records_are_htm_id_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let mut points = Vec::new();
        for i in 0..50 {
            let lon = (i as f64) * 7.1;
            let lat = ((i as f64) * 1.9).cos() * 70.0;
            points.push(crate::vec3::SphericalCoord::new(lon, lat).to_v3());
        }
        let entries_path = write_entries(dir.path(), &points);
        let entries = EntryStore::open_file(&entries_path, 24, xyz_fields()).unwrap();
        let tree_path = dir.path().join("records.htm");
        build_tree_file(&entries_path, &entries, &tree_path, 64 * 1024, 4).unwrap();

        let reordered = EntryStore::open_file(&entries_path, 24, xyz_fields()).unwrap();
        let mut prev = htm_id::id(&reordered.point(0).unwrap(), MAX_TREE_LEVEL).unwrap();
        for i in 1..reordered.len() {
            let cur = htm_id::id(&reordered.point(i).unwrap(), MAX_TREE_LEVEL).unwrap();
            assert!(cur >= prev, "records not sorted at index {i}");
            prev = cur;
        }
    }
}
