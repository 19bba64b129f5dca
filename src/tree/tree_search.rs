//! Reads the packed tree file built by [`crate::tree::tree_compress`]
//! and walks it alongside the same trixel subdivision
//! ([`crate::trixel::TriFrame`]) that built it, pruning whole subtrees
//! a region cannot possibly touch.
//!
//! Node offsets are self-relative and forward: reading a distance field
//! at some position tells you how far *ahead* its target starts, so a
//! reader never needs the file length or a second pass, only its
//! current cursor. See `tree_compress` for the derivation of that
//! arithmetic; this module only consumes it.
//!
//! A node's leaf/internal status is never stored directly -- it is
//! re-derived the same way the builder decided it, from `count` versus
//! `leafthresh` and from depth versus [`crate::tree::tree_gen::MAX_TREE_LEVEL`],
//! saving a tag byte on every node in the file.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::coverage::Coverage;
use crate::error::{Error, Result};
use crate::htm_id::{NROOTS, ROOT_EDGE, ROOT_VERT};
use crate::region::Shape;
use crate::tree::tree_gen::MAX_TREE_LEVEL;
use crate::trixel::TriFrame;
use crate::varint;

enum Backing {
    Mmap(Mmap),
    Owned(Vec<u8>),
}

impl Backing {
    fn as_bytes(&self) -> &[u8] {
        match self {
            Backing::Mmap(m) => m,
            Backing::Owned(v) => v,
        }
    }
}

/// A matched span of points under some node, reported during a tree
/// walk. `certain` is `true` only for a node lying entirely inside the
/// region (no further per-point test needed); `false` for a leaf whose
/// points only partially overlap the region, or whose trixel merely
/// contains the region, which the caller must test point-by-point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchedRange {
    pub index: u64,
    pub count: u64,
    pub certain: bool,
}

pub struct TreeReader {
    backing: Backing,
    leafthresh: u64,
    total_count: u64,
    root_ptr: [Option<usize>; NROOTS],
}

impl TreeReader {
    pub fn open_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: tree files are written once by `tree_compress::compress`
        // and never mutated afterward; callers in this crate only ever
        // open them read-only.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::Mmap(e.to_string()))?;
        Self::build(Backing::Mmap(mmap))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::build(Backing::Owned(bytes))
    }

    fn build(backing: Backing) -> Result<Self> {
        let bytes = backing.as_bytes();
        let (leafthresh, mut pos) = read_varint(bytes, 0)?;
        let (total_count, after_total) = read_varint(bytes, pos)?;
        pos = after_total;
        let mut root_ptr = [None; NROOTS];
        for slot in root_ptr.iter_mut() {
            let (target, after) = read_distance(bytes, pos)?;
            *slot = target;
            pos = after;
        }
        Ok(Self { backing, leafthresh, total_count, root_ptr })
    }

    #[must_use]
    pub fn leafthresh(&self) -> u64 {
        self.leafthresh
    }

    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Size of the mapped/owned tree buffer, in bytes.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.backing.as_bytes().len()
    }

    /// Pins the tree mapping in physical memory (`mlock`). A no-op on
    /// an owned, non-mmap-backed reader, which is already fully resident.
    pub fn lock_in_memory(&self) -> Result<()> {
        match &self.backing {
            Backing::Mmap(m) => m.lock().map_err(|e| Error::Mmap(e.to_string())),
            Backing::Owned(_) => Ok(()),
        }
    }

    /// Releases a mapping previously pinned by [`Self::lock_in_memory`].
    pub fn unlock_memory(&self) -> Result<()> {
        match &self.backing {
            Backing::Mmap(m) => m.unlock().map_err(|e| Error::Mmap(e.to_string())),
            Backing::Owned(_) => Ok(()),
        }
    }

    fn is_leaf(&self, count: u64, level: i32) -> bool {
        count < self.leafthresh || level >= MAX_TREE_LEVEL
    }

    /// Walks every node that overlaps `shape`, invoking `on_range` once
    /// per matched span. Disjoint subtrees are pruned without being
    /// read at all.
    pub fn for_each_range(&self, shape: &Shape, mut on_range: impl FnMut(MatchedRange)) -> Result<()> {
        let bytes = self.backing.as_bytes();
        for idx in 0..NROOTS {
            if let Some(offset) = self.root_ptr[idx] {
                let frame = root_frame(idx);
                self.visit(bytes, offset, &frame, 0, 0, shape, &mut on_range)?;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn visit(
        &self,
        bytes: &[u8],
        offset: usize,
        frame: &TriFrame,
        level: i32,
        parent_index: u64,
        shape: &Shape,
        on_range: &mut impl FnMut(MatchedRange),
    ) -> Result<()> {
        let coverage = shape.classify(frame);
        if coverage == Coverage::Disjoint {
            return Ok(());
        }
        let (count, after_count) = read_varint(bytes, offset)?;
        let (delta, after_index) = read_varint(bytes, after_count)?;
        let index = parent_index + delta;

        if coverage == Coverage::Inside {
            on_range(MatchedRange { index, count, certain: true });
            return Ok(());
        }

        if self.is_leaf(count, level) {
            on_range(MatchedRange { index, count, certain: false });
            return Ok(());
        }

        let children = frame.children()?;
        let mut pos = after_index;
        for child in &children {
            let (target, after) = read_distance(bytes, pos)?;
            pos = after;
            if let Some(child_offset) = target {
                self.visit(bytes, child_offset, child, level + 1, index, shape, on_range)?;
            }
        }
        Ok(())
    }
}

fn root_frame(idx: usize) -> TriFrame {
    TriFrame {
        verts: ROOT_VERT[idx],
        edges: ROOT_EDGE[idx],
        id: idx as i64 + 8,
    }
}

fn read_varint(bytes: &[u8], pos: usize) -> Result<(u64, usize)> {
    let slice = bytes.get(pos..).ok_or_else(|| Error::Corrupt("tree offset out of bounds".into()))?;
    let (value, len) = varint::decode(slice)?;
    Ok((value, pos + len))
}

/// Reads one self-relative distance field at `pos`: `0` means absent,
/// otherwise `pos_after + rel - 1` is the target's byte offset.
fn read_distance(bytes: &[u8], pos: usize) -> Result<(Option<usize>, usize)> {
    let (rel, after) = read_varint(bytes, pos)?;
    if rel == 0 {
        Ok((None, after))
    } else {
        Ok((Some(after + rel as usize - 1), after))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Circle;
    use crate::tree::{tree_compress, tree_gen};
    use crate::vec3::V3;

    fn lvl20(root: i64, path: &[i64]) -> i64 {
        let mut id = root;
        for &p in path {
            id = id * 4 + p;
        }
        id << (2 * (20 - path.len()))
    }

    fn build_reader(ids: &[i64], leafthresh: u64) -> TreeReader {
        let roots = tree_gen::build(ids, leafthresh);
        let mut bytes = Vec::new();
        tree_compress::compress(&roots, leafthresh, ids.len() as u64, &mut bytes).unwrap();
        TreeReader::from_bytes(bytes).unwrap()
    }

    #[test]
    fn all_sky_shape_matches_every_root_as_one_certain_range_each() {
        let mut ids = Vec::new();
        for root in 8..16i64 {
            for p in 0..4 {
                ids.push(lvl20(root, &[p]));
            }
        }
        ids.sort();
        let reader = build_reader(&ids, 1);
        assert_eq!(reader.total_count(), ids.len() as u64);

        let shape: Shape = Circle::all_sky().into();
        let mut total = 0u64;
        reader
            .for_each_range(&shape, |r| {
                assert!(r.certain);
                total += r.count;
            })
            .unwrap();
        assert_eq!(total, ids.len() as u64);
    }

    #[test]
    fn small_circle_prunes_disjoint_roots() {
        let mut ids = Vec::new();
        for root in 8..16i64 {
            for p in 0..4 {
                ids.push(lvl20(root, &[p]));
            }
        }
        ids.sort();
        let reader = build_reader(&ids, 1);

        let shape: Shape = Circle::new(V3::new(1.0, 0.0, 0.0), 1.0).unwrap().into();
        let mut ranges = Vec::new();
        reader.for_each_range(&shape, |r| ranges.push(r)).unwrap();
        let matched: u64 = ranges.iter().map(|r| r.count).sum();
        assert!(matched < ids.len() as u64);
    }
}
