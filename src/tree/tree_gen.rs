//! Builds the in-memory tree over an already-HTM-ID-sorted point set.
//!
//! The full sorted id array is available in memory at once (it is the
//! product of [`crate::extsort::sort_file`] over the record file), so
//! construction is a direct recursive partition of that array rather
//! than the streaming `addNode`/`emit` walk a single pass over disk
//! would require: each node's point range is a contiguous slice, and
//! a sorted slice's children are four contiguous sub-slices found by
//! binary search on the next 2-bit field. This produces the exact same
//! node/count/index tree that the streaming walk would, just without
//! needing a disk pass to get there.
//!
//! [`super::layout`] runs as a second pass over this forest, annotating
//! each node with its multi-LOD block membership; see that module for
//! why a separate pass, rather than a change to this one, is where that
//! belongs.

use super::layout::{self, BlockInfo};
use crate::htm_id::HtmId;

/// Every HTM tree built by this crate is rooted at this fixed level;
/// tree search stops descending here regardless of leaf threshold.
pub const MAX_TREE_LEVEL: i32 = 20;

#[derive(Debug)]
pub struct MemNode {
    /// This node's id *at its own level* (i.e. the level-20 id of any
    /// point under it, right-shifted down to this node's depth).
    pub id: HtmId,
    pub level: i32,
    /// Index of this node's first point in the globally sorted array.
    pub index: u64,
    pub count: u64,
    pub children: [Option<Box<MemNode>>; 4],
    /// Multi-LOD block membership, filled in by [`layout::compute`] after
    /// the whole forest is built; all-zero until then.
    pub blockinfo: [BlockInfo; layout::NLOD],
}

/// Builds the 8 root subtrees (`None` for roots with no points) from
/// `ids`, level-20 HTM ids sorted ascending, collapsing any subtree
/// with fewer than `leafthresh` points into a leaf.
#[must_use]
pub fn build(ids: &[HtmId], leafthresh: u64) -> [Option<Box<MemNode>>; 8] {
    let mut roots: [Option<Box<MemNode>>; 8] = Default::default();
    let mut start = 0usize;
    while start < ids.len() {
        let root_marker = ids[start] >> (2 * MAX_TREE_LEVEL);
        let end = ids[start..].partition_point(|&id| (id >> (2 * MAX_TREE_LEVEL)) == root_marker) + start;
        let ridx = (root_marker - 8) as usize;
        roots[ridx] = Some(Box::new(build_node(ids, start, end, root_marker, 0, leafthresh)));
        start = end;
    }
    for root in roots.iter_mut().flatten() {
        layout::compute(root);
    }
    roots
}

fn build_node(
    ids: &[HtmId],
    start: usize,
    end: usize,
    id_at_level: HtmId,
    level: i32,
    leafthresh: u64,
) -> MemNode {
    let count = (end - start) as u64;
    let mut node = MemNode {
        id: id_at_level,
        level,
        index: start as u64,
        count,
        children: Default::default(),
        blockinfo: Default::default(),
    };
    if level >= MAX_TREE_LEVEL || count < leafthresh {
        return node;
    }
    let shift = 2 * (MAX_TREE_LEVEL - level - 1);
    let mut s = start;
    for k in 0..4i64 {
        let child_id = id_at_level * 4 + k;
        let e = ids[s..end].partition_point(|&id| (id >> shift) <= child_id) + s;
        if e > s {
            node.children[k as usize] = Some(Box::new(build_node(ids, s, e, child_id, level + 1, leafthresh)));
        }
        s = e;
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lvl20(root: i64, path: &[i64]) -> HtmId {
        let mut id = root;
        for &p in path {
            id = id * 4 + p;
        }
        id << (2 * (MAX_TREE_LEVEL as usize - path.len()))
    }

    #[test]
    fn single_root_counts_match() {
        let mut ids = vec![lvl20(8, &[0, 0]), lvl20(8, &[0, 1]), lvl20(8, &[1, 0])];
        ids.sort();
        let roots = build(&ids, 1);
        let root = roots[0].as_ref().unwrap();
        assert_eq!(root.count, 3);
        assert_eq!(root.index, 0);
    }

    #[test]
    fn below_leafthresh_collapses_to_leaf() {
        let mut ids = vec![lvl20(9, &[0]), lvl20(9, &[1])];
        ids.sort();
        let roots = build(&ids, 10);
        let root = roots[1].as_ref().unwrap();
        assert_eq!(root.count, 2);
        assert!(root.children.iter().all(Option::is_none));
    }

    #[test]
    fn child_counts_sum_to_parent() {
        let mut ids = Vec::new();
        for p0 in 0..4 {
            for p1 in 0..4 {
                ids.push(lvl20(10, &[p0, p1]));
            }
        }
        ids.sort();
        let roots = build(&ids, 1);
        let root = roots[2].as_ref().unwrap();
        let child_sum: u64 = root.children.iter().flatten().map(|c| c.count).sum();
        assert_eq!(child_sum, root.count);
    }
}
