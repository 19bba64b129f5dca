//! Multi-LOD Clark-Munro/Alstrup "split-and-refine" block packing.
//!
//! Applied once per LOD, bottom-up, to the just-built node forest: each
//! node records, at every block size, how big a block it would form by
//! greedily merging with its already-packed children, and how deep that
//! block sits relative to its children's own blocks. Running the same
//! greedy single-block-size packer independently at several block sizes
//! is what makes the result cache-oblivious rather than tuned to one
//! page size.
//!
//! This only decides block membership and reports it (via
//! [`MemNode::blockinfo`], logged by [`super::build_tree_file`]); it does
//! not reorder [`super::tree_compress`]'s write pass. That pass already
//! writes every node immediately after the whole of its own subtree, so
//! a node and its descendants are already contiguous in the finished
//! file -- exactly the locality a block assignment at a subtree root
//! would otherwise have to re-derive.

use super::tree_gen::MemNode;
use crate::varint;

/// Block sizes in bytes, largest to smallest: one large page, one
/// mid-size page, one small page, one prefetch line, one cache line.
pub const LOD_SIZES: [u32; 5] = [2_097_152, 65_536, 4_096, 256, 64];
pub const NLOD: usize = LOD_SIZES.len();

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Estimated cumulative size of the block this node anchors, in bytes.
    pub size: u32,
    /// Depth of that block relative to its children's own blocks; 0 for
    /// a node packed alone or merged only with same-depth children.
    pub depth: u8,
}

/// Fills in `node.blockinfo` for `node` and its whole subtree, children
/// before parents.
pub fn compute(node: &mut MemNode) {
    for child in node.children.iter_mut().flatten() {
        compute(child);
    }
    let own_size = estimate_size(node);
    for lod in 0..NLOD {
        node.blockinfo[lod] = pack_lod(node, own_size, LOD_SIZES[lod]);
    }
}

/// `varint(index) + varint(count)`, plus a fixed per-child estimate for
/// internal nodes (distance field plus bookkeeping), matching the rough
/// on-disk size `tree_compress` actually produces.
fn estimate_size(node: &MemNode) -> u32 {
    let mut size = varint::encode(node.index).len() as u32 + varint::encode(node.count).len() as u32;
    let nchild = node.children.iter().filter(|c| c.is_some()).count() as u32;
    if nchild > 0 {
        size += 3 * nchild + 4;
    }
    size
}

fn pack_lod(node: &MemNode, own_size: u32, block_size: u32) -> BlockInfo {
    let lod = LOD_SIZES.iter().position(|&s| s == block_size).expect("block_size must be one of LOD_SIZES");
    let mut children: Vec<BlockInfo> =
        node.children.iter().flatten().map(|c| c.blockinfo[lod]).collect();
    if children.is_empty() {
        return BlockInfo { size: own_size, depth: 0 };
    }
    children.sort_by_key(|b| (b.depth, b.size));

    let min_depth = children[0].depth;
    let max_depth = children[children.len() - 1].depth;

    if min_depth == max_depth {
        let total: u32 = own_size + children.iter().map(|b| b.size).sum::<u32>();
        if total <= block_size {
            return BlockInfo { size: total, depth: min_depth };
        }
        let mut fit = own_size;
        for b in &children {
            if fit + b.size <= block_size {
                fit += b.size;
            } else {
                break;
            }
        }
        BlockInfo { size: fit, depth: min_depth + 1 }
    } else {
        let deepest_total: u32 =
            own_size + children.iter().filter(|b| b.depth == max_depth).map(|b| b.size).sum::<u32>();
        if deepest_total <= block_size {
            BlockInfo { size: deepest_total, depth: max_depth }
        } else {
            BlockInfo { size: own_size, depth: max_depth + 1 }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::tree_gen::build;

    fn lvl20(root: i64, path: &[i64]) -> i64 {
        let mut id = root;
        for &p in path {
            id = id * 4 + p;
        }
        id << (2 * (20 - path.len()))
    }

    #[test]
    fn leaf_node_forms_a_depth_zero_block_at_every_lod() {
        let ids = vec![lvl20(8, &[0, 0])];
        let mut roots = build(&ids, 1);
        let root = roots[0].as_mut().unwrap();
        compute(root);
        for info in root.blockinfo {
            assert_eq!(info.depth, 0);
            assert_eq!(info.size, estimate_size(root));
        }
    }

    #[test]
    fn small_subtree_merges_into_one_block_at_every_lod() {
        let mut ids = Vec::new();
        for p in 0..4 {
            ids.push(lvl20(9, &[p]));
        }
        ids.sort();
        let mut roots = build(&ids, 1);
        let root = roots[1].as_mut().unwrap();
        compute(root);
        // four tiny leaves plus their parent fit easily even at the
        // smallest (64-byte) block.
        let smallest = root.blockinfo[NLOD - 1];
        assert_eq!(smallest.depth, 0);
        assert!(smallest.size <= LOD_SIZES[NLOD - 1]);
    }

    #[test]
    fn overflowing_smallest_lod_climbs_a_depth() {
        let mut ids = Vec::new();
        for p0 in 0..4 {
            for p1 in 0..4 {
                for p2 in 0..4 {
                    ids.push(lvl20(10, &[p0, p1, p2]));
                }
            }
        }
        ids.sort();
        let mut roots = build(&ids, 1);
        let root = roots[2].as_mut().unwrap();
        compute(root);
        // enough nodes that the cacheline-size (64 byte) block can't
        // hold the whole subtree, but the 2 MiB block still can.
        assert!(root.blockinfo[NLOD - 1].depth >= 1);
        assert_eq!(root.blockinfo[0].depth, 0);
    }
}
