//! Serializes a [`MemNode`] forest into the packed, reverse-built tree
//! file format: every node is `[count][index][children]`, each child
//! slot either a single zero byte (absent) or a reverse-varint byte
//! distance back to that child, and an all-four-absent node collapses
//! to a leaf with its child slots omitted entirely. `index` is stored
//! relative to the parent's own index (absolute for roots), so a deep
//! node's own field stays small regardless of its absolute position.
//!
//! Reading `count` before any child pointers is what lets a reader
//! decide "is this a leaf" (`count < leafthresh`) before it needs to
//! know whether more fields follow -- the reverse of that order would
//! leave a reader unable to find `count` without already knowing the
//! answer it's meant to produce.
//!
//! The whole file is built back-to-front: a node can only be written
//! once every one of its children has already been written (so its
//! distance to each child is known), so the natural write order is a
//! post-order traversal, and what a post-order traversal wants to write
//! first is a leaf's deepest descendant — i.e. the *end* of the final
//! file. Rather than track absolute file positions and do a second
//! pass to fix them up, every distance is measured backward from "here"
//! at write time, every multi-byte field is mirrored
//! ([`crate::varint::encode_reverse`]), and the finished buffer is
//! reversed once at the end, turning every reverse distance, and every
//! mirrored varint, back into an ordinary forward one.
//!
//! A small hash table tracks, for each node not yet claimed by its
//! parent, the running output size at the moment it finished writing.
//! A parent looks up and *removes* each child's entry when it writes
//! that child's distance; the table must be completely empty once the
//! 8 root slots and the header are written, since every node other
//! than a root has exactly one parent to claim it. That invariant is
//! checked, not assumed.

use std::collections::HashMap;
use std::io::Write;

use crate::error::{Error, Result};
use crate::tree::tree_gen::MemNode;
use crate::varint;

/// Serializes `roots` (as produced by [`crate::tree::tree_gen::build`])
/// into the final tree file format and writes it to `out`.
pub fn compress<W: Write>(
    roots: &[Option<Box<MemNode>>; 8],
    leafthresh: u64,
    total_count: u64,
    out: &mut W,
) -> Result<()> {
    let mut buf: Vec<u8> = Vec::new();
    let mut offsets: HashMap<u64, u64> = HashMap::new();
    let mut running_size: u64 = 0;
    let mut next_idx: u64 = 0;

    let mut root_idx: [Option<u64>; 8] = [None; 8];
    for (ridx, root) in roots.iter().enumerate() {
        if let Some(node) = root {
            let idx = visit(node, 0, &mut buf, &mut offsets, &mut running_size, &mut next_idx, leafthresh);
            root_idx[ridx] = Some(idx);
        }
    }

    for ridx in (0..8).rev() {
        write_distance(root_idx[ridx], &mut buf, &mut offsets, &mut running_size);
    }

    append_reverse_varint(&mut buf, &mut running_size, total_count);
    append_reverse_varint(&mut buf, &mut running_size, leafthresh);

    if !offsets.is_empty() {
        return Err(Error::Corrupt(
            "tree compress: node offsets left unclaimed after header".into(),
        ));
    }

    buf.reverse();
    out.write_all(&buf)?;
    Ok(())
}

fn visit(
    node: &MemNode,
    parent_index: u64,
    buf: &mut Vec<u8>,
    offsets: &mut HashMap<u64, u64>,
    running_size: &mut u64,
    next_idx: &mut u64,
    leafthresh: u64,
) -> u64 {
    let mut child_idx: [Option<u64>; 4] = [None; 4];
    for (k, child) in node.children.iter().enumerate() {
        if let Some(c) = child {
            child_idx[k] = Some(visit(c, node.index, buf, offsets, running_size, next_idx, leafthresh));
        }
    }

    let children_start = buf.len();
    for k in (0..4).rev() {
        write_distance(child_idx[k], buf, offsets, running_size);
    }
    if child_idx.iter().all(Option::is_none) {
        let written = buf.len() - children_start;
        buf.truncate(children_start);
        *running_size -= written as u64;
    } else {
        debug_assert!(node.count >= leafthresh, "internal node below leaf threshold");
    }

    append_reverse_varint(buf, running_size, node.index - parent_index);
    append_reverse_varint(buf, running_size, node.count);

    let my_idx = *next_idx;
    *next_idx += 1;
    offsets.insert(my_idx, *running_size);
    my_idx
}

fn write_distance(
    idx: Option<u64>,
    buf: &mut Vec<u8>,
    offsets: &mut HashMap<u64, u64>,
    running_size: &mut u64,
) {
    match idx {
        None => {
            buf.push(0);
            *running_size += 1;
        }
        Some(idx) => {
            let child_offset = offsets
                .remove(&idx)
                .expect("child offset must have been recorded before its parent visits it");
            let rel = *running_size + 1 - child_offset;
            append_reverse_varint(buf, running_size, rel);
        }
    }
}

fn append_reverse_varint(buf: &mut Vec<u8>, running_size: &mut u64, value: u64) {
    let bytes = varint::encode_reverse(value);
    *running_size += bytes.len() as u64;
    buf.extend_from_slice(&bytes);
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
    fn single_point_tree_round_trips_through_header() {
        let ids = vec![lvl20(8, &[0, 0])];
        let roots = build(&ids, 1);
        let mut out = Vec::new();
        compress(&roots, 1, 1, &mut out).unwrap();
        assert!(!out.is_empty());
    }

    #[test]
    fn larger_forest_leaves_no_unclaimed_offsets() {
        let mut ids = Vec::new();
        for root in 8..16i64 {
            for p0 in 0..4 {
                for p1 in 0..4 {
                    ids.push(lvl20(root, &[p0, p1]));
                }
            }
        }
        ids.sort();
        let roots = build(&ids, 4);
        let mut out = Vec::new();
        compress(&roots, 4, ids.len() as u64, &mut out).unwrap();
        assert!(!out.is_empty());
    }
}
