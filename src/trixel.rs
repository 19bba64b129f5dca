//! A triangle (trixel) frame carrying both vertices and edge-plane
//! normals, plus the subdivision step that produces its four children.
//!
//! This is the "six-function ladder" (`prep0/make0 .. prep2/make3`) from
//! the source collapsed into one [`TriFrame::children`] call: every
//! consumer that needs to walk the conceptual HTM tree node-by-node
//! (range covering, tree search traversal) goes through here so the
//! subdivision math exists in exactly one place.

use crate::error::Result;
use crate::htm_id::{HtmId, Root, ROOT_EDGE, ROOT_VERT};
use crate::vec3::V3;

#[derive(Debug, Clone, Copy)]
pub struct TriFrame {
    /// Vertices, counter-clockwise as seen from outside the sphere.
    pub verts: [V3; 3],
    /// Edge-plane normals; `edges[i]` is a (not necessarily unit, but
    /// correctly signed) plane normal for the edge running from
    /// `verts[i]` to `verts[(i+1)%3]`. Sign and direction are exact;
    /// magnitude may be scaled by a positive factor relative to the
    /// true cross product `verts[i] x verts[(i+1)%3]` once this frame
    /// descends from a subdivision, since children reuse their parent's
    /// un-renormalized edge vectors for shared edges. Every consumer in
    /// this crate only tests the sign of a dot product against an edge,
    /// or ratios of such dot products, both invariant under positive
    /// rescaling, so this is never a problem.
    pub edges: [V3; 3],
    pub id: HtmId,
}

impl TriFrame {
    #[must_use]
    pub fn root(r: Root) -> Self {
        let idx = r as usize;
        Self {
            verts: ROOT_VERT[idx],
            edges: ROOT_EDGE[idx],
            id: idx as i64 + 8,
        }
    }

    /// Computes this node's 4 children, in index order 0..=3, matching
    /// `_htm_node_make0..3`: children 0/1/2 are the corner triangles at
    /// `verts[0]/[1]/[2]`, child 3 is the central triangle formed by the
    /// three edge midpoints (whose edge normals are the negated mid-edge
    /// normals, since its winding is reversed relative to its neighbors).
    pub fn children(&self) -> Result<[TriFrame; 4]> {
        let [v0, v1, v2] = self.verts;
        let [edge0, edge1, edge2] = self.edges;

        let w0 = V3::midpoint(&v1, &v2)?; // opposite v0
        let w1 = V3::midpoint(&v2, &v0)?; // opposite v1
        let w2 = V3::midpoint(&v0, &v1)?; // opposite v2

        let mid_edge1 = w2.rcross(&w1);
        let mid_edge2 = w0.rcross(&w2);
        let mid_edge0 = w1.rcross(&w0);

        let base = self.id << 2;
        let c0 = TriFrame {
            verts: [v0, w2, w1],
            edges: [edge0, mid_edge1, edge2],
            id: base,
        };
        let c1 = TriFrame {
            verts: [v1, w0, w2],
            edges: [edge1, mid_edge2, edge0],
            id: base + 1,
        };
        let c2 = TriFrame {
            verts: [v2, w1, w0],
            edges: [edge2, mid_edge0, edge1],
            id: base + 2,
        };
        let c3 = TriFrame {
            verts: [w0, w1, w2],
            edges: [mid_edge0.neg(), mid_edge1.neg(), mid_edge2.neg()],
            id: base + 3,
        };
        Ok([c0, c1, c2, c3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::htm_id;

    #[test]
    fn children_ids_match_htm_id_subdivision() {
        let v = V3::new(0.3, 0.6, 0.74).normalize().unwrap();
        let root = htm_id::root_of(&v);
        let mut frame = TriFrame::root(root);
        for _ in 0..5 {
            let children = frame.children().unwrap();
            let want = htm_id::id(&v, htm_id::level(frame.id) + 1).unwrap();
            let got = children.iter().find(|c| c.id == want);
            assert!(got.is_some(), "child id {want} not among computed children");
            frame = *got.unwrap();
        }
    }
}
