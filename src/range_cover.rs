//! Computes a bounded-size, sorted, non-adjacent list of HTM-ID ranges
//! covering a region at a given level, coarsening the level when the
//! unconstrained cover would exceed the caller's range budget.

use crate::coverage::Coverage;
use crate::error::{Error, Result};
use crate::htm_id::{HtmId, HTM_MAX_LEVEL, NROOTS, ROOT_EDGE, ROOT_VERT};
use crate::region::Shape;
use crate::trixel::TriFrame;

/// An inclusive range of level-L HTM ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HtmRange {
    pub min: HtmId,
    pub max: HtmId,
}

/// A sorted sequence of [`HtmRange`]s with `range_i.max + 1 < range_{i+1}.min`:
/// strictly non-adjacent, non-overlapping, and in increasing order.
#[derive(Debug, Clone, Default)]
pub struct RangeList(Vec<HtmRange>);

impl RangeList {
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn ranges(&self) -> &[HtmRange] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Appends `[lo, hi]`, coalescing into the last range if `lo` is
    /// exactly the successor of the last range's `max`.
    pub fn append(&mut self, lo: HtmId, hi: HtmId) {
        if let Some(last) = self.0.last_mut() {
            if lo == last.max + 1 {
                last.max = hi;
                return;
            }
        }
        self.0.push(HtmRange { min: lo, max: hi });
    }

    #[must_use]
    pub fn contains_id(&self, id: HtmId) -> bool {
        self.0
            .binary_search_by(|r| {
                if id < r.min {
                    std::cmp::Ordering::Greater
                } else if id > r.max {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }

    /// Re-expresses this list (built at `old_level`) at a coarser
    /// `new_level`, masking low bits of each endpoint and re-coalescing.
    /// The result is always a superset of the original as a set of
    /// covered sky points.
    #[must_use]
    pub fn coarsen(&self, old_level: i32, new_level: i32) -> RangeList {
        debug_assert!(new_level <= old_level);
        let shift = 2 * (old_level - new_level);
        let mask: i64 = if shift >= 64 { -1 } else { (1i64 << shift) - 1 };
        let mut out = RangeList::new();
        for r in &self.0 {
            out.append(r.min & !mask, r.max | mask);
        }
        out
    }
}

fn root_frame(idx: usize) -> TriFrame {
    TriFrame {
        verts: ROOT_VERT[idx],
        edges: ROOT_EDGE[idx],
        id: idx as i64 + 8,
    }
}

/// Computes a RangeList covering `shape` at `level`, coarsening down from
/// `level` as needed to fit within `max_ranges`. Fails if `max_ranges` is
/// below the guaranteed achievable minimum of 4, or if `level` is out of
/// range.
pub fn cover(shape: &Shape, level: i32, max_ranges: usize) -> Result<RangeList> {
    if max_ranges < 4 {
        return Err(Error::OutOfBudget(max_ranges));
    }
    if !(0..=HTM_MAX_LEVEL).contains(&level) {
        return Err(Error::InvalidLevel(level));
    }

    let mut list = RangeList::new();
    for idx in 0..NROOTS {
        visit(&root_frame(idx), 0, level, shape, &mut list)?;
    }

    let mut eff_level = level;
    while list.len() > max_ranges && eff_level > 0 {
        eff_level -= 1;
        list = list.coarsen(level, eff_level);
    }
    Ok(list)
}

fn visit(frame: &TriFrame, l: i32, level: i32, shape: &Shape, list: &mut RangeList) -> Result<()> {
    match shape.classify(frame) {
        Coverage::Disjoint => {}
        Coverage::Inside | Coverage::Contains => {
            let shift = 2 * (level - l);
            let lo = frame.id << shift;
            let hi = lo | ((1i64 << shift) - 1);
            list.append(lo, hi);
        }
        Coverage::Intersect => {
            if l == level {
                list.append(frame.id, frame.id);
            } else {
                for child in frame.children()? {
                    visit(&child, l + 1, level, shape, list)?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::htm_id::Root;
    use crate::region::Circle;
    use crate::vec3::V3;

    #[test]
    fn append_coalesces_adjacent_ranges() {
        let mut list = RangeList::new();
        list.append(8, 8);
        list.append(9, 12);
        list.append(14, 15);
        assert_eq!(list.ranges(), &[HtmRange { min: 8, max: 12 }, HtmRange { min: 14, max: 15 }]);
    }

    #[test]
    fn coarsen_is_superset_by_range_count_or_wider() {
        let mut list = RangeList::new();
        list.append(32, 35);
        list.append(40, 40);
        let coarse = list.coarsen(1, 0);
        assert!(coarse.len() <= list.len());
        for r in list.ranges() {
            assert!(coarse.contains_id(r.min) && coarse.contains_id(r.max));
        }
    }

    #[test]
    fn s3_small_circle_at_level_zero() {
        let shape: Shape = Circle::new(V3::new(1.0, 0.0, 0.0), 10.0).unwrap().into();
        let list = cover(&shape, 0, 64).unwrap();
        let s0 = Root::S0 as i64 + 8;
        let s3 = Root::S3 as i64 + 8;
        let n0 = Root::N0 as i64 + 8;
        let n3 = Root::N3 as i64 + 8;
        let ranges = list.ranges();
        assert!(ranges.contains(&HtmRange { min: s0, max: s0 }));
        assert!(ranges.contains(&HtmRange { min: s3, max: n0 }));
        assert!(ranges.contains(&HtmRange { min: n3, max: n3 }));
    }

    #[test]
    fn s4_all_sky_circle_at_level_one() {
        let shape: Shape = Circle::all_sky().into();
        let list = cover(&shape, 1, 64).unwrap();
        assert_eq!(list.ranges(), &[HtmRange { min: 32, max: 63 }]);
    }

    #[test]
    fn budget_below_four_rejected() {
        let shape: Shape = Circle::all_sky().into();
        assert!(cover(&shape, 1, 3).is_err());
    }

    #[test]
    fn coarsening_reduces_range_count_to_fit_budget() {
        let shape: Shape = Circle::new(V3::new(0.3, 0.4, 0.5).normalize().unwrap(), 0.2)
            .unwrap()
            .into();
        let list = cover(&shape, 12, 4).unwrap();
        assert!(list.len() <= 4);
    }
}
