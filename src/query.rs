//! Uniform façade over the three ways a region query against a record
//! set can run: via the tree (pruned traversal, most ranges resolved
//! without touching a single point), via the tree with a point-by-point
//! pass over its uncertain leaves, or via a full linear scan when no
//! tree file exists.
//!
//! `certain` ranges reported by [`TreeReader::for_each_range`] need no
//! further test -- every record in the span is known to match or not
//! match as a whole. `certain=false` leaves only partially overlap the
//! region, so records in that span must be tested individually against
//! [`Shape::contains`], exactly what [`scan_fallback`] does, just scoped
//! to a narrow span instead of the whole file.

use crate::entry_store::EntryStore;
use crate::error::Result;
use crate::region::Shape;
use crate::tree::{scan_fallback, MatchedRange, TreeReader};

/// Exact count of records matching `shape`. Falls back to a full linear
/// scan when `tree` is `None` (no tree file, or fewer records than the
/// configured `--tree-min`).
pub fn count(entries: &EntryStore, tree: Option<&TreeReader>, shape: &Shape) -> Result<u64> {
    let Some(tree) = tree else {
        return scan_fallback::count(entries, shape);
    };
    let mut total = 0u64;
    let mut err = None;
    tree.for_each_range(shape, |r| {
        if err.is_some() {
            return;
        }
        match resolve_count(entries, shape, r) {
            Ok(n) => total += n,
            Err(e) => err = Some(e),
        }
    })?;
    if let Some(e) = err {
        return Err(e);
    }
    Ok(total)
}

fn resolve_count(entries: &EntryStore, shape: &Shape, r: MatchedRange) -> Result<u64> {
    if r.certain {
        return Ok(r.count);
    }
    let mut n = 0u64;
    for i in r.index..r.index + r.count {
        if shape.contains(&entries.point(i as usize)?) {
            n += 1;
        }
    }
    Ok(n)
}

/// A cheap lower/upper bound on the match count, computable without
/// resolving any uncertain leaf: every certain range contributes its
/// exact count to both bounds, every uncertain leaf contributes 0 to
/// the lower bound and its full count to the upper bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountRange {
    pub min: u64,
    pub max: u64,
}

pub fn estimate(entries: &EntryStore, tree: Option<&TreeReader>, shape: &Shape) -> Result<CountRange> {
    let Some(tree) = tree else {
        let n = scan_fallback::count(entries, shape)?;
        return Ok(CountRange { min: n, max: n });
    };
    let mut min = 0u64;
    let mut max = 0u64;
    tree.for_each_range(shape, |r| {
        if r.certain {
            min += r.count;
            max += r.count;
        } else {
            max += r.count;
        }
    })?;
    Ok(CountRange { min, max })
}

/// Invokes `on_match(row)` once per record index matching `shape`, in
/// ascending order. `row` indexes the (possibly tree-reordered) record
/// file directly.
pub fn enumerate(
    entries: &EntryStore,
    tree: Option<&TreeReader>,
    shape: &Shape,
    mut on_match: impl FnMut(usize),
) -> Result<()> {
    let Some(tree) = tree else {
        return scan_fallback::scan(entries, shape, on_match);
    };
    let mut err = None;
    tree.for_each_range(shape, |r| {
        if err.is_some() {
            return;
        }
        if let Err(e) = emit_range(entries, shape, r, &mut on_match) {
            err = Some(e);
        }
    })?;
    match err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn emit_range(
    entries: &EntryStore,
    shape: &Shape,
    r: MatchedRange,
    on_match: &mut impl FnMut(usize),
) -> Result<()> {
    for i in r.index..r.index + r.count {
        let i = i as usize;
        if r.certain || shape.contains(&entries.point(i)?) {
            on_match(i);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry_store::{FieldDesc, FieldType};
    use crate::region::Circle;
    use crate::tree::build_tree_file;
    use crate::vec3::{SphericalCoord, V3};

    fn xyz_fields() -> Vec<FieldDesc> {
        vec![
            FieldDesc { name: "x".into(), ty: FieldType::F64, offset: 0 },
            FieldDesc { name: "y".into(), ty: FieldType::F64, offset: 8 },
            FieldDesc { name: "z".into(), ty: FieldType::F64, offset: 16 },
        ]
    }

    fn build_records(dir: &std::path::Path, points: &[V3]) -> (EntryStore, std::path::PathBuf) {
        let path = dir.join("records.bin");
        let mut bytes = Vec::new();
        for p in points {
            bytes.extend_from_slice(&p.x.to_le_bytes());
            bytes.extend_from_slice(&p.y.to_le_bytes());
            bytes.extend_from_slice(&p.z.to_le_bytes());
        }
        std::fs::write(&path, bytes).unwrap();
        let store = EntryStore::open_file(&path, 24, xyz_fields()).unwrap();
        (store, path)
    }

    #[test]
    fn tree_count_matches_scan_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut points = Vec::new();
        for i in 0..2000 {
            let lon = (i as f64) * 0.73;
            let lat = ((i as f64) * 0.31).sin() * 85.0;
            points.push(SphericalCoord::new(lon, lat).to_v3());
        }
        let (entries, path) = build_records(dir.path(), &points);
        let tree_path = dir.path().join("records.htm");
        build_tree_file(&path, &entries, &tree_path, 64 * 1024, 8).unwrap();
        let entries = EntryStore::open_file(&path, 24, xyz_fields()).unwrap();
        let reader = TreeReader::open_file(&tree_path).unwrap();

        let shape: Shape = Circle::new(SphericalCoord::new(30.0, 10.0).to_v3(), 5.0).unwrap().into();
        let via_tree = count(&entries, Some(&reader), &shape).unwrap();
        let via_scan = count(&entries, None, &shape).unwrap();
        assert_eq!(via_tree, via_scan);
    }

    #[test]
    fn estimate_bounds_contain_exact_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut points = Vec::new();
        for i in 0..2000 {
            let lon = (i as f64) * 0.53;
            let lat = ((i as f64) * 0.17).cos() * 80.0;
            points.push(SphericalCoord::new(lon, lat).to_v3());
        }
        let (entries, path) = build_records(dir.path(), &points);
        let tree_path = dir.path().join("records.htm");
        build_tree_file(&path, &entries, &tree_path, 64 * 1024, 8).unwrap();
        let entries = EntryStore::open_file(&path, 24, xyz_fields()).unwrap();
        let reader = TreeReader::open_file(&tree_path).unwrap();

        let shape: Shape = Circle::new(SphericalCoord::new(200.0, -20.0).to_v3(), 8.0).unwrap().into();
        let exact = count(&entries, Some(&reader), &shape).unwrap();
        let bounds = estimate(&entries, Some(&reader), &shape).unwrap();
        assert!(bounds.min <= exact && exact <= bounds.max);
    }

    #[test]
    fn enumerate_matches_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut points = Vec::new();
        for i in 0..500 {
            let lon = (i as f64) * 1.1;
            let lat = ((i as f64) * 0.9).sin() * 60.0;
            points.push(SphericalCoord::new(lon, lat).to_v3());
        }
        let (entries, path) = build_records(dir.path(), &points);
        let tree_path = dir.path().join("records.htm");
        build_tree_file(&path, &entries, &tree_path, 64 * 1024, 8).unwrap();
        let entries = EntryStore::open_file(&path, 24, xyz_fields()).unwrap();
        let reader = TreeReader::open_file(&tree_path).unwrap();

        let shape: Shape = Circle::new(SphericalCoord::new(90.0, 45.0).to_v3(), 15.0).unwrap().into();
        let mut seen = 0u64;
        enumerate(&entries, Some(&reader), &shape, |_| seen += 1).unwrap();
        let exact = count(&entries, Some(&reader), &shape).unwrap();
        assert_eq!(seen, exact);
    }
}
