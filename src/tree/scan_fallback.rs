//! Linear point-by-point scan against a region, with no tree at all.
//!
//! Used for record sets too small to be worth building a tree for, and
//! as the reference implementation the tree-backed path is checked
//! against in tests.

use crate::entry_store::EntryStore;
use crate::error::Result;
use crate::region::Shape;

/// Calls `on_match(i)` for every record index in `entries` whose point
/// lies in `shape`, in ascending index order.
pub fn scan(entries: &EntryStore, shape: &Shape, mut on_match: impl FnMut(usize)) -> Result<()> {
    for i in 0..entries.len() {
        if shape.contains(&entries.point(i)?) {
            on_match(i);
        }
    }
    Ok(())
}

/// Counts records in `entries` whose point lies in `shape`.
pub fn count(entries: &EntryStore, shape: &Shape) -> Result<u64> {
    let mut n = 0u64;
    scan(entries, shape, |_| n += 1)?;
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Circle;
    use crate::vec3::V3;

    fn store_of(points: &[V3]) -> EntryStore {
        let mut bytes = Vec::new();
        for p in points {
            bytes.extend_from_slice(&p.x.to_le_bytes());
            bytes.extend_from_slice(&p.y.to_le_bytes());
            bytes.extend_from_slice(&p.z.to_le_bytes());
        }
        let fields = vec![
            crate::entry_store::FieldDesc { name: "x".into(), ty: crate::entry_store::FieldType::F64, offset: 0 },
            crate::entry_store::FieldDesc { name: "y".into(), ty: crate::entry_store::FieldType::F64, offset: 8 },
            crate::entry_store::FieldDesc { name: "z".into(), ty: crate::entry_store::FieldType::F64, offset: 16 },
        ];
        EntryStore::from_bytes(bytes, 24, fields).unwrap()
    }

    #[test]
    fn counts_only_points_in_shape() {
        let entries = store_of(&[
            V3::new(1.0, 0.0, 0.0),
            V3::new(-1.0, 0.0, 0.0),
            V3::new(0.9, 0.1, 0.0).normalize().unwrap(),
        ]);
        let shape: Shape = Circle::new(V3::new(1.0, 0.0, 0.0), 20.0).unwrap().into();
        assert_eq!(count(&entries, &shape).unwrap(), 2);
    }

    #[test]
    fn scan_visits_matches_in_ascending_order() {
        let entries = store_of(&[
            V3::new(1.0, 0.0, 0.0),
            V3::new(-1.0, 0.0, 0.0),
            V3::new(0.0, 1.0, 0.0),
        ]);
        let shape: Shape = Circle::all_sky().into();
        let mut seen = Vec::new();
        scan(&entries, &shape, |i| seen.push(i)).unwrap();
        assert_eq!(seen, vec![0, 1, 2]);
    }
}
