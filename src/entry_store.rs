//! Thin reader over an opaque packed record file: stride, field
//! descriptors, and the unit-vector accessor every region query needs.
//!
//! The encoding is opaque beyond a fixed stride and a known field list;
//! the first three fields are always the record's unit vector and share
//! a common scalar width.

use std::fs::File;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use memmap2::Mmap;

use crate::error::{Error, Result};
use crate::vec3::V3;

/// Scalar width shared by every field in a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    F32,
    F64,
    I32,
    I64,
    U8,
}

impl FieldType {
    #[must_use]
    pub fn size(self) -> usize {
        match self {
            FieldType::F32 | FieldType::I32 => 4,
            FieldType::F64 | FieldType::I64 => 8,
            FieldType::U8 => 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldDesc {
    pub name: String,
    pub ty: FieldType,
    pub offset: usize,
}

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

/// A table of fixed-size, 16-byte-aligned records. `fields[0..3]` are
/// always named `x`, `y`, `z` and share a single coordinate width.
pub struct EntryStore {
    backing: Backing,
    stride: usize,
    count: usize,
    fields: Vec<FieldDesc>,
    coord_ty: FieldType,
}

impl EntryStore {
    /// Wraps an in-memory byte buffer already laid out as `count`
    /// records of `stride` bytes each.
    pub fn from_bytes(bytes: Vec<u8>, stride: usize, fields: Vec<FieldDesc>) -> Result<Self> {
        Self::build(Backing::Owned(bytes), stride, fields)
    }

    /// Memory-maps `path` read-only and interprets it as a record table.
    pub fn open_file(path: &Path, stride: usize, fields: Vec<FieldDesc>) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: the file is opened read-only for the lifetime of this
        // store and is not expected to be concurrently truncated; callers
        // in this crate never mutate a record file after construction.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::Mmap(e.to_string()))?;
        Self::build(Backing::Mmap(mmap), stride, fields)
    }

    fn build(backing: Backing, stride: usize, fields: Vec<FieldDesc>) -> Result<Self> {
        if stride == 0 || stride % 8 != 0 {
            return Err(Error::InvalidArgument(
                "record stride must be a positive multiple of 8".into(),
            ));
        }
        if fields.len() < 3 || fields[0].name != "x" || fields[1].name != "y" || fields[2].name != "z" {
            return Err(Error::InvalidArgument(
                "first three fields must be named x, y, z".into(),
            ));
        }
        let coord_ty = fields[0].ty;
        if fields[1].ty != coord_ty || fields[2].ty != coord_ty {
            return Err(Error::InvalidArgument(
                "x, y, z fields must share a scalar width".into(),
            ));
        }
        if !matches!(coord_ty, FieldType::F32 | FieldType::F64) {
            return Err(Error::InvalidArgument(
                "x, y, z fields must be float-typed".into(),
            ));
        }
        let bytes = backing.as_bytes();
        if bytes.len() % stride != 0 {
            return Err(Error::Corrupt(format!(
                "record file length {} is not a multiple of stride {stride}",
                bytes.len()
            )));
        }
        let count = bytes.len() / stride;
        Ok(Self {
            backing,
            stride,
            count,
            fields,
            coord_ty,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[must_use]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldDesc] {
        &self.fields
    }

    /// Raw bytes of record `i`.
    pub fn record(&self, i: usize) -> Result<&[u8]> {
        if i >= self.count {
            return Err(Error::InvalidArgument(format!(
                "record index {i} out of bounds ({} records)",
                self.count
            )));
        }
        let start = i * self.stride;
        Ok(&self.backing.as_bytes()[start..start + self.stride])
    }

    /// Total size of the mapped/owned record buffer, in bytes.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.backing.as_bytes().len()
    }

    /// Pins the record mapping in physical memory (`mlock`). A no-op on
    /// an owned, non-mmap-backed store, which is already fully resident.
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

    /// The record's unit vector, read from the fixed `x, y, z` prefix.
    pub fn point(&self, i: usize) -> Result<V3> {
        let rec = self.record(i)?;
        let (x, y, z) = match self.coord_ty {
            FieldType::F32 => (
                f64::from(LittleEndian::read_f32(&rec[0..4])),
                f64::from(LittleEndian::read_f32(&rec[4..8])),
                f64::from(LittleEndian::read_f32(&rec[8..12])),
            ),
            FieldType::F64 => (
                LittleEndian::read_f64(&rec[0..8]),
                LittleEndian::read_f64(&rec[8..16]),
                LittleEndian::read_f64(&rec[16..24]),
            ),
            _ => unreachable!("validated as float in build()"),
        };
        Ok(V3::new(x, y, z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xyz_fields() -> Vec<FieldDesc> {
        vec![
            FieldDesc { name: "x".into(), ty: FieldType::F64, offset: 0 },
            FieldDesc { name: "y".into(), ty: FieldType::F64, offset: 8 },
            FieldDesc { name: "z".into(), ty: FieldType::F64, offset: 16 },
        ]
    }

    #[test]
    fn reads_back_points() {
        let mut bytes = Vec::new();
        for v in [V3::new(1.0, 0.0, 0.0), V3::new(0.0, 1.0, 0.0)] {
            bytes.extend_from_slice(&v.x.to_le_bytes());
            bytes.extend_from_slice(&v.y.to_le_bytes());
            bytes.extend_from_slice(&v.z.to_le_bytes());
        }
        let store = EntryStore::from_bytes(bytes, 24, xyz_fields()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.point(0).unwrap(), V3::new(1.0, 0.0, 0.0));
        assert_eq!(store.point(1).unwrap(), V3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn rejects_bad_stride() {
        assert!(EntryStore::from_bytes(vec![0; 24], 7, xyz_fields()).is_err());
    }

    #[test]
    fn rejects_truncated_file() {
        assert!(EntryStore::from_bytes(vec![0; 20], 24, xyz_fields()).is_err());
    }
}
