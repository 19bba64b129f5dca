//! A spatial index and query engine for point data on the unit sphere,
//! built on the Hierarchical Triangular Mesh (HTM): recursive
//! subdivision of the sphere into 8 root triangles, 4 children each, to
//! a fixed construction depth.
//!
//! Two halves: an offline construction pipeline ([`extsort`] sorts
//! records by HTM id, [`tree`] partitions the sorted ids into a node
//! forest and packs it into a compact file), and an online query path
//! ([`tree::TreeReader`] prunes disjoint subtrees, [`query`] resolves
//! the uncertain leaves against [`entry_store::EntryStore`]). A tree
//! file is optional; [`tree::scan_fallback`] answers every query
//! directly against the records.
//!
//! ```
//! use htm_tree::region::Circle;
//! use htm_tree::vec3::V3;
//!
//! let center = V3::new(1.0, 0.0, 0.0);
//! let circle = Circle::new(center, 5.0)?;
//! assert!(circle.contains(&center));
//! # Ok::<(), htm_tree::Error>(())
//! ```

pub mod config;
pub mod coverage;
pub mod entry_store;
pub mod error;
pub mod extsort;
pub mod htm_id;
pub mod query;
pub mod range_cover;
pub mod region;
pub mod tree;
pub mod trixel;
pub mod varint;
pub mod vec3;

pub use error::{Error, Result};
pub use htm_id::{HtmId, Root, HTM_MAX_LEVEL};
