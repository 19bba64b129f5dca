//! Tunables for offline tree construction, collected into one struct so
//! the CLI's `build` subcommand has a single place to validate and hand
//! off to [`crate::tree::build_tree_file`].

use crate::error::{Error, Result};

/// Construction parameters for `build`. All fields have defaults matching
/// the CLI's documented flag defaults.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuildConfig {
    /// Sort/merge block size, in KiB.
    pub blk_size_kib: u32,
    /// Field delimiter for delimited-text input.
    pub delim: char,
    /// Memory budget for external sort, in MiB.
    pub max_mem_mib: u32,
    /// Skip tree construction (linear scan only) below this many records.
    pub tree_min: u64,
    /// Minimum points for an internal node; smaller subtrees collapse to leaves.
    pub leaf_thresh: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            blk_size_kib: 1024,
            delim: '|',
            max_mem_mib: 512,
            tree_min: 1024,
            leaf_thresh: 64,
        }
    }
}

impl BuildConfig {
    #[must_use]
    pub fn blk_size_kib(mut self, v: u32) -> Self {
        self.blk_size_kib = v;
        self
    }

    #[must_use]
    pub fn delim(mut self, v: char) -> Self {
        self.delim = v;
        self
    }

    #[must_use]
    pub fn max_mem_mib(mut self, v: u32) -> Self {
        self.max_mem_mib = v;
        self
    }

    #[must_use]
    pub fn tree_min(mut self, v: u64) -> Self {
        self.tree_min = v;
        self
    }

    #[must_use]
    pub fn leaf_thresh(mut self, v: u64) -> Self {
        self.leaf_thresh = v;
        self
    }

    /// Validates range constraints the CLI flags document. Does not
    /// touch the filesystem.
    pub fn validate(&self) -> Result<()> {
        if !(1..=1_048_576).contains(&self.blk_size_kib) {
            return Err(Error::InvalidArgument(format!(
                "--blk-size {} outside [1, 1048576] KiB",
                self.blk_size_kib
            )));
        }
        if self.delim.is_ascii_digit() || self.delim == '-' || self.delim == '.' {
            return Err(Error::InvalidArgument(format!(
                "--delim '{}' must be a non-numeric character",
                self.delim
            )));
        }
        if self.max_mem_mib == 0 {
            return Err(Error::InvalidArgument("--max-mem must be positive".into()));
        }
        if self.leaf_thresh == 0 {
            return Err(Error::InvalidArgument("--leaf-thresh must be positive".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn mem_budget_bytes(&self) -> usize {
        self.max_mem_mib as usize * 1024 * 1024
    }

    #[must_use]
    pub fn sort_block_bytes(&self) -> usize {
        self.blk_size_kib as usize * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(BuildConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_blk_size() {
        assert!(BuildConfig::default().blk_size_kib(0).validate().is_err());
    }

    #[test]
    fn rejects_numeric_delimiter() {
        assert!(BuildConfig::default().delim('5').validate().is_err());
    }

    #[test]
    fn rejects_zero_leaf_thresh() {
        assert!(BuildConfig::default().leaf_thresh(0).validate().is_err());
    }
}
