use thiserror::Error;

use crate::constants::MAXSHARDS;

/// A contiguous, binary-tree aligned range of shards `[left, right)`.
///
/// Alignment means the range is a node of the binary tree over the shard
/// universe: its width is a power of two and its left bound is a multiple of
/// that width (12..14 and 14..15 are valid, 13..15 is not). The validated
/// constructor is the only way to build one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardRange {
    left: u64,
    right: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidShardRange {
    #[error("shard range [{left}, {right}) is empty or out of bounds")]
    OutOfBounds { left: u64, right: u64 },
    #[error("shard range [{left}, {right}) is not binary-tree aligned")]
    NotTreeAligned { left: u64, right: u64 },
}

impl ShardRange {
    pub fn new(left: u64, right: u64) -> Result<Self, InvalidShardRange> {
        if left >= right || right > MAXSHARDS {
            return Err(InvalidShardRange::OutOfBounds { left, right });
        }
        let width = right - left;
        if !width.is_power_of_two() || left % width != 0 {
            return Err(InvalidShardRange::NotTreeAligned { left, right });
        }
        Ok(Self { left, right })
    }

    /// The whole shard universe.
    pub fn full() -> Self {
        Self {
            left: 0,
            right: MAXSHARDS,
        }
    }

    pub fn left(&self) -> u64 {
        self.left
    }

    pub fn right(&self) -> u64 {
        self.right
    }

    pub fn width(&self) -> u64 {
        self.right - self.left
    }

    pub fn contains_shard(&self, shard: u64) -> bool {
        self.left <= shard && shard < self.right
    }

    pub fn encloses(&self, other: &ShardRange) -> bool {
        self.left <= other.left && other.right <= self.right
    }
}

#[cfg(test)]
mod tests {
    use super::{InvalidShardRange, ShardRange};
    use crate::constants::MAXSHARDS;

    #[test]
    fn accepts_tree_aligned_ranges() {
        for (left, right) in [(0, MAXSHARDS), (12, 14), (13, 14), (14, 15), (0, 1), (8, 16)] {
            assert!(ShardRange::new(left, right).is_ok(), "[{left}, {right})");
        }
    }

    #[test]
    fn rejects_misaligned_ranges() {
        assert_eq!(
            ShardRange::new(13, 15),
            Err(InvalidShardRange::NotTreeAligned { left: 13, right: 15 })
        );
        assert_eq!(
            ShardRange::new(4, 7),
            Err(InvalidShardRange::NotTreeAligned { left: 4, right: 7 })
        );
    }

    #[test]
    fn rejects_empty_or_oversized_ranges() {
        assert!(ShardRange::new(4, 4).is_err());
        assert!(ShardRange::new(5, 4).is_err());
        assert!(ShardRange::new(0, MAXSHARDS + 1).is_err());
    }

    #[test]
    fn containment() {
        let range = ShardRange::new(8, 16).unwrap();
        assert!(range.contains_shard(8));
        assert!(range.contains_shard(15));
        assert!(!range.contains_shard(16));
        assert!(range.encloses(&ShardRange::new(12, 14).unwrap()));
        assert!(!range.encloses(&ShardRange::new(0, 16).unwrap()));
    }
}
