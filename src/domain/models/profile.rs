//! Coverage profile domain model.
//!
//! A profile is the set of blocks recorded for one source file under one
//! instrumentation mode. Blocks are half-open `[start, end)` source ranges
//! ordered lexicographically by (line, column).

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::domain::errors::DomainError;

/// Coverage counting discipline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverMode {
    /// Covered / not covered.
    Set,
    /// Raw hit count.
    #[default]
    Count,
    /// Hit count maintained with atomic increments.
    Atomic,
}

impl CoverMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Count => "count",
            Self::Atomic => "atomic",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim() {
            "set" => Some(Self::Set),
            "count" => Some(Self::Count),
            "atomic" => Some(Self::Atomic),
            _ => None,
        }
    }
}

impl fmt::Display for CoverMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (line, column) source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub col: u32,
}

impl Position {
    pub const fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.line, self.col)
    }
}

/// One contiguous source range with its statement and execution counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Block {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
    /// Number of executable statements inside the range.
    pub num_stmt: u32,
    /// Execution count (or 0/1 flag in set mode); always treated additively.
    pub count: u64,
}

impl Block {
    /// Build a block, rejecting ranges whose end precedes their start.
    pub fn new(
        start: Position,
        end: Position,
        num_stmt: u32,
        count: u64,
    ) -> Result<Self, DomainError> {
        if end < start {
            return Err(DomainError::InvertedRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self::spanning(start, end, num_stmt, count))
    }

    /// Build a block without validating the range. Callers guarantee
    /// `start <= end`.
    pub(crate) const fn spanning(start: Position, end: Position, num_stmt: u32, count: u64) -> Self {
        Self {
            start_line: start.line,
            start_col: start.col,
            end_line: end.line,
            end_col: end.col,
            num_stmt,
            count,
        }
    }

    pub const fn start(&self) -> Position {
        Position::new(self.start_line, self.start_col)
    }

    pub const fn end(&self) -> Position {
        Position::new(self.end_line, self.end_col)
    }

    pub fn is_empty(&self) -> bool {
        self.start() == self.end()
    }

    /// True when the two ranges share at least one source point, or describe
    /// the very same range. A zero-width block covers no points, so it only
    /// overlaps an identical zero-width block.
    pub fn overlaps(&self, other: &Self) -> bool {
        if self.same_range(other) {
            return true;
        }
        self.start().max(other.start()) < self.end().min(other.end())
    }

    pub fn same_range(&self, other: &Self) -> bool {
        self.start() == other.start() && self.end() == other.end()
    }

    /// True when `self` lies entirely inside `outer`.
    pub fn within(&self, outer: &Self) -> bool {
        outer.start() <= self.start() && self.end() <= outer.end()
    }

    /// Ordering used for emitted profiles: by start, then by end.
    pub fn cmp_range(&self, other: &Self) -> Ordering {
        self.start()
            .cmp(&other.start())
            .then_with(|| self.end().cmp(&other.end()))
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{} {} {}",
            self.start(),
            self.end(),
            self.num_stmt,
            self.count
        )
    }
}

/// All blocks recorded for one file under one mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub file_name: String,
    pub mode: CoverMode,
    pub blocks: Vec<Block>,
}

impl Profile {
    pub fn new(file_name: impl Into<String>, mode: CoverMode) -> Self {
        Self {
            file_name: file_name.into(),
            mode,
            blocks: Vec::new(),
        }
    }

    pub fn with_blocks(mut self, blocks: Vec<Block>) -> Self {
        self.blocks = blocks;
        self.sort_blocks();
        self
    }

    pub fn sort_blocks(&mut self) {
        self.blocks.sort_by(Block::cmp_range);
    }

    /// True when no two blocks overlap.
    pub fn is_disjoint(&self) -> bool {
        self.blocks
            .iter()
            .enumerate()
            .all(|(i, a)| self.blocks[i + 1..].iter().all(|b| !a.overlaps(b)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blk(sl: u32, sc: u32, el: u32, ec: u32) -> Block {
        Block::new(Position::new(sl, sc), Position::new(el, ec), 1, 0).unwrap()
    }

    #[test]
    fn test_cover_mode_round_trip_names() {
        for mode in [CoverMode::Set, CoverMode::Count, CoverMode::Atomic] {
            assert_eq!(CoverMode::from_str(mode.as_str()), Some(mode));
        }
        assert_eq!(CoverMode::from_str("bogus"), None);
    }

    #[test]
    fn test_block_rejects_inverted_range() {
        let result = Block::new(Position::new(3, 1), Position::new(2, 9), 0, 0);
        assert!(matches!(result, Err(DomainError::InvertedRange { .. })));
    }

    #[test]
    fn test_zero_width_block_is_legal() {
        let b = Block::new(Position::new(4, 2), Position::new(4, 2), 0, 0).unwrap();
        assert!(b.is_empty());
    }

    #[test]
    fn test_overlap_is_half_open() {
        assert!(!blk(1, 0, 2, 0).overlaps(&blk(2, 0, 3, 0)));
        assert!(blk(1, 0, 2, 1).overlaps(&blk(2, 0, 3, 0)));
        assert!(blk(2, 0, 2, 0).overlaps(&blk(2, 0, 2, 0)));
        assert!(!blk(1, 5, 1, 5).overlaps(&blk(1, 0, 3, 0)));
        assert!(!blk(1, 0, 1, 0).overlaps(&blk(1, 0, 3, 0)));
    }

    #[test]
    fn test_position_ordering_is_lexicographic() {
        assert!(Position::new(1, 50) < Position::new(2, 0));
        assert!(Position::new(2, 1) > Position::new(2, 0));
    }

    #[test]
    fn test_with_blocks_sorts_by_start() {
        let mut covered = blk(1, 0, 2, 0);
        covered.num_stmt = 3;
        covered.count = 2;
        let mut missed = blk(3, 0, 4, 0);
        missed.num_stmt = 2;
        let profile = Profile::new("a.go", CoverMode::Count).with_blocks(vec![missed, covered]);
        assert_eq!(profile.blocks[0], covered);
        assert!(profile.is_disjoint());
    }
}
