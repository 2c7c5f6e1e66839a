//! Interval merge engine for coverage blocks.
//!
//! Two profiles of the same file may record overlapping ranges when the
//! packages that produced them were instrumented from different entry points.
//! The engine rewrites such overlaps into a disjoint set of blocks whose
//! execution counts are the pointwise sum of both inputs.
//!
//! Statement counts cannot be attributed exactly once a block is split: the
//! profile only says how many statements a whole range holds, not where they
//! sit. Nested and partially overlapping merges therefore distribute
//! `num_stmt` evenly across the new fragments. Execution counts are always
//! exact.

use std::cmp::Ordering;

use crate::domain::errors::MergeError;
use crate::domain::models::profile::Block;

/// Splitting merges tolerated whatever the input size.
pub const MERGE_SPLIT_ALLOWANCE: usize = 4;

/// One more splitting merge is tolerated per this many input blocks.
pub const MERGE_SPLIT_RATIO: usize = 4;

/// Number of splitting merges `merge_blocks` accepts for inputs of these sizes.
///
/// Profiles of one file instrumented the same way only overlap on identical
/// ranges. Every other overlap splits a block; many of them mean the two
/// profiles disagree about where the blocks of the file lie.
pub fn split_budget(left_len: usize, right_len: usize) -> usize {
    MERGE_SPLIT_ALLOWANCE + (left_len + right_len) / MERGE_SPLIT_RATIO
}

/// Merge two blocks of the same file.
///
/// Returns the fragments that replace both blocks, or an empty vector when
/// the ranges do not overlap and both should pass through unchanged. The
/// result describes the same ranges and counts whichever argument comes
/// first.
pub fn merge_block_pair(left: &Block, right: &Block) -> Vec<Block> {
    if !left.overlaps(right) {
        return Vec::new();
    }

    match (
        left.start().cmp(&right.start()),
        left.end().cmp(&right.end()),
    ) {
        (Ordering::Equal, Ordering::Equal) => merge_same(left, right),
        (Ordering::Equal, Ordering::Less) => merge_common_start(left, right),
        (Ordering::Equal, Ordering::Greater) => merge_common_start(right, left),
        (Ordering::Less, Ordering::Equal) => merge_common_end(left, right),
        (Ordering::Greater, Ordering::Equal) => merge_common_end(right, left),
        (Ordering::Less, Ordering::Greater) => merge_nested(right, left),
        (Ordering::Greater, Ordering::Less) => merge_nested(left, right),
        (Ordering::Less, Ordering::Less) => merge_overlap(left, right),
        (Ordering::Greater, Ordering::Greater) => merge_overlap(right, left),
    }
}

/// Merge two block sets for the same file into one disjoint set.
///
/// Blocks that overlap nothing in the other set are returned unchanged.
/// The output is sorted by start position. Fails with
/// [`MergeError::Explosion`] once more overlaps split a block than
/// [`split_budget`] allows.
pub fn merge_blocks(left: &[Block], right: &[Block]) -> Result<Vec<Block>, MergeError> {
    merge_blocks_with_limit(left, right, split_budget(left.len(), right.len()))
}

/// `merge_blocks` with an explicit ceiling on splitting merges.
pub fn merge_blocks_with_limit(
    left: &[Block],
    right: &[Block],
    max_splits: usize,
) -> Result<Vec<Block>, MergeError> {
    let mut merged: Vec<Block> = left.to_vec();
    let mut splits = 0usize;

    for incoming in right {
        // Parts of `incoming` not yet reconciled with `merged`.
        let mut pending = vec![*incoming];

        while let Some(piece) = pending.pop() {
            let Some(idx) = merged
                .iter()
                .position(|existing| existing.overlaps(&piece))
            else {
                merged.push(piece);
                continue;
            };

            let existing = merged.swap_remove(idx);
            if !existing.same_range(&piece) {
                splits += 1;
                if splits > max_splits {
                    return Err(MergeError::Explosion {
                        left: left.to_vec(),
                        right: right.to_vec(),
                        splits,
                    });
                }
            }

            for fragment in merge_block_pair(&existing, &piece) {
                // Fragments inside `existing` cannot touch any other merged
                // block; the rest belong to `piece` alone and may.
                if fragment.within(&existing) {
                    merged.push(fragment);
                } else {
                    pending.push(fragment);
                }
            }
        }
    }

    merged.sort_by(Block::cmp_range);
    Ok(merged)
}

/// Same range covered by both.
fn merge_same(one: &Block, other: &Block) -> Vec<Block> {
    vec![Block::spanning(
        one.start(),
        one.end(),
        one.num_stmt.max(other.num_stmt),
        one.count.saturating_add(other.count),
    )]
}

/// Same start, `shorter` ends first: split where `shorter` ends.
fn merge_common_start(shorter: &Block, longer: &Block) -> Vec<Block> {
    vec![
        Block::spanning(
            shorter.start(),
            shorter.end(),
            shorter.num_stmt,
            shorter.count.saturating_add(longer.count),
        ),
        Block::spanning(
            shorter.end(),
            longer.end(),
            longer.num_stmt.saturating_sub(shorter.num_stmt),
            longer.count,
        ),
    ]
}

/// Same end, `shorter` starts later: split where `shorter` begins.
fn merge_common_end(longer: &Block, shorter: &Block) -> Vec<Block> {
    vec![
        Block::spanning(
            longer.start(),
            shorter.start(),
            longer.num_stmt.saturating_sub(shorter.num_stmt),
            longer.count,
        ),
        Block::spanning(
            shorter.start(),
            shorter.end(),
            shorter.num_stmt,
            shorter.count.saturating_add(longer.count),
        ),
    ]
}

/// `inner` lies strictly inside `outer`.
///
/// The statements of `outer` not accounted for by `inner` are split evenly
/// between the prefix and the suffix, the odd one going to the suffix.
fn merge_nested(inner: &Block, outer: &Block) -> Vec<Block> {
    let diff = outer.num_stmt.saturating_sub(inner.num_stmt);
    let prefix_stmts = diff / 2;
    let suffix_stmts = diff - prefix_stmts;

    vec![
        Block::spanning(outer.start(), inner.start(), prefix_stmts, outer.count),
        Block::spanning(
            inner.start(),
            inner.end(),
            inner.num_stmt,
            inner.count.saturating_add(outer.count),
        ),
        Block::spanning(inner.end(), outer.end(), suffix_stmts, outer.count),
    ]
}

/// Tail of `first` overlaps the head of `second`.
///
/// Both statement counts are pooled and split in thirds, the remainder going
/// to the last fragment.
fn merge_overlap(first: &Block, second: &Block) -> Vec<Block> {
    let sum = first.num_stmt.saturating_add(second.num_stmt);
    let third = sum / 3;
    let last = sum - 2 * third;

    vec![
        Block::spanning(first.start(), second.start(), third, first.count),
        Block::spanning(
            second.start(),
            first.end(),
            third,
            first.count.saturating_add(second.count),
        ),
        Block::spanning(first.end(), second.end(), last, second.count),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::profile::Position;
    use proptest::prelude::*;

    fn bk(sl: u32, sc: u32, el: u32, ec: u32, num_stmt: u32, count: u64) -> Block {
        Block::new(Position::new(sl, sc), Position::new(el, ec), num_stmt, count).unwrap()
    }

    fn blk(start: u32, end: u32) -> Block {
        bk(start, 0, end, 0, 0, 0)
    }

    fn sorted(mut blocks: Vec<Block>) -> Vec<Block> {
        blocks.sort_by(Block::cmp_range);
        blocks
    }

    #[test]
    fn test_pair_classification_lengths() {
        let pairs = [
            (bk(0, 0, 0, 0, 0, 0), bk(1, 1, 1, 1, 0, 0), 0),
            (bk(40, 60, 45, 24, 2, 0), bk(45, 24, 46, 26, 1, 0), 0),
            (bk(45, 24, 46, 26, 1, 0), bk(40, 60, 45, 24, 2, 0), 0),
            (bk(1, 1, 1, 1, 0, 0), bk(1, 1, 1, 1, 0, 0), 1),
            (bk(0, 0, 2, 2, 0, 0), bk(1, 1, 2, 2, 0, 0), 2), // same end
            (bk(1, 1, 2, 2, 0, 0), bk(0, 0, 2, 2, 0, 0), 2), // same end
            (bk(0, 0, 2, 2, 0, 0), bk(0, 0, 1, 1, 0, 0), 2), // same begin
            (bk(0, 0, 1, 1, 0, 0), bk(0, 0, 2, 2, 0, 0), 2), // same begin
            (bk(0, 0, 2, 2, 0, 0), bk(1, 1, 3, 3, 0, 0), 3), // left overlap
            (bk(1, 1, 3, 3, 0, 0), bk(0, 0, 2, 2, 0, 0), 3), // right overlap
            (bk(0, 0, 3, 3, 0, 0), bk(1, 1, 2, 2, 0, 0), 3), // left outer
            (bk(1, 1, 2, 2, 0, 0), bk(0, 0, 3, 3, 0, 0), 3), // right outer
        ];

        for (l, r, n) in pairs {
            let merged = merge_block_pair(&l, &r);
            assert_eq!(merged.len(), n, "\n  {l:?}\n  {r:?}");
        }
    }

    #[test]
    fn test_identical_blocks_sum_counts() {
        let merged = merge_block_pair(&bk(1, 1, 1, 1, 0, 5), &bk(1, 1, 1, 1, 0, 3));
        assert_eq!(merged, vec![bk(1, 1, 1, 1, 0, 8)]);
    }

    #[test]
    fn test_disjoint_blocks_do_not_merge() {
        assert!(merge_block_pair(&bk(0, 0, 0, 0, 0, 0), &bk(1, 1, 1, 1, 0, 0)).is_empty());
    }

    #[test]
    fn test_nested_block_splits_outer() {
        let outer = bk(0, 0, 3, 3, 1, 1);
        let inner = bk(1, 1, 2, 2, 0, 2);
        let merged = merge_block_pair(&outer, &inner);

        assert_eq!(
            merged,
            vec![
                bk(0, 0, 1, 1, 0, 1),
                bk(1, 1, 2, 2, 0, 3),
                bk(2, 2, 3, 3, 1, 1),
            ]
        );
        let stmts: u32 = merged.iter().map(|b| b.num_stmt).sum();
        assert_eq!(stmts, outer.num_stmt);
    }

    #[test]
    fn test_common_start_split() {
        let merged = merge_block_pair(&bk(5, 0, 9, 0, 4, 2), &bk(5, 0, 6, 10, 1, 7));
        assert_eq!(merged, vec![bk(5, 0, 6, 10, 1, 9), bk(6, 10, 9, 0, 3, 2)]);
    }

    #[test]
    fn test_common_end_split() {
        let merged = merge_block_pair(&bk(7, 3, 9, 0, 1, 4), &bk(5, 0, 9, 0, 3, 1));
        assert_eq!(merged, vec![bk(5, 0, 7, 3, 2, 1), bk(7, 3, 9, 0, 1, 5)]);
    }

    #[test]
    fn test_partial_overlap_split() {
        let merged = merge_block_pair(&bk(0, 0, 2, 2, 2, 1), &bk(1, 1, 3, 3, 2, 10));
        assert_eq!(
            merged,
            vec![
                bk(0, 0, 1, 1, 1, 1),
                bk(1, 1, 2, 2, 1, 11),
                bk(2, 2, 3, 3, 2, 10),
            ]
        );
    }

    #[test]
    fn test_statement_difference_saturates() {
        // Inner claims more statements than its enclosing block.
        let merged = merge_block_pair(&bk(0, 0, 9, 0, 1, 1), &bk(2, 0, 3, 0, 5, 1));
        assert_eq!(merged[0].num_stmt, 0);
        assert_eq!(merged[2].num_stmt, 0);
    }

    #[test]
    fn test_merge_block_sets() {
        assert_eq!(
            merge_blocks(&[blk(0, 0), blk(4, 4), blk(2, 2), blk(7, 8)], &[blk(1, 1), blk(5, 5)])
                .unwrap()
                .len(),
            6
        );
        assert_eq!(merge_blocks(&[blk(0, 7)], &[blk(1, 5)]).unwrap().len(), 3);
        assert_eq!(merge_blocks(&[blk(0, 7), blk(8, 9)], &[blk(1, 5)]).unwrap().len(), 4);
        assert_eq!(
            merge_blocks(&[bk(30, 41, 32, 2, 1, 0)], &[bk(35, 52, 38, 2, 2, 0)])
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn test_merge_identical_profiles_keeps_shape() {
        let blocks = vec![
            bk(30, 41, 32, 2, 1, 0),
            bk(35, 52, 38, 2, 2, 1),
            bk(40, 60, 45, 24, 2, 0),
            bk(45, 24, 46, 26, 1, 3),
            bk(46, 26, 48, 9, 2, 0),
            bk(51, 2, 51, 24, 1, 0),
            bk(51, 24, 52, 26, 1, 0),
            bk(52, 26, 54, 9, 2, 0),
            bk(57, 2, 57, 24, 1, 0),
            bk(57, 24, 58, 23, 1, 0),
            bk(58, 23, 60, 9, 2, 0),
            bk(63, 2, 63, 24, 1, 0),
            bk(63, 24, 64, 33, 1, 0),
            bk(64, 33, 65, 39, 1, 0),
            bk(65, 39, 67, 5, 1, 0),
            bk(69, 3, 69, 27, 1, 0),
            bk(69, 27, 70, 33, 1, 0),
            bk(70, 33, 72, 5, 1, 0),
            bk(75, 2, 75, 11, 1, 0),
        ];
        let merged = merge_blocks(&blocks, &blocks).unwrap();
        assert_eq!(merged.len(), 19);
        for (m, b) in merged.iter().zip(&blocks) {
            assert!(m.same_range(b));
            assert_eq!(m.count, b.count * 2);
        }
    }

    #[test]
    fn test_block_spanning_two_others_stays_disjoint() {
        let left = vec![bk(1, 0, 3, 0, 2, 1), bk(3, 0, 5, 0, 2, 1)];
        let right = vec![bk(2, 0, 4, 0, 2, 10)];
        let merged = merge_blocks(&left, &right).unwrap();
        assert_eq!(
            merged.iter().map(|b| (b.start(), b.end(), b.count)).collect::<Vec<_>>(),
            vec![
                (Position::new(1, 0), Position::new(2, 0), 1),
                (Position::new(2, 0), Position::new(3, 0), 11),
                (Position::new(3, 0), Position::new(4, 0), 11),
                (Position::new(4, 0), Position::new(5, 0), 1),
            ]
        );
    }

    #[test]
    fn test_non_overlapping_sets_pass_through() {
        let left = vec![bk(1, 0, 2, 0, 1, 4), bk(5, 0, 6, 0, 3, 0)];
        let right = vec![bk(2, 0, 3, 0, 2, 9), bk(8, 1, 8, 9, 1, 1)];
        let merged = merge_blocks(&left, &right).unwrap();
        let mut expected = left.clone();
        expected.extend(right.iter().copied());
        assert_eq!(merged, sorted(expected));
    }

    #[test]
    fn test_split_limit_is_enforced() {
        let left = vec![blk(0, 10)];
        let right = vec![blk(1, 2), blk(3, 4), blk(5, 6)];
        let err = merge_blocks_with_limit(&left, &right, 2).unwrap_err();
        match err {
            MergeError::Explosion { left: l, right: r, splits } => {
                assert_eq!(l, left);
                assert_eq!(r, right);
                assert_eq!(splits, 3);
            }
        }
        assert_eq!(merge_blocks(&left, &right).unwrap().len(), 7);
    }

    #[test]
    fn test_identical_ranges_never_count_as_splits() {
        let blocks: Vec<Block> = (0..200).map(|i| bk(i * 2, 0, i * 2 + 1, 0, 1, 1)).collect();
        let merged = merge_blocks_with_limit(&blocks, &blocks, 0).unwrap();
        assert_eq!(merged.len(), 200);
    }

    #[test]
    fn test_shifted_instrumentation_is_rejected() {
        // Same file, every boundary one line apart.
        let left: Vec<Block> = (0..50).map(|i| bk(i * 2, 0, i * 2 + 2, 0, 2, 1)).collect();
        let right: Vec<Block> = (0..50).map(|i| bk(i * 2 + 1, 0, i * 2 + 3, 0, 2, 1)).collect();

        let err = merge_blocks(&left, &right).unwrap_err();
        let MergeError::Explosion { left: l, right: r, splits } = err;
        assert_eq!(l.len(), 50);
        assert_eq!(r.len(), 50);
        assert_eq!(splits, split_budget(50, 50) + 1);
    }

    // Blocks are laid out on a grid of ten columns per line so that every
    // boundary falls on a unit step and coverage can be checked per unit.
    const COLS: u32 = 10;

    fn pos(offset: u32) -> Position {
        Position::new(offset / COLS, offset % COLS)
    }

    fn unit_count(blocks: &[Block], offset: u32) -> (usize, u64) {
        let p = pos(offset);
        blocks
            .iter()
            .filter(|b| b.start() <= p && p < b.end())
            .fold((0, 0), |(n, c), b| (n + 1, c + b.count))
    }

    fn disjoint_blocks() -> impl Strategy<Value = Vec<Block>> {
        prop::collection::vec((0u32..6, 1u32..12, 0u32..5, 0u64..20), 0..8).prop_map(|specs| {
            let mut offset = 0;
            specs
                .into_iter()
                .map(|(gap, len, num_stmt, count)| {
                    let start = offset + gap;
                    offset = start + len;
                    Block::spanning(pos(start), pos(offset), num_stmt, count)
                })
                .collect()
        })
    }

    fn any_block() -> impl Strategy<Value = Block> {
        (0u32..60, 0u32..30, 0u32..5, 0u64..20).prop_map(|(start, len, num_stmt, count)| {
            Block::spanning(pos(start), pos(start + len), num_stmt, count)
        })
    }

    proptest! {
        #[test]
        fn prop_merge_is_disjoint_cover_with_summed_counts(
            left in disjoint_blocks(),
            right in disjoint_blocks(),
        ) {
            let merged = merge_blocks_with_limit(&left, &right, usize::MAX).unwrap();
            let extent = merged.iter().chain(&left).chain(&right)
                .map(|b| b.end_line * COLS + b.end_col)
                .max()
                .unwrap_or(0);

            for offset in 0..=extent {
                let (in_left, count_left) = unit_count(&left, offset);
                let (in_right, count_right) = unit_count(&right, offset);
                let (in_merged, count_merged) = unit_count(&merged, offset);

                prop_assert!(in_merged <= 1, "point {} covered {} times", pos(offset), in_merged);
                prop_assert_eq!(in_merged == 1, in_left + in_right > 0);
                prop_assert_eq!(count_merged, count_left + count_right);
            }
        }

        #[test]
        fn prop_pair_merge_is_symmetric(a in any_block(), b in any_block()) {
            prop_assert_eq!(
                sorted(merge_block_pair(&a, &b)),
                sorted(merge_block_pair(&b, &a))
            );
        }

        #[test]
        fn prop_pair_merge_conserves_counts(a in any_block(), b in any_block()) {
            let merged = merge_block_pair(&a, &b);
            prop_assume!(!merged.is_empty());
            let extent = a.end_line.max(b.end_line) * COLS + COLS;
            for offset in 0..extent {
                let (_, expected) = unit_count(&[a, b], offset);
                let (n, actual) = unit_count(&merged, offset);
                prop_assert!(n <= 1);
                prop_assert_eq!(actual, expected);
            }
        }
    }
}
