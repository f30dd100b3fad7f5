//! Distance arithmetic on a closed ring of cells.
//!
//! Positions are in `[0, length)` and the last cell is adjacent to the first. A gap as returned
//! here is the number of cells travelled to reach the other position. The number of empty cells
//! between two vehicles is therefore `gap - 1`.

/// Cells travelled moving forward from `from` until `to` is reached.
pub fn forward_gap(from: usize, to: usize, length: usize) -> usize {
    debug_assert!(from < length && to < length);
    (to + length - from) % length
}

/// Cells travelled moving backward from `from` until `to` is reached.
pub fn backward_gap(from: usize, to: usize, length: usize) -> usize {
    debug_assert!(from < length && to < length);
    (from + length - to) % length
}

/// Position reached after advancing `cells` from `position`.
pub fn advance(position: usize, cells: usize, length: usize) -> usize {
    (position + cells) % length
}
