use std::ops::{Bound, RangeBounds};

fn get_start_bound(bound: Bound<&usize>) -> usize {
    match bound {
        Bound::Included(x) => *x,
        Bound::Excluded(x) => x + 1,
        Bound::Unbounded => 0,
    }
}

fn get_end_bound(bound: Bound<&usize>, size: usize) -> usize {
    match bound {
        Bound::Excluded(x) => *x,
        Bound::Included(x) => x + 1,
        Bound::Unbounded => size,
    }
}

/// Resolve a range over a dimension of `size` into half-open `(start, end)` bounds.
/// Bounds are not clamped, so an out of range request stays detectable.
pub fn range_bounds(range: &impl RangeBounds<usize>, size: usize) -> (usize, usize) {
    (
        get_start_bound(range.start_bound()),
        get_end_bound(range.end_bound(), size),
    )
}
