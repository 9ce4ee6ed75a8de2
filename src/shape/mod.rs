mod permute;
mod slice;
mod strided;

pub use permute::*;
pub use slice::*;
pub use strided::*;

use tinyvec::TinyVec;

/// Per-dimension sizes or strides. Inline up to 6 dims, spills to the heap past that.
pub type Dims = TinyVec<[usize; 6]>;

/// Canonical row-major strides for a shape
pub fn contiguous_strides(shape: &[usize]) -> Dims {
    let mut strides = shape
        .iter()
        .rev()
        .scan(1, |state, &dim| {
            let ret = *state;
            *state *= dim;
            Some(ret)
        })
        .collect::<Dims>();
    strides.reverse();
    strides
}

pub fn numel(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Element count, `None` when it does not fit in a `usize`
pub fn checked_numel(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
}

/// Check if strides match the row-major layout of the shape. Dimensions of size 1 are
/// skipped, and a shape holding no elements is always contiguous.
pub fn is_contiguous(shape: &[usize], strides: &[usize]) -> bool {
    if shape.contains(&0) {
        return true;
    }
    let mut expected = 1;
    for (&size, &stride) in shape.iter().zip(strides).rev() {
        if size > 1 {
            if stride != expected {
                return false;
            }
            expected *= size;
        }
    }
    true
}

/// Largest element offset any index can reach, `None` when the shape holds no elements
pub fn max_offset(shape: &[usize], strides: &[usize]) -> Option<usize> {
    if shape.contains(&0) {
        return None;
    }
    Some(
        shape
            .iter()
            .zip(strides)
            .map(|(&size, &stride)| (size - 1) * stride)
            .sum(),
    )
}
