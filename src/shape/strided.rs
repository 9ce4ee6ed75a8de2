use super::{numel, Dims};

/// Walks the element offsets of a strided layout in logical row-major order.
#[derive(Debug, Clone)]
pub struct StridedOffsets<'a> {
    shape: &'a [usize],
    strides: &'a [usize],
    index: Dims,
    offset: usize,
    remaining: usize,
}

impl<'a> StridedOffsets<'a> {
    /// Offsets start at `base` and are counted in elements
    pub fn new(shape: &'a [usize], strides: &'a [usize], base: usize) -> Self {
        Self {
            shape,
            strides,
            index: shape.iter().map(|_| 0).collect(),
            offset: base,
            remaining: numel(shape),
        }
    }
}

impl Iterator for StridedOffsets<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        let current = self.offset;
        self.remaining -= 1;
        if self.remaining > 0 {
            // Odometer increment, innermost dim first
            for d in (0..self.shape.len()).rev() {
                self.index[d] += 1;
                self.offset += self.strides[d];
                if self.index[d] < self.shape[d] {
                    break;
                }
                self.offset -= self.strides[d] * self.shape[d];
                self.index[d] = 0;
            }
        }
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for StridedOffsets<'_> {}
