//! CPU kernels.
//!
//! Every entry point checks shapes and dtypes, dispatches on the storage dtype to a
//! monomorphized body, reads its inputs through their strides, computes in f32, and stores
//! into a preallocated output. Results are computed into a local buffer before the output
//! is locked for writing, so an output may share storage with an input.

/// Run a kernel body specialized for the float dtype of a tensor
macro_rules! dispatch_float {
    ($op:literal, $dtype:expr, $kernel:ident($($arg:expr),* $(,)?)) => {
        match $dtype {
            $crate::dtype::DType::F32 => $kernel::<f32>($($arg),*),
            $crate::dtype::DType::F16 => $kernel::<half::f16>($($arg),*),
            $crate::dtype::DType::BF16 => $kernel::<half::bf16>($($arg),*),
            other => Err($crate::error::Error::UnsupportedDType {
                op: $op,
                dtype: other,
            }),
        }
    };
}
pub(crate) use dispatch_float;

mod argmax;
mod embedding;
mod linear;
mod rearrange;
mod rms_norm;
mod rope;
pub mod self_attention;
mod swiglu;

pub use argmax::argmax;
pub use embedding::embedding;
pub use linear::linear;
pub use rearrange::rearrange;
pub use rms_norm::rms_norm;
pub use rope::rope;
pub use self_attention::self_attention;
pub use swiglu::swiglu;

use std::marker::PhantomData;

use num_traits::AsPrimitive;

use crate::{
    cast::{self, Element, FloatElement},
    dtype::DType,
    error::{Error, Result},
    tensor::Tensor,
};

/// Typed read access to a tensor's elements through its strides
pub(crate) struct Strided<'a, T> {
    memory: &'a [u8],
    base: usize,
    strides: &'a [usize],
    _marker: PhantomData<T>,
}

impl<'a, T: Element> Strided<'a, T> {
    pub(crate) fn new(memory: &'a [u8], tensor: &'a Tensor) -> Self {
        Self {
            memory,
            base: tensor.element_offset(),
            strides: tensor.strides(),
            _marker: PhantomData,
        }
    }

    #[inline(always)]
    pub(crate) fn stride(&self, dim: usize) -> usize {
        self.strides[dim]
    }

    /// Element at `offset` elements past the tensor's first element
    #[inline(always)]
    pub(crate) fn get(&self, offset: usize) -> T {
        cast::read(self.memory, self.base + offset)
    }
}

impl<T: FloatElement> Strided<'_, T> {
    #[inline(always)]
    pub(crate) fn load(&self, offset: usize) -> f32 {
        self.get(offset).to_f32()
    }
}

/// Read a float tensor in logical order, upcast to f32
pub(crate) fn gather_f32<T: FloatElement>(tensor: &Tensor) -> Vec<f32> {
    let memory = tensor.memory();
    tensor
        .offsets()
        .map(|o| cast::read::<T>(&memory, o).to_f32())
        .collect()
}

/// Cast f32 results down and store them in logical order
pub(crate) fn store_f32<T: FloatElement>(out: &Tensor, values: &[f32]) -> Result<()> {
    out.store(&values.iter().map(|&v| T::from_f32(v)).collect::<Vec<T>>())
}

/// Fill `rows` independent rows of `width` outputs. Rows run on the rayon pool when the
/// `parallel` feature is on.
pub(crate) fn map_rows<T, F>(rows: usize, width: usize, f: F) -> Vec<T>
where
    T: Default + Clone + Send,
    F: Fn(usize, &mut [T]) + Send + Sync,
{
    let mut out = vec![T::default(); rows * width];
    if width == 0 {
        return out;
    }
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        out.par_chunks_mut(width)
            .enumerate()
            .for_each(|(row, chunk)| f(row, chunk));
    }
    #[cfg(not(feature = "parallel"))]
    out.chunks_mut(width)
        .enumerate()
        .for_each(|(row, chunk)| f(row, chunk));
    out
}

/// Read an integer index tensor (i64 or i32), widened to i64
pub(crate) fn read_indices(op: &'static str, tensor: &Tensor) -> Result<Vec<i64>> {
    fn widen<T: Element + AsPrimitive<i64>>(tensor: &Tensor) -> Result<Vec<i64>> {
        Ok(tensor.to_vec::<T>()?.into_iter().map(|i| i.as_()).collect())
    }
    match tensor.dtype() {
        DType::I64 => widen::<i64>(tensor),
        DType::I32 => widen::<i32>(tensor),
        other => Err(Error::UnsupportedDType { op, dtype: other }),
    }
}

pub(crate) fn expect_dtype(op: &'static str, tensor: &Tensor, dtype: DType) -> Result<()> {
    if tensor.dtype() == dtype {
        Ok(())
    } else {
        Err(Error::DTypeMismatch {
            op,
            expected: dtype,
            found: tensor.dtype(),
        })
    }
}

pub(crate) fn expect_shape(
    op: &'static str,
    name: &str,
    tensor: &Tensor,
    shape: &[usize],
) -> Result<()> {
    if tensor.shape() == shape {
        Ok(())
    } else {
        Err(Error::shape(
            op,
            format!("{name} has shape {:?}, expected {shape:?}", tensor.shape()),
        ))
    }
}

pub(crate) fn expect_rank(op: &'static str, name: &str, tensor: &Tensor, rank: usize) -> Result<()> {
    if tensor.ndim() == rank {
        Ok(())
    } else {
        Err(Error::shape(
            op,
            format!("{name} must have rank {rank}, got shape {:?}", tensor.shape()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_rows() {
        let out = map_rows::<f32, _>(3, 2, |row, chunk| {
            chunk[0] = row as f32;
            chunk[1] = -(row as f32);
        });
        assert_eq!(out, vec![0., -0., 1., -1., 2., -2.]);
        assert!(map_rows::<f32, _>(4, 0, |_, _| unreachable!()).is_empty());
    }

    #[test]
    fn test_read_indices() {
        let t = Tensor::from_slice(&[3], &[4i32, 0, -1]).unwrap();
        assert_eq!(read_indices("test", &t).unwrap(), vec![4, 0, -1]);
        let f = Tensor::new(&[3], DType::F32).unwrap();
        assert_eq!(
            read_indices("test", &f).unwrap_err(),
            Error::UnsupportedDType {
                op: "test",
                dtype: DType::F32
            }
        );
    }

    #[test]
    fn test_strided_reader() {
        let t = Tensor::from_slice(&[2, 3], &[0f32, 1., 2., 3., 4., 5.])
            .unwrap()
            .permute(&[1, 0])
            .unwrap()
            .slice(0, 1, 3)
            .unwrap();
        let memory = t.memory();
        let r = Strided::<f32>::new(&memory, &t);
        assert_eq!(r.stride(0), 1);
        assert_eq!(r.stride(1), 3);
        assert_eq!(r.load(0), 1.);
        assert_eq!(r.load(r.stride(1) + r.stride(0)), 5.);
        drop(memory);
        assert_eq!(gather_f32::<f32>(&t), vec![1., 4., 2., 5.]);
    }
}
