use tracing::{debug, trace};

use super::{expect_dtype, expect_shape};
use crate::{error::Result, tensor::Tensor};

/// Visit the byte runs of a strided layout in logical order, outermost dim first.
///
/// `visit(strided, dense, len)` gets the byte offset of the run in strided storage, its
/// byte offset in a densely packed buffer, and its length. An innermost dim with unit
/// stride is one run; otherwise every element is its own run.
fn walk(
    shape: &[usize],
    strides: &[usize],
    dim: usize,
    strided: usize,
    dense: usize,
    element_size: usize,
    visit: &mut impl FnMut(usize, usize, usize),
) {
    let (count, stride) = (shape[dim], strides[dim]);
    if dim == shape.len() - 1 {
        if stride == 1 {
            visit(strided, dense, count * element_size);
        } else {
            for i in 0..count {
                visit(
                    strided + i * stride * element_size,
                    dense + i * element_size,
                    element_size,
                );
            }
        }
    } else {
        let inner = shape[dim + 1..].iter().product::<usize>() * element_size;
        for i in 0..count {
            walk(
                shape,
                strides,
                dim + 1,
                strided + i * stride * element_size,
                dense + i * inner,
                element_size,
                visit,
            );
        }
    }
}

fn for_each_run(tensor: &Tensor, mut visit: impl FnMut(usize, usize, usize)) {
    if tensor.ndim() == 0 {
        visit(tensor.offset(), 0, tensor.element_size());
    } else {
        walk(
            tensor.shape(),
            tensor.strides(),
            0,
            tensor.offset(),
            0,
            tensor.element_size(),
            &mut visit,
        );
    }
}

/// Pack a strided tensor's bytes into row-major order
fn pack(tensor: &Tensor) -> Vec<u8> {
    let mut dense = vec![0u8; tensor.numel() * tensor.element_size()];
    let memory = tensor.memory();
    for_each_run(tensor, |strided, offset, len| {
        dense[offset..offset + len].copy_from_slice(&memory[strided..strided + len]);
    });
    dense
}

/// Scatter row-major bytes into a (possibly strided) tensor
pub(crate) fn unpack(out: &Tensor, dense: &[u8]) {
    let mut memory = out.storage().write();
    if out.is_contiguous() {
        memory[out.offset()..out.offset() + dense.len()].copy_from_slice(dense);
    } else {
        for_each_run(out, |strided, offset, len| {
            memory[strided..strided + len].copy_from_slice(&dense[offset..offset + len]);
        });
    }
}

/// Copy `input`'s logical contents into `out`, which has the same shape and dtype but any
/// strides. Byte exact, works for every dtype.
pub fn rearrange(out: &Tensor, input: &Tensor) -> Result<()> {
    expect_dtype("rearrange", out, input.dtype())?;
    expect_shape("rearrange", "out", out, input.shape())?;
    trace!(shape = ?input.shape(), strides = ?input.strides(), out_strides = ?out.strides(), dtype = %input.dtype(), "rearrange");
    if input.strides().last().is_some_and(|&s| s != 1) && input.numel() > 1 {
        debug!(shape = ?input.shape(), "rearrange copying element by element");
    }

    unpack(out, &pack(input));
    Ok(())
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use super::*;
    use crate::{dtype::DType, error::Error, shape::numel};

    fn arange(shape: &[usize]) -> Tensor {
        let data = (0..numel(shape)).map(|i| i as f32).collect_vec();
        Tensor::from_slice(shape, &data).unwrap()
    }

    #[test]
    fn test_transpose() {
        let t = arange(&[2, 3]).permute(&[1, 0]).unwrap();
        let out = Tensor::new(&[3, 2], DType::F32).unwrap();
        rearrange(&out, &t).unwrap();
        assert_eq!(out.to_vec::<f32>().unwrap(), vec![0., 3., 1., 4., 2., 5.]);
    }

    #[test]
    fn test_unit_stride_and_elementwise_paths_agree() {
        // Same logical contents, one with unit inner stride and one without
        let strided_src = arange(&[4, 3]).permute(&[1, 0]).unwrap();
        let expected = strided_src.to_vec::<f32>().unwrap();
        let reordered = Tensor::from_slice(&[3, 4], &expected).unwrap();

        let a = Tensor::new(&[3, 4], DType::F32).unwrap();
        let b = Tensor::new(&[3, 4], DType::F32).unwrap();
        rearrange(&a, &reordered).unwrap();
        rearrange(&b, &strided_src).unwrap();
        assert_eq!(a.to_vec::<f32>().unwrap(), b.to_vec::<f32>().unwrap());
        assert_eq!(a.to_vec::<f32>().unwrap(), expected);
    }

    #[test]
    fn test_sliced_source() {
        let t = arange(&[4, 5]).slice(1, 1, 4).unwrap().slice(0, 2, 4).unwrap();
        let out = Tensor::new(&[2, 3], DType::F32).unwrap();
        rearrange(&out, &t).unwrap();
        assert_eq!(
            out.to_vec::<f32>().unwrap(),
            vec![11., 12., 13., 16., 17., 18.]
        );
    }

    #[test]
    fn test_strided_destination() {
        let src = arange(&[2, 3]);
        let backing = Tensor::new(&[3, 2], DType::F32).unwrap();
        let out = backing.permute(&[1, 0]).unwrap();
        rearrange(&out, &src).unwrap();
        assert_eq!(out.to_vec::<f32>().unwrap(), src.to_vec::<f32>().unwrap());
        assert_eq!(
            backing.to_vec::<f32>().unwrap(),
            vec![0., 3., 1., 4., 2., 5.]
        );
    }

    #[test]
    fn test_scalar_and_integer() {
        let s = Tensor::from_slice(&[], &[42i64]).unwrap();
        let out = Tensor::new(&[], DType::I64).unwrap();
        rearrange(&out, &s).unwrap();
        assert_eq!(out.to_vec::<i64>().unwrap(), vec![42]);

        let ints = Tensor::from_slice(&[2, 2], &[1i32, 2, 3, 4])
            .unwrap()
            .permute(&[1, 0])
            .unwrap();
        let out = Tensor::new(&[2, 2], DType::I32).unwrap();
        rearrange(&out, &ints).unwrap();
        assert_eq!(out.to_vec::<i32>().unwrap(), vec![1, 3, 2, 4]);
    }

    #[test]
    fn test_aliasing_copy() {
        // Copy row 0 over row 1 of the same storage
        let t = arange(&[2, 3]);
        rearrange(&t.slice(0, 1, 2).unwrap(), &t.slice(0, 0, 1).unwrap()).unwrap();
        assert_eq!(t.to_vec::<f32>().unwrap(), vec![0., 1., 2., 0., 1., 2.]);
    }

    #[test]
    fn test_mismatch() {
        let t = arange(&[2, 3]);
        let out = Tensor::new(&[3, 2], DType::F32).unwrap();
        assert!(matches!(
            rearrange(&out, &t),
            Err(Error::Shape { op: "rearrange", .. })
        ));
        let out = Tensor::new(&[2, 3], DType::F16).unwrap();
        assert_eq!(
            rearrange(&out, &t).unwrap_err(),
            Error::DTypeMismatch {
                op: "rearrange",
                expected: DType::F32,
                found: DType::F16
            }
        );
    }
}
