use tracing::trace;

use super::{dispatch_float, expect_dtype, store_f32};
use crate::{
    cast::{read, FloatElement},
    dtype::DType,
    error::{Error, Result},
    tensor::Tensor,
};

/// Index and value of the largest element of `vals`, read flattened.
///
/// `max_idx` is a single i64 element and `max_val` a single element of `vals`' dtype. Ties go
/// to the lowest index.
pub fn argmax(max_idx: &Tensor, max_val: &Tensor, vals: &Tensor) -> Result<()> {
    if vals.numel() == 0 {
        return Err(Error::shape("argmax", "input is empty"));
    }
    for (name, t) in [("max_idx", max_idx), ("max_val", max_val)] {
        if t.numel() != 1 {
            return Err(Error::shape(
                "argmax",
                format!("{name} must hold one element, got shape {:?}", t.shape()),
            ));
        }
    }
    expect_dtype("argmax", max_idx, DType::I64)?;
    expect_dtype("argmax", max_val, vals.dtype())?;
    trace!(n = vals.numel(), dtype = %vals.dtype(), "argmax");
    dispatch_float!("argmax", vals.dtype(), kernel(max_idx, max_val, vals))
}

fn kernel<T: FloatElement>(max_idx: &Tensor, max_val: &Tensor, vals: &Tensor) -> Result<()> {
    let (index, value) = {
        let memory = vals.memory();
        let mut best = (0usize, f32::NEG_INFINITY);
        for (i, offset) in vals.offsets().enumerate() {
            let v = read::<T>(&memory, offset).to_f32();
            if v > best.1 {
                best = (i, v);
            }
        }
        best
    };
    max_idx.store(&[index as i64])?;
    store_f32::<T>(max_val, &[value])
}
