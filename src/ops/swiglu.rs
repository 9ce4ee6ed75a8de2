use tracing::trace;

use super::{dispatch_float, expect_dtype, expect_shape, gather_f32, store_f32};
use crate::{cast::FloatElement, error::Result, tensor::Tensor};

#[inline]
fn silu(x: f32) -> f32 {
    x / (1.0 + (-x).exp())
}

/// `out = up * silu(gate)`, elementwise over tensors of one shape
pub fn swiglu(out: &Tensor, gate: &Tensor, up: &Tensor) -> Result<()> {
    expect_shape("swiglu", "up", up, gate.shape())?;
    expect_shape("swiglu", "out", out, gate.shape())?;
    expect_dtype("swiglu", up, gate.dtype())?;
    expect_dtype("swiglu", out, gate.dtype())?;
    trace!(shape = ?gate.shape(), dtype = %gate.dtype(), "swiglu");
    dispatch_float!("swiglu", gate.dtype(), kernel(out, gate, up))
}

fn kernel<T: FloatElement>(out: &Tensor, gate: &Tensor, up: &Tensor) -> Result<()> {
    let values = gather_f32::<T>(gate)
        .into_iter()
        .zip(gather_f32::<T>(up))
        .map(|(g, u)| u * silu(g))
        .collect::<Vec<_>>();
    store_f32::<T>(out, &values)
}
