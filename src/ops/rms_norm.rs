use tracing::trace;

use super::{
    dispatch_float, expect_dtype, expect_rank, expect_shape, map_rows, store_f32, Strided,
};
use crate::{cast::FloatElement, error::Result, tensor::Tensor};

/// Normalize each row of `input` (`[M, N]`) by its root mean square, then scale by
/// `weight` (`[N]`): `out[i, j] = input[i, j] / sqrt(mean(input[i]^2) + eps) * weight[j]`.
pub fn rms_norm(out: &Tensor, input: &Tensor, weight: &Tensor, eps: f32) -> Result<()> {
    expect_rank("rms_norm", "input", input, 2)?;
    let (m, n) = (input.shape()[0], input.shape()[1]);
    expect_shape("rms_norm", "weight", weight, &[n])?;
    expect_shape("rms_norm", "out", out, &[m, n])?;
    expect_dtype("rms_norm", weight, input.dtype())?;
    expect_dtype("rms_norm", out, input.dtype())?;
    trace!(m, n, eps, dtype = %input.dtype(), "rms_norm");
    dispatch_float!("rms_norm", input.dtype(), kernel(out, input, weight, eps))
}

fn kernel<T: FloatElement>(out: &Tensor, input: &Tensor, weight: &Tensor, eps: f32) -> Result<()> {
    let (m, n) = (input.shape()[0], input.shape()[1]);
    let values = {
        let (in_memory, w_memory) = (input.memory(), weight.memory());
        let x = Strided::<T>::new(&in_memory, input);
        let w = Strided::<T>::new(&w_memory, weight);
        map_rows(m, n, |i, row| {
            let base = i * x.stride(0);
            let sum_sq: f32 = (0..n)
                .map(|j| x.load(base + j * x.stride(1)))
                .map(|v| v * v)
                .sum();
            let scale = 1.0 / (sum_sq / n as f32 + eps).sqrt();
            for (j, o) in row.iter_mut().enumerate() {
                *o = x.load(base + j * x.stride(1)) * scale * w.load(j * w.stride(0));
            }
        })
    };
    store_f32::<T>(out, &values)
}
