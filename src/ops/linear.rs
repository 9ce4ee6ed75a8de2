use tracing::trace;

use super::{dispatch_float, expect_dtype, expect_rank, expect_shape, gather_f32, store_f32};
use crate::{cast::FloatElement, error::Result, tensor::Tensor};

/// `out[m, n] = sum_k input[m, k] * weight[n, k] + bias[n]`
///
/// `input` is `[M, K]`, `weight` is `[N, K]` and `out` is `[M, N]`, all of one float dtype.
/// A missing or empty `bias` skips the add.
pub fn linear(out: &Tensor, input: &Tensor, weight: &Tensor, bias: Option<&Tensor>) -> Result<()> {
    expect_rank("linear", "input", input, 2)?;
    expect_rank("linear", "weight", weight, 2)?;
    let (m, k) = (input.shape()[0], input.shape()[1]);
    let n = weight.shape()[0];
    expect_shape("linear", "weight", weight, &[n, k])?;
    expect_shape("linear", "out", out, &[m, n])?;
    expect_dtype("linear", weight, input.dtype())?;
    expect_dtype("linear", out, input.dtype())?;
    let bias = bias.filter(|b| b.numel() > 0);
    if let Some(bias) = bias {
        expect_shape("linear", "bias", bias, &[n])?;
        expect_dtype("linear", bias, input.dtype())?;
    }
    trace!(m, n, k, bias = bias.is_some(), dtype = %input.dtype(), "linear");
    dispatch_float!("linear", input.dtype(), kernel(out, input, weight, bias))
}

fn kernel<T: FloatElement>(
    out: &Tensor,
    input: &Tensor,
    weight: &Tensor,
    bias: Option<&Tensor>,
) -> Result<()> {
    let (m, k, n) = (input.shape()[0], input.shape()[1], weight.shape()[0]);
    let a = gather_f32::<T>(input);
    let b = gather_f32::<T>(weight);
    let mut c = vec![0f32; m * n];
    if !c.is_empty() {
        // SAFETY: a is m x k, b is read as the k x n transpose of the dense n x k weight,
        // c is m x n; all three buffers are exactly that size and row-major.
        unsafe {
            matrixmultiply::sgemm(
                m,
                k,
                n,
                1.0,
                a.as_ptr(),
                k as isize,
                1,
                b.as_ptr(),
                1,
                k as isize,
                0.0,
                c.as_mut_ptr(),
                n as isize,
                1,
            );
        }
    }
    if let Some(bias) = bias {
        let bias = gather_f32::<T>(bias);
        for row in c.chunks_exact_mut(n.max(1)) {
            row.iter_mut().zip(&bias).for_each(|(c, b)| *c += b);
        }
    }
    store_f32::<T>(out, &c)
}
