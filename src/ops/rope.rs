use tracing::trace;

use super::{
    dispatch_float, expect_dtype, expect_rank, expect_shape, map_rows, read_indices, store_f32,
    Strided,
};
use crate::{
    cast::FloatElement,
    error::{Error, Result},
    tensor::Tensor,
};

/// Rotary position embedding over `input` (`[seqlen, nhead, head_dim]`).
///
/// Each head vector is split in two halves `a` and `b`; pair `j` is rotated by
/// `pos[s] * theta^(-2j / head_dim)`. `pos` is `[seqlen]` of i64 or i32. The angle and the
/// rotation are evaluated in f64, operands are read and results stored as f32 or narrower.
pub fn rope(out: &Tensor, input: &Tensor, pos: &Tensor, theta: f32) -> Result<()> {
    expect_rank("rope", "input", input, 3)?;
    let (seqlen, nhead, head_dim) = (input.shape()[0], input.shape()[1], input.shape()[2]);
    if head_dim % 2 != 0 {
        return Err(Error::shape(
            "rope",
            format!("head dim must be even, got {head_dim}"),
        ));
    }
    expect_shape("rope", "pos", pos, &[seqlen])?;
    expect_shape("rope", "out", out, input.shape())?;
    expect_dtype("rope", out, input.dtype())?;
    let positions = read_indices("rope", pos)?;
    trace!(seqlen, nhead, head_dim, theta, dtype = %input.dtype(), "rope");
    dispatch_float!("rope", input.dtype(), kernel(out, input, &positions, theta))
}

fn kernel<T: FloatElement>(out: &Tensor, input: &Tensor, positions: &[i64], theta: f32) -> Result<()> {
    let (nhead, head_dim) = (input.shape()[1], input.shape()[2]);
    let half = head_dim / 2;
    let freqs = (0..half)
        .map(|j| (theta as f64).powf(-2.0 * j as f64 / head_dim as f64))
        .collect::<Vec<_>>();
    let values = {
        let memory = input.memory();
        let x = Strided::<T>::new(&memory, input);
        map_rows(positions.len() * nhead, head_dim, |row, o| {
            let (s, h) = (row / nhead, row % nhead);
            let base = s * x.stride(0) + h * x.stride(1);
            let p = positions[s] as f64;
            for (j, &freq) in freqs.iter().enumerate() {
                let (sin, cos) = (p * freq).sin_cos();
                let a = x.load(base + j * x.stride(2)) as f64;
                let b = x.load(base + (j + half) * x.stride(2)) as f64;
                o[j] = (a * cos - b * sin) as f32;
                o[j + half] = (b * cos + a * sin) as f32;
            }
        })
    };
    store_f32::<T>(out, &values)
}
