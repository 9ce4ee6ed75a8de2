//! Causal grouped-query attention over a key/value timeline that ends with the queries.

use tracing::trace;

use super::{dispatch_float, expect_dtype, expect_rank, expect_shape, map_rows, store_f32, Strided};
use crate::{
    cast::FloatElement,
    error::{Error, Result},
    tensor::Tensor,
};

/// Added to the softmax denominator
pub const SOFTMAX_EPSILON: f32 = 1e-6;

/// Timesteps whose attention probability is below this are left out of the weighted sum.
/// This is an approximation of the exact sum and is kept for numerical parity.
pub const SKIP_THRESHOLD: f32 = 1e-9;

/// `q` is `[seqlen, nhead, head_dim]`, `k` is `[total_len, nkvhead, head_dim]` and `v` is
/// `[total_len, nkvhead, v_dim]`, with `total_len >= seqlen` and `nhead` a multiple of
/// `nkvhead`. Query `s` sits at absolute position `total_len - seqlen + s` and attends to
/// keys `0..=` that position. Query head `h` reads kv head `h / (nhead / nkvhead)`.
///
/// `out` is `[seqlen, nhead, v_dim]`.
pub fn self_attention(out: &Tensor, q: &Tensor, k: &Tensor, v: &Tensor, scale: f32) -> Result<()> {
    expect_rank("self_attention", "q", q, 3)?;
    expect_rank("self_attention", "k", k, 3)?;
    expect_rank("self_attention", "v", v, 3)?;
    let (seqlen, nhead, head_dim) = (q.shape()[0], q.shape()[1], q.shape()[2]);
    let (total_len, nkvhead) = (k.shape()[0], k.shape()[1]);
    let v_dim = v.shape()[2];
    expect_shape("self_attention", "k", k, &[total_len, nkvhead, head_dim])?;
    expect_shape("self_attention", "v", v, &[total_len, nkvhead, v_dim])?;
    expect_shape("self_attention", "out", out, &[seqlen, nhead, v_dim])?;
    if nkvhead == 0 || nhead % nkvhead != 0 {
        return Err(Error::shape(
            "self_attention",
            format!("{nhead} query heads cannot be grouped over {nkvhead} kv heads"),
        ));
    }
    if total_len < seqlen {
        return Err(Error::shape(
            "self_attention",
            format!("{seqlen} queries but only {total_len} keys"),
        ));
    }
    for t in [k, v, out] {
        expect_dtype("self_attention", t, q.dtype())?;
    }
    trace!(seqlen, total_len, nhead, nkvhead, head_dim, v_dim, scale, dtype = %q.dtype(), "self_attention");
    dispatch_float!("self_attention", q.dtype(), kernel(out, q, k, v, scale))
}

fn kernel<T: FloatElement>(out: &Tensor, q: &Tensor, k: &Tensor, v: &Tensor, scale: f32) -> Result<()> {
    let (seqlen, nhead, head_dim) = (q.shape()[0], q.shape()[1], q.shape()[2]);
    let (total_len, nkvhead) = (k.shape()[0], k.shape()[1]);
    let v_dim = v.shape()[2];
    let group_size = nhead / nkvhead;
    let start = total_len - seqlen;

    let values = {
        let (q_memory, k_memory, v_memory) = (q.memory(), k.memory(), v.memory());
        let (q, k, v) = (
            Strided::<T>::new(&q_memory, q),
            Strided::<T>::new(&k_memory, k),
            Strided::<T>::new(&v_memory, v),
        );
        // Every (position, head) pair is independent
        map_rows(seqlen * nhead, v_dim, |row, acc| {
            let (s, h) = (row / nhead, row % nhead);
            let kv_h = h / group_size;
            let q_base = s * q.stride(0) + h * q.stride(1);
            let query = (0..head_dim)
                .map(|i| q.load(q_base + i * q.stride(2)))
                .collect::<Vec<_>>();

            // Timesteps past the query's own position are masked out
            let visible = start + s + 1;
            let mut scores = (0..visible)
                .map(|t| {
                    let k_base = t * k.stride(0) + kv_h * k.stride(1);
                    let dot: f32 = query
                        .iter()
                        .enumerate()
                        .map(|(i, qi)| qi * k.load(k_base + i * k.stride(2)))
                        .sum();
                    dot * scale
                })
                .collect::<Vec<_>>();

            let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let mut sum = 0.0;
            for score in scores.iter_mut() {
                *score = if *score == f32::NEG_INFINITY {
                    0.0
                } else {
                    (*score - max).exp()
                };
                sum += *score;
            }
            let inv_sum = 1.0 / (sum + SOFTMAX_EPSILON);

            for (t, score) in scores.iter().enumerate() {
                let prob = score * inv_sum;
                if prob < SKIP_THRESHOLD {
                    continue;
                }
                let v_base = t * v.stride(0) + kv_h * v.stride(1);
                for (i, a) in acc.iter_mut().enumerate() {
                    *a += prob * v.load(v_base + i * v.stride(2));
                }
            }
        })
    };
    store_f32::<T>(out, &values)
}
