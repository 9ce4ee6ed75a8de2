use num_traits::ToPrimitive;
use tracing::trace;

use super::{expect_dtype, expect_rank, expect_shape, read_indices, rearrange::unpack};
use crate::{
    error::{Error, Result},
    tensor::Tensor,
};

/// Gather rows of `weight` (`[vocab, dim]`) into `out` (`[n, dim]`), one per id in `index`.
///
/// `index` holds i64 or i32 ids and may have any shape; it is read flattened. Every id must
/// satisfy `0 <= id < vocab`. Rows are copied byte for byte, so any weight dtype works as
/// long as `out` has the same one.
pub fn embedding(out: &Tensor, index: &Tensor, weight: &Tensor) -> Result<()> {
    expect_rank("embedding", "weight", weight, 2)?;
    expect_dtype("embedding", out, weight.dtype())?;
    let (vocab, dim) = (weight.shape()[0], weight.shape()[1]);
    let ids = read_indices("embedding", index)?;
    expect_shape("embedding", "out", out, &[ids.len(), dim])?;
    trace!(n = ids.len(), vocab, dim, dtype = %weight.dtype(), "embedding");

    let rows = ids
        .iter()
        .map(|&id| {
            id.to_usize()
                .filter(|&r| r < vocab)
                .ok_or(Error::IndexOutOfRange {
                    op: "embedding",
                    index: id,
                    size: vocab,
                })
        })
        .collect::<Result<Vec<_>>>()?;

    let element_size = weight.element_size();
    let row_bytes = dim * element_size;
    if row_bytes == 0 {
        return Ok(());
    }
    let (row_stride, col_stride) = (weight.strides()[0], weight.strides()[1]);
    let mut dense = vec![0u8; rows.len() * row_bytes];
    {
        let memory = weight.memory();
        for (&row, dst) in rows.iter().zip(dense.chunks_exact_mut(row_bytes)) {
            let src = weight.offset() + row * row_stride * element_size;
            if col_stride == 1 {
                dst.copy_from_slice(&memory[src..src + row_bytes]);
            } else {
                for (j, element) in dst.chunks_exact_mut(element_size).enumerate() {
                    let at = src + j * col_stride * element_size;
                    element.copy_from_slice(&memory[at..at + element_size]);
                }
            }
        }
    }
    unpack(out, &dense);
    Ok(())
}
