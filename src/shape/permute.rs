use itertools::Itertools;

use super::Dims;
use crate::error::{Error, Result};

/// Ensure `order` is a bijection on `[0, ndim)`
pub fn check_permutation(order: &[usize], ndim: usize) -> Result<()> {
    if order.len() == ndim && order.iter().all(|&i| i < ndim) && order.iter().all_unique() {
        Ok(())
    } else {
        Err(Error::InvalidPermutation {
            order: order.to_vec(),
            ndim,
        })
    }
}

/// Reorder per-dimension values so that output dim `i` takes input dim `order[i]`
pub fn permute_dims(dims: &[usize], order: &[usize]) -> Dims {
    order.iter().map(|&i| dims[i]).collect()
}
