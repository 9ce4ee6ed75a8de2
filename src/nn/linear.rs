use super::{fold_rows, unfold_rows};
use crate::{ops, prelude::*};

/// A linear projection `x W^T + b`.
///
/// `weight` is stored `[out_features, in_features]`, so each output reads one weight row.
#[derive(Debug, Clone)]
pub struct Linear {
    pub weight: Tensor,
    pub bias: Option<Tensor>,
}

impl Linear {
    pub fn new(weight: Tensor, bias: Option<Tensor>) -> Result<Self> {
        if weight.ndim() != 2 {
            return Err(Error::shape(
                "linear",
                format!("weight must be [out, in], got {:?}", weight.shape()),
            ));
        }
        Ok(Self { weight, bias })
    }

    pub fn in_features(&self) -> usize {
        self.weight.shape()[1]
    }

    pub fn out_features(&self) -> usize {
        self.weight.shape()[0]
    }
}

/// Projects the last dim; any leading dims are batch dims
impl Module<Tensor> for Linear {
    type Output = Tensor;

    fn forward(&self, input: Tensor) -> Result<Tensor> {
        let (rows, leading) = fold_rows(&input)?;
        let out = Tensor::new_on(
            &[rows.shape()[0], self.out_features()],
            input.dtype(),
            input.device(),
        )?;
        ops::linear(&out, &rows, &self.weight, self.bias.as_ref())?;
        unfold_rows(out, &leading)
    }
}
