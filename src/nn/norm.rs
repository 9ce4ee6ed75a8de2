use super::{fold_rows, unfold_rows};
use crate::{ops, prelude::*};

/// Root mean square norm over the last dim, scaled by a learned weight
#[derive(Debug, Clone)]
pub struct RMSNorm {
    pub weight: Tensor,
    pub epsilon: f32,
}

impl RMSNorm {
    pub fn new(weight: Tensor, epsilon: f32) -> Self {
        Self { weight, epsilon }
    }
}

impl Module<Tensor> for RMSNorm {
    type Output = Tensor;

    fn forward(&self, input: Tensor) -> Result<Tensor> {
        let (rows, leading) = fold_rows(&input)?;
        let out = Tensor::new_on(rows.shape(), input.dtype(), input.device())?;
        ops::rms_norm(&out, &rows, &self.weight, self.epsilon)?;
        unfold_rows(out, &leading)
    }
}

#[cfg(test)]
mod tests {
    use super::RMSNorm;
    use crate::{prelude::*, tests::assert_close};

    #[test]
    fn test_rms_norm() {
        let norm = RMSNorm::new(Tensor::from_slice(&[2], &[1f32, 0.5]).unwrap(), 1e-6);
        let out = norm
            .forward(Tensor::from_slice(&[2, 1, 2], &[1f32, 1., -2., 2.]).unwrap())
            .unwrap();
        assert_eq!(out.shape(), &[2, 1, 2]);
        assert_close(&out.to_vec::<f32>().unwrap(), &[1., 0.5, -1., 0.5]);
    }
}
