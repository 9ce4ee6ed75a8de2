use crate::{ops, prelude::*};

/// Token embedding table of shape `[vocab, dim]`
#[derive(Debug, Clone)]
pub struct Embedding {
    pub weight: Tensor,
}

impl Embedding {
    pub fn new(weight: Tensor) -> Result<Self> {
        if weight.ndim() != 2 {
            return Err(Error::shape(
                "embedding",
                format!("weight must be [vocab, dim], got {:?}", weight.shape()),
            ));
        }
        Ok(Self { weight })
    }

    pub fn vocab(&self) -> usize {
        self.weight.shape()[0]
    }

    pub fn dim(&self) -> usize {
        self.weight.shape()[1]
    }
}

/// Ids of any shape `[..]` give embeddings of shape `[.., dim]`
impl Module<Tensor> for Embedding {
    type Output = Tensor;

    fn forward(&self, ids: Tensor) -> Result<Tensor> {
        let out = Tensor::new_on(
            &[ids.numel(), self.dim()],
            self.weight.dtype(),
            self.weight.device(),
        )?;
        ops::embedding(&out, &ids, &self.weight)?;
        let mut shape = ids.shape().to_vec();
        shape.push(self.dim());
        out.view(&shape)
    }
}
