use super::linear::Linear;
use crate::{ops, prelude::*};

/// Gated feed-forward block: `down(up(x) * silu(gate(x)))`
#[derive(Debug, Clone)]
pub struct SwiGLU {
    pub gate: Linear,
    pub up: Linear,
    pub down: Linear,
}

impl Module<Tensor> for SwiGLU {
    type Output = Tensor;

    fn forward(&self, input: Tensor) -> Result<Tensor> {
        let gate = self.gate.forward(input.clone())?;
        let up = self.up.forward(input)?;
        // The activation is written over the gate projection
        ops::swiglu(&gate, &gate, &up)?;
        self.down.forward(gate)
    }
}
