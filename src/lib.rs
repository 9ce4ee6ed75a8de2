pub mod cast;
pub mod device;
pub mod dtype;
pub mod error;
pub mod nn;
pub mod ops;
pub mod shape;
pub mod storage;
pub mod tensor;

#[cfg(test)]
mod tests;

pub use error::{Error, Result};

pub mod prelude {
    pub use crate::device::{Device, DeviceApi, MemcpyKind};
    pub use crate::dtype::DType;
    pub use crate::error::{Error, Result};
    pub use crate::nn::Module;
    pub use crate::tensor::{Tensor, TensorMeta};
}
