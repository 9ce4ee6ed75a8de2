use thiserror::Error;

use crate::{device::Device, dtype::DType};

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong in a metadata transform or a kernel call.
/// Failures are scoped to the call that raised them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("{op}: shape holds {expected} elements but the tensor has {actual}")]
    NumelMismatch {
        op: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("{op}: tensor is not contiguous")]
    NotContiguous { op: &'static str },
    #[error("dimension {dim} out of range for tensor of rank {ndim}")]
    DimOutOfRange { dim: usize, ndim: usize },
    #[error("slice [{start}, {end}) out of range for dimension {dim} of size {size}")]
    SliceOutOfRange {
        dim: usize,
        start: usize,
        end: usize,
        size: usize,
    },
    #[error("permutation {order:?} is not a bijection on [0, {ndim})")]
    InvalidPermutation { order: Vec<usize>, ndim: usize },
    #[error("{op}: unsupported datatype {dtype}")]
    UnsupportedDType { op: &'static str, dtype: DType },
    #[error("{op}: expected dtype {expected}, found {found}")]
    DTypeMismatch {
        op: &'static str,
        expected: DType,
        found: DType,
    },
    #[error("{op}: {msg}")]
    Shape { op: &'static str, msg: String },
    #[error("view needs {required} bytes from offset {offset} but storage holds {capacity}")]
    StorageOverflow {
        offset: usize,
        required: usize,
        capacity: usize,
    },
    #[error("device {0} is not available")]
    DeviceUnavailable(Device),
    #[error("cannot copy {src} bytes into a buffer of {dst} bytes")]
    CopySize { src: usize, dst: usize },
    #[error("{op}: index {index} out of range for dimension of size {size}")]
    IndexOutOfRange {
        op: &'static str,
        index: i64,
        size: usize,
    },
}

impl Error {
    pub(crate) fn shape(op: &'static str, msg: impl Into<String>) -> Self {
        Error::Shape {
            op,
            msg: msg.into(),
        }
    }
}
