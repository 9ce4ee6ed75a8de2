use std::{fmt, ops::RangeBounds, sync::Arc};

use half::{bf16, f16};
use itertools::Itertools;
use parking_lot::RwLockReadGuard;
use tracing::debug;

use crate::{
    cast::{self, Element, FloatElement},
    device::{Device, MemcpyKind},
    dtype::DType,
    error::{Error, Result},
    ops,
    shape::{
        check_permutation, checked_numel, contiguous_strides, is_contiguous, max_offset, numel,
        permute_dims,
        range_bounds, Dims, StridedOffsets,
    },
    storage::Storage,
};

/// Layout of a tensor: what it holds and how its dims map onto storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorMeta {
    pub dtype: DType,
    pub shape: Dims,
    /// Per-dimension strides, in elements
    pub strides: Dims,
}

/// A strided view over a shared storage block.
///
/// Metadata never changes after construction. Permute, slice and view produce new tensors
/// that share the same storage; the storage is released when the last of them drops.
#[derive(Debug, Clone)]
pub struct Tensor {
    meta: TensorMeta,
    storage: Arc<Storage>,
    /// Byte offset of element `[0, 0, ..]` in storage
    offset: usize,
}

impl Tensor {
    /// Allocate a zeroed, contiguous tensor on the cpu
    pub fn new(shape: &[usize], dtype: DType) -> Result<Self> {
        Self::new_on(shape, dtype, Device::Cpu)
    }

    /// Allocate a zeroed, contiguous tensor on a device
    pub fn new_on(shape: &[usize], dtype: DType, device: Device) -> Result<Self> {
        let bytes = checked_numel(shape)
            .and_then(|n| n.checked_mul(dtype.size()))
            .ok_or_else(|| Error::shape("new", format!("{shape:?} of {dtype} overflows usize")))?;
        let storage = Storage::allocate(bytes, device)?;
        Ok(Self {
            meta: TensorMeta {
                dtype,
                shape: shape.iter().copied().collect(),
                strides: contiguous_strides(shape),
            },
            storage,
            offset: 0,
        })
    }

    /// Allocate a cpu tensor and fill it with `data` in row-major order
    pub fn from_slice<T: Element>(shape: &[usize], data: &[T]) -> Result<Self> {
        let tensor = Self::new(shape, T::DTYPE)?;
        tensor.load_slice(data)?;
        Ok(tensor)
    }

    /// Allocate a cpu tensor of a float dtype, casting `data` down to it
    pub fn from_f32(shape: &[usize], dtype: DType, data: &[f32]) -> Result<Self> {
        fn cast_all<T: FloatElement>(data: &[f32]) -> Vec<T> {
            data.iter().map(|&v| T::from_f32(v)).collect()
        }
        match dtype {
            DType::F32 => Self::from_slice(shape, data),
            DType::F16 => Self::from_slice(shape, &cast_all::<f16>(data)),
            DType::BF16 => Self::from_slice(shape, &cast_all::<bf16>(data)),
            other => Err(Error::UnsupportedDType {
                op: "from_f32",
                dtype: other,
            }),
        }
    }

    fn from_parts(meta: TensorMeta, storage: Arc<Storage>, offset: usize) -> Result<Self> {
        let required = max_offset(&meta.shape, &meta.strides)
            .map(|max| (max + 1) * meta.dtype.size())
            .unwrap_or(0);
        if offset + required > storage.size() {
            return Err(Error::StorageOverflow {
                offset,
                required,
                capacity: storage.size(),
            });
        }
        Ok(Self {
            meta,
            storage,
            offset,
        })
    }

    pub fn meta(&self) -> &TensorMeta {
        &self.meta
    }

    pub fn ndim(&self) -> usize {
        self.meta.shape.len()
    }

    pub fn shape(&self) -> &[usize] {
        &self.meta.shape
    }

    pub fn strides(&self) -> &[usize] {
        &self.meta.strides
    }

    pub fn dtype(&self) -> DType {
        self.meta.dtype
    }

    pub fn device(&self) -> Device {
        self.storage.device()
    }

    pub fn numel(&self) -> usize {
        numel(self.shape())
    }

    pub fn element_size(&self) -> usize {
        self.meta.dtype.size()
    }

    /// Byte offset into storage
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    /// True if both tensors view the same storage block
    pub fn shares_storage(&self, other: &Tensor) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    pub fn is_contiguous(&self) -> bool {
        is_contiguous(self.shape(), self.strides())
    }

    /// Element index of the first element, counted from the start of storage
    pub(crate) fn element_offset(&self) -> usize {
        self.offset / self.element_size()
    }

    /// Storage element indexes in logical row-major order
    pub(crate) fn offsets(&self) -> StridedOffsets<'_> {
        StridedOffsets::new(self.shape(), self.strides(), self.element_offset())
    }

    pub(crate) fn memory(&self) -> RwLockReadGuard<'_, Box<[u8]>> {
        self.storage.read()
    }

    // Meta transforms

    /// Reorder dimensions: output dim `i` is input dim `order[i]`
    pub fn permute(&self, order: &[usize]) -> Result<Self> {
        check_permutation(order, self.ndim())?;
        Self::from_parts(
            TensorMeta {
                dtype: self.dtype(),
                shape: permute_dims(self.shape(), order),
                strides: permute_dims(self.strides(), order),
            },
            Arc::clone(&self.storage),
            self.offset,
        )
    }

    /// Narrow `dim` to `[start, end)` without copying
    pub fn slice(&self, dim: usize, start: usize, end: usize) -> Result<Self> {
        if dim >= self.ndim() {
            return Err(Error::DimOutOfRange {
                dim,
                ndim: self.ndim(),
            });
        }
        let size = self.shape()[dim];
        if start > end || end > size {
            return Err(Error::SliceOutOfRange {
                dim,
                start,
                end,
                size,
            });
        }
        let mut shape = self.meta.shape.clone();
        shape[dim] = end - start;
        Self::from_parts(
            TensorMeta {
                dtype: self.dtype(),
                shape,
                strides: self.meta.strides.clone(),
            },
            Arc::clone(&self.storage),
            self.offset + start * self.strides()[dim] * self.element_size(),
        )
    }

    /// Take a slice with a range, e.g. `t.slice_range(0, 2..)`
    pub fn slice_range(&self, dim: usize, range: impl RangeBounds<usize>) -> Result<Self> {
        let size = self.shape().get(dim).copied().ok_or(Error::DimOutOfRange {
            dim,
            ndim: self.ndim(),
        })?;
        let (start, end) = range_bounds(&range, size);
        self.slice(dim, start, end)
    }

    /// Reinterpret a contiguous tensor under a new shape with the same element count
    pub fn view(&self, shape: &[usize]) -> Result<Self> {
        if numel(shape) != self.numel() {
            return Err(Error::NumelMismatch {
                op: "view",
                expected: numel(shape),
                actual: self.numel(),
            });
        }
        if !self.is_contiguous() {
            return Err(Error::NotContiguous { op: "view" });
        }
        Self::from_parts(
            TensorMeta {
                dtype: self.dtype(),
                shape: shape.iter().copied().collect(),
                strides: contiguous_strides(shape),
            },
            Arc::clone(&self.storage),
            self.offset,
        )
    }

    /// Like `view`, but densifies a non-contiguous tensor into new storage first
    pub fn reshape(&self, shape: &[usize]) -> Result<Self> {
        if self.is_contiguous() {
            return self.view(shape);
        }
        if numel(shape) != self.numel() {
            return Err(Error::NumelMismatch {
                op: "reshape",
                expected: numel(shape),
                actual: self.numel(),
            });
        }
        debug!(from = ?self.shape(), to = ?shape, "reshape copies a strided tensor");
        self.contiguous()?.view(shape)
    }

    /// A densely packed tensor with the same contents. Shares storage if already dense.
    pub fn contiguous(&self) -> Result<Self> {
        if self.is_contiguous() {
            return Ok(self.clone());
        }
        let out = Self::new_on(self.shape(), self.dtype(), self.device())?;
        ops::rearrange(&out, self)?;
        Ok(out)
    }

    /// Copy into fresh storage on `device`
    pub fn to(&self, device: Device) -> Result<Self> {
        let src = self.contiguous()?;
        let out = Self::new_on(self.shape(), self.dtype(), device)?;
        let bytes = src.numel() * src.element_size();
        {
            let src_memory = src.memory();
            let mut dst_memory = out.storage.write();
            out.storage.api().memcpy(
                &mut dst_memory[..],
                &src_memory[src.offset..src.offset + bytes],
                MemcpyKind::between(src.device(), device),
            )?;
        }
        Ok(out)
    }

    // Data movement

    /// Copy `numel * element_size` bytes from host memory into this tensor
    pub fn load(&self, src: &[u8]) -> Result<()> {
        if !self.is_contiguous() {
            return Err(Error::NotContiguous { op: "load" });
        }
        let bytes = self.numel() * self.element_size();
        if src.len() != bytes {
            return Err(Error::CopySize {
                src: src.len(),
                dst: bytes,
            });
        }
        let mut memory = self.storage.write();
        self.storage.api().memcpy(
            &mut memory[self.offset..self.offset + bytes],
            src,
            MemcpyKind::between(Device::Cpu, self.device()),
        )
    }

    /// Write host values in logical row-major order, following this tensor's strides
    pub fn load_slice<T: Element>(&self, data: &[T]) -> Result<()> {
        if T::DTYPE != self.dtype() {
            return Err(Error::DTypeMismatch {
                op: "load",
                expected: self.dtype(),
                found: T::DTYPE,
            });
        }
        self.store(data)
    }

    /// Store values in logical order. The caller guarantees `T` matches the dtype's width.
    pub(crate) fn store<T: Element>(&self, values: &[T]) -> Result<()> {
        debug_assert_eq!(std::mem::size_of::<T>(), self.element_size());
        if values.len() != self.numel() {
            return Err(Error::NumelMismatch {
                op: "store",
                expected: values.len(),
                actual: self.numel(),
            });
        }
        let mut memory = self.storage.write();
        if self.is_contiguous() {
            let bytes: &[u8] = bytemuck::cast_slice(values);
            memory[self.offset..self.offset + bytes.len()].copy_from_slice(bytes);
        } else {
            for (offset, &value) in self.offsets().zip(values) {
                cast::write(&mut memory, offset, value);
            }
        }
        Ok(())
    }

    /// Read all elements in logical row-major order
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        if T::DTYPE != self.dtype() {
            return Err(Error::DTypeMismatch {
                op: "to_vec",
                expected: self.dtype(),
                found: T::DTYPE,
            });
        }
        let memory = self.memory();
        Ok(self.offsets().map(|o| cast::read::<T>(&memory, o)).collect())
    }

    /// Read a float tensor in logical order, upcast to f32
    pub fn to_f32_vec(&self) -> Result<Vec<f32>> {
        fn upcast<T: FloatElement>(t: &Tensor) -> Result<Vec<f32>> {
            Ok(t.to_vec::<T>()?.into_iter().map(T::to_f32).collect())
        }
        match self.dtype() {
            DType::F32 => self.to_vec::<f32>(),
            DType::F16 => upcast::<f16>(self),
            DType::BF16 => upcast::<bf16>(self),
            other => Err(Error::UnsupportedDType {
                op: "to_f32_vec",
                dtype: other,
            }),
        }
    }

    /// One-line summary of the layout
    pub fn info(&self) -> String {
        format!(
            "Tensor: shape[{}] strides[{}] offset={} dtype={} device={}",
            self.shape().iter().join(", "),
            self.strides().iter().join(", "),
            self.offset,
            self.dtype(),
            self.device(),
        )
    }

    fn display_values(&self) -> Result<Vec<String>> {
        fn strings<T: Element + ToString>(t: &Tensor) -> Result<Vec<String>> {
            Ok(t.to_vec::<T>()?.iter().map(T::to_string).collect())
        }
        match self.dtype() {
            DType::F32 | DType::F16 | DType::BF16 => {
                Ok(self.to_f32_vec()?.iter().map(f32::to_string).collect())
            }
            DType::F64 => strings::<f64>(self),
            DType::I8 => strings::<i8>(self),
            DType::I16 => strings::<i16>(self),
            DType::I32 => strings::<i32>(self),
            DType::I64 => strings::<i64>(self),
            DType::U16 => strings::<u16>(self),
            DType::U32 => strings::<u32>(self),
            DType::U64 => strings::<u64>(self),
            // One-byte types share a layout
            DType::U8 | DType::Byte | DType::Bool => {
                let memory = self.memory();
                Ok(self
                    .offsets()
                    .map(|o| cast::read::<u8>(&memory, o).to_string())
                    .collect())
            }
        }
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.info())?;
        let values = self.display_values().map_err(|_| fmt::Error)?;
        let row = self.shape().last().copied().unwrap_or(1).max(1);
        for chunk in values.chunks(row) {
            writeln!(f, "{}", chunk.join(" "))?;
        }
        Ok(())
    }
}
