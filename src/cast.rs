//! Conversions between storage scalars and the f32 working precision.
//!
//! Kernels never do arithmetic on a 16-bit value. Every load goes through
//! [`FloatElement::to_f32`] and every store through [`FloatElement::from_f32`].
//!
//! Bit layouts of the two compressed formats:
//!
//! | format | sign | exponent (bias) | mantissa |
//! |--------|------|-----------------|----------|
//! | f16    | 1    | 5 (15)          | 10       |
//! | bf16   | 1    | 8 (127)         | 7        |
//!
//! bf16 is the upper half of an IEEE f32. Both encoders round to nearest, ties to even,
//! and keep NaN a NaN. The encode/decode itself is `half`'s.

use std::fmt::Debug;

use half::{bf16, f16};

use crate::dtype::DType;

/// A plain-old-data scalar that can live in tensor storage
pub trait Element: bytemuck::Pod + Debug + Default + Send + Sync + 'static {
    const DTYPE: DType;
}

/// A storage scalar the float kernels can compute on
pub trait FloatElement: Element {
    fn to_f32(self) -> f32;
    fn from_f32(value: f32) -> Self;
}

macro_rules! element {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(impl Element for $ty {
            const DTYPE: DType = DType::$dtype;
        })*
    };
}

element!(
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f16 => F16,
    f32 => F32,
    f64 => F64,
    bf16 => BF16,
);

impl FloatElement for f32 {
    #[inline(always)]
    fn to_f32(self) -> f32 {
        self
    }
    #[inline(always)]
    fn from_f32(value: f32) -> Self {
        value
    }
}

impl FloatElement for f16 {
    #[inline(always)]
    fn to_f32(self) -> f32 {
        f16::to_f32(self)
    }
    #[inline(always)]
    fn from_f32(value: f32) -> Self {
        f16::from_f32(value)
    }
}

impl FloatElement for bf16 {
    #[inline(always)]
    fn to_f32(self) -> f32 {
        bf16::to_f32(self)
    }
    #[inline(always)]
    fn from_f32(value: f32) -> Self {
        bf16::from_f32(value)
    }
}

/// Read the element at `index` (in elements, not bytes). Storage carries no alignment
/// guarantee so the read is unaligned.
#[inline(always)]
pub(crate) fn read<T: Element>(bytes: &[u8], index: usize) -> T {
    let size = std::mem::size_of::<T>();
    bytemuck::pod_read_unaligned(&bytes[index * size..(index + 1) * size])
}

#[inline(always)]
pub(crate) fn write<T: Element>(bytes: &mut [u8], index: usize, value: T) {
    let size = std::mem::size_of::<T>();
    bytes[index * size..(index + 1) * size].copy_from_slice(bytemuck::bytes_of(&value));
}
