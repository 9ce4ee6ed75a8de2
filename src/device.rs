use std::{fmt::Debug, sync::Arc};

use strum::Display;
use tracing::trace;

use crate::error::{Error, Result};

/// Where a storage block lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
    Nvidia,
}

/// Direction of a memory copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemcpyKind {
    H2H,
    H2D,
    D2H,
    D2D,
}

impl MemcpyKind {
    /// The copy kind needed to move bytes from `src` to `dst`
    pub fn between(src: Device, dst: Device) -> Self {
        match (src == Device::Cpu, dst == Device::Cpu) {
            (true, true) => MemcpyKind::H2H,
            (true, false) => MemcpyKind::H2D,
            (false, true) => MemcpyKind::D2H,
            (false, false) => MemcpyKind::D2D,
        }
    }
}

/// Allocation and copy contract a device runtime provides to storage.
pub trait DeviceApi: Debug + Send + Sync {
    fn device(&self) -> Device;
    /// Allocate `size` zeroed bytes
    fn allocate(&self, size: usize) -> Result<Box<[u8]>>;
    fn free(&self, memory: Box<[u8]>);
    /// Copy all of `src` into the front of `dst`
    fn memcpy(&self, dst: &mut [u8], src: &[u8], kind: MemcpyKind) -> Result<()>;
}

/// Host memory runtime. Every copy kind is a plain memcpy here.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuApi;

impl DeviceApi for CpuApi {
    fn device(&self) -> Device {
        Device::Cpu
    }

    fn allocate(&self, size: usize) -> Result<Box<[u8]>> {
        trace!(size, "cpu allocate");
        Ok(vec![0u8; size].into_boxed_slice())
    }

    fn free(&self, memory: Box<[u8]>) {
        trace!(size = memory.len(), "cpu free");
        drop(memory);
    }

    fn memcpy(&self, dst: &mut [u8], src: &[u8], _: MemcpyKind) -> Result<()> {
        if src.len() > dst.len() {
            return Err(Error::CopySize {
                src: src.len(),
                dst: dst.len(),
            });
        }
        dst[..src.len()].copy_from_slice(src);
        Ok(())
    }
}

/// Get the runtime for a device
pub fn api(device: Device) -> Result<Arc<dyn DeviceApi>> {
    match device {
        Device::Cpu => Ok(Arc::new(CpuApi)),
        other => Err(Error::DeviceUnavailable(other)),
    }
}
