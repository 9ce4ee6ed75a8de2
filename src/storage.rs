use std::{fmt, sync::Arc};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{
    device::{self, Device, DeviceApi},
    error::Result,
};

/// A block of device memory shared by every tensor viewing it.
///
/// Held through an `Arc`; the memory goes back to its runtime when the last handle drops.
pub struct Storage {
    memory: RwLock<Box<[u8]>>,
    size: usize,
    api: Arc<dyn DeviceApi>,
}

impl Storage {
    pub fn allocate(size: usize, device: Device) -> Result<Arc<Self>> {
        let api = device::api(device)?;
        let memory = api.allocate(size)?;
        Ok(Arc::new(Self {
            memory: RwLock::new(memory),
            size,
            api,
        }))
    }

    /// Size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn device(&self) -> Device {
        self.api.device()
    }

    pub fn api(&self) -> &Arc<dyn DeviceApi> {
        &self.api
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Box<[u8]>> {
        self.memory.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Box<[u8]>> {
        self.memory.write()
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        let memory = std::mem::take(self.memory.get_mut());
        self.api.free(memory);
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("device", &self.device())
            .field("size", &self.size)
            .finish()
    }
}
