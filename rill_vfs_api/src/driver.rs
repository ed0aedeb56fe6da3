use alloc::sync::Arc;

use crate::FsError;

/// Operations of a registered device driver. Unimplemented transfers fall
/// through to `Unsupported`.
pub trait DriverOps: Send + Sync {
    fn open(&self) -> Result<(), FsError>;
    fn close(&self) -> Result<(), FsError>;

    fn read(
        &self,
        _dst: &mut [u8],
        _item_size: usize,
        _count: usize,
        _seek: usize,
    ) -> Result<usize, FsError> {
        Err(FsError::Unsupported)
    }

    fn write(
        &self,
        _src: &[u8],
        _item_size: usize,
        _count: usize,
        _seek: usize,
    ) -> Result<usize, FsError> {
        Err(FsError::Unsupported)
    }

    fn ioctl(&self, _request: u32, _data: &mut [u8]) -> Result<(), FsError> {
        Err(FsError::Unsupported)
    }
}

/// Driver binding stored in a device node. Cloned into the node at mknod
/// time, so later driver re-registration cannot invalidate it.
#[derive(Clone)]
pub struct DriverConfig {
    pub dev: u32,
    pub part: u32,
    pub ops: Arc<dyn DriverOps>,
}

impl core::fmt::Debug for DriverConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DriverConfig")
            .field("dev", &self.dev)
            .field("part", &self.part)
            .finish_non_exhaustive()
    }
}
