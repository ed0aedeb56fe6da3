use alloc::{boxed::Box, sync::Arc};

use crate::{
    FsError,
    driver::DriverConfig,
    file::{FileHandle, OpenMode},
    stat::{DirEntry, Stat, StatFs},
};

/// Contract between the VFS and a mounted filesystem instance. A backend
/// implements what it supports; everything else inherits the `Unsupported`
/// default.
pub trait FsBackend: Send + Sync {
    fn open(&self, _path: &str, _mode: OpenMode) -> Result<(FileHandle, usize), FsError> {
        Err(FsError::Unsupported)
    }

    fn close(&self, _handle: FileHandle) -> Result<(), FsError> {
        Err(FsError::Unsupported)
    }

    /// Returns the number of whole items read.
    fn read(
        &self,
        _handle: FileHandle,
        _dst: &mut [u8],
        _item_size: usize,
        _count: usize,
        _seek: usize,
    ) -> Result<usize, FsError> {
        Err(FsError::Unsupported)
    }

    /// Returns the number of whole items written.
    fn write(
        &self,
        _handle: FileHandle,
        _src: &[u8],
        _item_size: usize,
        _count: usize,
        _seek: usize,
    ) -> Result<usize, FsError> {
        Err(FsError::Unsupported)
    }

    fn ioctl(&self, _handle: FileHandle, _request: u32, _data: &mut [u8]) -> Result<(), FsError> {
        Err(FsError::Unsupported)
    }

    fn fstat(&self, _handle: FileHandle) -> Result<Stat, FsError> {
        Err(FsError::Unsupported)
    }

    fn stat(&self, _path: &str) -> Result<Stat, FsError> {
        Err(FsError::Unsupported)
    }

    fn statfs(&self) -> Result<StatFs, FsError> {
        Err(FsError::Unsupported)
    }

    fn mkdir(&self, _path: &str) -> Result<(), FsError> {
        Err(FsError::Unsupported)
    }

    fn mknod(&self, _path: &str, _driver: DriverConfig) -> Result<(), FsError> {
        Err(FsError::Unsupported)
    }

    fn opendir(&self, _path: &str) -> Result<Box<dyn DirStream>, FsError> {
        Err(FsError::Unsupported)
    }

    fn remove(&self, _path: &str) -> Result<(), FsError> {
        Err(FsError::Unsupported)
    }

    fn rename(&self, _old: &str, _new: &str) -> Result<(), FsError> {
        Err(FsError::Unsupported)
    }

    fn chmod(&self, _path: &str, _mode: u32) -> Result<(), FsError> {
        Err(FsError::Unsupported)
    }

    fn chown(&self, _path: &str, _uid: u32, _gid: u32) -> Result<(), FsError> {
        Err(FsError::Unsupported)
    }

    /// Called by unmount before the instance is dropped from the mount
    /// table. A backend that still has live state to protect returns `Busy`.
    fn release(&self) -> Result<(), FsError> {
        Ok(())
    }
}

/// A mountable filesystem type. `init` produces one backend instance per
/// mount; the instance doubles as the mount descriptor.
pub trait Filesystem {
    fn name(&self) -> &str;
    fn init(&self, src_path: Option<&str>) -> Result<Arc<dyn FsBackend>, FsError>;
}

/// One-shot directory cursor. Not restartable; reopen to rewind.
pub trait DirStream: Send {
    /// Entry count at open time.
    fn items(&self) -> usize;
    fn read_next(&mut self) -> Option<DirEntry>;
}
