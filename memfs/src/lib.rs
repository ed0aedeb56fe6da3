#![no_std]

extern crate alloc;

mod node;
mod volume;

pub use volume::MemFsVolume;

use core::marker::PhantomData;

use alloc::sync::Arc;
use lock_api::RawMutex;
use rill_vfs_api::{
    FsError,
    fs::{Filesystem, FsBackend},
};

pub const MEMFS_TYPE: &str = "memfs";

/// In-RAM hierarchical filesystem type. Every mount gets a fresh empty
/// volume; contents are lost at unmount.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemFs<R: RawMutex + Send + Sync + 'static> {
    _marker: PhantomData<R>,
}

impl<R: RawMutex + Send + Sync + 'static> Filesystem for MemFs<R> {
    fn name(&self) -> &str {
        MEMFS_TYPE
    }

    fn init(&self, _src_path: Option<&str>) -> Result<Arc<dyn FsBackend>, FsError> {
        Ok(Arc::new(MemFsVolume::<R>::new()))
    }
}
