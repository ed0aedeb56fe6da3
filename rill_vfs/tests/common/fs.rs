use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use rill_vfs_api::{
    FsError,
    fs::{DirStream, Filesystem, FsBackend},
    stat::{DirEntry, StatFs},
};

/// Test filesystem that records how often its backend is released. Every
/// path opens as an empty directory, so it can host nested mounts anywhere.
pub struct CountingFs {
    pub releases: Arc<AtomicU32>,
}

impl CountingFs {
    pub fn new() -> Self {
        Self {
            releases: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn release_count(&self) -> u32 {
        self.releases.load(Ordering::Relaxed)
    }
}

impl Filesystem for CountingFs {
    fn name(&self) -> &str {
        "countingfs"
    }

    fn init(&self, _src_path: Option<&str>) -> Result<Arc<dyn FsBackend>, FsError> {
        Ok(Arc::new(CountingBackend {
            releases: self.releases.clone(),
        }))
    }
}

struct CountingBackend {
    releases: Arc<AtomicU32>,
}

impl FsBackend for CountingBackend {
    fn opendir(&self, _path: &str) -> Result<Box<dyn DirStream>, FsError> {
        Ok(Box::new(EmptyDir))
    }

    fn statfs(&self) -> Result<StatFs, FsError> {
        Ok(StatFs {
            fs_type: 0xff,
            blocks: 64,
            bfree: 32,
            files: 0,
            ffree: 0,
            name: "countingfs",
        })
    }

    fn release(&self) -> Result<(), FsError> {
        self.releases.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

struct EmptyDir;

impl DirStream for EmptyDir {
    fn items(&self) -> usize {
        0
    }

    fn read_next(&mut self) -> Option<DirEntry> {
        None
    }
}

/// Filesystem whose init always fails; used to exercise mount rollback.
pub struct FailingFs;

impl Filesystem for FailingFs {
    fn name(&self) -> &str {
        "failingfs"
    }

    fn init(&self, _src_path: Option<&str>) -> Result<Arc<dyn FsBackend>, FsError> {
        Err(FsError::AllocationFailed)
    }
}
