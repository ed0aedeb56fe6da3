#![no_std]

extern crate alloc;

mod file;
mod mount;

pub use file::{Access, Dir, File};
pub use rill_vfs_api as api;

use alloc::{string::String, sync::Arc};
use lock_api::{Mutex, MutexGuard, RawMutex};
use log::info;
use rill_vfs_api::{
    FsError,
    driver::DriverConfig,
    file::OpenMode,
    fs::{Filesystem, FsBackend},
    lock::{DEFAULT_LOCK_TRIES, lock_or_timeout},
    path,
    stat::{Stat, StatFs},
};

use crate::mount::{MountEntry, MountId, MountTable};

/// Mount-point description returned by positional enumeration.
#[derive(Debug, Clone)]
pub struct MountInfo {
    pub fs_name: &'static str,
    pub mount_point: String,
    pub total: u32,
    pub free: u32,
}

/// The virtual filesystem: a mount table plus the dispatch layer that
/// resolves absolute paths to a backend and an FS-relative suffix.
///
/// The table lock is never held across a call into a backend; dispatch
/// clones the entry's backend handle under the lock and calls it after
/// release, so a concurrent unmount cannot free state mid-call.
pub struct Vfs<R: RawMutex> {
    mounts: Mutex<R, MountTable>,
    lock_tries: u32,
}

impl<R: RawMutex + Send + Sync> Vfs<R> {
    pub fn new() -> Self {
        Self::with_lock_tries(DEFAULT_LOCK_TRIES)
    }

    pub fn with_lock_tries(lock_tries: u32) -> Self {
        Self {
            mounts: Mutex::new(MountTable::new()),
            lock_tries,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, R, MountTable>, FsError> {
        lock_or_timeout(&self.mounts, self.lock_tries)
    }

    /// Resolves the deepest mount whose point prefixes `path`; returns its
    /// backend and the byte offset where the FS-relative suffix starts.
    fn resolve(&self, path: &str) -> Result<(Arc<dyn FsBackend>, usize), FsError> {
        if !path::is_absolute(path) {
            return Err(FsError::InvalidArgument);
        }
        let table = self.lock()?;
        let (id, at) = table.resolve_base(path).ok_or(FsError::NotFound)?;
        let backend = table.get(id).ok_or(FsError::NotFound)?.backend.clone();
        Ok((backend, at))
    }

    /// Backend of the mount whose point is exactly `path` (normalized).
    fn resolve_mounted(&self, path: &str) -> Result<Arc<dyn FsBackend>, FsError> {
        let table = self.lock()?;
        let id = table.find_exact(path).ok_or(FsError::NotFound)?;
        Ok(table.get(id).ok_or(FsError::NotFound)?.backend.clone())
    }

    pub fn mount(
        &self,
        src_path: Option<&str>,
        mount_point: &str,
        fs: &dyn Filesystem,
    ) -> Result<(), FsError> {
        if mount_point.is_empty() || !path::is_absolute(mount_point) {
            return Err(FsError::InvalidArgument);
        }
        let mpath = path::normalize_dir(mount_point);

        // reserve a slot under the base before touching any backend
        let base = {
            let mut table = self.lock()?;
            if table.find_exact(&mpath).is_some() {
                return Err(FsError::AlreadyExists);
            }
            if table.is_empty() {
                // bootstrap: the very first mount must be the root
                if mpath != "/" {
                    return Err(FsError::NotFound);
                }
                None
            } else {
                let (id, at) = table.resolve_base(&mpath).ok_or(FsError::NotFound)?;
                let entry = table.get_mut(id).ok_or(FsError::NotFound)?;
                entry.child_mounts += 1;
                let backend = entry.backend.clone();
                Some((id, backend, at))
            }
        };

        match self.attach(src_path, &mpath, fs, &base) {
            Ok(()) => Ok(()),
            Err(e) => {
                if let Some((base_id, _, _)) = base {
                    self.cancel_reservation(base_id);
                }
                Err(e)
            }
        }
    }

    fn attach(
        &self,
        src_path: Option<&str>,
        mpath: &str,
        fs: &dyn Filesystem,
        base: &Option<(MountId, Arc<dyn FsBackend>, usize)>,
    ) -> Result<(), FsError> {
        // the mount point must exist as a directory in the base filesystem
        if let Some((_, base_backend, at)) = base {
            base_backend.opendir(&mpath[*at..])?;
        }

        let backend = fs.init(src_path)?;

        let mut table = self.lock()?;
        if table.find_exact(mpath).is_some() {
            // lost a race against another mount on the same point
            let _ = backend.release();
            return Err(FsError::AlreadyExists);
        }
        table.insert(MountEntry {
            mount_point: String::from(mpath),
            base: base.as_ref().map(|(id, _, _)| *id),
            child_mounts: 0,
            backend,
        });
        info!("mounted {} at {mpath}", fs.name());
        Ok(())
    }

    fn cancel_reservation(&self, base_id: MountId) {
        if let Ok(mut table) = self.lock() {
            if let Some(entry) = table.get_mut(base_id) {
                entry.child_mounts = entry.child_mounts.saturating_sub(1);
            }
        }
    }

    pub fn umount(&self, mount_point: &str) -> Result<(), FsError> {
        if !path::is_absolute(mount_point) {
            return Err(FsError::InvalidArgument);
        }
        let mpath = path::normalize_dir(mount_point);

        let (id, backend) = {
            let table = self.lock()?;
            let id = table.find_exact(&mpath).ok_or(FsError::NotFound)?;
            let entry = table.get(id).ok_or(FsError::NotFound)?;
            if entry.child_mounts != 0 {
                return Err(FsError::Busy);
            }
            (id, entry.backend.clone())
        };

        backend.release()?;

        let mut table = self.lock()?;
        let Some(entry) = table.remove(id) else {
            // another task unmounted it in the window; nothing left to do
            return Ok(());
        };
        if let Some(base_id) = entry.base {
            if let Some(base) = table.get_mut(base_id) {
                base.child_mounts = base.child_mounts.saturating_sub(1);
            }
        }
        info!("unmounted {mpath}");
        Ok(())
    }

    /// Positional mount enumeration for listing tools.
    pub fn mount_entry(&self, index: usize) -> Result<MountInfo, FsError> {
        let (mount_point, backend) = {
            let table = self.lock()?;
            let entry = table.by_index(index).ok_or(FsError::NotFound)?;
            (entry.mount_point.clone(), entry.backend.clone())
        };
        let stat = backend.statfs()?;
        Ok(MountInfo {
            fs_name: stat.name,
            mount_point: String::from(path::display_form(&mount_point)),
            total: stat.blocks,
            free: stat.bfree,
        })
    }

    pub fn mkdir(&self, dir_path: &str) -> Result<(), FsError> {
        let p = dir_form(dir_path)?;
        let (backend, at) = self.resolve(&p)?;
        backend.mkdir(&p[at..])
    }

    pub fn mknod(&self, node_path: &str, driver: DriverConfig) -> Result<(), FsError> {
        let p = dir_form(node_path)?;
        let (backend, at) = self.resolve(&p)?;
        backend.mknod(&p[at..], driver)
    }

    pub fn opendir(&self, dir_path: &str) -> Result<Dir, FsError> {
        let p = dir_form(dir_path)?;
        let (backend, at) = self.resolve(&p)?;
        Ok(Dir::new(backend.opendir(&p[at..])?))
    }

    /// Removes a file or an empty directory. Mount points cannot be
    /// removed; unmount them instead.
    pub fn remove(&self, target_path: &str) -> Result<(), FsError> {
        let mpath = dir_form(target_path)?;
        {
            let table = self.lock()?;
            if table.find_exact(&mpath).is_some() {
                return Err(FsError::Busy);
            }
        }
        let (backend, at) = self.resolve(target_path)?;
        backend.remove(&target_path[at..])
    }

    /// Renames within one directory of one filesystem; both paths must
    /// resolve to the same mount.
    pub fn rename(&self, old_path: &str, new_path: &str) -> Result<(), FsError> {
        let (old_backend, old_at) = self.resolve(old_path)?;
        let (new_backend, new_at) = self.resolve(new_path)?;
        if !Arc::ptr_eq(&old_backend, &new_backend) {
            return Err(FsError::InvalidArgument);
        }
        old_backend.rename(&old_path[old_at..], &new_path[new_at..])
    }

    pub fn chmod(&self, target_path: &str, mode: u32) -> Result<(), FsError> {
        let (backend, at) = self.resolve(target_path)?;
        backend.chmod(&target_path[at..], mode)
    }

    pub fn chown(&self, target_path: &str, uid: u32, gid: u32) -> Result<(), FsError> {
        let (backend, at) = self.resolve(target_path)?;
        backend.chown(&target_path[at..], uid, gid)
    }

    pub fn stat(&self, target_path: &str) -> Result<Stat, FsError> {
        let (backend, at) = self.resolve(target_path)?;
        backend.stat(&target_path[at..])
    }

    /// Status of the filesystem mounted exactly at `mount_point`.
    pub fn statfs(&self, mount_point: &str) -> Result<StatFs, FsError> {
        let mpath = dir_form(mount_point)?;
        self.resolve_mounted(&mpath)?.statfs()
    }

    /// Opens a file, binding only the transfer directions the mode allows.
    pub fn open(&self, file_path: &str, mode: OpenMode) -> Result<File, FsError> {
        if !path::is_absolute(file_path) {
            return Err(FsError::InvalidArgument);
        }
        let p = path::normalize_file(file_path);
        let (backend, at) = self.resolve(&p)?;
        let (handle, seek) = backend.open(&p[at..], mode)?;
        Ok(File::new(backend, handle, seek, Access::from(mode)))
    }
}

fn dir_form(p: &str) -> Result<String, FsError> {
    if !path::is_absolute(p) {
        return Err(FsError::InvalidArgument);
    }
    Ok(path::normalize_dir(p))
}

impl<R: RawMutex + Send + Sync> Default for Vfs<R> {
    fn default() -> Self {
        Self::new()
    }
}
