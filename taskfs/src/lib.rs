#![no_std]

extern crate alloc;

use core::marker::PhantomData;

use alloc::{boxed::Box, format, string::String, sync::Arc, vec::Vec};
use lock_api::{Mutex, MutexGuard, RawMutex};
use log::trace;
use rill_vfs_api::{
    FsError,
    file::{FileHandle, OpenMode},
    fs::{DirStream, Filesystem, FsBackend},
    lock::{DEFAULT_LOCK_TRIES, lock_or_timeout},
    path,
    stat::{DirEntry, FileType, Stat, StatFs},
};
use slotmap::{Key, KeyData, SlotMap};

pub const TASKFS_TYPE: &str = "taskfs";

/// Snapshot of one task, as reported by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStat {
    pub id: u32,
    pub name: String,
    pub priority: i32,
    pub stack_free: usize,
    pub memory: usize,
}

/// Scheduler-side provider of task snapshots. Keeps the scheduler itself
/// out of the filesystem's dependency graph.
pub trait TaskSource: Send + Sync {
    fn tasks(&self) -> Vec<TaskStat>;

    fn task(&self, id: u32) -> Option<TaskStat> {
        self.tasks().into_iter().find(|t| t.id == id)
    }
}

/// Read-only pseudo-filesystem exposing one text file per task, named by
/// task id, under the filesystem root.
pub struct TaskFs<R: RawMutex + Send + Sync + 'static, S: TaskSource + 'static> {
    source: Arc<S>,
    _marker: PhantomData<R>,
}

impl<R: RawMutex + Send + Sync + 'static, S: TaskSource + 'static> TaskFs<R, S> {
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            _marker: PhantomData,
        }
    }
}

impl<R: RawMutex + Send + Sync + 'static, S: TaskSource + 'static> Filesystem for TaskFs<R, S> {
    fn name(&self) -> &str {
        TASKFS_TYPE
    }

    fn init(&self, _src_path: Option<&str>) -> Result<Arc<dyn FsBackend>, FsError> {
        Ok(Arc::new(TaskFsVolume::<R, S> {
            source: self.source.clone(),
            open: Mutex::new(SlotMap::with_key()),
            lock_tries: DEFAULT_LOCK_TRIES,
        }))
    }
}

slotmap::new_key_type! { struct TaskFileId; }

pub struct TaskFsVolume<R: RawMutex + Send + Sync + 'static, S: TaskSource> {
    source: Arc<S>,
    /// Text rendered at open time, one buffer per handle.
    open: Mutex<R, SlotMap<TaskFileId, Box<[u8]>>>,
    lock_tries: u32,
}

impl<R: RawMutex + Send + Sync + 'static, S: TaskSource> TaskFsVolume<R, S> {
    fn lock(&self) -> Result<MutexGuard<'_, R, SlotMap<TaskFileId, Box<[u8]>>>, FsError> {
        lock_or_timeout(&self.open, self.lock_tries)
    }
}

fn render(task: &TaskStat) -> String {
    format!(
        "name: {}\npriority: {}\nstack_free: {}\nmemory: {}\n",
        task.name, task.priority, task.stack_free, task.memory
    )
}

/// Resolves a suffix path to a task id; `Ok(None)` is the filesystem root.
fn task_id(path: &str) -> Result<Option<u32>, FsError> {
    let mut segs = path::segments(path);
    let Some(name) = segs.next() else {
        return Ok(None);
    };
    if segs.next().is_some() {
        return Err(FsError::NotFound);
    }
    name.parse().map(Some).map_err(|_| FsError::NotFound)
}

impl<R: RawMutex + Send + Sync + 'static, S: TaskSource + 'static> FsBackend
    for TaskFsVolume<R, S>
{
    fn open(&self, path: &str, mode: OpenMode) -> Result<(FileHandle, usize), FsError> {
        if mode.writable() {
            return Err(FsError::Unsupported);
        }
        let id = task_id(path)?.ok_or(FsError::IsADirectory)?;
        let task = self.source.task(id).ok_or(FsError::NotFound)?;
        trace!("taskfs: open snapshot of task {id}");
        let text = render(&task).into_bytes().into_boxed_slice();
        let handle = self.lock()?.insert(text);
        Ok((FileHandle(handle.data().as_ffi()), 0))
    }

    fn close(&self, handle: FileHandle) -> Result<(), FsError> {
        self.lock()?
            .remove(TaskFileId::from(KeyData::from_ffi(handle.0)))
            .map(|_| ())
            .ok_or(FsError::NotFound)
    }

    fn read(
        &self,
        handle: FileHandle,
        dst: &mut [u8],
        item_size: usize,
        count: usize,
        seek: usize,
    ) -> Result<usize, FsError> {
        if item_size == 0 || count == 0 {
            return Ok(0);
        }
        let open = self.lock()?;
        let text = open
            .get(TaskFileId::from(KeyData::from_ffi(handle.0)))
            .ok_or(FsError::NotFound)?;
        let seek = seek.min(text.len());
        let items = count.min((text.len() - seek) / item_size);
        let bytes = items * item_size;
        if dst.len() < bytes {
            return Err(FsError::InvalidArgument);
        }
        dst[..bytes].copy_from_slice(&text[seek..seek + bytes]);
        Ok(items)
    }

    fn fstat(&self, handle: FileHandle) -> Result<Stat, FsError> {
        let open = self.lock()?;
        let text = open
            .get(TaskFileId::from(KeyData::from_ffi(handle.0)))
            .ok_or(FsError::NotFound)?;
        Ok(Stat {
            dev: 0,
            mode: 0o444,
            uid: 0,
            gid: 0,
            size: text.len(),
            mtime: 0,
            file_type: FileType::Regular,
        })
    }

    fn stat(&self, path: &str) -> Result<Stat, FsError> {
        let stat = match task_id(path)? {
            None => Stat {
                dev: 0,
                mode: 0o444,
                uid: 0,
                gid: 0,
                size: self.source.tasks().len(),
                mtime: 0,
                file_type: FileType::Directory,
            },
            Some(id) => {
                let task = self.source.task(id).ok_or(FsError::NotFound)?;
                if path.ends_with('/') {
                    return Err(FsError::NotADirectory);
                }
                Stat {
                    dev: 0,
                    mode: 0o444,
                    uid: 0,
                    gid: 0,
                    size: render(&task).len(),
                    mtime: 0,
                    file_type: FileType::Regular,
                }
            }
        };
        Ok(stat)
    }

    fn statfs(&self) -> Result<StatFs, FsError> {
        Ok(StatFs {
            fs_type: 0x02,
            blocks: 0,
            bfree: 0,
            files: self.source.tasks().len() as u32,
            ffree: 0,
            name: TASKFS_TYPE,
        })
    }

    fn opendir(&self, path: &str) -> Result<Box<dyn DirStream>, FsError> {
        if task_id(path)?.is_some() {
            return Err(FsError::NotADirectory);
        }
        let entries: Vec<DirEntry> = self
            .source
            .tasks()
            .iter()
            .map(|task| DirEntry {
                name: format!("{}", task.id),
                size: render(task).len(),
                file_type: FileType::Regular,
            })
            .collect();
        Ok(Box::new(TaskDirStream { entries, cursor: 0 }))
    }

    fn release(&self) -> Result<(), FsError> {
        if !self.lock()?.is_empty() {
            return Err(FsError::Busy);
        }
        Ok(())
    }

    // every mutating operation is inherited from the contract defaults and
    // surfaces Unsupported
}

struct TaskDirStream {
    entries: Vec<DirEntry>,
    cursor: usize,
}

impl DirStream for TaskDirStream {
    fn items(&self) -> usize {
        self.entries.len()
    }

    fn read_next(&mut self) -> Option<DirEntry> {
        let entry = self.entries.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(entry)
    }
}
