use alloc::{boxed::Box, sync::Arc};
use lock_api::{Mutex, MutexGuard, RawMutex};
use log::debug;
use rill_vfs_api::{
    FsError,
    driver::{DriverConfig, DriverOps},
    file::{FileHandle, OpenMode},
    fs::{DirStream, FsBackend},
    lock::{DEFAULT_LOCK_TRIES, lock_or_timeout},
    path,
    stat::{DirEntry, Stat, StatFs},
};
use slotmap::{Key, KeyData, SlotMap};

use crate::{
    MEMFS_TYPE,
    node::{Node, NodeId, NodePayload, NodeTree},
};

slotmap::new_key_type! { struct FileId; }

/// One open descriptor. A removed node is freed only when the last
/// descriptor referencing it is closed.
#[derive(Clone, Copy)]
struct OpenFileEntry {
    node: NodeId,
    parent: NodeId,
    pending_removal: bool,
}

struct VolumeState {
    tree: NodeTree,
    open: SlotMap<FileId, OpenFileEntry>,
}

struct Shared<R: RawMutex> {
    state: Mutex<R, VolumeState>,
    lock_tries: u32,
}

/// One mounted memfs instance: a node tree plus its open-file registry,
/// behind a single bounded-timeout mutex.
pub struct MemFsVolume<R: RawMutex + Send + Sync + 'static> {
    shared: Arc<Shared<R>>,
}

impl<R: RawMutex + Send + Sync + 'static> MemFsVolume<R> {
    pub fn new() -> Self {
        Self::with_lock_tries(DEFAULT_LOCK_TRIES)
    }

    pub fn with_lock_tries(lock_tries: u32) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(VolumeState {
                    tree: NodeTree::new(),
                    open: SlotMap::with_key(),
                }),
                lock_tries,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, R, VolumeState>, FsError> {
        lock_or_timeout(&self.shared.state, self.shared.lock_tries)
    }

    fn insert_new(&self, path: &str, make: impl FnOnce(&str) -> Node) -> Result<(), FsError> {
        let mut st = self.lock()?;
        let (parent, name) = match st.tree.find_parent(path) {
            Some(found) => found,
            // an empty path names the volume root, which always exists
            None if path::depth(path) == 0 => return Err(FsError::AlreadyExists),
            None => return Err(FsError::NotFound),
        };
        if st.tree.child(parent, name).is_some() {
            return Err(FsError::AlreadyExists);
        }
        st.tree.insert_child(parent, make(name))?;
        Ok(())
    }
}

impl<R: RawMutex + Send + Sync + 'static> Default for MemFsVolume<R> {
    fn default() -> Self {
        Self::new()
    }
}

fn to_file_id(handle: FileHandle) -> FileId {
    FileId::from(KeyData::from_ffi(handle.0))
}

fn to_handle(id: FileId) -> FileHandle {
    FileHandle(id.data().as_ffi())
}

fn driver_ops(tree: &NodeTree, node: NodeId) -> Option<Arc<dyn DriverOps>> {
    match &tree.node(node)?.payload {
        NodePayload::Driver(cfg) => Some(cfg.ops.clone()),
        _ => None,
    }
}

fn stat_of(node: &Node) -> Stat {
    let (dev, size) = match &node.payload {
        NodePayload::Dir(children) => (0, children.len()),
        NodePayload::File(data) => (0, data.len()),
        NodePayload::Driver(cfg) => (cfg.dev, 0),
    };
    Stat {
        dev,
        mode: node.mode,
        uid: node.uid,
        gid: node.gid,
        size,
        mtime: node.mtime,
        file_type: node.file_type(),
    }
}

impl<R: RawMutex + Send + Sync + 'static> FsBackend for MemFsVolume<R> {
    fn open(&self, path: &str, mode: OpenMode) -> Result<(FileHandle, usize), FsError> {
        let mut st = self.lock()?;
        let (parent, name) = st.tree.find_parent(path).ok_or(FsError::NotFound)?;
        let node_id = match st.tree.walk(path, 0) {
            Some(id) => id,
            None if mode.creates() => {
                let id = st.tree.insert_child(parent, Node::file(name))?;
                debug!("memfs: created {path}");
                id
            }
            None => return Err(FsError::NotFound),
        };

        let node = st.tree.node_mut(node_id).ok_or(FsError::NotFound)?;
        let mut driver = None;
        let mut seek = 0;
        match &mut node.payload {
            NodePayload::Dir(_) => return Err(FsError::IsADirectory),
            NodePayload::File(data) => {
                if mode.truncates() {
                    data.clear();
                    node.size = 0;
                }
                if mode.appends() {
                    seek = node.size;
                }
            }
            NodePayload::Driver(cfg) => driver = Some(cfg.ops.clone()),
        }
        if let Some(drv) = driver {
            drv.open()?;
        }

        // a node already marked for removal stays marked for every new opener
        let pending = st
            .open
            .values()
            .any(|e| e.node == node_id && e.pending_removal);
        let id = st.open.insert(OpenFileEntry {
            node: node_id,
            parent,
            pending_removal: pending,
        });
        Ok((to_handle(id), seek))
    }

    fn close(&self, handle: FileHandle) -> Result<(), FsError> {
        let mut st = self.lock()?;
        let id = to_file_id(handle);
        let entry = *st.open.get(id).ok_or(FsError::NotFound)?;
        if let Some(drv) = driver_ops(&st.tree, entry.node) {
            drv.close()?;
        }
        st.open.remove(id);
        if entry.pending_removal && !st.open.values().any(|e| e.node == entry.node) {
            debug!("memfs: removing node on last close");
            st.tree.unlink(entry.parent, entry.node)?;
        }
        Ok(())
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
        let st = self.lock()?;
        let entry = *st.open.get(to_file_id(handle)).ok_or(FsError::NotFound)?;
        if let Some(ops) = driver_ops(&st.tree, entry.node) {
            drop(st);
            return ops.read(dst, item_size, count, seek);
        }
        let node = st.tree.node(entry.node).ok_or(FsError::NotFound)?;
        match &node.payload {
            NodePayload::File(data) => {
                let seek = seek.min(data.len());
                let items = count.min((data.len() - seek) / item_size);
                let bytes = items * item_size;
                if dst.len() < bytes {
                    return Err(FsError::InvalidArgument);
                }
                dst[..bytes].copy_from_slice(&data[seek..seek + bytes]);
                Ok(items)
            }
            NodePayload::Dir(_) => Err(FsError::IsADirectory),
            // driver transfers were dispatched above
            NodePayload::Driver(_) => Err(FsError::Unsupported),
        }
    }

    fn write(
        &self,
        handle: FileHandle,
        src: &[u8],
        item_size: usize,
        count: usize,
        seek: usize,
    ) -> Result<usize, FsError> {
        if item_size == 0 || count == 0 {
            return Ok(0);
        }
        let bytes = item_size.checked_mul(count).ok_or(FsError::InvalidArgument)?;
        if src.len() < bytes {
            return Err(FsError::InvalidArgument);
        }
        let mut st = self.lock()?;
        let entry = *st.open.get(to_file_id(handle)).ok_or(FsError::NotFound)?;
        if let Some(ops) = driver_ops(&st.tree, entry.node) {
            drop(st);
            return ops.write(src, item_size, count, seek);
        }
        let node = st.tree.node_mut(entry.node).ok_or(FsError::NotFound)?;
        match &mut node.payload {
            NodePayload::File(data) => {
                let seek = seek.min(data.len());
                let end = seek + bytes;
                if end > data.len() {
                    data.try_reserve(end - data.len())
                        .map_err(|_| FsError::AllocationFailed)?;
                    data.resize(end, 0);
                }
                data[seek..end].copy_from_slice(&src[..bytes]);
                node.size = data.len();
                Ok(count)
            }
            NodePayload::Dir(_) => Err(FsError::IsADirectory),
            NodePayload::Driver(_) => Err(FsError::Unsupported),
        }
    }

    fn ioctl(&self, handle: FileHandle, request: u32, data: &mut [u8]) -> Result<(), FsError> {
        let st = self.lock()?;
        let entry = *st.open.get(to_file_id(handle)).ok_or(FsError::NotFound)?;
        let Some(ops) = driver_ops(&st.tree, entry.node) else {
            return Err(FsError::Unsupported);
        };
        drop(st);
        ops.ioctl(request, data)
    }

    fn fstat(&self, handle: FileHandle) -> Result<Stat, FsError> {
        let st = self.lock()?;
        let entry = st.open.get(to_file_id(handle)).ok_or(FsError::NotFound)?;
        let node = st.tree.node(entry.node).ok_or(FsError::NotFound)?;
        Ok(stat_of(node))
    }

    fn stat(&self, path: &str) -> Result<Stat, FsError> {
        let st = self.lock()?;
        let id = st.tree.walk(path, 0).ok_or(FsError::NotFound)?;
        let node = st.tree.node(id).ok_or(FsError::NotFound)?;
        if path.ends_with('/') && !node.is_dir() {
            return Err(FsError::NotADirectory);
        }
        Ok(stat_of(node))
    }

    fn statfs(&self) -> Result<StatFs, FsError> {
        let st = self.lock()?;
        Ok(StatFs {
            fs_type: 0x01,
            blocks: 0,
            bfree: 0,
            files: st.tree.len() as u32,
            ffree: 0,
            name: MEMFS_TYPE,
        })
    }

    fn mkdir(&self, path: &str) -> Result<(), FsError> {
        self.insert_new(path, Node::dir)
    }

    fn mknod(&self, path: &str, driver: DriverConfig) -> Result<(), FsError> {
        self.insert_new(path, |name| Node::driver(name, driver))
    }

    fn opendir(&self, path: &str) -> Result<Box<dyn DirStream>, FsError> {
        let st = self.lock()?;
        let id = st.tree.walk(path, 0).ok_or(FsError::NotFound)?;
        let node = st.tree.node(id).ok_or(FsError::NotFound)?;
        let NodePayload::Dir(children) = &node.payload else {
            return Err(FsError::NotADirectory);
        };
        Ok(Box::new(MemDirStream {
            shared: self.shared.clone(),
            dir: id,
            items: children.len(),
            cursor: 0,
        }))
    }

    fn remove(&self, path: &str) -> Result<(), FsError> {
        let mut st = self.lock()?;
        let (parent, _) = st.tree.find_parent(path).ok_or(FsError::NotFound)?;
        let node_id = st.tree.walk(path, 0).ok_or(FsError::NotFound)?;
        if node_id == st.tree.root() {
            return Err(FsError::InvalidArgument);
        }
        let node = st.tree.node(node_id).ok_or(FsError::NotFound)?;
        let is_dir = node.is_dir();
        if path.ends_with('/') && !is_dir {
            return Err(FsError::NotADirectory);
        }
        if !is_dir {
            let mut live = false;
            for entry in st.open.values_mut() {
                if entry.node == node_id {
                    entry.pending_removal = true;
                    live = true;
                }
            }
            if live {
                debug!("memfs: {path} still open, removal deferred");
                return Ok(());
            }
        }
        st.tree.unlink(parent, node_id)
    }

    fn rename(&self, old: &str, new: &str) -> Result<(), FsError> {
        if old.ends_with('/') || new.ends_with('/') {
            return Err(FsError::InvalidArgument);
        }
        let mut st = self.lock()?;
        let (old_parent, _) = st.tree.find_parent(old).ok_or(FsError::NotFound)?;
        let (new_parent, new_name) = st.tree.find_parent(new).ok_or(FsError::NotFound)?;
        if old_parent != new_parent {
            // in-place rename only; this backend does not move nodes
            return Err(FsError::InvalidArgument);
        }
        let node_id = st.tree.walk(old, 0).ok_or(FsError::NotFound)?;
        if st
            .tree
            .child(new_parent, new_name)
            .is_some_and(|existing| existing != node_id)
        {
            return Err(FsError::AlreadyExists);
        }
        let node = st.tree.node_mut(node_id).ok_or(FsError::NotFound)?;
        node.name = new_name.into();
        Ok(())
    }

    fn chmod(&self, path: &str, mode: u32) -> Result<(), FsError> {
        let mut st = self.lock()?;
        let id = st.tree.walk(path, 0).ok_or(FsError::NotFound)?;
        let node = st.tree.node_mut(id).ok_or(FsError::NotFound)?;
        node.mode = mode;
        Ok(())
    }

    fn chown(&self, path: &str, uid: u32, gid: u32) -> Result<(), FsError> {
        let mut st = self.lock()?;
        let id = st.tree.walk(path, 0).ok_or(FsError::NotFound)?;
        let node = st.tree.node_mut(id).ok_or(FsError::NotFound)?;
        node.uid = uid;
        node.gid = gid;
        Ok(())
    }

    fn release(&self) -> Result<(), FsError> {
        let st = self.lock()?;
        if !st.open.is_empty() {
            return Err(FsError::Busy);
        }
        Ok(())
    }
}

struct MemDirStream<R: RawMutex + Send + Sync + 'static> {
    shared: Arc<Shared<R>>,
    dir: NodeId,
    items: usize,
    cursor: usize,
}

impl<R: RawMutex + Send + Sync + 'static> DirStream for MemDirStream<R> {
    fn items(&self) -> usize {
        self.items
    }

    fn read_next(&mut self) -> Option<DirEntry> {
        let st = lock_or_timeout(&self.shared.state, self.shared.lock_tries).ok()?;
        let node = st.tree.node(self.dir)?;
        let NodePayload::Dir(children) = &node.payload else {
            return None;
        };
        let child = st.tree.node(*children.get(self.cursor)?)?;
        self.cursor += 1;
        let stat = stat_of(child);
        Some(DirEntry {
            name: child.name.as_ref().into(),
            size: stat.size,
            file_type: stat.file_type,
        })
    }
}
