use alloc::{boxed::Box, sync::Arc};
use rill_vfs_api::{
    FsError,
    file::{FileHandle, OpenMode, SeekMode},
    fs::{DirStream, FsBackend},
    stat::{DirEntry, Stat},
};

/// Direction capability bound to a file at open time. Replaces per-mode
/// nulling of transfer entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl Access {
    pub const fn readable(self) -> bool {
        !matches!(self, Self::WriteOnly)
    }

    pub const fn writable(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }
}

impl From<OpenMode> for Access {
    fn from(mode: OpenMode) -> Self {
        match (mode.readable(), mode.writable()) {
            (true, true) => Self::ReadWrite,
            (false, _) => Self::WriteOnly,
            (true, false) => Self::ReadOnly,
        }
    }
}

/// An open file. Holds its backend alive, so an unmount cannot free state
/// under a live handle. Closes itself when dropped.
pub struct File {
    backend: Arc<dyn FsBackend>,
    handle: FileHandle,
    seek: usize,
    access: Access,
    closed: bool,
}

impl File {
    pub(crate) fn new(
        backend: Arc<dyn FsBackend>,
        handle: FileHandle,
        seek: usize,
        access: Access,
    ) -> Self {
        Self {
            backend,
            handle,
            seek,
            access,
            closed: false,
        }
    }

    pub fn access(&self) -> Access {
        self.access
    }

    /// Reads up to `count` items of `item_size` bytes; returns the number
    /// of whole items read and advances the position accordingly.
    pub fn read(&mut self, dst: &mut [u8], item_size: usize, count: usize) -> Result<usize, FsError> {
        if !self.access.readable() {
            return Err(FsError::Unsupported);
        }
        let n = self
            .backend
            .read(self.handle, dst, item_size, count, self.seek)?;
        self.seek += n * item_size;
        Ok(n)
    }

    /// Writes up to `count` items of `item_size` bytes; returns the number
    /// of whole items written and advances the position accordingly.
    pub fn write(&mut self, src: &[u8], item_size: usize, count: usize) -> Result<usize, FsError> {
        if !self.access.writable() {
            return Err(FsError::Unsupported);
        }
        let n = self
            .backend
            .write(self.handle, src, item_size, count, self.seek)?;
        self.seek += n * item_size;
        Ok(n)
    }

    pub fn seek(&mut self, mode: SeekMode, offset: isize) -> Result<usize, FsError> {
        let base = match mode {
            SeekMode::Set => 0,
            SeekMode::Current => self.seek,
            SeekMode::End => self.backend.fstat(self.handle)?.size,
        };
        self.seek = base
            .checked_add_signed(offset)
            .ok_or(FsError::InvalidArgument)?;
        Ok(self.seek)
    }

    pub fn tell(&self) -> usize {
        self.seek
    }

    pub fn ioctl(&mut self, request: u32, data: &mut [u8]) -> Result<(), FsError> {
        self.backend.ioctl(self.handle, request, data)
    }

    pub fn stat(&self) -> Result<Stat, FsError> {
        self.backend.fstat(self.handle)
    }

    pub fn close(mut self) -> Result<(), FsError> {
        self.closed = true;
        self.backend.close(self.handle)
    }
}

impl Drop for File {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.backend.close(self.handle);
        }
    }
}

/// An open directory: a one-shot cursor over the entries present at open
/// time. Reopen to rewind.
pub struct Dir {
    stream: Box<dyn DirStream>,
}

impl Dir {
    pub(crate) fn new(stream: Box<dyn DirStream>) -> Self {
        Self { stream }
    }

    /// Entry count at open time.
    pub fn items(&self) -> usize {
        self.stream.items()
    }

    pub fn readdir(&mut self) -> Option<DirEntry> {
        self.stream.read_next()
    }

    pub fn close(self) -> Result<(), FsError> {
        Ok(())
    }
}
