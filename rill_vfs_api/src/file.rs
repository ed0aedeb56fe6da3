use crate::FsError;

/// Opaque per-backend file descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHandle(pub u64);

/// C-stdio style open mode. `Update` is the `+` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    ReadUpdate,
    Write,
    WriteUpdate,
    Append,
    AppendUpdate,
}

impl OpenMode {
    pub const fn readable(self) -> bool {
        !matches!(self, Self::Write | Self::Append)
    }

    pub const fn writable(self) -> bool {
        !matches!(self, Self::Read)
    }

    /// Missing targets may be created in these modes.
    pub const fn creates(self) -> bool {
        matches!(
            self,
            Self::Write | Self::WriteUpdate | Self::Append | Self::AppendUpdate
        )
    }

    pub const fn truncates(self) -> bool {
        matches!(self, Self::Write | Self::WriteUpdate)
    }

    pub const fn appends(self) -> bool {
        matches!(self, Self::Append | Self::AppendUpdate)
    }
}

impl core::str::FromStr for OpenMode {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, FsError> {
        Ok(match s {
            "r" => Self::Read,
            "r+" => Self::ReadUpdate,
            "w" => Self::Write,
            "w+" => Self::WriteUpdate,
            "a" => Self::Append,
            "a+" => Self::AppendUpdate,
            _ => return Err(FsError::InvalidArgument),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    Set,
    Current,
    End,
}
