#![no_std]

extern crate alloc;

pub mod driver;
pub mod file;
pub mod fs;
pub mod lock;
pub mod path;
pub mod stat;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;

/// Status codes shared by every filesystem layer. The `u32` representation
/// is the value handed across the syscall boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum FsError {
    #[error("not found")]
    NotFound = 1,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("already exists")]
    AlreadyExists,
    #[error("directory not empty")]
    DirectoryNotEmpty,
    #[error("resource busy")]
    Busy,
    #[error("operation not supported")]
    Unsupported,
    #[error("allocation failed")]
    AllocationFailed,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("lock timeout")]
    Timeout,
}

#[cfg(test)]
mod tests {
    use super::FsError;

    #[test]
    fn error_codes_round_trip() {
        assert_eq!(1u32, u32::from(FsError::NotFound));
        assert_eq!(Ok(FsError::IsADirectory), FsError::try_from(3u32));
        assert!(FsError::try_from(0u32).is_err());
    }
}
