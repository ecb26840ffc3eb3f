use std::os::raw::c_int;

use thiserror::Error as ThisError;

pub type ErrorNum = c_int;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure kinds surfaced by the storage engine. `NoSpace` covers a full
/// block bitmap, a full inode table and a full directory block alike.
#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("no such file or directory")]
    NotFound,
    #[error("file exists")]
    AlreadyExists,
    #[error("no space left on image")]
    NoSpace,
    #[error("file name too long")]
    NameTooLong,
    #[error("file too large")]
    FileTooLarge,
    #[error("inode number out of range")]
    InvalidHandle,
    #[error("is a directory")]
    IsDirectory,
    #[error("not a directory")]
    NotDirectory,
    #[error("invalid file name")]
    InvalidName,
}

impl Error {
    pub fn error_num(&self) -> ErrorNum {
        match self {
            Error::NotFound => libc::ENOENT,
            Error::AlreadyExists => libc::EEXIST,
            Error::NoSpace => libc::ENOSPC,
            Error::NameTooLong => libc::ENAMETOOLONG,
            Error::FileTooLarge => libc::EFBIG,
            Error::InvalidHandle => libc::EBADF,
            Error::IsDirectory => libc::EISDIR,
            Error::NotDirectory => libc::ENOTDIR,
            Error::InvalidName => libc::EINVAL,
        }
    }

    /// Negative status value, as returned by C-style file operation handlers.
    pub fn status(&self) -> i64 {
        -(self.error_num() as i64)
    }
}
