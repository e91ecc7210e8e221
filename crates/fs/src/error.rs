//! 文件系统错误类型
//!
//! 各错误码对应标准 POSIX errno 值，可通过 [`FsError::to_errno()`]
//! 转换为系统调用错误码。

/// 文件系统错误类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// 文件不存在 (-ENOENT)
    NotFound,
    /// 文件已存在 (-EEXIST)
    AlreadyExists,
    /// 不是目录 (-ENOTDIR)
    NotDirectory,
    /// 是目录 (-EISDIR)
    IsDirectory,
    /// 目录非空 (-ENOTEMPTY)
    DirectoryNotEmpty,
    /// 无效路径 (-EINVAL)
    InvalidPath,
    /// 文件名过长 (-ENAMETOOLONG)
    NameTooLong,
    /// 设备空间不足 (-ENOSPC)
    NoSpace,
    /// I/O 错误 (-EIO)
    IoError,
    /// 打开的文件过多 (-EMFILE)
    TooManyOpenFiles,
}

impl FsError {
    /// 转换为系统调用错误码（负数）
    pub fn to_errno(self) -> isize {
        match self {
            FsError::NotFound => -2,
            FsError::IoError => -5,
            FsError::AlreadyExists => -17,
            FsError::NotDirectory => -20,
            FsError::IsDirectory => -21,
            FsError::InvalidPath => -22,
            FsError::TooManyOpenFiles => -24,
            FsError::NoSpace => -28,
            FsError::NameTooLong => -36,
            FsError::DirectoryNotEmpty => -39,
        }
    }
}
