use block_dev::BlockError;
use derive_more::Display;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// 没有足够的空闲扇区
    #[display(fmt = "no free sectors left")]
    Exhausted,
    #[display(fmt = "no such file or directory")]
    NotFound,
    #[display(fmt = "name already exists")]
    AlreadyExists,
    /// 块设备读写失败，不重试
    #[display(fmt = "{}", _0)]
    Io(BlockError),
    /// 对已关闭或已删除的对象进行操作
    #[display(fmt = "operation on an object in an invalid state")]
    InvalidState,
    #[display(fmt = "not a directory")]
    NotADirectory,
    #[display(fmt = "is a directory")]
    IsADirectory,
    #[display(fmt = "directory not empty")]
    DirectoryNotEmpty,
    /// 名字为空、过长、含有`/`或为保留名
    #[display(fmt = "invalid name")]
    InvalidName,
    /// 扇区越界，或其内容不是预期的结构
    #[display(fmt = "sector {} is corrupted or out of range", _0)]
    Corrupted(u32),
    /// 释放本就空闲的扇区
    #[display(fmt = "sector {} is already free", _0)]
    DoubleFree(u32),
}

impl From<BlockError> for Error {
    #[inline]
    fn from(err: BlockError) -> Self {
        Self::Io(err)
    }
}
