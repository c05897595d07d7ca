//! # 块设备接口层
//!
//! 块设备是以**块**为单位存储数据的设备，例如磁盘、光盘、U盘等；
//! [`BlockDevice`] 就是对读写块设备的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! 单个块的读写是原子的，跨块的读写不作任何保证。

#![no_std]

use core::any::Any;
use core::fmt;

/// 块大小（字节）
pub const BLOCK_SIZE: usize = 512;

/// 块设备驱动特质
pub trait BlockDevice: Send + Sync + Any + fmt::Debug {
    /// 读出第`block_id`块，`buf`长度须为[`BLOCK_SIZE`]
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), BlockError>;

    /// 写入第`block_id`块，`buf`长度须为[`BLOCK_SIZE`]
    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), BlockError>;

    /// 设备的总块数
    fn num_blocks(&self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockError {
    /// 块号超出设备容量
    OutOfRange(usize),
    /// 读写的字节数不足一块
    ShortTransfer(usize),
    /// 设备报告的其它错误
    Io(usize),
}

impl BlockError {
    pub fn block_id(&self) -> usize {
        match *self {
            Self::OutOfRange(id) | Self::ShortTransfer(id) | Self::Io(id) => id,
        }
    }
}

impl fmt::Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange(id) => write!(f, "block {id} is out of range"),
            Self::ShortTransfer(id) => write!(f, "incomplete transfer of block {id}"),
            Self::Io(id) => write!(f, "device failed on block {id}"),
        }
    }
}
