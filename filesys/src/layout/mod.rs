//! # 磁盘数据结构层
//!
//! filesys 的磁盘布局：
//! 空闲位图文件的 inode (0) | 根目录 inode (1) | 其余扇区按需分配
//!
//! 每个 inode 独占一个扇区，扇区号即 inode 编号。

mod bitmap;
pub use bitmap::{Bitmap, BitmapBlock};

mod inode;
pub use inode::{DiskInode, InodeKind, MAX_FILE_SIZE};

/// 目录项，也属于磁盘文件系统数据结构
mod dir_entry;
pub use dir_entry::{DirEntry, NAME_MAX};
