#![cfg_attr(not(test), no_std)]

extern crate alloc;

/* filesys 的整体架构，自上而下 */

// 文件系统层：创建、打开、删除，以及格式化与挂载
mod filesys;

// 文件层：带读写游标的打开文件
mod file;

// 目录层：以定长目录项为内容的特殊文件
mod directory;

// 索引节点层：引用计数的内存 inode
mod inode;

// 空闲扇区位图
mod free_map;

// 卷：块设备、扇区锁表与上述资源的集合
mod volume;

// 磁盘数据结构层
mod layout;

// 扇区缓冲与扇区锁
mod sector;

mod error;

pub use self::{
    directory::{Dir, DirEntryInfo},
    error::{Error, Result},
    file::File,
    filesys::{FileSystem, FormatOptions, Stat},
    inode::{Inode, InodeKind},
};
pub use block_dev::{BlockDevice, BlockError};

pub const SECTOR_SIZE: usize = block_dev::BLOCK_SIZE;
pub const SECTOR_BITS: usize = SECTOR_SIZE * 8;

/// 空闲位图文件的 inode 所在扇区
pub const FREE_MAP_SECTOR: u32 = 0;
/// 根目录 inode 所在扇区
pub const ROOT_DIR_SECTOR: u32 = 1;
/// 格式化时根目录预留的目录项数
pub const ROOT_DIR_ENTRIES: usize = 16;

pub const INODE_MAGIC: u32 = 0x494e_4f44;

pub use layout::{MAX_FILE_SIZE, NAME_MAX};

type DataBlock = [u8; SECTOR_SIZE];
