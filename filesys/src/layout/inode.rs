//! 磁盘上的 inode：文件长度与分级索引
//!
//! - 直接索引：inode 内连续存储**扇区号**，每个都指向一个**数据扇区**
//! - 一级索引：整个扇区连续存储扇区号，每个都指向一个数据扇区
//! - 二级索引：整个扇区连续存储扇区号，每个都指向一个一级索引扇区
//!
//! 目录的空间用于存放目录项；文件的空间用于存放它的数据。
//! 索引扇区在分配时即清零，可达的索引槽要么为0，要么指向已分配的扇区。

use alloc::vec::Vec;
use core::mem;

use crate::volume::Volume;
use crate::{DataBlock, Error, Result};
use crate::{INODE_MAGIC, SECTOR_SIZE};

/// 索引扇区的编号容量
const INDIRECT_COUNT: usize = SECTOR_SIZE / 4;
/// 索引扇区
type IndirectBlock = [u32; INDIRECT_COUNT];

/// 直接索引可编号数量，恰好让 inode 填满一个扇区
const DIRECT_COUNT: usize = 123;
/// 一级索引可编号数量
const INDIRECT1_COUNT: usize = INDIRECT_COUNT;
/// 二级索引可编号数量
const INDIRECT2_COUNT: usize = INDIRECT_COUNT.pow(2);
/// 直接索引时的编号容量
const DIRECT_CAP: usize = DIRECT_COUNT;
/// 用上一级索引时的编号容量
const INDIRECT1_CAP: usize = DIRECT_CAP + INDIRECT1_COUNT;
/// 用上二级索引时的编号容量
const INDIRECT2_CAP: usize = INDIRECT1_CAP + INDIRECT2_COUNT;

/// 单个文件的最大字节数
pub const MAX_FILE_SIZE: usize = INDIRECT2_CAP * SECTOR_SIZE;

#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct DiskInode {
    // 不用usize是为了严控布局
    pub size: u32,
    magic: u32,
    /// [`InodeKind`] 的原始值
    kind: u32,
    /// 直接索引，存储容量：DIRECT_CAP * SECTOR_SIZE 字节
    direct: [u32; DIRECT_COUNT],
    /// 指向一个一级索引扇区
    indirect1: u32,
    /// 指向一个二级索引扇区
    indirect2: u32,
}

const _: () = assert!(mem::size_of::<DiskInode>() == SECTOR_SIZE);

#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
#[repr(u32)]
pub enum InodeKind {
    #[default]
    File = 0,
    Directory = 1,
}

/// 数据扇区的逻辑索引所落入的索引层级
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum BlockIndex {
    Direct(usize),
    Indirect1(usize),
    /// (二级索引扇区内的位置, 一级索引扇区内的位置)
    Indirect2(usize, usize),
}

impl BlockIndex {
    fn new(block_index: usize) -> Option<Self> {
        if block_index < DIRECT_CAP {
            Some(Self::Direct(block_index))
        } else if block_index < INDIRECT1_CAP {
            // 剔去直接索引的部分
            Some(Self::Indirect1(block_index - DIRECT_CAP))
        } else if block_index < INDIRECT2_CAP {
            // 剔去使用了一级索引的部分
            let index = block_index - INDIRECT1_CAP;
            Some(Self::Indirect2(
                index / INDIRECT1_COUNT,
                index % INDIRECT1_COUNT,
            ))
        } else {
            None
        }
    }
}

impl DiskInode {
    pub fn new(kind: InodeKind) -> Self {
        Self {
            size: 0,
            magic: INODE_MAGIC,
            kind: kind as u32,
            direct: [0; DIRECT_COUNT],
            indirect1: 0,
            indirect2: 0,
        }
    }

    /// 魔数正确、类型可识别、长度不超过上限
    pub fn is_valid(&self) -> bool {
        self.magic == INODE_MAGIC
            && self.kind().is_some()
            && self.size as usize <= MAX_FILE_SIZE
    }

    pub fn kind(&self) -> Option<InodeKind> {
        match self.kind {
            0 => Some(InodeKind::File),
            1 => Some(InodeKind::Directory),
            _ => None,
        }
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind() == Some(InodeKind::Directory)
    }

    /// 逻辑上 inode 指向一系列数据扇区，此处传入的是这些扇区的索引（逻辑索引），
    /// 返回其物理扇区号
    pub fn block_id(&self, block_index: usize, vol: &Volume) -> Result<u32> {
        match BlockIndex::new(block_index).ok_or(Error::InvalidState)? {
            BlockIndex::Direct(index) => Ok(self.direct[index]),
            BlockIndex::Indirect1(index) => {
                vol.map(self.indirect1, 0, |indirect1: &IndirectBlock| indirect1[index])
            }
            BlockIndex::Indirect2(index2, index1) => {
                let indirect1 =
                    vol.map(self.indirect2, 0, |indirect2: &IndirectBlock| indirect2[index2])?;
                vol.map(indirect1, 0, |indirect1: &IndirectBlock| indirect1[index1])
            }
        }
    }

    /// 把长度扩大到`larger_size`，`new_blocks`是一批已清零的扇区，
    /// 数量须恰为 `count_total_block(larger_size) - count_total_block(size)`。
    ///
    /// 缺失的索引扇区按需取用，先接入索引再填写其中的数据扇区号。
    pub fn expand_to(&mut self, larger_size: u32, new_blocks: Vec<u32>, vol: &Volume) -> Result<()> {
        debug_assert!(larger_size >= self.size);
        debug_assert_eq!(
            new_blocks.len(),
            Self::count_total_block(larger_size) - Self::count_total_block(self.size)
        );

        let new_total_blocks = Self::count_data_block(larger_size);
        let mut new_blocks = new_blocks.into_iter();
        let mut next = move || new_blocks.next().ok_or(Error::InvalidState);

        for block_index in Self::count_data_block(self.size)..new_total_blocks {
            match BlockIndex::new(block_index).ok_or(Error::InvalidState)? {
                BlockIndex::Direct(index) => self.direct[index] = next()?,
                BlockIndex::Indirect1(index) => {
                    // 这次扩大经过了DIRECT_CAP，创建一级索引
                    if index == 0 {
                        self.indirect1 = next()?;
                    }
                    let data = next()?;
                    vol.map_mut(self.indirect1, 0, |indirect1: &mut IndirectBlock| {
                        indirect1[index] = data
                    })?;
                }
                BlockIndex::Indirect2(index2, index1) => {
                    // 这次扩大经过了INDIRECT1_CAP，创建二级索引
                    if index2 == 0 && index1 == 0 {
                        self.indirect2 = next()?;
                    }
                    // 子块索引为0表示进入新的一级索引扇区
                    let indirect1 = if index1 == 0 {
                        let indirect1 = next()?;
                        vol.map_mut(self.indirect2, 0, |indirect2: &mut IndirectBlock| {
                            indirect2[index2] = indirect1
                        })?;
                        indirect1
                    } else {
                        vol.map(self.indirect2, 0, |indirect2: &IndirectBlock| {
                            indirect2[index2]
                        })?
                    };
                    let data = next()?;
                    vol.map_mut(indirect1, 0, |indirect1: &mut IndirectBlock| {
                        indirect1[index1] = data
                    })?;
                }
            }
        }

        self.size = larger_size;
        Ok(())
    }

    /// 清空 inode，返回它占用的全部数据扇区与索引扇区
    pub fn clear(&mut self, vol: &Volume) -> Result<Vec<u32>> {
        let mut drop_blocks: Vec<u32> = Vec::with_capacity(Self::count_total_block(self.size));
        let mut data_blocks = Self::count_data_block(self.size);

        /******************** 直接索引 ********************/
        drop_blocks.extend_from_slice(&self.direct[..data_blocks.min(DIRECT_CAP)]);
        /******************** END ********************/

        if data_blocks > DIRECT_COUNT {
            /******************** 一级索引 ********************/
            data_blocks -= DIRECT_COUNT;
            drop_blocks.push(self.indirect1);
            vol.map(self.indirect1, 0, |indirect1: &IndirectBlock| {
                drop_blocks.extend_from_slice(&indirect1[..data_blocks.min(INDIRECT1_COUNT)])
            })?;
            /******************** END ********************/
        }

        if data_blocks > INDIRECT1_COUNT {
            /******************** 二级索引 ********************/
            data_blocks -= INDIRECT1_COUNT;
            drop_blocks.push(self.indirect2);
            let indirect2: IndirectBlock = vol.map(self.indirect2, 0, |b: &IndirectBlock| *b)?;
            for (index2, &indirect1) in indirect2
                .iter()
                .enumerate()
                .take(data_blocks.div_ceil(INDIRECT1_COUNT))
            {
                let count = (data_blocks - index2 * INDIRECT1_COUNT).min(INDIRECT1_COUNT);
                drop_blocks.push(indirect1);
                vol.map(indirect1, 0, |indirect1: &IndirectBlock| {
                    drop_blocks.extend_from_slice(&indirect1[..count])
                })?;
            }
            /******************** END ********************/
        }

        self.size = 0;
        self.direct.fill(0);
        self.indirect1 = 0;
        self.indirect2 = 0;

        debug_assert!(drop_blocks.iter().all(|&id| id != 0));
        Ok(drop_blocks)
    }

    /// 从指定位置(字节偏移)读出数据填充`buf`，不越过文件末尾
    pub fn read_at(&self, offset: usize, buf: &mut [u8], vol: &Volume) -> Result<usize> {
        let mut start = offset;
        let end = start.saturating_add(buf.len()).min(self.size as usize);

        if start >= end {
            return Ok(0);
        }

        // 已读取多少字节
        let mut read_size = 0;
        loop {
            // 当前块的逻辑索引
            let block_index = start / SECTOR_SIZE;
            // 当前块的末地址(字节)
            let current_block_end = ((block_index + 1) * SECTOR_SIZE).min(end);
            let block_read_size = current_block_end - start;
            let dest = &mut buf[read_size..read_size + block_read_size];

            vol.map(self.block_id(block_index, vol)?, 0, |data_block: &DataBlock| {
                // 绝对地址 % 块大小 = 块内偏移
                let src = &data_block[start % SECTOR_SIZE..start % SECTOR_SIZE + block_read_size];
                dest.copy_from_slice(src);
            })?;

            read_size += block_read_size;

            if current_block_end == end {
                break;
            }

            start = current_block_end;
        }

        Ok(read_size)
    }

    /// 在文件现有长度之内写入，调用者负责事先扩容
    pub fn write_at(&self, offset: usize, buf: &[u8], vol: &Volume) -> Result<usize> {
        let mut start = offset;
        let end = start.saturating_add(buf.len()).min(self.size as usize);

        if start >= end {
            return Ok(0);
        }

        let mut written_size = 0;
        loop {
            let block_index = start / SECTOR_SIZE;
            let current_block_end = ((block_index + 1) * SECTOR_SIZE).min(end);
            let block_write_size = current_block_end - start;
            let src = &buf[written_size..written_size + block_write_size];
            let block_id = self.block_id(block_index, vol)?;

            if block_write_size == SECTOR_SIZE {
                // 整块覆盖，无需先读
                vol.write_sector(block_id, src)?;
            } else {
                vol.map_mut(block_id, 0, |data_block: &mut DataBlock| {
                    let dest =
                        &mut data_block[start % SECTOR_SIZE..start % SECTOR_SIZE + block_write_size];
                    dest.copy_from_slice(src);
                })?;
            }

            written_size += block_write_size;

            if current_block_end == end {
                break;
            }

            start = current_block_end;
        }

        Ok(written_size)
    }

    /// 计算容纳指定数据量需要多少个**数据扇区**
    #[inline]
    pub fn count_data_block(size: u32) -> usize {
        (size as usize).div_ceil(SECTOR_SIZE)
    }

    /// 计算容纳指定数据量需要多少个 **数据扇区** 和 **索引扇区**(`IndirectBlock`)
    pub fn count_total_block(size: u32) -> usize {
        let data_blocks = Self::count_data_block(size);
        let mut total = data_blocks;

        // 超出直接索引，使用一级索引扇区
        if data_blocks > DIRECT_CAP {
            total += 1;
        }

        // 超出一级索引，使用二级索引扇区及其下的一级索引扇区
        if data_blocks > INDIRECT1_CAP {
            total += 1 + (data_blocks - INDIRECT1_CAP).div_ceil(INDIRECT_COUNT);
        }

        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_index_tiers() {
        assert_eq!(BlockIndex::new(0), Some(BlockIndex::Direct(0)));
        assert_eq!(BlockIndex::new(122), Some(BlockIndex::Direct(122)));
        assert_eq!(BlockIndex::new(123), Some(BlockIndex::Indirect1(0)));
        assert_eq!(BlockIndex::new(250), Some(BlockIndex::Indirect1(127)));
        assert_eq!(BlockIndex::new(251), Some(BlockIndex::Indirect2(0, 0)));
        assert_eq!(BlockIndex::new(251 + 129), Some(BlockIndex::Indirect2(1, 1)));
        assert_eq!(
            BlockIndex::new(INDIRECT2_CAP - 1),
            Some(BlockIndex::Indirect2(127, 127))
        );
        assert_eq!(BlockIndex::new(INDIRECT2_CAP), None);
    }

    #[test]
    fn total_blocks_count_index_sectors() {
        let sector = SECTOR_SIZE as u32;
        assert_eq!(DiskInode::count_total_block(0), 0);
        assert_eq!(DiskInode::count_total_block(1), 1);
        assert_eq!(DiskInode::count_total_block(123 * sector), 123);
        assert_eq!(DiskInode::count_total_block(123 * sector + 1), 125);
        assert_eq!(DiskInode::count_total_block(251 * sector), 252);
        // 二级索引扇区 + 第一个一级索引扇区
        assert_eq!(DiskInode::count_total_block(251 * sector + 1), 255);
        assert_eq!(DiskInode::count_total_block((251 + 128) * sector + 1), 1 + 380 + 3);
    }

    #[test]
    fn new_inode_is_valid() {
        let inode = DiskInode::new(InodeKind::Directory);
        assert!(inode.is_valid());
        assert!(inode.is_dir());
        assert_eq!(MAX_FILE_SIZE, 16635 * SECTOR_SIZE);
    }
}
