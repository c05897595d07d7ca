//! # 卷
//!
//! 一次挂载所拥有的全部资源：块设备、扇区锁表、空闲位图与打开的 inode 表。
//! 下层的 inode 与目录通过 [`Volume`] 借用扇区锁，而不是访问全局状态。

use alloc::sync::Arc;

use block_dev::BlockDevice;

use crate::free_map::FreeMap;
use crate::inode::InodeTable;
use crate::sector::{SectorBuf, SectorLocks};
use crate::{Error, Result, SECTOR_SIZE};

#[derive(Debug)]
pub struct Volume {
    block_device: Arc<dyn BlockDevice>,
    locks: SectorLocks,
    pub free_map: FreeMap,
    pub inodes: InodeTable,
}

impl Volume {
    pub fn new(block_device: Arc<dyn BlockDevice>) -> Self {
        let sectors = block_device.num_blocks();
        Self {
            block_device,
            locks: SectorLocks::new(sectors),
            free_map: FreeMap::new(sectors),
            inodes: InodeTable::new(),
        }
    }

    #[inline]
    pub fn sector_count(&self) -> usize {
        self.locks.len()
    }

    /// 持有扇区锁，读出扇区并以某种方式处理
    pub fn map<T: Sized, V>(&self, sector: u32, offset: usize, f: impl FnOnce(&T) -> V) -> Result<V> {
        let _guard = self.locks.lock(sector).ok_or(Error::Corrupted(sector))?;
        let mut buf = SectorBuf::zeroed();
        self.block_device
            .read_block(sector as usize, buf.as_bytes_mut())?;
        Ok(buf.map(offset, f))
    }

    /// 持有扇区锁，完成一次“读-改-写”
    pub fn map_mut<T: Sized, V>(
        &self,
        sector: u32,
        offset: usize,
        f: impl FnOnce(&mut T) -> V,
    ) -> Result<V> {
        let _guard = self.locks.lock(sector).ok_or(Error::Corrupted(sector))?;
        let mut buf = SectorBuf::zeroed();
        self.block_device
            .read_block(sector as usize, buf.as_bytes_mut())?;
        let ret = buf.map_mut(offset, f);
        self.block_device.write_block(sector as usize, buf.as_bytes())?;
        Ok(ret)
    }

    /// 整块覆盖扇区，`data`不足一块的部分补零
    pub fn write_sector(&self, sector: u32, data: &[u8]) -> Result<()> {
        debug_assert!(data.len() <= SECTOR_SIZE);
        let _guard = self.locks.lock(sector).ok_or(Error::Corrupted(sector))?;
        let mut buf = SectorBuf::zeroed();
        buf.as_bytes_mut()[..data.len()].copy_from_slice(data);
        self.block_device.write_block(sector as usize, buf.as_bytes())?;
        Ok(())
    }

    /// 分配一个清零的扇区
    pub fn alloc_sector(&self) -> Result<u32> {
        let sector = self.free_map.allocate(self, 1)?;
        if let Err(err) = self.write_sector(sector, &[]) {
            self.free_map.release(self, sector, 1)?;
            return Err(err);
        }
        Ok(sector)
    }

    /// 分配`count`个清零的扇区，任一失败则归还已分配的全部扇区
    pub fn alloc_sectors(&self, count: usize) -> Result<alloc::vec::Vec<u32>> {
        let mut sectors = alloc::vec::Vec::with_capacity(count);
        for _ in 0..count {
            match self.alloc_sector() {
                Ok(sector) => sectors.push(sector),
                Err(err) => {
                    log::warn!("rolling back {} sectors: {err}", sectors.len());
                    self.dealloc_sectors(&sectors)?;
                    return Err(err);
                }
            }
        }
        Ok(sectors)
    }

    pub fn dealloc_sectors(&self, sectors: &[u32]) -> Result<()> {
        sectors
            .iter()
            .try_for_each(|&sector| self.free_map.release(self, sector, 1))
    }
}
