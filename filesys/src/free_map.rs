//! # 空闲扇区位图
//!
//! 位图挂载时整个读入内存，其持久化形式是一个普通文件，
//! 文件的 inode 固定在 [`FREE_MAP_SECTOR`]。
//!
//! 位图文件打开之后，每次分配与释放都会立即把改动所在的位图扇区写回。

use alloc::vec::Vec;
use core::ops::Range;

use spin::Mutex;

use crate::inode::Inode;
use crate::layout::{Bitmap, BitmapBlock, DiskInode, InodeKind};
use crate::volume::Volume;
use crate::{Error, Result};
use crate::{FREE_MAP_SECTOR, ROOT_DIR_SECTOR, SECTOR_BITS};

#[derive(Debug)]
pub struct FreeMap {
    inner: Mutex<FreeMapInner>,
}

#[derive(Debug)]
struct FreeMapInner {
    bitmap: Bitmap,
    /// 位图文件的数据扇区；为空表示文件尚未打开，改动只留在内存
    file: Option<Vec<u32>>,
}

impl FreeMap {
    pub fn new(sectors: usize) -> Self {
        Self {
            inner: Mutex::new(FreeMapInner {
                bitmap: Self::fresh_bitmap(sectors),
                file: None,
            }),
        }
    }

    /// 分配`count`个连续的扇区，返回第一个扇区号
    pub fn allocate(&self, vol: &Volume, count: usize) -> Result<u32> {
        let mut inner = self.inner.lock();
        let start = inner.bitmap.alloc(count).ok_or(Error::Exhausted)?;

        if let Err(err) = inner.write_through(vol, start..start + count) {
            // 写回失败则撤销，内存与磁盘保持一致
            if let Err(bit) = inner.bitmap.dealloc(start, count) {
                log::warn!("rolling back allocation: sector {bit} already free");
            }
            return Err(err);
        }

        log::trace!("allocate sectors [{start}, {})", start + count);
        Ok(start as u32)
    }

    /// 归还`[sector, sector + count)`；其中有本就空闲的扇区时拒绝
    pub fn release(&self, vol: &Volume, sector: u32, count: usize) -> Result<()> {
        let mut inner = self.inner.lock();
        let start = sector as usize;
        // 越界的扇区号只可能来自损坏的索引
        if start
            .checked_add(count)
            .map_or(true, |end| end > inner.bitmap.capacity())
        {
            log::error!("release of sectors [{start}, +{count}) past the device end");
            return Err(Error::Corrupted(sector));
        }
        inner.bitmap.dealloc(start, count).map_err(|bit| {
            log::error!("release of free sector {bit}");
            Error::DoubleFree(bit as u32)
        })?;

        log::trace!("release sectors [{start}, {})", start + count);
        inner.write_through(vol, start..start + count)
    }

    /// 格式化：重建位图，并在[`FREE_MAP_SECTOR`]上创建位图文件
    pub fn create(&self, vol: &Volume) -> Result<()> {
        let size = {
            let mut inner = self.inner.lock();
            inner.bitmap = Self::fresh_bitmap(inner.bitmap.capacity());
            inner.file = None;
            inner.bitmap.file_size()
        };

        Inode::create(vol, FREE_MAP_SECTOR, size, InodeKind::File)?;

        let mut inner = self.inner.lock();
        inner.file = Some(Self::file_sectors(vol, &inner.bitmap)?);
        inner.flush(vol)
    }

    /// 挂载：从位图文件读入位图
    pub fn open(&self, vol: &Volume) -> Result<()> {
        let mut inner = self.inner.lock();
        let sectors = Self::file_sectors(vol, &inner.bitmap)?;

        for (index, &sector) in sectors.iter().enumerate() {
            let bitmap = &mut inner.bitmap;
            vol.map(sector, 0, |block: &BitmapBlock| bitmap.load_block(index, block))?;
        }
        let reserved = [FREE_MAP_SECTOR, ROOT_DIR_SECTOR];
        if !reserved.iter().all(|&sector| inner.bitmap.test(sector as usize)) {
            log::error!("free map does not reserve its own sectors");
            return Err(Error::Corrupted(FREE_MAP_SECTOR));
        }

        inner.file = Some(sectors);
        log::info!("free map opened, {} sectors free", inner.free_count());
        Ok(())
    }

    /// 卸载：写回位图并关闭位图文件
    pub fn close(&self, vol: &Volume) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.flush(vol)?;
        inner.file = None;
        Ok(())
    }

    pub fn free_count(&self) -> usize {
        self.inner.lock().free_count()
    }

    pub fn is_allocated(&self, sector: u32) -> bool {
        let inner = self.inner.lock();
        (sector as usize) < inner.bitmap.capacity() && inner.bitmap.test(sector as usize)
    }
}

impl FreeMap {
    fn fresh_bitmap(sectors: usize) -> Bitmap {
        let mut bitmap = Bitmap::new(sectors);
        bitmap.mark(FREE_MAP_SECTOR as usize);
        bitmap.mark(ROOT_DIR_SECTOR as usize);
        bitmap
    }

    /// 读出位图文件的 inode，求得其全部数据扇区
    fn file_sectors(vol: &Volume, bitmap: &Bitmap) -> Result<Vec<u32>> {
        let disk_inode = vol.map(FREE_MAP_SECTOR, 0, |disk_inode: &DiskInode| *disk_inode)?;
        if !disk_inode.is_valid() || disk_inode.size as usize != bitmap.file_size() {
            log::error!("free map file does not match a {} sector device", bitmap.capacity());
            return Err(Error::Corrupted(FREE_MAP_SECTOR));
        }

        (0..bitmap.blocks())
            .map(|index| disk_inode.block_id(index, vol))
            .collect()
    }
}

impl FreeMapInner {
    fn free_count(&self) -> usize {
        self.bitmap.capacity() - self.bitmap.count_ones()
    }

    /// 写回覆盖`bits`的位图扇区
    fn write_through(&self, vol: &Volume, bits: Range<usize>) -> Result<()> {
        let Some(file) = &self.file else {
            return Ok(());
        };
        if bits.is_empty() {
            return Ok(());
        }

        for index in bits.start / SECTOR_BITS..=(bits.end - 1) / SECTOR_BITS {
            vol.map_mut(file[index], 0, |block: &mut BitmapBlock| {
                self.bitmap.store_block(index, block)
            })?;
        }
        Ok(())
    }

    fn flush(&self, vol: &Volume) -> Result<()> {
        let Some(file) = &self.file else {
            return Ok(());
        };

        for (index, &sector) in file.iter().enumerate() {
            vol.map_mut(sector, 0, |block: &mut BitmapBlock| {
                self.bitmap.store_block(index, block)
            })?;
        }
        Ok(())
    }
}
