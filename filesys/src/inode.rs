//! # 索引节点层
//!
//! 内存中的 [`Inode`] 由打开的 inode 表按扇区号登记，
//! 同一扇区多次打开得到同一个对象，只增加打开计数。
//! 计数归零时：若已被删除，则归还它的全部扇区；否则从表中摘除即可，
//! 元数据在每次扩容时已经写回磁盘。

use alloc::collections::BTreeMap;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::fmt;

use spin::{Mutex, MutexGuard};

use crate::layout::DiskInode;
use crate::volume::Volume;
use crate::{Error, Result};
use crate::{MAX_FILE_SIZE, SECTOR_SIZE};

pub use crate::layout::InodeKind;

pub struct Inode {
    /// inode 所在扇区，即 inode 编号
    sector: u32,
    vol: Arc<Volume>,
    /// 磁盘 inode 在内存中的副本，修改时同步写回
    disk_inode: Mutex<DiskInode>,
    state: Mutex<OpenState>,
    /// 目录层的互斥锁，串行化对同一目录的查找与修改
    dir_lock: Mutex<()>,
}

#[derive(Debug)]
struct OpenState {
    open_count: usize,
    /// 已从目录中删除，最后一次关闭时归还扇区
    removed: bool,
    /// 大于0时拒绝写入
    deny_write_count: usize,
}

/// 打开的 inode 表
#[derive(Debug, Default)]
pub struct InodeTable {
    open: Mutex<BTreeMap<u32, Weak<Inode>>>,
}

impl InodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 仍处于打开状态的 inode 编号
    pub fn open_inodes(&self) -> Vec<u32> {
        self.open
            .lock()
            .iter()
            .filter(|(_, inode)| inode.strong_count() > 0)
            .map(|(&sector, _)| sector)
            .collect()
    }
}

impl Inode {
    /// 在已分配的`sector`上初始化一个长度为`length`的 inode，
    /// 并分配、清零覆盖该长度所需的全部扇区。
    /// 空间不足时归还已分配的扇区，磁盘上不留痕迹。
    pub(crate) fn create(vol: &Volume, sector: u32, length: usize, kind: InodeKind) -> Result<()> {
        if length > MAX_FILE_SIZE {
            return Err(Error::Exhausted);
        }

        let blocks = vol.alloc_sectors(DiskInode::count_total_block(length as u32))?;
        let mut disk_inode = DiskInode::new(kind);
        Self::expand(vol, sector, &mut disk_inode, length, blocks)?;

        log::trace!("inode {sector} created: {kind:?}, {length} bytes");
        Ok(())
    }

    /// 打开`sector`上的 inode；已打开则共享同一对象
    pub(crate) fn open(vol: &Arc<Volume>, sector: u32) -> Result<Arc<Self>> {
        let mut open = vol.inodes.open.lock();

        if let Some(inode) = open.get(&sector).and_then(Weak::upgrade) {
            inode.state.lock().open_count += 1;
            return Ok(inode);
        }

        let disk_inode = vol.map(sector, 0, |disk_inode: &DiskInode| *disk_inode)?;
        if !disk_inode.is_valid() {
            log::error!("sector {sector} does not hold a valid inode");
            return Err(Error::Corrupted(sector));
        }

        let inode = Arc::new(Self {
            sector,
            vol: vol.clone(),
            disk_inode: Mutex::new(disk_inode),
            state: Mutex::new(OpenState {
                open_count: 1,
                removed: false,
                deny_write_count: 0,
            }),
            dir_lock: Mutex::new(()),
        });
        open.insert(sector, Arc::downgrade(&inode));

        Ok(inode)
    }

    /// 再打开一次，与[`Inode::close`]成对使用
    pub fn reopen(self: &Arc<Self>) -> Arc<Self> {
        self.state.lock().open_count += 1;
        Arc::clone(self)
    }

    /// 关闭一次。最后一次关闭已删除的 inode 时，归还它的数据扇区、索引扇区与 inode 扇区
    pub fn close(self: Arc<Self>) -> Result<()> {
        {
            let mut open = self.vol.inodes.open.lock();
            let mut state = self.state.lock();
            state.open_count = state.open_count.checked_sub(1).ok_or(Error::InvalidState)?;
            if state.open_count > 0 {
                return Ok(());
            }

            if open
                .get(&self.sector)
                .is_some_and(|inode| inode.as_ptr() == Arc::as_ptr(&self))
            {
                open.remove(&self.sector);
            }

            if !state.removed {
                return Ok(());
            }
        }

        self.release()
    }

    /// 标记为删除，最后一次关闭时才真正释放
    #[inline]
    pub fn remove(&self) {
        self.state.lock().removed = true;
    }

    /// inode 编号，即其所在扇区
    #[inline]
    pub fn inumber(&self) -> u32 {
        self.sector
    }

    #[inline]
    pub fn length(&self) -> usize {
        self.disk_inode.lock().size as usize
    }

    pub fn kind(&self) -> InodeKind {
        self.disk_inode.lock().kind().unwrap_or_default()
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.disk_inode.lock().is_dir()
    }

    #[inline]
    pub fn is_removed(&self) -> bool {
        self.state.lock().removed
    }

    #[inline]
    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    /// 占用的扇区数，包括 inode 本身与索引扇区
    pub fn sectors(&self) -> usize {
        1 + DiskInode::count_total_block(self.disk_inode.lock().size)
    }

    /// 从`offset`处读出数据填充`buf`，读到文件末尾为止
    pub fn read_at(&self, buf: &mut [u8], offset: usize) -> Result<usize> {
        let disk_inode = *self.disk_inode.lock();
        disk_inode.read_at(offset, buf, &self.vol)
    }

    /// 从`offset`处写入`buf`，越过文件末尾时扩容。
    /// 空间耗尽时尽量扩容，返回实际写入的字节数。
    pub fn write_at(&self, buf: &[u8], offset: usize) -> Result<usize> {
        if self.state.lock().deny_write_count > 0 {
            return Ok(0);
        }

        let end = offset.saturating_add(buf.len()).min(MAX_FILE_SIZE);
        if end <= offset {
            return Ok(0);
        }

        let disk_inode = {
            let mut disk_inode = self.disk_inode.lock();
            if end > disk_inode.size as usize {
                self.grow(&mut disk_inode, offset, end)?;
            }
            *disk_inode
        };

        let written = disk_inode.write_at(offset, &buf[..end - offset], &self.vol)?;
        if written < buf.len() {
            log::warn!(
                "inode {}: wrote {written} of {} bytes at offset {offset}",
                self.sector,
                buf.len()
            );
        }
        Ok(written)
    }

    pub fn deny_write(&self) {
        let mut state = self.state.lock();
        state.deny_write_count += 1;
        debug_assert!(state.deny_write_count <= state.open_count);
    }

    pub fn allow_write(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.deny_write_count = state
            .deny_write_count
            .checked_sub(1)
            .ok_or(Error::InvalidState)?;
        Ok(())
    }
}

impl Inode {
    #[inline]
    pub(crate) fn volume(&self) -> &Arc<Volume> {
        &self.vol
    }

    #[inline]
    pub(crate) fn lock_dir(&self) -> MutexGuard<'_, ()> {
        self.dir_lock.lock()
    }

    /// 扩容至`target`字节；剩余扇区不够时退到能容纳的最大长度。
    /// 退后的长度够不到`offset`时什么都写不进，于是不扩容
    fn grow(&self, disk_inode: &mut DiskInode, offset: usize, target: usize) -> Result<()> {
        let old = disk_inode.size as usize;
        let mut size = target;

        let blocks = loop {
            let needed = DiskInode::count_total_block(size as u32)
                - DiskInode::count_total_block(old as u32);
            match self.vol.alloc_sectors(needed) {
                Ok(blocks) => break blocks,
                Err(Error::Exhausted) => {
                    let fit = Self::fit_size(old, size, self.vol.free_map.free_count());
                    if fit <= old.max(offset) {
                        return Ok(());
                    }
                    size = fit;
                }
                Err(err) => return Err(err),
            }
        };

        Self::expand(&self.vol, self.sector, disk_inode, size, blocks)
    }

    /// `(old, target]`中只需`free`个新扇区就能容纳的最大长度
    fn fit_size(old: usize, target: usize, free: usize) -> usize {
        let base = DiskInode::count_total_block(old as u32);
        (DiskInode::count_data_block(old as u32)..=DiskInode::count_data_block(target as u32))
            .rev()
            .map(|blocks| (blocks * SECTOR_SIZE).min(target))
            .find(|&size| DiskInode::count_total_block(size as u32) - base <= free)
            .map_or(old, |size| size.max(old))
    }

    /// 把`blocks`接入 inode 并写回磁盘；失败时归还`blocks`，`disk_inode`保持原样
    fn expand(
        vol: &Volume,
        sector: u32,
        disk_inode: &mut DiskInode,
        size: usize,
        blocks: Vec<u32>,
    ) -> Result<()> {
        let mut grown = *disk_inode;
        let result = grown
            .expand_to(size as u32, blocks.clone(), vol)
            .and_then(|()| vol.map_mut(sector, 0, |on_disk: &mut DiskInode| *on_disk = grown));

        match result {
            Ok(()) => {
                *disk_inode = grown;
                Ok(())
            }
            Err(err) => {
                log::warn!("inode {sector}: growth to {size} bytes failed: {err}");
                vol.dealloc_sectors(&blocks)?;
                Err(err)
            }
        }
    }

    fn release(&self) -> Result<()> {
        let mut disk_inode = self.disk_inode.lock();
        let blocks = disk_inode.clear(&self.vol)?;
        self.vol.dealloc_sectors(&blocks)?;
        self.vol.free_map.release(&self.vol, self.sector, 1)?;

        log::debug!("inode {} released with {} sectors", self.sector, blocks.len());
        Ok(())
    }
}

impl fmt::Debug for Inode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inode")
            .field("sector", &self.sector)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}
