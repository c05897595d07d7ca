//! # 扇区层
//!
//! 文件系统对块设备的一切访问都以扇区为单位：
//! 把扇区读进 [`SectorBuf`]，按类型映射其中的数据，改完后整块写回。
//!
//! 任何对同一扇区的“读-改-写”都必须持有 [`SectorLocks`] 中该扇区的锁，
//! 不同扇区上的操作互不干扰。

use alloc::boxed::Box;
use core::mem;

use spin::{Mutex, MutexGuard};

use crate::SECTOR_SIZE;

/// 内存中的扇区
///
/// 按8字节对齐，使磁盘结构可以原地映射。
#[repr(C, align(8))]
pub struct SectorBuf {
    data: [u8; SECTOR_SIZE],
}

impl SectorBuf {
    #[inline]
    pub const fn zeroed() -> Self {
        Self {
            data: [0; SECTOR_SIZE],
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn get<T: Sized>(&self, offset: usize) -> &T {
        let type_size = mem::size_of::<T>();
        assert!(type_size + offset <= SECTOR_SIZE);
        assert_eq!(offset % mem::align_of::<T>(), 0);
        let addr = self.data[offset..].as_ptr().cast::<T>();
        // SAFETY: 范围与对齐已检查，磁盘结构均为纯数据
        unsafe { &*addr }
    }

    pub fn get_mut<T: Sized>(&mut self, offset: usize) -> &mut T {
        let type_size = mem::size_of::<T>();
        assert!(type_size + offset <= SECTOR_SIZE);
        assert_eq!(offset % mem::align_of::<T>(), 0);
        let addr = self.data[offset..].as_mut_ptr().cast::<T>();
        // SAFETY: 同上
        unsafe { &mut *addr }
    }

    #[inline]
    pub fn map<T: Sized, V>(&self, offset: usize, f: impl FnOnce(&T) -> V) -> V {
        f(self.get(offset))
    }

    #[inline]
    pub fn map_mut<T: Sized, V>(&mut self, offset: usize, f: impl FnOnce(&mut T) -> V) -> V {
        f(self.get_mut(offset))
    }
}

/// 扇区锁表，每个扇区一把锁，挂载时按设备容量建立
pub struct SectorLocks {
    locks: Box<[Mutex<()>]>,
}

impl SectorLocks {
    pub fn new(sectors: usize) -> Self {
        Self {
            locks: (0..sectors).map(|_| Mutex::new(())).collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// 阻塞直至取得扇区锁；扇区号越界时返回空
    #[inline]
    pub fn lock(&self, sector: u32) -> Option<MutexGuard<'_, ()>> {
        self.locks.get(sector as usize).map(Mutex::lock)
    }
}

impl core::fmt::Debug for SectorLocks {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SectorLocks")
            .field("sectors", &self.locks.len())
            .finish()
    }
}
