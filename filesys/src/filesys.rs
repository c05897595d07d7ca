//! # 文件系统层
//!
//! 挂载、格式化与卸载，以及按名字创建、打开、删除。
//! 路径以`/`分隔，总是从根目录开始解析。

use alloc::sync::Arc;

use block_dev::BlockDevice;

use crate::directory::Dir;
use crate::file::File;
use crate::inode::{Inode, InodeKind};
use crate::layout::DirEntry;
use crate::volume::Volume;
use crate::{Error, Result};
use crate::{ROOT_DIR_ENTRIES, ROOT_DIR_SECTOR};

/// 格式化参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    /// 根目录预留的目录项数
    pub root_entries: usize,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            root_entries: ROOT_DIR_ENTRIES,
        }
    }
}

/// [`FileSystem::stat`]的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub inumber: u32,
    pub kind: InodeKind,
    /// 字节数
    pub size: usize,
    /// 占用的扇区数，包括 inode 与索引扇区
    pub sectors: usize,
}

/// 挂载在一个块设备上的文件系统
#[derive(Debug)]
pub struct FileSystem {
    vol: Arc<Volume>,
}

impl FileSystem {
    /// 挂载`block_device`；`format`为真时先以默认参数格式化
    pub fn init(block_device: Arc<dyn BlockDevice>, format: bool) -> Result<Self> {
        Self::init_with(block_device, format.then(FormatOptions::default))
    }

    pub fn init_with(
        block_device: Arc<dyn BlockDevice>,
        format: Option<FormatOptions>,
    ) -> Result<Self> {
        let vol = Arc::new(Volume::new(block_device));
        if vol.sector_count() <= ROOT_DIR_SECTOR as usize {
            log::error!("device with {} sectors is too small", vol.sector_count());
            return Err(Error::Exhausted);
        }

        if let Some(options) = format {
            Self::format(&vol, &options)?;
        }
        vol.free_map.open(&vol)?;

        log::info!("file system mounted on {} sectors", vol.sector_count());
        Ok(Self { vol })
    }

    /// 卸载：写回并关闭空闲位图
    pub fn done(self) -> Result<()> {
        let open = self.vol.inodes.open_inodes();
        if !open.is_empty() {
            log::warn!("unmounting with inodes still open: {open:?}");
        }
        self.vol.free_map.close(&self.vol)?;
        log::info!("file system unmounted");
        Ok(())
    }

    /// 在`dir`中创建名为`name`、长度为`initial_size`的文件。
    /// 无论成败都会关闭`dir`；失败时不留下任何已分配的扇区
    pub fn create(&self, name: &str, initial_size: usize, dir: Dir) -> Result<()> {
        let result = self.create_in(&dir, name, InodeKind::File, initial_size);
        let closed = dir.close();
        log::debug!("create {name:?} ({initial_size} bytes): {result:?}");
        result.map(|_| ()).and(closed)
    }

    /// 在`dir`中创建可容纳`entry_cnt`个目录项的子目录，并写入`.`与`..`
    pub fn create_dir(&self, name: &str, entry_cnt: usize, dir: Dir) -> Result<()> {
        let result = entry_cnt
            .checked_mul(DirEntry::SIZE)
            .ok_or(Error::Exhausted)
            .and_then(|length| self.create_in(&dir, name, InodeKind::Directory, length))
            .and_then(|sector| self.link_dir(&dir, name, sector));
        let closed = dir.close();
        log::debug!("mkdir {name:?} ({entry_cnt} entries): {result:?}");
        result.and(closed)
    }

    /// 打开`path`处的普通文件
    pub fn open(&self, path: &str) -> Result<File> {
        File::open(self.resolve(path)?)
    }

    /// 打开`path`处的目录
    pub fn open_dir(&self, path: &str) -> Result<Dir> {
        Dir::open(self.resolve(path)?)
    }

    pub fn root_dir(&self) -> Result<Dir> {
        Dir::open_root(&self.vol)
    }

    /// 删除`path`；仍被打开的文件在最后一次关闭时才释放
    pub fn remove(&self, path: &str) -> Result<()> {
        let (dir, name) = self.resolve_parent(path)?;
        let result = dir.remove(name);
        let closed = dir.close();
        result.and(closed)
    }

    pub fn stat(&self, path: &str) -> Result<Stat> {
        let inode = self.resolve(path)?;
        let stat = Stat {
            inumber: inode.inumber(),
            kind: inode.kind(),
            size: inode.length(),
            sectors: inode.sectors(),
        };
        inode.close()?;
        Ok(stat)
    }

    #[inline]
    pub fn sector_count(&self) -> usize {
        self.vol.sector_count()
    }

    #[inline]
    pub fn free_sectors(&self) -> usize {
        self.vol.free_map.free_count()
    }

    #[inline]
    pub fn is_allocated(&self, sector: u32) -> bool {
        self.vol.free_map.is_allocated(sector)
    }
}

impl FileSystem {
    fn format(vol: &Arc<Volume>, options: &FormatOptions) -> Result<()> {
        log::info!("formatting file system...");

        vol.free_map.create(vol)?;
        Dir::create(vol, ROOT_DIR_SECTOR, options.root_entries)?;

        let root = Dir::open_root(vol)?;
        let linked = root.bootstrap(ROOT_DIR_SECTOR);
        root.close()?;
        linked?;

        vol.free_map.close(vol)?;
        log::info!("done.");
        Ok(())
    }

    /// 分配 inode 扇区、创建 inode 并链接进`dir`，返回 inode 编号
    fn create_in(&self, dir: &Dir, name: &str, kind: InodeKind, length: usize) -> Result<u32> {
        DirEntry::check_name(name)?;

        let vol = &self.vol;
        let sector = vol.alloc_sector()?;
        if let Err(err) = Inode::create(vol, sector, length, kind) {
            vol.free_map.release(vol, sector, 1)?;
            return Err(err);
        }

        if let Err(err) = dir.add(name, sector, kind == InodeKind::Directory) {
            log::warn!("linking {name:?} failed, discarding inode {sector}: {err}");
            let inode = Inode::open(vol, sector)?;
            inode.remove();
            inode.close()?;
            return Err(err);
        }

        Ok(sector)
    }

    /// 为新目录写入`.`与`..`；失败时把它从`parent`中删除
    fn link_dir(&self, parent: &Dir, name: &str, sector: u32) -> Result<()> {
        let dir = Dir::open(Inode::open(&self.vol, sector)?)?;
        let linked = dir.bootstrap(parent.inumber());
        let closed = dir.close();

        if let Err(err) = linked.and(closed) {
            log::warn!("bootstrapping {name:?} failed: {err}");
            parent.remove(name)?;
            return Err(err);
        }
        Ok(())
    }

    /// 从根目录开始逐级查找，返回打开的 inode
    fn resolve(&self, path: &str) -> Result<Arc<Inode>> {
        let mut inode = Inode::open(&self.vol, ROOT_DIR_SECTOR)?;

        for name in path.split('/').filter(|name| !name.is_empty()) {
            let dir = Dir::open(inode)?;
            let next = dir.open_entry(name);
            inode = match (next, dir.close()) {
                (Ok(next), Ok(())) => next,
                (Ok(next), Err(err)) => {
                    next.close()?;
                    return Err(err);
                }
                (Err(err), _) => return Err(err),
            };
        }

        Ok(inode)
    }

    /// 打开`path`的父目录，并返回最后一级名字
    fn resolve_parent<'a>(&self, path: &'a str) -> Result<(Dir, &'a str)> {
        let path = path.trim_end_matches('/');
        let (parent, name) = path.rsplit_once('/').unwrap_or(("", path));
        if name.is_empty() {
            return Err(Error::InvalidName);
        }
        Ok((Dir::open(self.resolve(parent)?)?, name))
    }
}
