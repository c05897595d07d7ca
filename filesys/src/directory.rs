//! # 目录层
//!
//! 目录是内容为定长 [`DirEntry`] 数组的 inode。
//! 删除目录项只清除其使用位，留下的墓碑由之后的添加复用。

use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::inode::{Inode, InodeKind};
use crate::layout::DirEntry;
use crate::volume::Volume;
use crate::{Error, Result, ROOT_DIR_SECTOR};

/// 打开的目录，带有[`Dir::read_dir`]的遍历位置
#[derive(Debug)]
pub struct Dir {
    inode: Arc<Inode>,
    pos: usize,
}

/// [`Dir::read_dir`]返回的目录项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: String,
    pub inumber: u32,
    pub is_dir: bool,
}

impl Dir {
    /// 在已分配的`sector`上创建可容纳`entry_cnt`个目录项的空目录
    pub(crate) fn create(vol: &Volume, sector: u32, entry_cnt: usize) -> Result<()> {
        let length = entry_cnt
            .checked_mul(DirEntry::SIZE)
            .ok_or(Error::Exhausted)?;
        Inode::create(vol, sector, length, InodeKind::Directory)
    }

    /// 接管`inode`的一次打开；它不是目录时关闭它并报错
    pub fn open(inode: Arc<Inode>) -> Result<Self> {
        if !inode.is_dir() {
            inode.close()?;
            return Err(Error::NotADirectory);
        }
        Ok(Self { inode, pos: 0 })
    }

    pub(crate) fn open_root(vol: &Arc<Volume>) -> Result<Self> {
        Self::open(Inode::open(vol, ROOT_DIR_SECTOR)?)
    }

    /// 同一目录的另一个句柄，遍历位置从头开始
    pub fn reopen(&self) -> Self {
        Self {
            inode: self.inode.reopen(),
            pos: 0,
        }
    }

    pub fn close(self) -> Result<()> {
        self.inode.close()
    }

    #[inline]
    pub fn inode(&self) -> &Arc<Inode> {
        &self.inode
    }

    #[inline]
    pub fn inumber(&self) -> u32 {
        self.inode.inumber()
    }

    /// 按名字查找，返回其 inode 编号
    pub fn lookup(&self, name: &str) -> Result<u32> {
        let _guard = self.inode.lock_dir();
        find(&self.inode, name)?
            .map(|(_, entry)| entry.inode_sector())
            .ok_or(Error::NotFound)
    }

    /// 按名字查找并打开其 inode
    pub fn open_entry(&self, name: &str) -> Result<Arc<Inode>> {
        let sector = self.lookup(name)?;
        Inode::open(self.inode.volume(), sector)
    }

    /// 添加名为`name`、指向`inode_sector`的目录项。
    /// 优先复用墓碑槽位，否则追加到目录末尾
    pub fn add(&self, name: &str, inode_sector: u32, is_dir: bool) -> Result<()> {
        if is_reserved(name) {
            return Err(Error::AlreadyExists);
        }
        DirEntry::check_name(name)?;
        self.link(name, inode_sector, is_dir)
    }

    /// 写入`.`与`..`，只用于刚创建的目录
    pub(crate) fn bootstrap(&self, parent: u32) -> Result<()> {
        self.link(".", self.inumber(), true)?;
        self.link("..", parent, true)
    }

    /// 删除名为`name`的目录项，并将其 inode 标记为删除。
    /// 非空目录不可删除；`.`与`..`不可删除
    pub fn remove(&self, name: &str) -> Result<()> {
        if is_reserved(name) {
            return Err(Error::InvalidName);
        }

        let _guard = self.inode.lock_dir();
        let (offset, mut entry) = find(&self.inode, name)?.ok_or(Error::NotFound)?;
        let inode = Inode::open(self.inode.volume(), entry.inode_sector())?;

        let result = self.unlink(offset, &mut entry, &inode);
        let closed = inode.close();
        log::debug!("remove {name:?} from dir {}: {result:?}", self.inumber());
        result.and(closed)
    }

    /// 读出下一个有效目录项，跳过`.`与`..`
    pub fn read_dir(&mut self) -> Result<Option<DirEntryInfo>> {
        let _guard = self.inode.lock_dir();
        let mut entry = DirEntry::default();

        while self.pos + DirEntry::SIZE <= self.inode.length() {
            let read = self.inode.read_at(entry.as_bytes_mut(), self.pos)?;
            if read != DirEntry::SIZE {
                break;
            }
            self.pos += DirEntry::SIZE;

            if entry.in_use() && !is_reserved(entry.name()) {
                return Ok(Some(DirEntryInfo {
                    name: entry.name().to_string(),
                    inumber: entry.inode_sector(),
                    is_dir: entry.is_dir(),
                }));
            }
        }

        Ok(None)
    }

    /// 全部有效目录项，不影响[`Dir::read_dir`]的位置
    pub fn entries(&self) -> Result<Vec<DirEntryInfo>> {
        let mut dir = Self {
            inode: Arc::clone(&self.inode),
            pos: 0,
        };
        let mut entries = Vec::new();
        while let Some(info) = dir.read_dir()? {
            entries.push(info);
        }
        Ok(entries)
    }

    /// 除`.`与`..`之外没有有效目录项
    pub fn is_empty(&self) -> Result<bool> {
        let _guard = self.inode.lock_dir();
        is_empty(&self.inode)
    }
}

impl Dir {
    fn link(&self, name: &str, inode_sector: u32, is_dir: bool) -> Result<()> {
        let _guard = self.inode.lock_dir();
        // 已删除的目录不再接受新的目录项
        if self.inode.is_removed() {
            return Err(Error::NotFound);
        }
        if find(&self.inode, name)?.is_some() {
            return Err(Error::AlreadyExists);
        }

        let offset = scan(&self.inode, |entry| !entry.in_use())?
            .map_or_else(|| self.inode.length(), |(offset, _)| offset);
        let entry = DirEntry::new(name, inode_sector, is_dir);
        if self.inode.write_at(entry.as_bytes(), offset)? != DirEntry::SIZE {
            return Err(Error::Exhausted);
        }

        log::trace!("dir {}: {name:?} -> {inode_sector}", self.inumber());
        Ok(())
    }

    /// 调用者持有本目录的锁
    fn unlink(&self, offset: usize, entry: &mut DirEntry, inode: &Inode) -> Result<()> {
        // 指回本目录的目录项：目录锁不可重入
        if core::ptr::eq(inode, Arc::as_ptr(&self.inode)) {
            return Err(Error::InvalidState);
        }
        let _child = inode.is_dir().then(|| inode.lock_dir());
        if inode.is_dir() && !is_empty(inode)? {
            return Err(Error::DirectoryNotEmpty);
        }

        entry.tombstone();
        if self.inode.write_at(entry.as_bytes(), offset)? != DirEntry::SIZE {
            return Err(Error::InvalidState);
        }
        inode.remove();
        Ok(())
    }
}

#[inline]
fn is_reserved(name: &str) -> bool {
    matches!(name, "." | "..")
}

/// 逐个读出目录项，返回第一个满足`pred`的目录项及其偏移
fn scan(inode: &Inode, mut pred: impl FnMut(&DirEntry) -> bool) -> Result<Option<(usize, DirEntry)>> {
    let mut entry = DirEntry::default();
    for offset in (0..inode.length()).step_by(DirEntry::SIZE) {
        if inode.read_at(entry.as_bytes_mut(), offset)? != DirEntry::SIZE {
            break;
        }
        if pred(&entry) {
            return Ok(Some((offset, entry)));
        }
    }
    Ok(None)
}

fn find(inode: &Inode, name: &str) -> Result<Option<(usize, DirEntry)>> {
    scan(inode, |entry| entry.in_use() && entry.name() == name)
}

fn is_empty(inode: &Inode) -> Result<bool> {
    Ok(scan(inode, |entry| entry.in_use() && !is_reserved(entry.name()))?.is_none())
}
