use alloc::sync::Arc;

use crate::inode::Inode;
use crate::{Error, Result};

/// 打开的文件：inode 加上读写游标
#[derive(Debug)]
pub struct File {
    inode: Arc<Inode>,
    pos: usize,
    /// 本句柄是否调用过[`File::deny_write`]
    deny_write: bool,
}

impl File {
    /// 接管`inode`的一次打开；它是目录时关闭它并报错
    pub fn open(inode: Arc<Inode>) -> Result<Self> {
        if inode.is_dir() {
            inode.close()?;
            return Err(Error::IsADirectory);
        }
        Ok(Self {
            inode,
            pos: 0,
            deny_write: false,
        })
    }

    /// 同一文件的另一个句柄，游标从头开始
    pub fn reopen(&self) -> Self {
        Self {
            inode: self.inode.reopen(),
            pos: 0,
            deny_write: false,
        }
    }

    pub fn close(mut self) -> Result<()> {
        self.allow_write()?;
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

    /// 从游标处读，游标前进读到的字节数
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let read = self.inode.read_at(buf, self.pos)?;
        self.pos += read;
        Ok(read)
    }

    /// 从游标处写，游标前进写入的字节数
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let written = self.inode.write_at(buf, self.pos)?;
        self.pos += written;
        Ok(written)
    }

    #[inline]
    pub fn read_at(&self, buf: &mut [u8], offset: usize) -> Result<usize> {
        self.inode.read_at(buf, offset)
    }

    #[inline]
    pub fn write_at(&self, buf: &[u8], offset: usize) -> Result<usize> {
        self.inode.write_at(buf, offset)
    }

    /// 游标可以越过文件末尾，之后的写入会扩容
    #[inline]
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    #[inline]
    pub fn tell(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn length(&self) -> usize {
        self.inode.length()
    }

    /// 禁止任何句柄写入该 inode，直到本句柄[`File::allow_write`]或关闭
    pub fn deny_write(&mut self) {
        if !self.deny_write {
            self.deny_write = true;
            self.inode.deny_write();
        }
    }

    pub fn allow_write(&mut self) -> Result<()> {
        if self.deny_write {
            self.deny_write = false;
            self.inode.allow_write()?;
        }
        Ok(())
    }
}
