use core::{ptr, slice};

use enumflags2::{bitflags, BitFlags};

use crate::{Error, Result};

/// 名字的最大字节数
pub const NAME_MAX: usize = 26;

/// 目录项的状态位
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryFlag {
    /// 目录项有效；清除即为墓碑，槽位可复用
    InUse = 0b01,
    /// 指向的 inode 是目录
    Directory = 0b10,
}

/// 目录项：名字到 inode 扇区的映射
#[derive(Debug, Default, Clone)]
#[repr(C)]
pub struct DirEntry {
    inode_sector: u32,
    /// [`EntryFlag`] 的原始位
    flags: u8,
    // 最后一字节留给 \0
    name: [u8; NAME_MAX + 1],
}

impl DirEntry {
    /// 目录项大小恒为32字节
    pub const SIZE: usize = 32;

    #[inline]
    pub fn new(name: &str, inode_sector: u32, is_dir: bool) -> Self {
        let bytes = name.as_bytes();
        let mut raw_name = [0; NAME_MAX + 1];
        raw_name[..bytes.len()].copy_from_slice(bytes);

        let mut flags = BitFlags::from(EntryFlag::InUse);
        if is_dir {
            flags |= EntryFlag::Directory;
        }

        Self {
            inode_sector,
            flags: flags.bits(),
            name: raw_name,
        }
    }

    /// 名字须非空、不含`/`与`\0`、不超过[`NAME_MAX`]字节
    pub fn check_name(name: &str) -> Result<()> {
        if name.is_empty() || name.len() > NAME_MAX || name.contains(['/', '\0']) {
            return Err(Error::InvalidName);
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(NAME_MAX + 1);
        core::str::from_utf8(&self.name[..len]).unwrap_or_default()
    }

    #[inline]
    pub fn inode_sector(&self) -> u32 {
        self.inode_sector
    }

    #[inline]
    pub fn flags(&self) -> BitFlags<EntryFlag> {
        BitFlags::from_bits_truncate(self.flags)
    }

    #[inline]
    pub fn in_use(&self) -> bool {
        self.flags().contains(EntryFlag::InUse)
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.flags().contains(EntryFlag::Directory)
    }

    /// 标记为墓碑，名字与 inode 保留在磁盘上
    #[inline]
    pub fn tombstone(&mut self) {
        self.flags = (self.flags() & !EntryFlag::InUse).bits();
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(ptr::from_ref(self).cast(), Self::SIZE) }
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(ptr::from_mut(self).cast(), Self::SIZE) }
    }
}

const _: () = assert!(core::mem::size_of::<DirEntry>() == DirEntry::SIZE);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_validated() {
        assert!(DirEntry::check_name("a.txt").is_ok());
        assert!(DirEntry::check_name(&"x".repeat(NAME_MAX)).is_ok());
        assert_eq!(
            DirEntry::check_name(&"x".repeat(NAME_MAX + 1)),
            Err(Error::InvalidName)
        );
        assert_eq!(DirEntry::check_name(""), Err(Error::InvalidName));
        assert_eq!(DirEntry::check_name("a/b"), Err(Error::InvalidName));
    }

    #[test]
    fn tombstone_keeps_name() {
        let mut entry = DirEntry::new("sub", 42, true);
        assert!(entry.in_use() && entry.is_dir());
        assert_eq!(entry.name(), "sub");

        entry.tombstone();
        assert!(!entry.in_use());
        assert!(entry.is_dir());
        assert_eq!(entry.name(), "sub");
        assert_eq!(entry.inode_sector(), 42);
    }

    #[test]
    fn bytes_view_is_the_record() {
        let entry = DirEntry::new(&"n".repeat(NAME_MAX), 7, false);
        let mut copy = DirEntry::default();
        copy.as_bytes_mut().copy_from_slice(entry.as_bytes());
        assert_eq!(copy.name(), entry.name());
        assert_eq!(copy.inode_sector(), 7);
        assert!(copy.in_use() && !copy.is_dir());
        assert_eq!(DirEntry::default().flags(), BitFlags::empty());
    }
}
