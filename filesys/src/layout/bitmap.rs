use alloc::vec;
use alloc::vec::Vec;

use crate::SECTOR_BITS;

/// 位图文件中一个扇区的结构
pub type BitmapBlock = [u64; SECTOR_BITS / 64];

/// 空闲扇区位图，每个扇区一位，1 表示已分配
///
/// 挂载期间常驻内存，其内容以文件的形式存放在磁盘上。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    groups: Vec<u64>,
    /// 位图所指示的扇区总数
    bits: usize,
}

/// 位编号
struct BitId(usize);

impl Bitmap {
    pub fn new(bits: usize) -> Self {
        Self {
            groups: vec![0; bits.div_ceil(64)],
            bits,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.bits
    }

    /// 持久化所需的字节数
    #[inline]
    pub fn file_size(&self) -> usize {
        self.groups.len() * 8
    }

    /// 持久化所需的扇区数
    #[inline]
    pub fn blocks(&self) -> usize {
        self.groups.len().div_ceil(SECTOR_BITS / 64)
    }

    pub fn test(&self, bit: usize) -> bool {
        let (group, ingroup) = BitId(bit).decode();
        self.groups[group] & (1 << ingroup) != 0
    }

    pub fn mark(&mut self, bit: usize) {
        let (group, ingroup) = BitId(bit).decode();
        self.groups[group] |= 1 << ingroup;
    }

    pub fn count_ones(&self) -> usize {
        self.groups.iter().map(|g| g.count_ones() as usize).sum()
    }

    /// 首次适配地寻找`count`个连续的空闲位并置位，返回第一位的编号。
    /// 找不到时返回空。
    pub fn alloc(&mut self, count: usize) -> Option<usize> {
        match count {
            0 => None,
            1 => self.alloc_one(),
            _ => self.alloc_run(count),
        }
    }

    /// 清除`[start, start + count)`的位。
    /// 只要其中有一位本就空闲，便不做任何修改并返回该位。
    pub fn dealloc(&mut self, start: usize, count: usize) -> Result<(), usize> {
        let end = start + count;
        if end > self.bits {
            return Err(end - 1);
        }
        if let Some(free) = (start..end).find(|&bit| !self.test(bit)) {
            return Err(free);
        }

        for bit in start..end {
            let (group, ingroup) = BitId(bit).decode();
            self.groups[group] &= !(1 << ingroup);
        }
        Ok(())
    }

    pub fn store_block(&self, index: usize, block: &mut BitmapBlock) {
        let groups = self.block_groups(index);
        block.fill(0);
        block[..groups.len()].copy_from_slice(&self.groups[groups]);
    }

    pub fn load_block(&mut self, index: usize, block: &BitmapBlock) {
        let groups = self.block_groups(index);
        let len = groups.len();
        self.groups[groups].copy_from_slice(&block[..len]);
    }
}

impl Bitmap {
    fn alloc_one(&mut self) -> Option<usize> {
        // 寻找还有0的组；组内第一个0即为所求
        let (group, ingroup) = self
            .groups
            .iter()
            .enumerate()
            .find_map(|(group, &bits)| {
                (bits != u64::MAX).then_some((group, bits.trailing_ones() as usize))
            })?;

        let bit = BitId::encode(group, ingroup);
        // 末组超出容量的位恒为0，不能分配出去
        if bit >= self.bits {
            return None;
        }
        self.groups[group] |= 1 << ingroup;
        Some(bit)
    }

    fn alloc_run(&mut self, count: usize) -> Option<usize> {
        let mut run = 0;
        for bit in 0..self.bits {
            if self.test(bit) {
                run = 0;
                continue;
            }

            run += 1;
            if run == count {
                let start = bit + 1 - count;
                (start..=bit).for_each(|bit| self.mark(bit));
                return Some(start);
            }
        }

        None
    }

    fn block_groups(&self, index: usize) -> core::ops::Range<usize> {
        const GROUPS: usize = SECTOR_BITS / 64;
        let start = index * GROUPS;
        start..(start + GROUPS).min(self.groups.len())
    }
}

impl BitId {
    #[inline]
    fn encode(group: usize, ingroup: usize) -> usize {
        group * 64 + ingroup
    }

    #[inline]
    fn decode(self) -> (usize, usize) {
        (self.0 / 64, self.0 % 64)
    }
}
