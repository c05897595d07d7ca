#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use filesys::{BlockDevice, BlockError, FileSystem, SECTOR_SIZE};

/// 内存中的块设备，可以让指定扇区的读写失败
#[derive(Debug)]
pub struct RamDisk {
    data: Mutex<Vec<u8>>,
    sectors: usize,
    faults: Mutex<Faults>,
}

#[derive(Debug, Default)]
struct Faults {
    read: BTreeSet<usize>,
    write: BTreeSet<usize>,
}

impl RamDisk {
    pub fn new(sectors: usize) -> Arc<Self> {
        Arc::new(Self {
            data: Mutex::new(vec![0; sectors * SECTOR_SIZE]),
            sectors,
            faults: Mutex::default(),
        })
    }

    pub fn fail_reads_of(&self, sector: u32) {
        self.faults.lock().unwrap().read.insert(sector as usize);
    }

    pub fn fail_writes_of(&self, sector: u32) {
        self.faults.lock().unwrap().write.insert(sector as usize);
    }

    pub fn heal(&self) {
        *self.faults.lock().unwrap() = Faults::default();
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), BlockError> {
        if block_id >= self.sectors {
            return Err(BlockError::OutOfRange(block_id));
        }
        if self.faults.lock().unwrap().read.contains(&block_id) {
            return Err(BlockError::Io(block_id));
        }
        let start = block_id * SECTOR_SIZE;
        buf.copy_from_slice(&self.data.lock().unwrap()[start..start + SECTOR_SIZE]);
        Ok(())
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), BlockError> {
        if block_id >= self.sectors {
            return Err(BlockError::OutOfRange(block_id));
        }
        let faults = self.faults.lock().unwrap();
        if faults.write.contains(&block_id) {
            return Err(BlockError::Io(block_id));
        }
        let start = block_id * SECTOR_SIZE;
        self.data.lock().unwrap()[start..start + SECTOR_SIZE].copy_from_slice(buf);
        Ok(())
    }

    fn num_blocks(&self) -> usize {
        self.sectors
    }
}

/// 格式化一块`sectors`个扇区的内存盘并挂载
pub fn format(sectors: usize) -> (Arc<RamDisk>, FileSystem) {
    let disk = RamDisk::new(sectors);
    let fs = FileSystem::init(disk.clone(), true).unwrap();
    (disk, fs)
}

/// 每个扇区的分配状态
pub fn allocation(fs: &FileSystem) -> Vec<bool> {
    (0..fs.sector_count() as u32)
        .map(|sector| fs.is_allocated(sector))
        .collect()
}

/// 随机内容
pub fn random_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|_| rand::random::<u8>()).collect()
}
