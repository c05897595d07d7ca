
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use block_dev::{BlockDevice, BlockError, BLOCK_SIZE};

/// 以宿主机上的文件模拟块设备
#[derive(Debug)]
pub struct BlockFile {
    file: Mutex<File>,
    blocks: usize,
}

impl BlockFile {
    /// 创建（或截断）一个`blocks`块的镜像文件
    pub fn create(path: impl AsRef<Path>, blocks: usize) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len((blocks * BLOCK_SIZE) as u64)?;
        Ok(Self::new(file, blocks))
    }

    /// 打开已有的镜像文件，块数由文件长度决定
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let blocks = file.metadata()?.len() as usize / BLOCK_SIZE;
        Ok(Self::new(file, blocks))
    }

    pub fn new(file: File, blocks: usize) -> Self {
        Self {
            file: Mutex::new(file),
            blocks,
        }
    }

    fn seek_to(file: &mut File, block_id: usize) -> Result<(), BlockError> {
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .map_err(|err| {
                log::error!("seeking to block {block_id}: {err}");
                BlockError::Io(block_id)
            })?;
        Ok(())
    }
}

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), BlockError> {
        if block_id >= self.blocks {
            return Err(BlockError::OutOfRange(block_id));
        }
        let mut file = self.file.lock().map_err(|_| BlockError::Io(block_id))?;
        Self::seek_to(&mut file, block_id)?;
        file.read_exact(buf).map_err(|err| match err.kind() {
            io::ErrorKind::UnexpectedEof => BlockError::ShortTransfer(block_id),
            _ => BlockError::Io(block_id),
        })
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), BlockError> {
        if block_id >= self.blocks {
            return Err(BlockError::OutOfRange(block_id));
        }
        let mut file = self.file.lock().map_err(|_| BlockError::Io(block_id))?;
        Self::seek_to(&mut file, block_id)?;
        file.write_all(buf).map_err(|err| match err.kind() {
            io::ErrorKind::WriteZero => BlockError::ShortTransfer(block_id),
            _ => BlockError::Io(block_id),
        })
    }

    fn num_blocks(&self) -> usize {
        self.blocks
    }
}
