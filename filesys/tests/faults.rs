mod common;

use filesys::{BlockDevice, BlockError, Error, FileSystem, SECTOR_SIZE};

#[test]
fn read_failure_surfaces_as_io_error() {
    let (disk, fs) = common::format(64);
    fs.create("f", 2 * SECTOR_SIZE, fs.root_dir().unwrap())
        .unwrap();

    let file = fs.open("f").unwrap();
    let inumber = file.inumber();
    // inode 之后紧接着分配的是它的两个数据扇区
    let second = inumber + 2;
    disk.fail_reads_of(second);

    let mut buf = [0; SECTOR_SIZE];
    assert_eq!(file.read_at(&mut buf, 0).unwrap(), SECTOR_SIZE);
    assert_eq!(
        file.read_at(&mut buf, SECTOR_SIZE).unwrap_err(),
        Error::Io(BlockError::Io(second as usize))
    );

    disk.heal();
    assert_eq!(file.read_at(&mut buf, SECTOR_SIZE).unwrap(), SECTOR_SIZE);
    file.close().unwrap();
}

#[test]
fn unreadable_inode_fails_open() {
    let (disk, fs) = common::format(64);
    fs.create("f", 0, fs.root_dir().unwrap()).unwrap();
    let inumber = fs.stat("f").unwrap().inumber;

    disk.fail_reads_of(inumber);
    assert!(matches!(fs.open("f"), Err(Error::Io(_))));
    disk.heal();
    assert!(fs.open("f").is_ok_and(|file| file.close().is_ok()));
}

#[test]
fn zeroing_failure_rolls_back_allocation() {
    let (disk, fs) = common::format(64);
    let before = common::allocation(&fs);

    // 下一个被分配的扇区清零失败
    let next = (0..64).find(|&sector| !fs.is_allocated(sector)).unwrap();
    disk.fail_writes_of(next);
    assert!(matches!(
        fs.create("f", 0, fs.root_dir().unwrap()),
        Err(Error::Io(_))
    ));
    assert_eq!(common::allocation(&fs), before);
}

#[test]
fn stray_sector_is_not_an_inode() {
    let (disk, fs) = common::format(64);
    fs.create("f", SECTOR_SIZE, fs.root_dir().unwrap()).unwrap();
    let stat = fs.stat("f").unwrap();
    fs.done().unwrap();

    // 把数据扇区当作 inode 登记进根目录
    let fs = FileSystem::init(disk, false).unwrap();
    let root = fs.root_dir().unwrap();
    root.add("bogus", stat.inumber + 1, false).unwrap();
    root.close().unwrap();

    assert_eq!(
        fs.open("bogus").unwrap_err(),
        Error::Corrupted(stat.inumber + 1)
    );
}

#[test]
fn out_of_range_sector_is_rejected() {
    let (_disk, fs) = common::format(64);
    let root = fs.root_dir().unwrap();
    root.add("far", 1000, false).unwrap();
    root.close().unwrap();

    assert_eq!(fs.open("far").unwrap_err(), Error::Corrupted(1000));
}

#[test]
fn corrupted_index_is_not_a_double_free() {
    let (disk, fs) = common::format(64);
    fs.create("f", SECTOR_SIZE, fs.root_dir().unwrap()).unwrap();
    let inumber = fs.stat("f").unwrap().inumber;

    // 第一个直接索引紧跟在长度、魔数与类型之后，改成越界的扇区号
    let mut raw = [0; SECTOR_SIZE];
    disk.read_block(inumber as usize, &mut raw).unwrap();
    raw[12..16].copy_from_slice(&1000u32.to_le_bytes());
    disk.write_block(inumber as usize, &raw).unwrap();

    assert_eq!(fs.remove("f"), Err(Error::Corrupted(1000)));
}
