mod common;

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use filesys::{Error, ROOT_DIR_SECTOR, SECTOR_SIZE};

#[test]
fn open_file_outlives_its_name() {
    let (_disk, fs) = common::format(128);
    let free = fs.free_sectors();
    fs.create("f", 0, fs.root_dir().unwrap()).unwrap();

    let mut file = fs.open("f").unwrap();
    let payload = common::random_bytes(3 * SECTOR_SIZE);
    assert_eq!(file.write(&payload).unwrap(), payload.len());
    let inumber = file.inumber();

    fs.remove("f").unwrap();
    assert_eq!(fs.open("f").unwrap_err(), Error::NotFound);
    assert!(file.inode().is_removed());
    assert!(fs.is_allocated(inumber));

    // 删除之后仍可读写
    let mut buf = vec![0; payload.len()];
    assert_eq!(file.read_at(&mut buf, 0).unwrap(), payload.len());
    assert!(buf == payload);
    assert_eq!(file.write(b"tail").unwrap(), 4);

    let other = file.reopen();
    file.close().unwrap();
    assert!(fs.is_allocated(inumber));
    other.close().unwrap();

    assert!(!fs.is_allocated(inumber));
    assert_eq!(fs.free_sectors(), free);
}

#[test]
fn removed_directory_refuses_new_entries() {
    let (_disk, fs) = common::format(64);
    let before = common::allocation(&fs);

    fs.create_dir("d", 4, fs.root_dir().unwrap()).unwrap();
    let dir = fs.open_dir("d").unwrap();
    fs.remove("d").unwrap();

    // 创建失败，且`dir`作为最后的打开者被关闭，目录随之释放
    assert_eq!(fs.create("x", 10, dir), Err(Error::NotFound));
    assert_eq!(common::allocation(&fs), before);
}

#[test]
fn failed_create_leaves_free_map_untouched() {
    let (_disk, fs) = common::format(64);
    fs.create("filler", 0, fs.root_dir().unwrap()).unwrap();

    // 用完根目录预留的目录项（已有`.`、`..`与 filler），下一个目录项需要新扇区
    let slots = fs.stat("/").unwrap().size / 32;
    assert_eq!(slots * 32 % SECTOR_SIZE, 0);
    for i in 0..slots - 3 {
        fs.create(&format!("f{i}"), 0, fs.root_dir().unwrap())
            .unwrap();
    }

    // 只留一个扇区：够 inode 用，不够目录扩容
    let mut filler = fs.open("filler").unwrap();
    let len = (fs.free_sectors() - 1) * SECTOR_SIZE;
    assert_eq!(filler.write(&vec![7; len]).unwrap(), len);
    filler.close().unwrap();
    assert_eq!(fs.free_sectors(), 1);

    let before = common::allocation(&fs);
    assert_eq!(
        fs.create("x", 0, fs.root_dir().unwrap()),
        Err(Error::Exhausted)
    );
    assert_eq!(common::allocation(&fs), before);
    assert_eq!(
        fs.create_dir("y", 4, fs.root_dir().unwrap()),
        Err(Error::Exhausted)
    );
    assert_eq!(common::allocation(&fs), before);
    assert_eq!(fs.open("x").unwrap_err(), Error::NotFound);
}

#[test]
fn failed_mkdir_bootstrap_unlinks_the_directory() {
    let (_disk, fs) = common::format(64);
    // 零个目录项的子目录要靠扩容才能写入`.`与`..`
    fs.create("hog", 0, fs.root_dir().unwrap()).unwrap();
    let mut hog = fs.open("hog").unwrap();
    // 留一个扇区给新目录的 inode
    let len = (fs.free_sectors() - 1) * SECTOR_SIZE;
    assert_eq!(hog.write(&vec![0; len]).unwrap(), len);
    hog.close().unwrap();

    let before = common::allocation(&fs);
    assert_eq!(
        fs.create_dir("empty", 0, fs.root_dir().unwrap()),
        Err(Error::Exhausted)
    );
    assert_eq!(common::allocation(&fs), before);
    assert_eq!(fs.open_dir("empty").unwrap_err(), Error::NotFound);
}

#[test]
fn denied_writes_transfer_nothing() {
    let (_disk, fs) = common::format(64);
    fs.create("exe", 0, fs.root_dir().unwrap()).unwrap();

    let mut running = fs.open("exe").unwrap();
    let mut writer = fs.open("exe").unwrap();
    assert_eq!(writer.write(b"code").unwrap(), 4);

    running.deny_write();
    assert_eq!(writer.write(b"more").unwrap(), 0);
    assert_eq!(running.write_at(b"x", 0).unwrap(), 0);
    assert_eq!(writer.length(), 4);

    running.allow_write().unwrap();
    assert_eq!(writer.write(b"more").unwrap(), 4);

    // 关闭时自动解除
    running.deny_write();
    running.close().unwrap();
    assert_eq!(writer.write(b"!").unwrap(), 1);
    assert_eq!(writer.length(), 9);
    writer.close().unwrap();
}

#[test]
fn open_handles_share_one_inode() {
    let (_disk, fs) = common::format(64);
    fs.create("f", 0, fs.root_dir().unwrap()).unwrap();

    let a = fs.open("f").unwrap();
    let b = fs.open("/f").unwrap();
    assert!(std::sync::Arc::ptr_eq(a.inode(), b.inode()));
    assert_eq!(a.inode().open_count(), 2);

    assert_eq!(b.write_at(b"shared", 0).unwrap(), 6);
    assert_eq!(a.length(), 6);

    b.close().unwrap();
    assert_eq!(a.inode().open_count(), 1);
    a.close().unwrap();
}

#[test]
fn entry_pointing_at_its_own_directory_is_not_removable() {
    let (_disk, fs) = common::format(64);
    let root = fs.root_dir().unwrap();
    root.add("loop", ROOT_DIR_SECTOR, true).unwrap();
    root.close().unwrap();

    // 在另一个线程上删除，死锁时超时失败而不是卡住
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let removed = fs.remove("loop");
        tx.send((removed, fs)).unwrap();
    });
    let (removed, fs) = rx
        .recv_timeout(Duration::from_secs(3))
        .expect("remove of a self-referencing entry deadlocked");
    assert_eq!(removed, Err(Error::InvalidState));

    // 根目录不受影响
    assert_eq!(fs.stat("loop").unwrap().inumber, ROOT_DIR_SECTOR);
    let root = fs.root_dir().unwrap();
    assert!(!root.inode().is_removed());
    assert_eq!(root.lookup("loop"), Ok(ROOT_DIR_SECTOR));
    root.close().unwrap();
}
