mod cli;

use std::fs;
use std::io::{self, Write};
use std::sync::Arc;

use clap::Parser;
use filesys::{FileSystem, FormatOptions, InodeKind};
use filesys_fuse::BlockFile;

use self::cli::{Cli, Command};

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if let Command::Format {
        sectors,
        root_entries,
    } = cli.command
    {
        let device = Arc::new(BlockFile::create(&cli.image, sectors)?);
        let fs = FileSystem::init_with(device, Some(FormatOptions { root_entries }))
            .map_err(fs_err)?;
        println!("formatted {:?}: {sectors} sectors", cli.image);
        return fs.done().map_err(fs_err);
    }

    let device = Arc::new(BlockFile::open(&cli.image)?);
    let fs = FileSystem::init(device, false).map_err(fs_err)?;
    let result = run(&fs, cli.command);
    let done = fs.done().map_err(fs_err);
    result.and(done)
}

fn run(fs: &FileSystem, command: Command) -> io::Result<()> {
    match command {
        Command::Format { .. } => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "format does not work on a mounted image",
            ));
        }
        Command::Put { source, target } => {
            for entry in fs::read_dir(&source)? {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                let name = entry.file_name().into_string().map_err(|name| {
                    io::Error::new(io::ErrorKind::InvalidInput, format!("{name:?}"))
                })?;

                let data = fs::read(entry.path())?;
                put(fs, &target, &name, &data)?;
                log::info!("{name}: {} bytes", data.len());
            }
        }
        Command::Mkdir { path, entries } => {
            let (parent, name) = split(&path);
            let dir = fs.open_dir(parent).map_err(fs_err)?;
            fs.create_dir(name, entries, dir).map_err(fs_err)?;
        }
        Command::Ls { path } => {
            let dir = fs.open_dir(&path).map_err(fs_err)?;
            let entries = dir.entries();
            dir.close().map_err(fs_err)?;

            for entry in entries.map_err(fs_err)? {
                let stat = fs.stat(&join(&path, &entry.name)).map_err(fs_err)?;
                let kind = match stat.kind {
                    InodeKind::Directory => 'd',
                    InodeKind::File => '-',
                };
                println!("{kind} {:>6} {:>10} {}", stat.inumber, stat.size, entry.name);
            }
        }
        Command::Cat { path } => {
            let mut file = fs.open(&path).map_err(fs_err)?;
            let mut stdout = io::stdout().lock();
            let mut buf = [0; filesys::SECTOR_SIZE];
            let result = loop {
                match file.read(&mut buf) {
                    Ok(0) => break Ok(()),
                    Ok(len) => {
                        if let Err(err) = stdout.write_all(&buf[..len]) {
                            break Err(err);
                        }
                    }
                    Err(err) => break Err(fs_err(err)),
                }
            };
            file.close().map_err(fs_err)?;
            result?;
        }
        Command::Rm { path } => fs.remove(&path).map_err(fs_err)?,
        Command::Df => {
            let total = fs.sector_count();
            let free = fs.free_sectors();
            println!("sectors: {total}, used: {}, free: {free}", total - free);
        }
    }
    Ok(())
}

/// 在`dir`下创建名为`name`的文件并写入`data`
fn put(fs: &FileSystem, dir: &str, name: &str, data: &[u8]) -> io::Result<()> {
    let parent = fs.open_dir(dir).map_err(fs_err)?;
    fs.create(name, 0, parent).map_err(fs_err)?;

    let mut file = fs.open(&join(dir, name)).map_err(fs_err)?;
    let written = file.write(data);
    file.close().map_err(fs_err)?;

    if written.map_err(fs_err)? < data.len() {
        return Err(io::Error::new(
            io::ErrorKind::StorageFull,
            format!("{name}: image is full"),
        ));
    }
    Ok(())
}

fn join(dir: &str, name: &str) -> String {
    format!("{}/{name}", dir.trim_end_matches('/'))
}

fn split(path: &str) -> (&str, &str) {
    let path = path.trim_end_matches('/');
    path.rsplit_once('/').unwrap_or(("", path))
}

fn fs_err(err: filesys::Error) -> io::Error {
    let kind = match err {
        filesys::Error::NotFound => io::ErrorKind::NotFound,
        filesys::Error::AlreadyExists => io::ErrorKind::AlreadyExists,
        filesys::Error::Exhausted => io::ErrorKind::StorageFull,
        filesys::Error::InvalidName => io::ErrorKind::InvalidInput,
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, err.to_string())
}
