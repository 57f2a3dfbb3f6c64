//! End-to-end scenarios exercising the file system through its public
//! façade: formatting, nested directories, large writes that span every
//! block-map level, concurrent handles, and removal semantics.

use inodefs::block::MemBlockDevice;
use inodefs::fs::FileSystem;

fn init_logging() {
    let _ = env_logger::try_init();
}

fn fresh(sector_count: u32) -> FileSystem {
    FileSystem::format(MemBlockDevice::new(sector_count)).unwrap()
}

#[test]
fn format_and_root_contents() {
    init_logging();
    let fs = fresh(64);
    let task = fs.new_task().unwrap();

    let mut root = fs.open(&task, "/").unwrap();
    assert!(root.is_dir());
    assert_eq!(root.readdir(&fs).unwrap(), None);

    root.close(&fs);
    task.close(&fs);
}

#[test]
fn large_write_spans_direct_indirect_and_double_indirect() {
    init_logging();
    let fs = fresh(8192);
    let task = fs.new_task().unwrap();

    fs.create(&task, "big", 0, false).unwrap();
    let mut handle = fs.open(&task, "big").unwrap();
    let inodefs::Handle::File(file) = &mut handle else {
        panic!("expected a file handle");
    };

    let len = 600 * 1024;
    let pattern: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    let written = file.write(&fs, &pattern).unwrap();
    assert_eq!(written, len);
    assert_eq!(file.size(&fs), 614_400);
    handle.close(&fs);

    let mut handle = fs.open(&task, "big").unwrap();
    let inodefs::Handle::File(file) = &mut handle else {
        panic!("expected a file handle");
    };
    assert_eq!(file.size(&fs), 614_400);

    let mut readback = vec![0u8; len];
    let read = file.read(&fs, &mut readback).unwrap();
    assert_eq!(read, len);
    assert_eq!(readback, pattern);

    handle.close(&fs);
    task.close(&fs);
}

#[test]
fn nested_mkdir_and_relative_resolution() {
    init_logging();
    let fs = fresh(128);
    let mut task = fs.new_task().unwrap();

    fs.mkdir(&task, "/a").unwrap();
    fs.mkdir(&task, "/a/b").unwrap();
    fs.chdir(&mut task, "/a").unwrap();
    fs.mkdir(&task, "b2").unwrap();

    let via_dotdot = fs.open(&task, "b/../b2").unwrap();
    let direct = fs.open(&task, "/a/b2").unwrap();
    assert_eq!(via_dotdot.inumber(), direct.inumber());

    via_dotdot.close(&fs);
    direct.close(&fs);
    task.close(&fs);
}

#[test]
fn remove_while_open_releases_sectors_on_last_close() {
    init_logging();
    let fs = fresh(64);
    let task = fs.new_task().unwrap();

    fs.create(&task, "f", 0, false).unwrap();
    let mut handle = fs.open(&task, "f").unwrap();
    let inodefs::Handle::File(file) = &mut handle else {
        panic!("expected a file handle");
    };
    file.write(&fs, b"still here").unwrap();

    fs.remove(&task, "f").unwrap();
    assert!(fs.open(&task, "f").is_err());

    // The handle opened before the remove still sees the full content.
    let mut readback = [0u8; 10];
    let read = file.read(&fs, &mut readback).unwrap();
    assert_eq!(read, 10);
    assert_eq!(&readback, b"still here");

    handle.close(&fs);

    // The freed sector is reused by the next single-sector allocation.
    fs.create(&task, "g", 1, false).unwrap();
    let handle = fs.open(&task, "g").unwrap();
    handle.close(&fs);

    task.close(&fs);
}

#[test]
fn empty_directory_removal() {
    init_logging();
    let fs = fresh(64);
    let task = fs.new_task().unwrap();

    fs.mkdir(&task, "/d").unwrap();
    fs.remove(&task, "/d").unwrap();

    fs.mkdir(&task, "/d").unwrap();
    fs.create(&task, "/d/x", 0, false).unwrap();
    assert!(matches!(fs.remove(&task, "/d"), Err(inodefs::FsError::DirectoryNotEmpty)));

    fs.remove(&task, "/d/x").unwrap();
    fs.remove(&task, "/d").unwrap();

    task.close(&fs);
}

#[test]
fn deny_write_blocks_concurrent_writers() {
    init_logging();
    let fs = fresh(64);
    let task = fs.new_task().unwrap();

    fs.create(&task, "prog", 0, false).unwrap();
    let mut writer = fs.open(&task, "prog").unwrap();
    let denier = fs.open(&task, "prog").unwrap();

    let inodefs::Handle::File(deny_file) = &denier else {
        panic!("expected a file handle");
    };
    deny_file.deny_write(&fs);

    let inodefs::Handle::File(write_file) = &mut writer else {
        panic!("expected a file handle");
    };
    let n = write_file.write(&fs, b"hello").unwrap();
    assert_eq!(n, 0);
    assert_eq!(write_file.size(&fs), 0);

    deny_file.allow_write(&fs);
    let n = write_file.write(&fs, b"hello").unwrap();
    assert_eq!(n, 5);
    assert_eq!(write_file.size(&fs), 5);

    writer.close(&fs);
    denier.close(&fs);
    task.close(&fs);
}

#[test]
fn seek_past_eof_reads_zero_and_writes_fill_a_hole() {
    init_logging();
    let fs = fresh(64);
    let task = fs.new_task().unwrap();

    fs.create(&task, "sparse", 0, false).unwrap();
    let mut handle = fs.open(&task, "sparse").unwrap();
    let inodefs::Handle::File(file) = &mut handle else {
        panic!("expected a file handle");
    };

    file.seek(4096);
    let mut buf = [0u8; 16];
    assert_eq!(file.read(&fs, &mut buf).unwrap(), 0);

    file.seek(1024);
    let n = file.write(&fs, b"tail").unwrap();
    assert_eq!(n, 4);
    assert_eq!(file.size(&fs), 1028);

    let mut hole = [0xFFu8; 1024];
    file.seek(0);
    assert_eq!(file.read(&fs, &mut hole).unwrap(), 1024);
    assert!(hole.iter().all(|&b| b == 0));

    handle.close(&fs);
    task.close(&fs);
}

#[test]
fn random_content_round_trips_at_an_unaligned_offset() {
    use rand::Rng as _;

    init_logging();
    let fs = fresh(256);
    let task = fs.new_task().unwrap();

    let mut rng = rand::rng();
    let mut data = vec![0u8; 20_000];
    rng.fill(data.as_mut_slice());

    fs.create(&task, "blob", 0, false).unwrap();
    let mut handle = fs.open(&task, "blob").unwrap();
    let inodefs::Handle::File(file) = &mut handle else {
        panic!("expected a file handle");
    };

    let offset = 137;
    file.seek(offset);
    assert_eq!(file.write(&fs, &data).unwrap(), data.len());
    assert_eq!(file.size(&fs), offset + data.len());

    let mut readback = vec![0u8; data.len()];
    file.seek(offset);
    assert_eq!(file.read(&fs, &mut readback).unwrap(), data.len());
    assert_eq!(readback, data);

    handle.close(&fs);
    task.close(&fs);
}

#[test]
fn create_remove_create_reuses_the_name() {
    init_logging();
    let fs = fresh(64);
    let task = fs.new_task().unwrap();

    fs.create(&task, "f", 0, false).unwrap();
    let handle = fs.open(&task, "f").unwrap();
    let first = handle.inumber();
    handle.close(&fs);

    fs.remove(&task, "f").unwrap();
    fs.create(&task, "f", 0, false).unwrap();
    let handle = fs.open(&task, "f").unwrap();
    let second = handle.inumber();
    handle.close(&fs);

    assert_eq!(first, second, "the only freed sector is reallocated first");
    task.close(&fs);
}
