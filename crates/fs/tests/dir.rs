//! 目录层集成测试：`.`/`..`、路径解析、删除语义

mod common;

#[test]
fn test_mkdir_and_readdir_hides_dot_entries() {
    let (_guard, _disk) = common::setup();

    fs::create_dir("/a").unwrap();
    fs::create_dir("/a/b").unwrap();

    // readdir 不返回 `.` 和 `..`。
    assert_eq!(fs::readdir("/a").unwrap(), vec!["b".to_string()]);
    assert!(fs::readdir("/a/b").unwrap().is_empty());

    fs::done();
}

#[test]
fn test_dotdot_resolves_to_parent() {
    let (_guard, _disk) = common::setup();

    fs::create_dir("/a").unwrap();
    fs::create_dir("/a/b").unwrap();

    let direct = fs::open("/a/b").unwrap();
    let via_dots = fs::open("/a/b/../b").unwrap();
    assert_eq!(direct.inode().sector(), via_dots.inode().sector());

    // `.` 指向自身。
    let via_dot = fs::open("/a/b/.").unwrap();
    assert_eq!(direct.inode().sector(), via_dot.inode().sector());

    fs::done();
}

#[test]
fn test_root_dot_entries_point_to_root() {
    let (_guard, _disk) = common::setup();

    let root = fs::open("/").unwrap();
    let dot = fs::open("/.").unwrap();
    let dotdot = fs::open("/..").unwrap();
    assert_eq!(root.inode().sector(), dot.inode().sector());
    assert_eq!(root.inode().sector(), dotdot.inode().sector());

    fs::done();
}

#[test]
fn test_create_in_subdirectory_and_open_by_path() {
    let (_guard, _disk) = common::setup();

    fs::create_dir("/etc").unwrap();
    fs::create("/etc/passwd", 0).unwrap();

    let mut file = fs::open("/etc/passwd").unwrap();
    assert_eq!(file.write(b"root:x:0"), 8);

    let file2 = fs::open("/etc/../etc/passwd").unwrap();
    let mut buf = [0u8; 8];
    assert_eq!(file2.read_at(&mut buf, 0), 8);
    assert_eq!(&buf, b"root:x:0");

    fs::done();
}

#[test]
fn test_duplicate_names_rejected() {
    let (_guard, _disk) = common::setup();

    fs::create("/x", 0).unwrap();
    assert_eq!(fs::create("/x", 0), Err(fs::FsError::AlreadyExists));
    assert_eq!(fs::create_dir("/x"), Err(fs::FsError::AlreadyExists));

    fs::done();
}

#[test]
fn test_name_length_limit() {
    let (_guard, _disk) = common::setup();

    // NAME_MAX = 14
    fs::create("/abcdefghijklmn", 0).unwrap();
    assert_eq!(
        fs::create("/abcdefghijklmno", 0),
        Err(fs::FsError::NameTooLong)
    );

    fs::done();
}

#[test]
fn test_remove_nonempty_directory_fails() {
    let (_guard, _disk) = common::setup();

    fs::create_dir("/d").unwrap();
    fs::create("/d/f", 0).unwrap();

    assert_eq!(fs::remove("/d"), Err(fs::FsError::DirectoryNotEmpty));

    // 清空后可以删除；`.`/`..` 不算内容。
    fs::remove("/d/f").unwrap();
    fs::remove("/d").unwrap();
    assert!(fs::open("/d").is_err());

    fs::done();
}

#[test]
fn test_remove_missing_path() {
    let (_guard, _disk) = common::setup();

    assert_eq!(fs::remove("/nothing"), Err(fs::FsError::NotFound));
    assert_eq!(fs::remove("/no/such/dir"), Err(fs::FsError::NotFound));

    fs::done();
}

#[test]
fn test_file_component_mid_path_fails() {
    let (_guard, _disk) = common::setup();

    fs::create("/plain", 0).unwrap();
    assert!(matches!(
        fs::open("/plain/sub"),
        Err(fs::FsError::NotDirectory)
    ));

    fs::done();
}

#[test]
fn test_trailing_slash_semantics() {
    let (_guard, _disk) = common::setup();

    // 文件名带尾斜杠是目录写法，创建文件被拒绝。
    assert_eq!(fs::create("/f/", 0), Err(fs::FsError::InvalidPath));

    // 目录创建允许尾斜杠。
    fs::create_dir("/dir/").unwrap();
    assert!(fs::readdir("/dir").unwrap().is_empty());

    fs::done();
}

#[test]
fn test_open_directory_as_file() {
    let (_guard, _disk) = common::setup();

    fs::create_dir("/opened").unwrap();
    let file = fs::open("/opened").unwrap();
    assert!(file.inode().is_dir());
    // 目录内容是目录项数组，长度非零。
    assert!(file.len() > 0);

    fs::done();
}
