//! 块缓存集成测试：写回、关闭刷盘、定期刷盘、持久性

mod common;

use fs::cache;

#[test]
fn test_dirty_data_written_back_on_done() {
    let (_guard, disk) = common::setup();

    fs::create("/persist", 0).unwrap();
    {
        let mut file = fs::open("/persist").unwrap();
        assert_eq!(file.write(b"survives shutdown"), 17);
    }

    // 关闭会刷掉缓存里的全部脏扇区。
    fs::done();

    let raw = disk.raw_data();
    let needle = b"survives shutdown";
    assert!(
        raw.windows(needle.len()).any(|w| w == needle),
        "file content not written back to disk"
    );
}

#[test]
fn test_remount_preserves_contents() {
    let (_guard, _disk) = common::setup();

    fs::create_dir("/boot").unwrap();
    fs::create("/boot/cfg", 0).unwrap();
    {
        let mut file = fs::open("/boot/cfg").unwrap();
        assert_eq!(file.write(b"timeout=5"), 9);
    }
    fs::done();

    // 不格式化地重新初始化：内容应当原样可见。
    fs::init(false).unwrap();
    let file = fs::open("/boot/cfg").unwrap();
    let mut buf = [0u8; 9];
    assert_eq!(file.read_at(&mut buf, 0), 9);
    assert_eq!(&buf, b"timeout=5");
    drop(file);

    assert_eq!(fs::readdir("/boot").unwrap(), vec!["cfg".to_string()]);

    fs::done();
}

#[test]
fn test_flush_clears_dirty_slots() {
    let (_guard, _disk) = common::setup();

    fs::create("/d", 0).unwrap();
    let mut file = fs::open("/d").unwrap();
    assert_eq!(file.write(&[0x5A; 2000]), 2000);
    assert!(cache::dirty_count() > 0);

    cache::flush();
    assert_eq!(cache::dirty_count(), 0);

    fs::done();
}

#[test]
fn test_periodic_tick_arms_flush_on_next_write() {
    let (_guard, _disk) = common::setup();

    fs::create("/t", 0).unwrap();
    let mut file = fs::open("/t").unwrap();
    assert_eq!(file.write(&[1u8; 600]), 600);
    assert!(cache::dirty_count() > 0);

    // 计满一个刷盘周期。
    for _ in 0..10_000 {
        cache::tick();
    }

    // 下一次写顺带把所有脏扇区刷下去。
    assert_eq!(file.write_at(&[2u8; 4], 0), 4);
    assert_eq!(cache::dirty_count(), 0);

    fs::done();
}

#[test]
fn test_cache_capacity_eviction_is_transparent() {
    let (_guard, _disk) = common::setup();

    // 写出远超缓存容量（64 扇区）的数据再读回。
    fs::create("/big", 0).unwrap();
    let file = fs::open("/big").unwrap();

    let payload: Vec<u8> = (0..100 * 512).map(|i| (i % 239) as u8).collect();
    assert_eq!(file.write_at(&payload, 0), payload.len());

    let mut back = vec![0u8; payload.len()];
    assert_eq!(file.read_at(&mut back, 0), payload.len());
    assert_eq!(back, payload);

    fs::done();
}
