//! 测试公共设施：完整的"机器"——文件系统盘 + 交换盘 + 用户帧

use device::{register_block_device, BlockRole, RamDisk};
use mm::{frame, kpage, swap};

/// 文件系统盘扇区数
pub const FS_SECTORS: usize = 1024;

/// 交换盘扇区数（= 32 个页槽）
pub const SWAP_SECTORS: usize = 32 * 8;

/// 建立一台新机器：格式化的文件系统、空交换区、frames 个用户帧。
pub fn boot(frames: usize) -> test_support::SerialGuard {
    let guard = test_support::serial();

    let _ = register_block_device(BlockRole::FileSys, RamDisk::new(FS_SECTORS));
    let _ = register_block_device(BlockRole::Swap, RamDisk::new(SWAP_SECTORS));

    fs::init(true).expect("format failed");

    let base = test_support::mock::mem::leak_arena(frames);
    kpage::init(base, frames);
    frame::init();
    swap::init();

    process::init();
    process::deactivate();

    guard
}

/// 写一个带内容的文件。
pub fn write_file(path: &str, content: &[u8]) {
    fs::create(path, 0).unwrap();
    let mut file = fs::open(path).unwrap();
    assert_eq!(file.write(content), content.len());
}

/// 读出整个文件。
pub fn read_file(path: &str) -> Vec<u8> {
    let file = fs::open(path).unwrap();
    let mut buf = vec![0u8; file.len()];
    assert_eq!(file.read_at(&mut buf, 0), buf.len());
    buf
}
