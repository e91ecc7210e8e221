//! 测试公共设施：内存盘上的新鲜文件系统

use device::{register_block_device, BlockRole, RamDisk};
use std::sync::Arc;

/// 文件系统测试盘的扇区数
pub const DISK_SECTORS: usize = 1024;

/// 建立一块新内存盘并格式化文件系统。
///
/// 返回的保护器同时串行化测试并保持 Mock 架构注册。
pub fn setup() -> (test_support::SerialGuard, Arc<RamDisk>) {
    let guard = test_support::serial();

    let disk = RamDisk::new(DISK_SECTORS);
    let _ = register_block_device(BlockRole::FileSys, disk.clone());
    fs::init(true).expect("format failed");

    (guard, disk)
}
