//! 块设备接口与角色表
//!
//! 内核按"角色"使用块设备：文件系统盘和交换盘。
//! 驱动在启动时按角色注册，子系统通过 [`block_device`] 取得自己的设备。

mod ram_disk;

use alloc::sync::Arc;
use lazy_static::lazy_static;
use sync::SpinLock;

pub use ram_disk::RamDisk;

/// 扇区大小（字节）
pub const SECTOR_SIZE: usize = 512;

/// 扇区号
pub type Sector = u32;

/// 块设备的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRole {
    /// 文件系统所在设备
    FileSys,
    /// 交换区所在设备
    Swap,
}

impl BlockRole {
    const COUNT: usize = 2;

    fn index(self) -> usize {
        match self {
            BlockRole::FileSys => 0,
            BlockRole::Swap => 1,
        }
    }
}

/// 块设备驱动程序接口
///
/// 所有 I/O 以整扇区为单位，实现方保证读写在返回时已完成。
pub trait BlockDriver: Send + Sync {
    /// 读取一个扇区到 buf（长度必须为 SECTOR_SIZE）
    ///
    /// 读取成功返回 true
    fn read_block(&self, sector: Sector, buf: &mut [u8]) -> bool;

    /// 将 buf 写入一个扇区（长度必须为 SECTOR_SIZE）
    ///
    /// 写入成功返回 true
    fn write_block(&self, sector: Sector, buf: &[u8]) -> bool;

    /// 将设备内部缓冲刷新到介质
    fn flush(&self) -> bool {
        true
    }

    /// 设备总扇区数
    fn total_sectors(&self) -> usize;
}

lazy_static! {
    /// 全局块设备角色表
    static ref ROLE_TABLE: SpinLock<[Option<Arc<dyn BlockDriver>>; BlockRole::COUNT]> =
        SpinLock::new([None, None]);
}

/// 将驱动注册到指定角色，返回之前注册的驱动（如有）。
pub fn register_block_device(
    role: BlockRole,
    driver: Arc<dyn BlockDriver>,
) -> Option<Arc<dyn BlockDriver>> {
    let mut table = ROLE_TABLE.lock();
    let slot = &mut table[role.index()];
    let old = slot.take();
    log::debug!("block: register role {:?} ({} sectors)", role, driver.total_sectors());
    *slot = Some(driver);
    old
}

/// 取得指定角色的块设备。
pub fn block_device(role: BlockRole) -> Option<Arc<dyn BlockDriver>> {
    ROLE_TABLE.lock()[role.index()].clone()
}
