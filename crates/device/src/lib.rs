//! 块设备层
//!
//! 提供块设备驱动接口、按角色注册的设备表以及内存模拟块设备。
//! 真实磁盘/控制台驱动属于外部协作者，这里只定义它们必须满足的接口。

#![no_std]

extern crate alloc;

mod block;

pub use block::{
    block_device, register_block_device, BlockDriver, BlockRole, RamDisk, Sector, SECTOR_SIZE,
};
