//! 进程资源层
//!
//! 把文件系统和虚拟内存整合到进程粒度：
//!
//! - [`FdTable`]：fd ≥ 2 的稠密描述符表，扫描失败时翻倍
//! - [`MmapTable`]：活动内存映射的标识表
//! - [`Process`]：页目录 + 补充页表 + 描述符/映射表 + 工作目录 +
//!   写保护的可执行文件；`exit()` 按序回收全部资源
//! - [`FileBacking`]：把 inode 适配成 mm 的页后备文件
//!
//! 使用前先 [`init`] 注册文件系统上下文。

#![no_std]

extern crate alloc;

mod bridge;
mod fd_table;
mod mmap_table;
mod process;

pub use bridge::FileBacking;
pub use fd_table::FdTable;
pub use mmap_table::MmapTable;
pub use process::{activate, deactivate, init, CwdCell, Process};
