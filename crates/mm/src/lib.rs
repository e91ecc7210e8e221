//! 虚拟内存子系统
//!
//! 请求调页的核心：
//!
//! - [`page`]：每进程的补充页表（SPT）与页状态机
//! - [`frame`]：全局帧表、时钟换出
//! - [`swap`]：交换区位图与页粒度读写
//! - [`kpage`]：用户帧页池（水位线 + 回收栈）
//! - [`page_dir`]：软件页目录，脏位/访问位的权威来源
//! - [`mmap_file`]：内存映射文件
//! - [`uaccess`]：内核对用户内存的受控访问
//!
//! 文件后备页经由 [`PageFile`] trait 访问文件系统，
//! 本 crate 不依赖具体文件系统实现。
//!
//! # 初始化顺序
//!
//! 1. [`kpage::init`]：提供用户帧区间
//! 2. [`frame::init`]、[`swap::init`]：清空帧表、按交换盘建位图

#![no_std]

extern crate alloc;

pub mod config;
pub mod frame;
pub mod kpage;
pub mod mmap_file;
pub mod page;
pub mod page_dir;
pub mod swap;
pub mod uaccess;

mod file;

pub use config::{PGMASK, PGSIZE, PHYS_BASE};
pub use file::PageFile;
pub use kpage::{AllocFlags, Kpage};
pub use mmap_file::MmapFile;
pub use page::{FileSlice, PageEntry, PageKind, PageRef, PageState, SuppTable};
pub use page_dir::PageDir;
