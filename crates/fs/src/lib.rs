//! 可扩展文件系统
//!
//! 建立在原始块设备上的文件系统核心：
//!
//! - [`cache`]：写回制扇区缓存，时钟置换，定期刷盘
//! - [`inode`]：按需增深的多级块索引 inode
//! - [`dir`]：带 `.`/`..` 维护的目录层
//! - [`path`]：路径拆分与解析
//! - 空闲扇区表持久化在扇区 0 的位图文件，根目录固定在扇区 1
//!
//! 所有改变目录结构的顶层操作在一把文件系统锁下串行执行。
//! 当前工作目录通过注册的 [`FsContext`] 从进程层取得，
//! 本 crate 不依赖进程管理。

#![no_std]

extern crate alloc;

mod bitmap;
mod error;
mod file;
mod free_map;

pub mod cache;
pub mod dir;
pub mod inode;
pub mod path;

pub use dir::{Dir, DIR_ENTRY_SIZE, NAME_MAX};
pub use error::FsError;
pub use file::File;
pub use free_map::{free_count, is_allocated};

use alloc::string::String;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};
use device::{block_device, BlockRole, Sector};
use lazy_static::lazy_static;
use sync::SpinLock;

/// 位图文件所在扇区
pub const FREE_MAP_SECTOR: Sector = 0;

/// 根目录所在扇区
pub const ROOT_DIR_SECTOR: Sector = 1;

// ============================================================================
// 进程上下文注册
// ============================================================================

/// 进程层提供给文件系统的上下文
pub trait FsContext: Send + Sync {
    /// 当前进程工作目录的 inode 扇区；None 表示使用根目录。
    fn current_dir(&self) -> Option<Sector>;
}

static CONTEXT_DATA: AtomicUsize = AtomicUsize::new(0);
static CONTEXT_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册进程上下文实现
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次
pub unsafe fn register_context(ctx: &'static dyn FsContext) {
    let ptr = ctx as *const dyn FsContext;
    // SAFETY: fat pointer 的布局是 (data, vtable)
    let (data, vtable) =
        unsafe { core::mem::transmute::<*const dyn FsContext, (usize, usize)>(ptr) };
    CONTEXT_DATA.store(data, Ordering::Release);
    CONTEXT_VTABLE.store(vtable, Ordering::Release);
}

/// 取得注册的进程上下文；未注册时返回 None。
pub(crate) fn context() -> Option<&'static dyn FsContext> {
    let data = CONTEXT_DATA.load(Ordering::Acquire);
    let vtable = CONTEXT_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        return None;
    }
    // SAFETY: data 和 vtable 是通过 register_context 设置的有效指针
    Some(unsafe { &*core::mem::transmute::<(usize, usize), *const dyn FsContext>((data, vtable)) })
}

// ============================================================================
// 顶层操作
// ============================================================================

lazy_static! {
    /// 文件系统大锁：目录结构变更在此锁下串行。
    static ref FS_LOCK: SpinLock<()> = SpinLock::new(());
}

/// 初始化文件系统。format 为 true 时先格式化设备。
pub fn init(format: bool) -> Result<(), FsError> {
    let dev = block_device(BlockRole::FileSys).expect("no file system device found");

    cache::init(dev.clone());
    inode::init();
    free_map::init(dev.total_sectors());

    if format {
        do_format()?;
    }

    free_map::open()?;
    cache::enable();
    log::info!(
        "fs: initialized, {} sectors, {} free",
        dev.total_sectors(),
        free_count()
    );
    Ok(())
}

/// 关闭文件系统：写回缓存、落盘位图。
pub fn done() {
    free_map::close();
    cache::disable();
    log::info!("fs: shut down");
}

fn do_format() -> Result<(), FsError> {
    log::info!("fs: formatting file system");
    free_map::create()?;

    if !dir::create(ROOT_DIR_SECTOR) {
        return Err(FsError::NoSpace);
    }

    // 根目录的 `.` 与 `..` 都指向自身。
    let root = Dir::open_root()?;
    root.add_dot_entries(&root)?;

    free_map::close();
    Ok(())
}

/// 按路径前缀解析目录；前缀为空时打开当前工作目录。
fn resolve_dir(prefix: &str) -> Result<Dir, FsError> {
    if prefix.is_empty() {
        return Dir::open_current();
    }

    let mut dir = if path::is_absolute(prefix) {
        Dir::open_root()?
    } else {
        Dir::open_current()?
    };

    for token in path::components(prefix) {
        let inode = dir.lookup(token)?;
        // Dir::open 检查目录类型并在失败时关闭 inode。
        dir = Dir::open(inode)?;
    }

    Ok(dir)
}

/// 在 path 处创建长度 initial_size 的文件。
pub fn create(path: &str, initial_size: usize) -> Result<(), FsError> {
    let _guard = FS_LOCK.lock();

    let (parent, base) = path::split(path);
    if base.is_empty() || base == "/" {
        return Err(FsError::InvalidPath);
    }
    // 带尾部斜杠的名字是目录写法，不能用于文件。
    if path.ends_with(path::PATH_SEPARATOR) {
        return Err(FsError::InvalidPath);
    }

    let parent_dir = resolve_dir(parent)?;
    let sector = free_map::allocate().ok_or(FsError::NoSpace)?;

    if !inode::create(sector, initial_size, false) {
        inode::discard(sector);
        free_map::release(sector);
        return Err(FsError::NoSpace);
    }

    if let Err(e) = parent_dir.add(base, sector) {
        inode::discard(sector);
        free_map::release(sector);
        return Err(e);
    }

    Ok(())
}

/// 在 path 处创建目录，自动写入 `.` 与 `..`。
pub fn create_dir(path: &str) -> Result<(), FsError> {
    let _guard = FS_LOCK.lock();

    let (parent, base) = path::split(path);
    if base.is_empty() || base == "/" {
        return Err(FsError::InvalidPath);
    }

    let parent_dir = resolve_dir(parent)?;
    let sector = free_map::allocate().ok_or(FsError::NoSpace)?;

    if !dir::create(sector) {
        inode::discard(sector);
        free_map::release(sector);
        return Err(FsError::NoSpace);
    }

    if let Err(e) = parent_dir.add(base, sector) {
        inode::discard(sector);
        free_map::release(sector);
        return Err(e);
    }

    let new_inode = match inode::open(sector) {
        Some(i) => i,
        None => return Err(FsError::IoError),
    };
    let new_dir = Dir::open(new_inode)?;
    if let Err(e) = new_dir.add_dot_entries(&parent_dir) {
        drop(new_dir);
        let _ = parent_dir.remove(base);
        return Err(e);
    }

    Ok(())
}

/// 打开 path 处的文件。末级若是目录则以文件方式打开该目录。
pub fn open(path: &str) -> Result<File, FsError> {
    let _guard = FS_LOCK.lock();
    open_locked(path)
}

fn open_locked(path: &str) -> Result<File, FsError> {
    if path.is_empty() {
        return Err(FsError::NotFound);
    }

    let mut dir_opt = Some(if path::is_absolute(path) {
        Dir::open_root()?
    } else {
        Dir::open_current()?
    });
    let mut file: Option<File> = None;

    for token in path::components(path) {
        // 上一轮已经落在文件上却还有后续组件：路径非法。
        let dir = dir_opt.take().ok_or(FsError::NotDirectory)?;

        let inode = dir.lookup(token)?;
        drop(dir);

        if inode.is_dir() {
            dir_opt = Some(Dir::open(inode)?);
        } else {
            file = Some(File::new(inode));
        }
    }

    // 解析落在目录上：把目录当文件重新打开。
    if let Some(dir) = dir_opt {
        let inode = inode::reopen(dir.inode());
        drop(dir);
        return Ok(File::new(inode));
    }

    file.ok_or(FsError::NotFound)
}

/// 打开 path 处的目录。
pub fn open_dir(path: &str) -> Result<Dir, FsError> {
    let _guard = FS_LOCK.lock();
    if path.is_empty() {
        return Err(FsError::NotFound);
    }
    resolve_dir(path)
}

/// 删除 path 处的文件或空目录。
pub fn remove(path: &str) -> Result<(), FsError> {
    let _guard = FS_LOCK.lock();

    let (parent, base) = path::split(path);
    if base.is_empty() || base == "/" {
        return Err(FsError::InvalidPath);
    }

    let parent_dir = resolve_dir(parent)?;
    parent_dir.remove(base)
}

/// 列出 path 处目录的所有名字（`.`/`..` 除外）。
pub fn readdir(path: &str) -> Result<Vec<String>, FsError> {
    let mut dir = open_dir(path)?;
    let mut names = Vec::new();
    while let Some(name) = dir.read_next() {
        names.push(name);
    }
    Ok(names)
}
