//! 空闲扇区表
//!
//! 一位对应一个扇区。位图本体持久化在 FREE_MAP_SECTOR 处的位图文件里；
//! 打开期间的每次分配/释放都写穿到该文件。

use alloc::sync::Arc;
use lazy_static::lazy_static;
use sync::SpinLock;

use crate::bitmap::Bitmap;
use crate::inode::{self, Inode};
use crate::{FsError, FREE_MAP_SECTOR, ROOT_DIR_SECTOR};
use device::Sector;

struct FreeMap {
    bits: Bitmap,
    file: Option<Arc<Inode>>,
}

lazy_static! {
    static ref FREE_MAP: SpinLock<FreeMap> = SpinLock::new(FreeMap {
        bits: Bitmap::new(0),
        file: None,
    });
}

/// 初始化空闲扇区表：位图覆盖整个设备，保留位图扇区与根目录扇区。
pub fn init(total_sectors: usize) {
    let mut fm = FREE_MAP.lock();
    fm.bits = Bitmap::new(total_sectors);
    fm.bits.set(FREE_MAP_SECTOR as usize, true);
    fm.bits.set(ROOT_DIR_SECTOR as usize, true);
    fm.file = None;
}

/// 分配一个空闲扇区。
pub fn allocate() -> Option<Sector> {
    let mut fm = FREE_MAP.lock();
    let idx = fm.bits.scan_and_flip()?;
    write_through(&mut fm);
    Some(idx as Sector)
}

/// 释放一个扇区。
pub fn release(sector: Sector) {
    let mut fm = FREE_MAP.lock();
    debug_assert!(fm.bits.test(sector as usize), "releasing a free sector");
    fm.bits.set(sector as usize, false);
    write_through(&mut fm);
}

/// 把位图写进位图文件（文件未打开时跳过）。
fn write_through(fm: &mut FreeMap) {
    if let Some(file) = &fm.file {
        let written = file.write_at(fm.bits.bytes(), 0);
        debug_assert_eq!(written, fm.bits.byte_len());
    }
}

/// 格式化时创建位图文件并写入当前位图。
pub fn create() -> Result<(), FsError> {
    let byte_len = FREE_MAP.lock().bits.byte_len();
    if !inode::create(FREE_MAP_SECTOR, byte_len, false) {
        return Err(FsError::NoSpace);
    }

    let file = inode::open(FREE_MAP_SECTOR).ok_or(FsError::IoError)?;
    let mut fm = FREE_MAP.lock();
    fm.file = Some(file);
    write_through(&mut fm);
    Ok(())
}

/// 从位图文件读入位图并保持其打开。
pub fn open() -> Result<(), FsError> {
    let file = inode::open(FREE_MAP_SECTOR).ok_or(FsError::IoError)?;
    let mut fm = FREE_MAP.lock();
    let n = file.read_at(fm.bits.bytes_mut(), 0);
    if n != fm.bits.byte_len() {
        return Err(FsError::IoError);
    }
    fm.file = Some(file);
    Ok(())
}

/// 写回位图并关闭位图文件。
pub fn close() {
    let file = {
        let mut fm = FREE_MAP.lock();
        write_through(&mut fm);
        fm.file.take()
    };
    if let Some(file) = file {
        inode::close(file);
    }
}

/// 空闲扇区数（用于测试）
pub fn free_count() -> usize {
    let fm = FREE_MAP.lock();
    fm.bits.len() - fm.bits.count_set()
}

/// 指定扇区是否已分配（用于测试）
pub fn is_allocated(sector: Sector) -> bool {
    FREE_MAP.lock().bits.test(sector as usize)
}
