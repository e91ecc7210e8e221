//! 测试公共设施：页池竞技场、交换盘与内存后备文件

use device::{register_block_device, BlockRole, RamDisk};
use mm::{frame, kpage, swap, PageDir, PageFile, SuppTable};
use std::sync::{Arc, Mutex};
use sync::SpinLock;

/// 交换盘扇区数（= 64 个页槽）
pub const SWAP_SECTORS: usize = 64 * 8;

/// 建立新鲜的 VM 环境：frames 个用户帧 + 64 槽交换区。
pub fn setup(frames: usize) -> test_support::SerialGuard {
    let guard = test_support::serial();

    let base = test_support::mock::mem::leak_arena(frames);
    kpage::init(base, frames);
    frame::init();

    let swap_disk = RamDisk::new(SWAP_SECTORS);
    let _ = register_block_device(BlockRole::Swap, swap_disk);
    swap::init();

    guard
}

/// 新建一张空的补充页表（带自己的页目录）。
pub fn new_table() -> SuppTable {
    SuppTable::new(Arc::new(SpinLock::new(PageDir::new())))
}

/// 内存后备的页文件，模拟可 mmap 的文件。
pub struct MemFile {
    data: Mutex<Vec<u8>>,
}

impl MemFile {
    pub fn new(data: Vec<u8>) -> Arc<MemFile> {
        Arc::new(MemFile {
            data: Mutex::new(data),
        })
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }
}

impl PageFile for MemFile {
    fn len(&self) -> usize {
        self.data.lock().unwrap().len()
    }

    fn read_at(&self, buf: &mut [u8], offset: usize) -> usize {
        let data = self.data.lock().unwrap();
        if offset >= data.len() {
            return 0;
        }
        let n = buf.len().min(data.len() - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        n
    }

    fn write_at(&self, buf: &[u8], offset: usize) -> usize {
        let mut data = self.data.lock().unwrap();
        if offset >= data.len() {
            return 0;
        }
        let n = buf.len().min(data.len() - offset);
        data[offset..offset + n].copy_from_slice(buf);
        n
    }

    fn reopen(&self) -> Option<Arc<dyn PageFile>> {
        // 内存文件没有独立游标，重开就是共享同一份数据。
        None
    }
}

/// 可重开的包装：reopen 返回共享同一 MemFile 的新句柄。
pub struct SharedFile(pub Arc<MemFile>);

impl PageFile for SharedFile {
    fn len(&self) -> usize {
        self.0.len()
    }

    fn read_at(&self, buf: &mut [u8], offset: usize) -> usize {
        self.0.read_at(buf, offset)
    }

    fn write_at(&self, buf: &[u8], offset: usize) -> usize {
        self.0.write_at(buf, offset)
    }

    fn reopen(&self) -> Option<Arc<dyn PageFile>> {
        Some(Arc::new(SharedFile(self.0.clone())))
    }
}
