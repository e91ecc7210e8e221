//! mm ↔ fs 桥接
//!
//! 把文件系统 inode 适配成 mm 的 [`PageFile`]，供文件后备页装载与写回。
//! 桥接句柄持有独立的 inode 引用（无读写位置），生命周期与映射一致。

use alloc::sync::Arc;
use fs::inode::{self, Inode};
use fs::File;
use mm::PageFile;

/// 以 inode 为后备的页文件
pub struct FileBacking {
    inode: Arc<Inode>,
}

impl FileBacking {
    /// 从打开的文件取得后备句柄（inode 引用计数加一）。
    pub fn from_file(file: &File) -> Arc<dyn PageFile> {
        Arc::new(FileBacking {
            inode: inode::reopen(file.inode()),
        })
    }
}

impl PageFile for FileBacking {
    fn len(&self) -> usize {
        self.inode.length()
    }

    fn read_at(&self, buf: &mut [u8], offset: usize) -> usize {
        self.inode.read_at(buf, offset)
    }

    fn write_at(&self, buf: &[u8], offset: usize) -> usize {
        self.inode.write_at(buf, offset)
    }

    fn reopen(&self) -> Option<Arc<dyn PageFile>> {
        Some(Arc::new(FileBacking {
            inode: inode::reopen(&self.inode),
        }))
    }
}

impl Drop for FileBacking {
    fn drop(&mut self) {
        inode::close(self.inode.clone());
    }
}
