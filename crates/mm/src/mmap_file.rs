//! 内存映射文件
//!
//! 把一个文件按页映射进对齐的用户虚拟区间：每页一个 Mmap 类型的
//! SPT 表项，内容按需装入，脏页在卸载/换出/解除映射时写回文件。
//! 映射持有独立重开的文件句柄，不受原句柄关闭影响。

use alloc::sync::Arc;

use crate::config::{PGMASK, PGSIZE};
use crate::file::PageFile;
use crate::page::{FileSlice, SuppTable};

/// 一个活动的文件映射
pub struct MmapFile {
    file: Arc<dyn PageFile>,
    uaddr: usize,
    page_cnt: usize,
}

impl MmapFile {
    /// 在 uaddr 处建立 file 的映射。
    ///
    /// uaddr 必须页对齐且非零。任何一页与既有表项重叠都会使映射失败，
    /// 已插入的页全部回退。空文件不可映射。
    pub fn create(spt: &mut SuppTable, file: &Arc<dyn PageFile>, uaddr: usize) -> Option<MmapFile> {
        assert!(uaddr != 0);
        assert!(uaddr & PGMASK == 0);

        let file = file.reopen()?;
        let len = file.len();
        if len == 0 {
            return None;
        }
        let page_cnt = len.div_ceil(PGSIZE);

        for p in 0..page_cnt {
            let offset = p * PGSIZE;
            let read_bytes = core::cmp::min(PGSIZE, len - offset);
            let slice = FileSlice {
                file: file.clone(),
                offset,
                read_bytes,
                zero_bytes: PGSIZE - read_bytes,
            };

            if spt.insert_mmap(uaddr + offset, slice, true).is_none() {
                // 与既有映射重叠：回退之前插入的页。
                log::debug!("mmap: overlap at {:#x}, unwinding", uaddr + offset);
                for q in 0..p {
                    spt.destroy(uaddr + q * PGSIZE);
                }
                return None;
            }
        }

        Some(MmapFile {
            file,
            uaddr,
            page_cnt,
        })
    }

    /// 解除映射：逐页销毁表项（脏页随之写回），关闭文件句柄。
    pub fn destroy(self, spt: &mut SuppTable) {
        for p in 0..self.page_cnt {
            let ok = spt.destroy(self.uaddr + p * PGSIZE);
            assert!(ok, "mmap page vanished from page table");
        }
        // self.file 随 self 一起释放
    }

    /// 映射的起始用户地址。
    pub fn uaddr(&self) -> usize {
        self.uaddr
    }

    /// 映射的页数。
    pub fn page_cnt(&self) -> usize {
        self.page_cnt
    }
}
