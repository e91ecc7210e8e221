//! 内核访问用户内存
//!
//! 经页目录逐页翻译后拷贝，同时维护访问位与脏位。
//! 目标页必须已映射（调用者先通过缺页或 pin 把页装好）；
//! 未映射或权限不符时返回 false，不做部分拷贝之外的补救。

use alloc::sync::Arc;
use core::cmp::min;
use sync::SpinLock;

use crate::config::{pg_round_down, PGSIZE};
use crate::page_dir::PageDir;

/// 把 src 拷入用户地址 uaddr 处。目标页必须已映射且可写。
pub fn copy_to_user(pagedir: &Arc<SpinLock<PageDir>>, uaddr: usize, src: &[u8]) -> bool {
    let mut done = 0;

    while done < src.len() {
        let addr = uaddr + done;
        let upage = pg_round_down(addr);
        let page_ofs = addr - upage;
        let chunk = min(src.len() - done, PGSIZE - page_ofs);

        let mut pd = pagedir.lock();
        let kpage = match pd.get_page(upage) {
            Some(k) => k,
            None => return false,
        };
        if !pd.is_writable(upage) {
            return false;
        }

        // SAFETY: 映射存在则帧有效；页内偏移经 chunk 约束不越界。
        unsafe {
            core::ptr::copy_nonoverlapping(
                src[done..].as_ptr(),
                (kpage.addr() + page_ofs) as *mut u8,
                chunk,
            );
        }
        pd.set_accessed(upage, true);
        pd.set_dirty(upage, true);

        done += chunk;
    }

    true
}

/// 从用户地址 uaddr 处拷出到 dst。来源页必须已映射。
pub fn copy_from_user(pagedir: &Arc<SpinLock<PageDir>>, uaddr: usize, dst: &mut [u8]) -> bool {
    let mut done = 0;

    while done < dst.len() {
        let addr = uaddr + done;
        let upage = pg_round_down(addr);
        let page_ofs = addr - upage;
        let chunk = min(dst.len() - done, PGSIZE - page_ofs);

        let mut pd = pagedir.lock();
        let kpage = match pd.get_page(upage) {
            Some(k) => k,
            None => return false,
        };

        // SAFETY: 同 copy_to_user。
        unsafe {
            core::ptr::copy_nonoverlapping(
                (kpage.addr() + page_ofs) as *const u8,
                dst[done..].as_mut_ptr(),
                chunk,
            );
        }
        pd.set_accessed(upage, true);

        done += chunk;
    }

    true
}
