//! 测试内存竞技场
//!
//! 内核页池需要一段页对齐的"内核地址"区间；宿主机测试中
//! 用一块泄漏的堆内存充当。

use alloc::alloc::{alloc_zeroed, Layout};

/// 页大小必须与 mm crate 的 PGSIZE 一致。
pub const PAGE_SIZE: usize = 4096;

/// 分配并泄漏 `pages` 个页对齐的清零页，返回基地址。
///
/// 内存是有意泄漏的：页池在整个测试进程生命周期内复用同一块区间。
pub fn leak_arena(pages: usize) -> usize {
    let layout = Layout::from_size_align(pages * PAGE_SIZE, PAGE_SIZE).unwrap();
    // SAFETY: layout 非零大小，分配失败时显式 panic。
    let ptr = unsafe { alloc_zeroed(layout) };
    assert!(!ptr.is_null(), "test arena allocation failed");
    ptr as usize
}
