//! 用户帧页池
//!
//! 管理一段内核虚拟地址区间里的用户页。
//! 采用水位线 + 回收栈的分配策略：优先复用已释放的页，
//! 回收栈为空时推进水位线。
//!
//! 区间由上层在启动时提供（真实内核里是物理内存的用户池，
//! 测试里是一块页对齐的泄漏内存）。

use alloc::vec::Vec;
use bitflags::bitflags;
use lazy_static::lazy_static;
use sync::SpinLock;

use crate::config::PGSIZE;

bitflags! {
    /// 页分配标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AllocFlags: u8 {
        /// 分配后清零
        const ZERO = 1 << 0;
    }
}

/// 一个用户帧的内核虚拟地址。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kpage(usize);

impl Kpage {
    pub(crate) const fn new(addr: usize) -> Kpage {
        Kpage(addr)
    }

    /// 内核虚拟地址。
    pub fn addr(self) -> usize {
        self.0
    }

    /// 页内容的只读视图。
    ///
    /// # Safety
    /// 调用者必须保证此页当前由自己持有（已分配且未释放）。
    pub unsafe fn bytes(&self) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self.0 as *const u8, PGSIZE) }
    }

    /// 页内容的可写视图。
    ///
    /// # Safety
    /// 同 [`Kpage::bytes`]，且不得存在其它并发访问。
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn bytes_mut(&self) -> &mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(self.0 as *mut u8, PGSIZE) }
    }
}

/// 页池：水位线 + 回收栈。
struct PagePool {
    base: usize,
    page_cnt: usize,
    /// 水位线：尚未被分配过的第一页下标
    next: usize,
    /// 已释放页的下标栈
    recycled: Vec<usize>,
}

impl PagePool {
    fn alloc(&mut self) -> Option<Kpage> {
        let index = if let Some(i) = self.recycled.pop() {
            i
        } else if self.next < self.page_cnt {
            let i = self.next;
            self.next += 1;
            i
        } else {
            return None;
        };
        Some(Kpage(self.base + index * PGSIZE))
    }

    fn free(&mut self, kpage: Kpage) {
        debug_assert!(kpage.0 >= self.base);
        let index = (kpage.0 - self.base) / PGSIZE;
        debug_assert!(index < self.next);
        debug_assert!(!self.recycled.contains(&index));
        self.recycled.push(index);
    }

    fn free_pages(&self) -> usize {
        self.page_cnt - self.next + self.recycled.len()
    }
}

lazy_static! {
    static ref POOL: SpinLock<PagePool> = SpinLock::new(PagePool {
        base: 0,
        page_cnt: 0,
        next: 0,
        recycled: Vec::new(),
    });
}

/// 初始化页池。base 必须页对齐。
pub fn init(base: usize, page_cnt: usize) {
    assert!(base % PGSIZE == 0);
    let mut pool = POOL.lock();
    pool.base = base;
    pool.page_cnt = page_cnt;
    pool.next = 0;
    pool.recycled.clear();
}

/// 分配一个用户帧；内存耗尽时返回 None。
pub fn alloc(flags: AllocFlags) -> Option<Kpage> {
    let kpage = POOL.lock().alloc()?;
    if flags.contains(AllocFlags::ZERO) {
        // SAFETY: 刚分配的页由调用者独占。
        unsafe { kpage.bytes_mut().fill(0) };
    }
    Some(kpage)
}

/// 归还一个用户帧。
pub fn free(kpage: Kpage) {
    POOL.lock().free(kpage);
}

/// 剩余可分配页数。
pub fn free_pages() -> usize {
    POOL.lock().free_pages()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(pages: usize) -> test_support::SerialGuard {
        let guard = test_support::serial();
        let base = test_support::mock::mem::leak_arena(pages);
        init(base, pages);
        guard
    }

    #[test]
    fn test_alloc_free_recycle() {
        let _guard = setup(4);
        let a = alloc(AllocFlags::empty()).unwrap();
        let b = alloc(AllocFlags::empty()).unwrap();
        assert_ne!(a.addr(), b.addr());
        assert_eq!(free_pages(), 2);

        free(a);
        assert_eq!(free_pages(), 3);

        // 回收的页被优先复用
        let c = alloc(AllocFlags::empty()).unwrap();
        assert_eq!(c.addr(), a.addr());

        let _d = alloc(AllocFlags::empty()).unwrap();
        let _e = alloc(AllocFlags::empty()).unwrap();
        assert!(alloc(AllocFlags::empty()).is_none());
    }

    #[test]
    fn test_zero_flag() {
        let _guard = setup(4);
        let a = alloc(AllocFlags::empty()).unwrap();
        // SAFETY: a 由本测试持有。
        unsafe { a.bytes_mut().fill(0xAB) };
        free(a);

        let b = alloc(AllocFlags::ZERO).unwrap();
        assert_eq!(b.addr(), a.addr());
        // SAFETY: b 由本测试持有。
        assert!(unsafe { b.bytes() }.iter().all(|&x| x == 0));
    }
}
