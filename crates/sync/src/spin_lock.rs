//! 票号自旋锁
//!
//! 领号/叫号两个计数器实现 FIFO 公平的互斥：竞争者先领号，再自旋
//! 等待叫号追上自己的号，释放即叫下一个号。帧表、块缓存这类全局
//! 热点上排队者按到达顺序获得锁，不会被后来者插队饿死。
//!
//! 持锁期间中断保持关闭（经 [`push_off`]/[`pop_off`] 配对计数），
//! 锁因此不可重入：同一执行流嵌套取同一把锁会在自旋中死锁。

use core::cell::UnsafeCell;
use core::hint;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::intr::{pop_off, push_off};

/// 带数据的票号自旋锁。
pub struct SpinLock<T> {
    /// 下一个待发的号
    next_ticket: AtomicUsize,
    /// 正在叫的号
    serving: AtomicUsize,
    data: UnsafeCell<T>,
}

impl<T> SpinLock<T> {
    /// 创建一个新的 SpinLock 实例。
    pub const fn new(data: T) -> Self {
        SpinLock {
            next_ticket: AtomicUsize::new(0),
            serving: AtomicUsize::new(0),
            data: UnsafeCell::new(data),
        }
    }

    /// 领号并等待叫号，返回可访问内部数据的 RAII 保护器。
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        push_off();

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        while self.serving.load(Ordering::Acquire) != ticket {
            hint::spin_loop();
        }

        SpinLockGuard { lock: self }
    }

    /// 只在队列为空时取锁，不排队。
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        push_off();

        let serving = self.serving.load(Ordering::Acquire);
        // 叫号与发号一致说明锁空闲；把发号推进一格就等于直接领到号。
        if self
            .next_ticket
            .compare_exchange(serving, serving + 1, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(SpinLockGuard { lock: self })
        } else {
            pop_off();
            None
        }
    }

    /// 是否有人持有或排队（仅用于调试/测试）
    #[cfg(test)]
    pub fn is_contended(&self) -> bool {
        self.serving.load(Ordering::Relaxed) != self.next_ticket.load(Ordering::Relaxed)
    }
}

/// SpinLock 的 RAII 保护器。离开作用域时叫下一个号并恢复中断配对。
pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // SAFETY: 持有号即独占数据。
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: 同上。
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.serving.fetch_add(1, Ordering::Release);
        pop_off();
    }
}

// Safety: 票号机制保证同一时刻只有一个保护器存在。
unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}
