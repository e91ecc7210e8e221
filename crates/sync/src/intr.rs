//! 关中断的嵌套配对
//!
//! 临界区会嵌套：持一把锁时常常还要取第二把。关中断因此按深度计数，
//! 两次 push_off 需要两次 pop_off 才会真正恢复中断；进入前中断本来
//! 就是关的，退出后保持关闭。单 CPU 内核一份全局计数就够了。

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::arch_ops;

/// 当前关中断嵌套深度
static DEPTH: AtomicUsize = AtomicUsize::new(0);

/// 最外层 push_off 进入前的中断状态
static SAVED_FLAGS: AtomicUsize = AtomicUsize::new(0);

/// 关闭中断，嵌套深度加一。最外层调用记录进入前的状态。
pub fn push_off() {
    // SAFETY: 与 pop_off 配对，保存的状态只在最外层恢复一次。
    let flags = unsafe { arch_ops().read_and_disable_interrupts() };
    if DEPTH.fetch_add(1, Ordering::Acquire) == 0 {
        SAVED_FLAGS.store(flags, Ordering::Relaxed);
    }
}

/// 嵌套深度减一，最外层恢复进入时的中断状态。
///
/// 没有配对的 push_off 就调用是内核缺陷，直接停机。
pub fn pop_off() {
    let prev = DEPTH.fetch_sub(1, Ordering::Release);
    assert!(prev > 0, "pop_off without matching push_off");

    if prev == 1 {
        let flags = SAVED_FLAGS.load(Ordering::Relaxed);
        // SAFETY: flags 是最外层 push_off 保存的状态。
        unsafe { arch_ops().restore_interrupts(flags) };
    }
}

/// RAII 形式的关中断区间：创建时 push_off，离开作用域时 pop_off。
pub struct IntrGuard(());

impl IntrGuard {
    pub fn new() -> Self {
        push_off();
        IntrGuard(())
    }
}

impl Default for IntrGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IntrGuard {
    fn drop(&mut self) {
        pop_off();
    }
}
