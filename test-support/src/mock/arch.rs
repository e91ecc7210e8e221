//! 架构操作的 Mock 实现
//!
//! 宿主机测试环境没有可禁用的中断，Mock 把中断开关实现为 no-op。

use core::sync::atomic::{AtomicUsize, Ordering};
use sync::ArchOps;

/// no-op 的中断控制
pub struct MockArchOps;

impl ArchOps for MockArchOps {
    unsafe fn read_and_disable_interrupts(&self) -> usize {
        0
    }

    unsafe fn restore_interrupts(&self, _flags: usize) {}
}

/// 全局 Mock 实例
pub static MOCK_ARCH_OPS: MockArchOps = MockArchOps;

// 0 = uninit, 1 = initializing, 2 = ready
static INIT: AtomicUsize = AtomicUsize::new(0);

/// 幂等地注册 Mock 架构操作。并发调用时只有一个注册者，其余自旋等待。
pub fn init() {
    match INIT.compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire) {
        Ok(_) => {
            // Safety: tests use a single global mock ArchOps.
            unsafe { sync::register_arch_ops(&MOCK_ARCH_OPS) };
            INIT.store(2, Ordering::Release);
        }
        Err(_) => {
            while INIT.load(Ordering::Acquire) != 2 {
                core::hint::spin_loop();
            }
        }
    }
}
