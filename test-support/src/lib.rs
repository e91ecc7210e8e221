//! 测试支持 crate
//!
//! 提供 Mock 实现与测试工具：
//!
//! - [`mock::arch`]：no-op 的中断控制 Mock（注册给 sync crate）
//! - [`mock::mem`]：页对齐的测试内存竞技场（供内核页池使用）
//! - [`serial`]：全局串行化保护器 —— 各子系统是模块级单例，
//!   集成测试必须逐个运行并在测试开头重新初始化

#![no_std]

extern crate alloc;

pub mod mock;

use core::hint;
use core::sync::atomic::{AtomicBool, Ordering};

static SERIAL_LOCK: AtomicBool = AtomicBool::new(false);

/// 串行化测试保护器：持有期间其它测试线程在 [`serial`] 中自旋等待。
pub struct SerialGuard(());

impl Drop for SerialGuard {
    fn drop(&mut self) {
        SERIAL_LOCK.store(false, Ordering::Release);
    }
}

/// 获取全局测试锁并注册 Mock 架构操作。
///
/// 所有触碰全局单例（帧表、交换位图、块缓存、打开 inode 表）的
/// 测试都应以 `let _guard = test_support::serial();` 开头。
pub fn serial() -> SerialGuard {
    mock::arch::init();
    while SERIAL_LOCK
        .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
        .is_err()
    {
        hint::spin_loop();
    }
    SerialGuard(())
}
