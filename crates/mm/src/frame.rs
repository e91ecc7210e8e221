//! 帧表
//!
//! 全局的常驻用户帧集合，元素是指向属主 SPT 表项的共享引用；
//! 表项 Loaded 当且仅当它在帧表中。队列顺序就是时钟扫描顺序。
//!
//! 锁序：帧表锁 → 表项锁 → 页目录锁。任何路径都不得在持有表项锁时
//! 再取帧表锁。帧表锁不跨块 I/O 持有：选中的受害者先被钉住，
//! 换出 I/O 在锁外进行。

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use lazy_static::lazy_static;
use sync::SpinLock;

use crate::kpage::{self, AllocFlags, Kpage};
use crate::page::{self, PageRef};

lazy_static! {
    static ref FRAME_TABLE: SpinLock<VecDeque<PageRef>> = SpinLock::new(VecDeque::new());
}

/// 初始化（清空）帧表。
pub fn init() {
    FRAME_TABLE.lock().clear();
}

/// 当前常驻帧数。
pub fn resident_count() -> usize {
    FRAME_TABLE.lock().len()
}

/// 把表项登记进帧表。
pub(crate) fn insert(entry: &PageRef) {
    let mut table = FRAME_TABLE.lock();
    debug_assert!(!table.iter().any(|e| Arc::ptr_eq(e, entry)));
    table.push_back(entry.clone());
}

/// 把表项移出帧表。
pub(crate) fn remove(entry: &PageRef) {
    let mut table = FRAME_TABLE.lock();
    let pos = table
        .iter()
        .position(|e| Arc::ptr_eq(e, entry))
        .expect("frame table: entry not resident");
    let _ = table.remove(pos);
}

/// 按内核帧地址查找常驻表项。
pub fn lookup(kpage: Kpage) -> Option<PageRef> {
    let table = FRAME_TABLE.lock();
    table
        .iter()
        .find(|e| e.lock().kpage() == Some(kpage))
        .cloned()
}

/// 表项是否在帧表中（用于测试）。
pub fn contains(entry: &PageRef) -> bool {
    FRAME_TABLE.lock().iter().any(|e| Arc::ptr_eq(e, entry))
}

/// 时钟（二次机会）选择受害者。
///
/// 被钉住的轮转跳过；访问位置位的清位后轮转；否则选中。
/// 返回前把受害者钉住，换出全程不会被再次选中。
/// 帧表全部被钉住意味着上层违反了"钉住只能是瞬态"的约定。
fn choose_victim_clock() -> PageRef {
    let mut table = FRAME_TABLE.lock();
    assert!(!table.is_empty(), "frame table empty, nothing to evict");

    loop {
        let entry = table.pop_front().unwrap();
        {
            let mut e = entry.lock();
            if e.pinned() {
                drop(e);
                table.push_back(entry);
                continue;
            }
            if e.is_accessed() {
                e.set_accessed(false);
                drop(e);
                table.push_back(entry);
                continue;
            }
            e.set_pinned(true);
        }
        table.push_back(entry.clone());
        return entry;
    }
}

/// 随机选择受害者（更简单的测试用策略）。同样把受害者钉住。
pub fn choose_victim_random() -> PageRef {
    let table = FRAME_TABLE.lock();
    assert!(!table.is_empty(), "frame table empty, nothing to evict");

    // 以表长播种的 xorshift，无需全局随机源。
    let mut x = table.len() as u64 ^ 0x9e37_79b9_7f4a_7c15;
    for _ in 0..3 {
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
    }
    let start = (x as usize) % table.len();

    for i in 0..table.len() {
        let entry = &table[(start + i) % table.len()];
        let mut e = entry.lock();
        if !e.pinned() {
            e.set_pinned(true);
            drop(e);
            return entry.clone();
        }
    }
    panic!("frame table fully pinned");
}

/// 换出一帧：Mmap 页写回文件后卸载，其余换入交换区。
pub(crate) fn evict() {
    let victim = choose_victim_clock();

    let is_mmap = victim.lock().is_mmap();
    log::debug!(
        "frame: evicting upage {:#x} ({})",
        victim.lock().upage(),
        if is_mmap { "mmap" } else { "swap" }
    );

    if is_mmap {
        page::unload(&victim);
    } else {
        page::swap_out(&victim);
    }

    victim.lock().set_pinned(false);
}

/// 分配一个用户帧；内存耗尽返回 None。
pub fn allocate(flags: AllocFlags) -> Option<Kpage> {
    kpage::alloc(flags)
}

/// 分配一个用户帧，不够就换出直到成功。
pub fn allocate_with_eviction(flags: AllocFlags) -> Kpage {
    loop {
        if let Some(kpage) = kpage::alloc(flags) {
            return kpage;
        }
        log::debug!("frame: memory full, evicting one");
        evict();
    }
}

/// 归还一个用户帧。
pub(crate) fn free(kpage: Kpage) {
    kpage::free(kpage);
}
