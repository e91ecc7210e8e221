//! 交换区
//!
//! 交换盘被划分为页大小的槽位，一页占 PAGE_SECTOR_COUNT 个连续扇区。
//! 槽位的占用状态只存在内存位图里，盘上没有任何元数据；
//! 重启后交换内容全部作废。
//!
//! I/O 不经过文件系统缓存，直接读写交换盘。

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use device::{block_device, BlockDriver, BlockRole, Sector, SECTOR_SIZE};
use lazy_static::lazy_static;
use sync::SpinLock;

use crate::config::PGSIZE;
use crate::kpage::Kpage;

/// 一页占用的扇区数
pub const PAGE_SECTOR_COUNT: usize = PGSIZE / SECTOR_SIZE;

struct SwapArea {
    dev: Option<Arc<dyn BlockDriver>>,
    /// 槽位占用位，一页一位
    bits: Vec<u64>,
    page_count: usize,
}

impl SwapArea {
    fn test(&self, slot: usize) -> bool {
        self.bits[slot / 64] & (1 << (slot % 64)) != 0
    }

    fn set(&mut self, slot: usize, value: bool) {
        if value {
            self.bits[slot / 64] |= 1 << (slot % 64);
        } else {
            self.bits[slot / 64] &= !(1 << (slot % 64));
        }
    }

    fn scan_and_flip(&mut self) -> Option<usize> {
        for slot in 0..self.page_count {
            if !self.test(slot) {
                self.set(slot, true);
                return Some(slot);
            }
        }
        None
    }
}

lazy_static! {
    static ref SWAP: SpinLock<SwapArea> = SpinLock::new(SwapArea {
        dev: None,
        bits: Vec::new(),
        page_count: 0,
    });
}

/// 初始化交换区，按交换盘容量建立位图。
pub fn init() {
    let dev = block_device(BlockRole::Swap).expect("no swap device found");
    let page_count = dev.total_sectors() / PAGE_SECTOR_COUNT;

    let mut swap = SWAP.lock();
    swap.bits = vec![0u64; page_count.div_ceil(64)];
    swap.page_count = page_count;
    swap.dev = Some(dev);
    log::debug!("swap: {} slots", page_count);
}

fn slot_to_sector(slot: usize) -> Sector {
    (slot * PAGE_SECTOR_COUNT) as Sector
}

/// 把 kpage 的内容写入交换区，返回占用的槽号。
///
/// 交换区耗尽是致命错误。
pub fn install(kpage: Kpage) -> usize {
    let (dev, slot) = {
        let mut swap = SWAP.lock();
        let slot = match swap.scan_and_flip() {
            Some(s) => s,
            None => panic!("swap: out of swap slots"),
        };
        (swap.dev.clone().expect("swap not initialized"), slot)
    };

    log::trace!("swap: kpage {:#x} -> slot {}", kpage.addr(), slot);

    // SAFETY: 换出路径持有此页（受害者被钉住）。
    let page = unsafe { kpage.bytes() };
    let base = slot_to_sector(slot);
    for i in 0..PAGE_SECTOR_COUNT {
        dev.write_block(base + i as Sector, &page[i * SECTOR_SIZE..(i + 1) * SECTOR_SIZE]);
    }

    slot
}

/// 把槽 slot 的内容读回 kpage 并释放槽位。
pub fn uninstall(slot: usize, kpage: Kpage) {
    let dev = {
        let swap = SWAP.lock();
        assert!(slot < swap.page_count);
        assert!(swap.test(slot), "uninstalling a free swap slot");
        swap.dev.clone().expect("swap not initialized")
    };

    log::trace!("swap: slot {} -> kpage {:#x}", slot, kpage.addr());

    // SAFETY: 换入路径独占新分配的页。
    let page = unsafe { kpage.bytes_mut() };
    let base = slot_to_sector(slot);
    for i in 0..PAGE_SECTOR_COUNT {
        dev.read_block(base + i as Sector, &mut page[i * SECTOR_SIZE..(i + 1) * SECTOR_SIZE]);
    }

    SWAP.lock().set(slot, false);
}

/// 释放槽 slot，不做 I/O（进程退出时的清理）。
pub fn remove(slot: usize) {
    let mut swap = SWAP.lock();
    assert!(slot < swap.page_count);
    assert!(swap.test(slot), "removing a free swap slot");
    swap.set(slot, false);
}

/// 槽 slot 是否在用（用于测试）
pub fn slot_in_use(slot: usize) -> bool {
    SWAP.lock().test(slot)
}

/// 空闲槽数（用于测试）
pub fn free_slots() -> usize {
    let swap = SWAP.lock();
    (0..swap.page_count).filter(|&s| !swap.test(s)).count()
}
