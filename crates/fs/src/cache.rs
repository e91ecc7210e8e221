//! 文件系统块缓存
//!
//! 固定容量的扇区缓存，写回制，时钟置换，定期刷盘。
//!
//! - 关闭状态下所有操作直通块设备（部分读写经由弹跳缓冲）
//! - 命中失败且无槽可腾（全部被钉住）时同样直通设备，缓存只是优化
//! - 顺序读优化：整扇区读命中后预取下一个扇区
//! - `tick()` 由定时器协作者调用，每 10000 次使下一次写操作附带全量刷盘

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use bitflags::bitflags;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use device::{BlockDriver, Sector, SECTOR_SIZE};
use lazy_static::lazy_static;
use sync::SpinLock;

/// 缓存槽数量
pub const CACHE_SIZE: usize = 64;

/// 每隔多少个 tick 安排一次刷盘
const FLUSH_TICKS: u64 = 10_000;

bitflags! {
    /// 缓存槽标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct SlotFlags: u8 {
        /// 槽位在用
        const IN_USE = 1 << 0;
        /// 内容比磁盘新
        const DIRTY  = 1 << 1;
        /// 自上次时钟扫描后被访问过
        const ACCESS = 1 << 2;
        /// 禁止被置换
        const PIN    = 1 << 3;
    }
}

/// 一个缓存槽：一个扇区的数据与状态
struct CacheSlot {
    sector: Sector,
    flags: SlotFlags,
    data: [u8; SECTOR_SIZE],
}

impl CacheSlot {
    fn empty() -> Self {
        CacheSlot {
            sector: 0,
            flags: SlotFlags::empty(),
            data: [0u8; SECTOR_SIZE],
        }
    }
}

/// 块缓存本体
struct BlockCache {
    slots: Box<[CacheSlot]>,
    /// 时钟指针
    hand: usize,
    enabled: bool,
    dev: Option<Arc<dyn BlockDriver>>,
}

impl BlockCache {
    fn uninit() -> Self {
        BlockCache {
            slots: Vec::new().into_boxed_slice(),
            hand: 0,
            enabled: false,
            dev: None,
        }
    }

    fn lookup(&mut self, sector: Sector) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.flags.contains(SlotFlags::IN_USE) && s.sector == sector)
    }

    /// 时钟置换：从 hand 出发最多走 2*CACHE_SIZE 步找一个可用槽。
    ///
    /// 空闲槽直接用；被钉住的跳过；访问位置位的清位续走；
    /// 否则写回脏数据后腾出。全部被钉住时返回 None。
    fn evict_slot(&mut self) -> Option<usize> {
        let size = self.slots.len();
        if size == 0 {
            return None;
        }

        for step in 0..size * 2 {
            let i = (self.hand + step) % size;

            if !self.slots[i].flags.contains(SlotFlags::IN_USE) {
                self.hand = (i + 1) % size;
                return Some(i);
            }
            if self.slots[i].flags.contains(SlotFlags::PIN) {
                continue;
            }
            if self.slots[i].flags.contains(SlotFlags::ACCESS) {
                self.slots[i].flags.remove(SlotFlags::ACCESS);
                continue;
            }

            if self.slots[i].flags.contains(SlotFlags::DIRTY) {
                self.write_back(i);
            }
            self.slots[i].flags.remove(SlotFlags::IN_USE);
            self.hand = (i + 1) % size;
            return Some(i);
        }

        None
    }

    fn write_back(&mut self, i: usize) {
        debug_assert!(self.slots[i].flags.contains(SlotFlags::DIRTY));
        if let Some(dev) = &self.dev {
            dev.write_block(self.slots[i].sector, &self.slots[i].data);
        }
        self.slots[i].flags.remove(SlotFlags::DIRTY);
    }

    /// 访问一个扇区：命中返回槽号，未命中则腾槽装入。
    ///
    /// read 为 true 时装入需要从磁盘读出当前内容。
    fn access(&mut self, sector: Sector, read: bool) -> Option<usize> {
        let i = match self.lookup(sector) {
            Some(i) => i,
            None => {
                let i = self.evict_slot()?;
                let slot = &mut self.slots[i];
                slot.sector = sector;
                slot.flags = SlotFlags::IN_USE;
                if read {
                    if let Some(dev) = &self.dev {
                        dev.read_block(sector, &mut self.slots[i].data);
                    }
                }
                i
            }
        };

        self.slots[i].flags.insert(SlotFlags::ACCESS);
        Some(i)
    }

    /// 写回所有脏槽。
    fn flush_all(&mut self) {
        for i in 0..self.slots.len() {
            if self.slots[i].flags.contains(SlotFlags::DIRTY) {
                self.write_back(i);
            }
        }
    }

    /// 顺序读预取：把下一个扇区装入缓存（尽力而为）。
    fn prefetch(&mut self, sector: Sector) {
        let total = match &self.dev {
            Some(dev) => dev.total_sectors(),
            None => return,
        };
        if (sector as usize) < total {
            let _ = self.access(sector, true);
        }
    }
}

lazy_static! {
    static ref CACHE: SpinLock<BlockCache> = SpinLock::new(BlockCache::uninit());
}

/// tick 计数器；不加锁，定时器上下文可直接调用。
static TICKS: AtomicU64 = AtomicU64::new(0);

/// 置位后下一次写操作附带全量刷盘。
static SYNC_WRITE: AtomicBool = AtomicBool::new(false);

/// 初始化块缓存（初始为关闭状态）。
pub fn init(dev: Arc<dyn BlockDriver>) {
    let mut cache = CACHE.lock();
    let mut slots = Vec::with_capacity(CACHE_SIZE);
    for _ in 0..CACHE_SIZE {
        slots.push(CacheSlot::empty());
    }
    cache.slots = slots.into_boxed_slice();
    cache.hand = 0;
    cache.enabled = false;
    cache.dev = Some(dev);
    TICKS.store(0, Ordering::Relaxed);
    SYNC_WRITE.store(false, Ordering::Relaxed);
}

/// 启用缓存。
pub fn enable() {
    CACHE.lock().enabled = true;
}

/// 关闭缓存，关闭前写回所有脏数据。
pub fn disable() {
    let mut cache = CACHE.lock();
    if cache.enabled {
        cache.flush_all();
        cache.enabled = false;
    }
}

/// 写回所有脏数据。
pub fn flush() {
    let mut cache = CACHE.lock();
    if cache.enabled {
        cache.flush_all();
    }
}

/// 定时器 tick。每 FLUSH_TICKS 次安排一次随写刷盘。
pub fn tick() {
    let t = TICKS.fetch_add(1, Ordering::Relaxed) + 1;
    if t % FLUSH_TICKS == 0 {
        SYNC_WRITE.store(true, Ordering::Relaxed);
    }
}

fn device(cache: &BlockCache) -> Arc<dyn BlockDriver> {
    cache.dev.clone().expect("block cache not initialized")
}

/// 读整个扇区到 buf（长度必须为 SECTOR_SIZE）。
pub fn read_sector(sector: Sector, buf: &mut [u8]) {
    assert_eq!(buf.len(), SECTOR_SIZE);

    let mut cache = CACHE.lock();
    if !cache.enabled {
        device(&cache).read_block(sector, buf);
        return;
    }

    match cache.access(sector, true) {
        Some(i) => {
            buf.copy_from_slice(&cache.slots[i].data);
            cache.prefetch(sector + 1);
        }
        None => {
            // 无槽可用，直通设备。
            device(&cache).read_block(sector, buf);
        }
    }
}

/// 从扇区偏移 ofs 处读 buf.len() 字节。
pub fn read_bytes(sector: Sector, buf: &mut [u8], ofs: usize) {
    assert!(ofs + buf.len() <= SECTOR_SIZE);

    let mut cache = CACHE.lock();
    if !cache.enabled {
        let mut bounce = vec![0u8; SECTOR_SIZE];
        device(&cache).read_block(sector, &mut bounce);
        buf.copy_from_slice(&bounce[ofs..ofs + buf.len()]);
        return;
    }

    match cache.access(sector, true) {
        Some(i) => buf.copy_from_slice(&cache.slots[i].data[ofs..ofs + buf.len()]),
        None => {
            let mut bounce = vec![0u8; SECTOR_SIZE];
            device(&cache).read_block(sector, &mut bounce);
            buf.copy_from_slice(&bounce[ofs..ofs + buf.len()]);
        }
    }
}

/// 将 buf 写入整个扇区（长度必须为 SECTOR_SIZE）。
pub fn write_sector(sector: Sector, buf: &[u8]) {
    assert_eq!(buf.len(), SECTOR_SIZE);

    let mut cache = CACHE.lock();
    if !cache.enabled {
        device(&cache).write_block(sector, buf);
        return;
    }

    // 整扇区覆盖写不需要读出旧内容。
    match cache.access(sector, false) {
        Some(i) => {
            cache.slots[i].data.copy_from_slice(buf);
            cache.slots[i].flags.insert(SlotFlags::DIRTY);
        }
        None => {
            device(&cache).write_block(sector, buf);
        }
    }

    if SYNC_WRITE.swap(false, Ordering::Relaxed) {
        cache.flush_all();
    }
}

/// 将 buf 写入扇区偏移 ofs 处。
pub fn write_bytes(sector: Sector, buf: &[u8], ofs: usize) {
    assert!(ofs + buf.len() <= SECTOR_SIZE);

    let mut cache = CACHE.lock();
    if !cache.enabled {
        let mut bounce = vec![0u8; SECTOR_SIZE];
        let dev = device(&cache);
        dev.read_block(sector, &mut bounce);
        bounce[ofs..ofs + buf.len()].copy_from_slice(buf);
        dev.write_block(sector, &bounce);
        return;
    }

    match cache.access(sector, true) {
        Some(i) => {
            cache.slots[i].data[ofs..ofs + buf.len()].copy_from_slice(buf);
            cache.slots[i].flags.insert(SlotFlags::DIRTY);
        }
        None => {
            let mut bounce = vec![0u8; SECTOR_SIZE];
            let dev = device(&cache);
            dev.read_block(sector, &mut bounce);
            bounce[ofs..ofs + buf.len()].copy_from_slice(buf);
            dev.write_block(sector, &bounce);
        }
    }

    if SYNC_WRITE.swap(false, Ordering::Relaxed) {
        cache.flush_all();
    }
}

/// 当前脏槽数（用于测试）
pub fn dirty_count() -> usize {
    CACHE
        .lock()
        .slots
        .iter()
        .filter(|s| s.flags.contains(SlotFlags::DIRTY))
        .count()
}
