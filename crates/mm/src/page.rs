//! 补充页表
//!
//! 每个进程按用户页地址索引一张表，记录硬件页表装不下的页元数据。
//! 表项同时是帧表成员：Loaded 状态的表项在全局帧表中。
//!
//! 表项有三个状态、四种类型。状态机：
//!
//! ```text
//! NotLoaded --load--> Loaded --swap_out--> Swapped
//!     ^                 |  ^                  |
//!     +----unload-------+  +----swap_in-------+
//! ```
//!
//! - Mmap 页永不进入 Swapped：换出时把脏内容写回文件后卸载
//! - Zero 页装载时得到清零帧
//! - Code 页默认只读；脏的 Code 页可以换出（绝不写回可执行文件）
//!
//! 本进程的表项只在本进程上下文中变更；唯一的跨进程路径是帧表换出，
//! 受害者在选中时被钉住。

use alloc::sync::Arc;
use hashbrown::HashMap;

use crate::config::{
    is_stack_vaddr, is_user_vaddr, pg_round_down, PGMASK, PGSIZE, STACK_HEURISTIC,
};
use crate::file::PageFile;
use crate::frame;
use crate::kpage::{AllocFlags, Kpage};
use crate::page_dir::PageDir;
use crate::swap;
use sync::SpinLock;

/// 指向表项的共享引用；帧表持有同一引用。
pub type PageRef = Arc<SpinLock<PageEntry>>;

/// 文件后备页的来源描述
pub struct FileSlice {
    /// 后备文件
    pub file: Arc<dyn PageFile>,
    /// 页内容在文件中的偏移
    pub offset: usize,
    /// 从文件读入的字节数
    pub read_bytes: usize,
    /// 末尾补零的字节数
    pub zero_bytes: usize,
}

impl FileSlice {
    fn clone_ref(&self) -> (Arc<dyn PageFile>, usize, usize) {
        (self.file.clone(), self.offset, self.read_bytes)
    }
}

/// 页类型
pub enum PageKind {
    /// 普通页（如栈）
    Normal,
    /// 装载时清零的页
    Zero,
    /// 可执行文件内容
    Code(FileSlice),
    /// 内存映射文件
    Mmap(FileSlice),
}

/// 页状态。负载保证了状态与资源的一致：
/// 持有帧当且仅当 Loaded，占有交换槽当且仅当 Swapped。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    /// 尚未装入内存
    NotLoaded,
    /// 常驻于给定内核帧
    Loaded(Kpage),
    /// 换出到给定交换槽
    Swapped(usize),
}

/// 补充页表项
pub struct PageEntry {
    upage: usize,
    kind: PageKind,
    state: PageState,
    writable: bool,
    pinned: bool,
    /// 脏位覆盖：与页目录脏位取或
    dirty: bool,
    /// 属主进程的页目录
    pagedir: Arc<SpinLock<PageDir>>,
}

impl PageEntry {
    /// 用户页地址（表内唯一键）。
    pub fn upage(&self) -> usize {
        self.upage
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    pub fn writable(&self) -> bool {
        self.writable
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, PageState::Loaded(_))
    }

    pub fn is_not_loaded(&self) -> bool {
        matches!(self.state, PageState::NotLoaded)
    }

    pub fn is_swapped(&self) -> bool {
        matches!(self.state, PageState::Swapped(_))
    }

    /// 常驻帧地址；非 Loaded 时为 None。
    pub fn kpage(&self) -> Option<Kpage> {
        match self.state {
            PageState::Loaded(k) => Some(k),
            _ => None,
        }
    }

    /// 占用的交换槽；非 Swapped 时为 None。
    pub fn swap_slot(&self) -> Option<usize> {
        match self.state {
            PageState::Swapped(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_mmap(&self) -> bool {
        matches!(self.kind, PageKind::Mmap(_))
    }

    pub fn is_code(&self) -> bool {
        matches!(self.kind, PageKind::Code(_))
    }

    /// 文件后备页？
    pub fn is_file(&self) -> bool {
        self.is_code() || self.is_mmap()
    }

    pub fn is_zero(&self) -> bool {
        matches!(self.kind, PageKind::Zero)
    }

    pub fn is_normal(&self) -> bool {
        matches!(self.kind, PageKind::Normal)
    }

    pub fn pinned(&self) -> bool {
        self.pinned
    }

    pub fn set_pinned(&mut self, pinned: bool) {
        self.pinned = pinned;
    }

    fn file_slice(&self) -> Option<&FileSlice> {
        match &self.kind {
            PageKind::Code(s) | PageKind::Mmap(s) => Some(s),
            _ => None,
        }
    }

    /// 页是否为脏：覆盖位与页目录脏位取或。仅 Loaded 时有意义。
    pub fn is_dirty(&self) -> bool {
        debug_assert!(self.is_loaded());
        self.dirty || self.pagedir.lock().is_dirty(self.upage)
    }

    /// 置脏位覆盖。
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// 页是否被访问过。仅 Loaded 时有意义。
    pub fn is_accessed(&self) -> bool {
        debug_assert!(self.is_loaded());
        self.pagedir.lock().is_accessed(self.upage)
    }

    pub fn set_accessed(&mut self, accessed: bool) {
        self.pagedir.lock().set_accessed(self.upage, accessed);
    }
}

// ============================================================================
// 状态转移
// ============================================================================

/// NotLoaded → Loaded。
///
/// 分配一帧（必要时换出他人），文件后备页从文件读入并补零尾部，
/// Zero 页拿到清零帧，随后装入页目录并登记帧表。
/// 文件短读时回收帧并返回 false。
pub fn load(entry: &PageRef) -> bool {
    let (flags, file_info) = {
        let e = entry.lock();
        assert!(e.is_not_loaded());

        let flags = if e.is_zero() {
            AllocFlags::ZERO
        } else {
            AllocFlags::empty()
        };
        (flags, e.file_slice().map(FileSlice::clone_ref))
    };

    let kpage = frame::allocate_with_eviction(flags);

    if let Some((file, offset, read_bytes)) = file_info {
        // SAFETY: 新分配的帧由装载路径独占。
        let page = unsafe { kpage.bytes_mut() };
        let n = file.read_at(&mut page[..read_bytes], offset);
        if n != read_bytes {
            frame::free(kpage);
            return false;
        }
        page[read_bytes..].fill(0);
    }

    install(entry, kpage);
    true
}

/// Loaded → NotLoaded。脏的 Mmap 页先写回文件。
pub fn unload(entry: &PageRef) {
    let write_back = {
        let e = entry.lock();
        assert!(e.is_loaded());
        if e.is_mmap() && e.is_dirty() {
            let (file, offset, read_bytes) = e.file_slice().unwrap().clone_ref();
            Some((file, offset, read_bytes, e.kpage().unwrap()))
        } else {
            None
        }
    };

    if let Some((file, offset, read_bytes, kpage)) = write_back {
        // SAFETY: 表项仍持有此帧。
        let page = unsafe { kpage.bytes() };
        let written = file.write_at(&page[..read_bytes], offset);
        // 换出路径没有向缺页进程报告错误的渠道。
        assert!(written == read_bytes, "mmap write-back failed");
    }

    uninstall(entry);

    let kpage = {
        let mut e = entry.lock();
        let kpage = e.kpage().unwrap();
        e.state = PageState::NotLoaded;
        kpage
    };
    frame::free(kpage);

    log::trace!("page: unloaded upage {:#x}", entry.lock().upage());
}

/// Loaded → Swapped。Mmap 页不允许换出。
pub fn swap_out(entry: &PageRef) {
    let (kpage, upage) = {
        let e = entry.lock();
        assert!(e.is_loaded());
        assert!(!e.is_mmap());
        (e.kpage().unwrap(), e.upage)
    };

    // 受害者已被钉住，帧内容在 I/O 期间稳定。
    let slot = swap::install(kpage);

    uninstall(entry);

    {
        let mut e = entry.lock();
        e.state = PageState::Swapped(slot);
    }
    frame::free(kpage);

    log::trace!("page: swapped out upage {:#x} -> slot {}", upage, slot);
}

/// Swapped → Loaded。
pub fn swap_in(entry: &PageRef) {
    let slot = {
        let e = entry.lock();
        assert!(e.is_swapped());
        assert!(!e.is_mmap());
        e.swap_slot().unwrap()
    };

    let kpage = frame::allocate_with_eviction(AllocFlags::empty());
    swap::uninstall(slot, kpage);

    {
        let mut e = entry.lock();
        e.state = PageState::NotLoaded;
    }
    install(entry, kpage);

    log::trace!(
        "page: swapped in slot {} -> upage {:#x}",
        slot,
        entry.lock().upage()
    );
}

/// 装入页目录并登记帧表。
fn install(entry: &PageRef, kpage: Kpage) {
    {
        let mut e = entry.lock();
        assert!(!e.is_loaded());
        let ok = e.pagedir.lock().set_page(e.upage, kpage, e.writable);
        assert!(ok, "user page already mapped");
        e.state = PageState::Loaded(kpage);
    }
    // Loaded 之后立即可见于帧表；换出要等表项进表才可能选中它。
    frame::insert(entry);
}

/// 撤销页目录映射并移出帧表。
fn uninstall(entry: &PageRef) {
    {
        let e = entry.lock();
        assert!(e.is_loaded());
        e.pagedir.lock().clear_page(e.upage);
    }
    frame::remove(entry);
}

// ============================================================================
// 补充页表
// ============================================================================

/// 进程的补充页表。
pub struct SuppTable {
    entries: HashMap<usize, PageRef>,
    pagedir: Arc<SpinLock<PageDir>>,
}

impl SuppTable {
    pub fn new(pagedir: Arc<SpinLock<PageDir>>) -> Self {
        SuppTable {
            entries: HashMap::new(),
            pagedir,
        }
    }

    /// 属主进程的页目录。
    pub fn pagedir(&self) -> &Arc<SpinLock<PageDir>> {
        &self.pagedir
    }

    /// 按用户页地址查找表项。
    pub fn find(&self, upage: usize) -> Option<PageRef> {
        self.entries.get(&pg_round_down(upage)).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert_entry(&mut self, upage: usize, kind: PageKind, writable: bool) -> Option<PageRef> {
        assert!(upage & PGMASK == 0);
        assert!(upage != 0);
        assert!(is_user_vaddr(upage));

        if self.entries.contains_key(&upage) {
            return None;
        }

        let entry = Arc::new(SpinLock::new(PageEntry {
            upage,
            kind,
            state: PageState::NotLoaded,
            writable,
            pinned: false,
            dirty: false,
            pagedir: self.pagedir.clone(),
        }));
        self.entries.insert(upage, entry.clone());
        Some(entry)
    }

    /// 登记一个可执行文件页。
    pub fn insert_code(
        &mut self,
        upage: usize,
        slice: FileSlice,
        writable: bool,
    ) -> Option<PageRef> {
        debug_assert!(slice.read_bytes + slice.zero_bytes == PGSIZE);
        self.insert_entry(upage, PageKind::Code(slice), writable)
    }

    /// 登记一个内存映射文件页。
    pub fn insert_mmap(
        &mut self,
        upage: usize,
        slice: FileSlice,
        writable: bool,
    ) -> Option<PageRef> {
        debug_assert!(slice.read_bytes + slice.zero_bytes == PGSIZE);
        self.insert_entry(upage, PageKind::Mmap(slice), writable)
    }

    /// 登记一个栈页。zero 为 true 时得到清零页。
    pub fn insert_stack(&mut self, upage: usize, zero: bool, writable: bool) -> Option<PageRef> {
        let kind = if zero { PageKind::Zero } else { PageKind::Normal };
        self.insert_entry(upage, kind, writable)
    }

    /// 销毁一个表项：卸载常驻页（含 Mmap 写回），释放交换槽。
    pub fn destroy(&mut self, upage: usize) -> bool {
        let entry = match self.entries.get(&pg_round_down(upage)) {
            Some(e) => e.clone(),
            None => return false,
        };

        let state = entry.lock().state;
        match state {
            PageState::Loaded(_) => unload(&entry),
            PageState::Swapped(slot) => {
                swap::remove(slot);
                entry.lock().state = PageState::NotLoaded;
            }
            PageState::NotLoaded => {}
        }

        self.entries.remove(&pg_round_down(upage));
        true
    }

    /// 进程退出时的整表清理，最后销毁页目录。
    pub fn remove_all(&mut self) {
        for (_, entry) in self.entries.drain() {
            let state = entry.lock().state;
            match state {
                PageState::Loaded(_) => unload(&entry),
                PageState::Swapped(slot) => swap::remove(slot),
                PageState::NotLoaded => {}
            }
        }
        self.pagedir.lock().clear_all();
    }

    /// 缺页处理。
    ///
    /// 地址取整到页后查表分派；查不到时按栈增长启发式按需建 Zero 页。
    /// 返回 false 表示无法满足，调用者应终止该进程。
    pub fn handle_fault(&mut self, fault_addr: usize, user_esp: usize) -> bool {
        if fault_addr == 0 {
            return false;
        }
        if !is_user_vaddr(fault_addr) {
            return false;
        }

        let upage = pg_round_down(fault_addr);

        if let Some(entry) = self.find(upage) {
            let (not_loaded, is_file, swapped) = {
                let e = entry.lock();
                (e.is_not_loaded(), e.is_file(), e.is_swapped())
            };

            if not_loaded && is_file {
                return load(&entry);
            }
            if swapped {
                swap_in(&entry);
                return true;
            }
            return false;
        }

        // 栈增长：错误地址在栈指针下方 STACK_HEURISTIC 字节内
        // 且落在许可的栈区里。
        if fault_addr >= user_esp.saturating_sub(STACK_HEURISTIC) && is_stack_vaddr(fault_addr) {
            if let Some(entry) = self.insert_stack(upage, true, true) {
                return load(&entry);
            }
        }

        false
    }

    /// 缺页陷阱入口。协作者从陷阱帧传入完整的故障信息。
    ///
    /// 映射已存在的访问错误（保护违例）以及对只读页的写访问直接拒绝，
    /// 其余交给 [`SuppTable::handle_fault`]。返回 false 时调用者应
    /// 终止故障进程。
    pub fn handle_trap(
        &mut self,
        fault_addr: usize,
        user_esp: usize,
        write: bool,
        present: bool,
    ) -> bool {
        if present {
            return false;
        }
        if write {
            if let Some(entry) = self.find(fault_addr) {
                if !entry.lock().writable() {
                    return false;
                }
            }
        }
        self.handle_fault(fault_addr, user_esp)
    }

    /// 钉住一页（必要时先装入），供内核跨过缺页处理直接访问用户数据。
    pub fn pin(&mut self, upage: usize) -> bool {
        let entry = match self.find(upage) {
            Some(e) => e.clone(),
            None => return false,
        };

        let state = entry.lock().state;
        match state {
            PageState::NotLoaded => {
                if !load(&entry) {
                    return false;
                }
            }
            PageState::Swapped(_) => swap_in(&entry),
            PageState::Loaded(_) => {}
        }

        entry.lock().set_pinned(true);
        true
    }

    /// 解除钉住。
    pub fn unpin(&self, upage: usize) {
        if let Some(entry) = self.find(upage) {
            entry.lock().set_pinned(false);
        }
    }
}
