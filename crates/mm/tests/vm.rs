//! VM 集成测试：装载/卸载、时钟换出、交换往返、mmap 写回、缺页处理

mod common;

use common::{MemFile, SharedFile};
use mm::config::{PGSIZE, PHYS_BASE};
use mm::{frame, kpage, page, swap, uaccess, MmapFile, PageFile, PageState};
use std::sync::Arc;

const UA: usize = 0x0800_0000;
const UB: usize = UA + PGSIZE;
const UC: usize = UA + 2 * PGSIZE;
const ESP: usize = PHYS_BASE - 64;

fn fill(pattern: u8) -> Vec<u8> {
    (0..PGSIZE).map(|i| pattern ^ (i % 251) as u8).collect()
}

#[test]
fn test_zero_page_load_unload() {
    let _guard = common::setup(2);
    let mut table = common::new_table();

    let entry = table.insert_stack(UA, true, true).unwrap();
    assert!(page::load(&entry));

    // Loaded ⇔ 帧表成员 ∧ 页目录有映射
    assert!(frame::contains(&entry));
    let kpage = table.pagedir().lock().get_page(UA).unwrap();
    assert!(std::sync::Arc::ptr_eq(&frame::lookup(kpage).unwrap(), &entry));

    // Zero 页装载后内容全零
    let mut buf = vec![0xFFu8; PGSIZE];
    assert!(uaccess::copy_from_user(table.pagedir(), UA, &mut buf));
    assert!(buf.iter().all(|&b| b == 0));

    page::unload(&entry);
    assert!(!frame::contains(&entry));
    assert!(table.pagedir().lock().get_page(UA).is_none());
    assert_eq!(entry.lock().state(), PageState::NotLoaded);
    assert_eq!(kpage::free_pages(), 2);
}

#[test]
fn test_swap_roundtrip_under_pressure() {
    let _guard = common::setup(2);
    let mut table = common::new_table();

    let ea = table.insert_stack(UA, true, true).unwrap();
    let eb = table.insert_stack(UB, true, true).unwrap();
    let ec = table.insert_stack(UC, true, true).unwrap();

    assert!(page::load(&ea));
    assert!(page::load(&eb));

    let pat_a = fill(0xA5);
    let pat_b = fill(0x3C);
    assert!(uaccess::copy_to_user(table.pagedir(), UA, &pat_a));
    assert!(uaccess::copy_to_user(table.pagedir(), UB, &pat_b));
    assert_eq!(frame::resident_count(), 2);

    let free_slots_before = swap::free_slots();

    // 第三次装载触发换出；A 的访问位先被时钟清掉，随后被选中。
    assert!(page::load(&ec));
    assert_eq!(frame::resident_count(), 2);

    let slot = {
        let e = ea.lock();
        assert!(e.is_swapped());
        e.swap_slot().unwrap()
    };
    // Swapped ⇔ 槽位被占 ∧ 不在帧表
    assert!(swap::slot_in_use(slot));
    assert!(!frame::contains(&ea));
    assert_eq!(swap::free_slots(), free_slots_before - 1);

    // 缺页把 A 换回来，内容逐字节一致，槽位归还。
    assert!(table.handle_fault(UA + 123, ESP));
    assert!(ea.lock().is_loaded());
    assert!(!swap::slot_in_use(slot));

    let mut back = vec![0u8; PGSIZE];
    assert!(uaccess::copy_from_user(table.pagedir(), UA, &mut back));
    assert_eq!(back, pat_a);

    // B 在第二次换出里离开了内存；把它也换回来验证。
    assert!(eb.lock().is_swapped());
    assert!(table.handle_fault(UB, ESP));
    let mut back_b = vec![0u8; PGSIZE];
    assert!(uaccess::copy_from_user(table.pagedir(), UB, &mut back_b));
    assert_eq!(back_b, pat_b);
}

#[test]
fn test_pinned_frames_never_evicted() {
    let _guard = common::setup(2);
    let mut table = common::new_table();

    let ea = table.insert_stack(UA, true, true).unwrap();
    let eb = table.insert_stack(UB, true, true).unwrap();
    let ec = table.insert_stack(UC, true, true).unwrap();

    assert!(page::load(&ea));
    assert!(page::load(&eb));

    // 钉住 B；换出压力必须落到 A 头上。
    assert!(table.pin(UB));

    assert!(page::load(&ec));
    assert!(eb.lock().is_loaded());
    assert!(ea.lock().is_swapped());

    table.unpin(UB);
}

#[test]
fn test_mmap_eviction_writes_back_to_file() {
    let _guard = common::setup(1);
    let mut table = common::new_table();

    let file_len = PGSIZE + 100;
    let mem = MemFile::new((0..file_len).map(|i| (i % 199) as u8).collect());
    let original = mem.snapshot();
    let file: Arc<dyn PageFile> = Arc::new(SharedFile(mem.clone()));

    const M: usize = 0x2000_0000;
    let mapping = MmapFile::create(&mut table, &file, M).unwrap();
    assert_eq!(mapping.page_cnt(), 2);

    let free_slots_before = swap::free_slots();

    // 第 0 页按需装入，内容来自文件。
    assert!(table.handle_fault(M, ESP));
    let mut head = vec![0u8; 16];
    assert!(uaccess::copy_from_user(table.pagedir(), M, &mut head));
    assert_eq!(head, original[..16]);

    // 改写第 0 页，然后靠第 1 页的装载把它挤出去。
    assert!(uaccess::copy_to_user(table.pagedir(), M, b"DIRTY!"));
    assert!(table.handle_fault(M + PGSIZE, ESP));

    // Mmap 页绝不进交换区：写回文件后回到 NotLoaded。
    let e0 = table.find(M).unwrap();
    assert_eq!(e0.lock().state(), PageState::NotLoaded);
    assert_eq!(swap::free_slots(), free_slots_before);

    let after_evict = mem.snapshot();
    assert_eq!(&after_evict[..6], b"DIRTY!");
    assert_eq!(after_evict[6..PGSIZE], original[6..PGSIZE]);

    // 第 1 页装载时末尾补零。
    let mut tail = vec![0xFFu8; PGSIZE - 100];
    assert!(uaccess::copy_from_user(table.pagedir(), M + PGSIZE + 100, &mut tail));
    assert!(tail.iter().all(|&b| b == 0));

    // 解除映射后帧全部归还，文件内容保持写回结果。
    mapping.destroy(&mut table);
    assert_eq!(frame::resident_count(), 0);
    assert_eq!(kpage::free_pages(), 1);
    assert!(table.find(M).is_none());
    assert_eq!(&mem.snapshot()[..6], b"DIRTY!");
}

#[test]
fn test_mmap_overlap_rejected_and_unwound() {
    let _guard = common::setup(2);
    let mut table = common::new_table();

    const M: usize = 0x2000_0000;
    // 第二页的位置已经被占用。
    table.insert_stack(M + PGSIZE, true, true).unwrap();

    let mem = MemFile::new(vec![7u8; PGSIZE + 1]);
    let file: Arc<dyn PageFile> = Arc::new(SharedFile(mem));
    assert!(MmapFile::create(&mut table, &file, M).is_none());

    // 第一页的插入被回退，占位页还在。
    assert!(table.find(M).is_none());
    assert!(table.find(M + PGSIZE).is_some());
}

#[test]
fn test_stack_growth_heuristic() {
    let _guard = common::setup(2);
    let mut table = common::new_table();

    let esp = PHYS_BASE - 2 * PGSIZE;

    // 栈指针正下方 32 字节内：按需建 Zero 页。
    assert!(table.handle_fault(esp - 32, esp));
    assert!(table.find(esp - 32).is_some());

    // 距离超过启发界限：拒绝。
    assert!(!table.handle_fault(esp - PGSIZE - 33, esp));

    // 空指针与内核地址：拒绝。
    assert!(!table.handle_fault(0, esp));
    assert!(!table.handle_fault(PHYS_BASE + 0x1000, esp));

    // 许可栈区之外：拒绝。
    let low_esp = 0x1000_0000;
    assert!(!table.handle_fault(low_esp - 16, low_esp));
}

#[test]
fn test_fault_on_loaded_page_fails() {
    let _guard = common::setup(2);
    let mut table = common::new_table();

    let entry = table.insert_stack(UA, true, false).unwrap();
    assert!(page::load(&entry));

    // 已装载页再缺页（如对只读页写入）无法满足，交由上层终止进程。
    assert!(!table.handle_fault(UA, ESP));
    // 陷阱入口对保护违例同样拒绝。
    assert!(!table.handle_trap(UA, ESP, true, true));
}

#[test]
fn test_trap_entry_rejects_write_to_readonly() {
    let _guard = common::setup(2);
    let mut table = common::new_table();

    let mem = MemFile::new(vec![9u8; PGSIZE]);
    let file: Arc<dyn PageFile> = Arc::new(SharedFile(mem));
    let slice = mm::FileSlice {
        file,
        offset: 0,
        read_bytes: PGSIZE,
        zero_bytes: 0,
    };
    table.insert_code(UA, slice, false).unwrap();

    // 对未装载只读代码页的写访问：不装载，直接拒绝。
    assert!(!table.handle_trap(UA, ESP, true, false));
    assert!(table.find(UA).unwrap().lock().is_not_loaded());

    // 读访问正常装入。
    assert!(table.handle_trap(UA, ESP, false, false));
    assert!(table.find(UA).unwrap().lock().is_loaded());
}

#[test]
fn test_destroy_releases_swap_slot() {
    let _guard = common::setup(2);
    let mut table = common::new_table();

    let ea = table.insert_stack(UA, true, true).unwrap();
    let eb = table.insert_stack(UB, true, true).unwrap();
    let ec = table.insert_stack(UC, true, true).unwrap();

    assert!(page::load(&ea));
    assert!(page::load(&eb));
    assert!(page::load(&ec)); // A 被换出

    let slot = ea.lock().swap_slot().unwrap();
    assert!(swap::slot_in_use(slot));

    // 销毁换出页只清位图，不做 I/O。
    assert!(table.destroy(UA));
    assert!(!swap::slot_in_use(slot));
    assert!(table.find(UA).is_none());
}

#[test]
fn test_remove_all_tears_everything_down() {
    let _guard = common::setup(2);
    let mut table = common::new_table();

    let ea = table.insert_stack(UA, true, true).unwrap();
    let eb = table.insert_stack(UB, true, true).unwrap();
    let ec = table.insert_stack(UC, true, true).unwrap();

    assert!(page::load(&ea));
    assert!(page::load(&eb));
    assert!(page::load(&ec)); // 产生一个换出页

    let slots_used = 64 - swap::free_slots();
    assert_eq!(slots_used, 1);

    table.remove_all();

    assert!(table.is_empty());
    assert_eq!(frame::resident_count(), 0);
    assert_eq!(swap::free_slots(), 64);
    assert_eq!(kpage::free_pages(), 2);
    assert_eq!(table.pagedir().lock().mapped_pages(), 0);
}

#[test]
fn test_random_victim_is_unpinned_resident() {
    let _guard = common::setup(2);
    let mut table = common::new_table();

    let ea = table.insert_stack(UA, true, true).unwrap();
    let eb = table.insert_stack(UB, true, true).unwrap();
    assert!(page::load(&ea));
    assert!(page::load(&eb));

    // 钉住 A，随机挑选只能落在 B 上；返回时受害者已被钉住。
    assert!(table.pin(UA));
    let victim = frame::choose_victim_random();
    assert!(std::sync::Arc::ptr_eq(&victim, &eb));
    assert!(victim.lock().pinned());

    victim.lock().set_pinned(false);
    table.unpin(UA);
}

#[test]
fn test_code_page_lazy_load() {
    let _guard = common::setup(2);
    let mut table = common::new_table();

    let mem = MemFile::new((0..PGSIZE).map(|i| (i % 97) as u8).collect());
    let original = mem.snapshot();
    let file: Arc<dyn PageFile> = Arc::new(SharedFile(mem));

    let slice = mm::FileSlice {
        file,
        offset: 0,
        read_bytes: PGSIZE,
        zero_bytes: 0,
    };
    let entry = table.insert_code(UA, slice, false).unwrap();
    assert!(entry.lock().is_not_loaded());

    // 缺页时才从文件读入。
    assert!(table.handle_fault(UA, ESP));
    let mut buf = vec![0u8; PGSIZE];
    assert!(uaccess::copy_from_user(table.pagedir(), UA, &mut buf));
    assert_eq!(buf, original);

    // 干净代码页卸载后回到与初始等价的元数据。
    page::unload(&entry);
    assert_eq!(entry.lock().state(), PageState::NotLoaded);
    assert!(!frame::contains(&entry));
}
