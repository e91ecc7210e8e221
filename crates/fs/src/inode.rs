//! Inode 存储层
//!
//! 磁盘 inode 恰好占一个扇区：长度、树深、目录标志、124 个块指针和魔数。
//! 深度为 0 时块指针直接指向数据扇区；深度为 d 时每个指针指向一棵
//! 深度 d-1 的子 inode。深度 d 的树最多容纳 124^(d+1) 个数据扇区，
//! 写越界时按需增深。
//!
//! 内存侧每个磁盘扇区至多有一个 [`Inode`] 句柄，打开表按扇区号查重；
//! `open_cnt` 记录未关闭的引用，最后一次关闭时若 `removed` 置位则
//! 由内而外释放全部数据扇区和 inode 扇区本身。

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cmp::min;
use lazy_static::lazy_static;
use sync::SpinLock;

use crate::{cache, free_map};
use device::{Sector, SECTOR_SIZE};

/// inode 魔数 ("INOD")
const INODE_MAGIC: u32 = 0x494e_4f44;

/// 每个 inode 的块指针数，选取后恰好填满一个扇区。
pub const INODE_BLOCK_COUNT: usize = 124;

/// 树深上限。i32 长度在深度 3 之前就会饱和。
pub const MAX_DEPTH: u32 = 3;

/// 磁盘 inode。必须恰好是 SECTOR_SIZE 字节。
#[repr(C)]
#[derive(Clone, Copy)]
struct InodeDisk {
    /// 文件长度（字节）
    length: i32,
    /// 树深，0 为直接块
    depth: u32,
    /// 是否为目录
    is_dir: u32,
    /// 块指针
    blocks: [Sector; INODE_BLOCK_COUNT],
    /// 魔数
    magic: u32,
}

const _: () = assert!(core::mem::size_of::<InodeDisk>() == SECTOR_SIZE);

impl InodeDisk {
    fn empty(depth: u32, is_dir: bool) -> Self {
        InodeDisk {
            length: 0,
            depth,
            is_dir: is_dir as u32,
            blocks: [0; INODE_BLOCK_COUNT],
            magic: INODE_MAGIC,
        }
    }

    fn length(&self) -> usize {
        self.length as usize
    }

    fn set_length(&mut self, len: usize) {
        self.length = len as i32;
    }

    fn as_bytes(&self) -> &[u8] {
        // SAFETY: repr(C) 的纯整数结构，大小恰为一个扇区。
        unsafe { core::slice::from_raw_parts(self as *const InodeDisk as *const u8, SECTOR_SIZE) }
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: 同上，任意位模式均为合法值。
        unsafe { core::slice::from_raw_parts_mut(self as *mut InodeDisk as *mut u8, SECTOR_SIZE) }
    }

    /// 每个块指针覆盖的扇区数：124^depth。
    fn block_sectors(&self) -> usize {
        let mut sectors = 1usize;
        let mut depth = self.depth;
        while depth > 0 {
            sectors *= INODE_BLOCK_COUNT;
            depth -= 1;
        }
        sectors
    }

    /// 每个块指针覆盖的最大字节数。
    fn max_block_size(&self) -> usize {
        self.block_sectors() * SECTOR_SIZE
    }

    /// 当前长度占用的块指针数。
    fn blocks_in_use(&self) -> usize {
        self.length().div_ceil(self.max_block_size())
    }

    /// 本 inode 的容量上限（字节）。
    fn max_size(&self) -> usize {
        self.max_block_size() * INODE_BLOCK_COUNT
    }
}

/// 长度为 size 字节的文件需要的扇区数。
fn bytes_to_sectors(size: usize) -> usize {
    size.div_ceil(SECTOR_SIZE)
}

/// 长度为 size 字节的文件需要的树深。
fn bytes_to_depth(size: usize) -> u32 {
    let mut sectors = bytes_to_sectors(size);
    let mut depth = 0;
    while sectors > INODE_BLOCK_COUNT {
        sectors = sectors.div_ceil(INODE_BLOCK_COUNT);
        depth += 1;
    }
    debug_assert!(depth <= MAX_DEPTH);
    depth
}

fn read_node(sector: Sector) -> Box<InodeDisk> {
    let mut node = Box::new(InodeDisk::empty(0, false));
    cache::read_sector(sector, node.as_bytes_mut());
    node
}

fn write_node(sector: Sector, node: &InodeDisk) {
    cache::write_sector(sector, node.as_bytes());
}

/// 在 sector 处写入一个空 inode。
fn create_empty(sector: Sector, depth: u32, is_dir: bool) {
    let node = InodeDisk::empty(depth, is_dir);
    write_node(sector, &node);
}

// ============================================================================
// 读写：按树深递归下降
// ============================================================================

fn read_at_direct(node: &InodeDisk, buf: &mut [u8], mut offset: usize) -> usize {
    debug_assert_eq!(node.depth, 0);

    let length = node.length();
    let mut done = 0;

    while done < buf.len() && offset < length {
        let sector_ofs = offset % SECTOR_SIZE;

        // 三者取小：请求余量、文件余量、扇区余量。
        let chunk = min(
            buf.len() - done,
            min(length - offset, SECTOR_SIZE - sector_ofs),
        );
        if chunk == 0 {
            break;
        }

        let sector = node.blocks[offset / SECTOR_SIZE];
        let dst = &mut buf[done..done + chunk];
        if sector_ofs == 0 && chunk == SECTOR_SIZE {
            cache::read_sector(sector, dst);
        } else {
            cache::read_bytes(sector, dst, sector_ofs);
        }

        offset += chunk;
        done += chunk;
    }

    done
}

fn read_at_node(node: &InodeDisk, buf: &mut [u8], mut offset: usize) -> usize {
    if node.depth == 0 {
        return read_at_direct(node, buf, offset);
    }

    let max_block_size = node.max_block_size();
    let length = node.length();
    let mut done = 0;

    // 下降用的临时节点放在堆上，整个循环复用一份。
    let mut child = Box::new(InodeDisk::empty(0, false));

    while done < buf.len() && offset < length {
        let block_index = offset / max_block_size;
        let block_offset = offset % max_block_size;
        if block_index >= node.blocks_in_use() {
            break;
        }

        let want = min(
            buf.len() - done,
            min(length - offset, max_block_size - block_offset),
        );
        if want == 0 {
            break;
        }

        cache::read_sector(node.blocks[block_index], child.as_bytes_mut());
        let n = read_at_node(&child, &mut buf[done..done + want], block_offset);
        if n == 0 {
            break;
        }

        offset += n;
        done += n;
    }

    done
}

fn write_at_direct(node: &InodeDisk, buf: &[u8], mut offset: usize) -> usize {
    debug_assert_eq!(node.depth, 0);

    let length = node.length();
    let mut done = 0;

    while done < buf.len() && offset < length {
        let sector_ofs = offset % SECTOR_SIZE;
        let chunk = min(
            buf.len() - done,
            min(length - offset, SECTOR_SIZE - sector_ofs),
        );
        if chunk == 0 {
            break;
        }

        let sector = node.blocks[offset / SECTOR_SIZE];
        let src = &buf[done..done + chunk];
        if sector_ofs == 0 && chunk == SECTOR_SIZE {
            cache::write_sector(sector, src);
        } else {
            cache::write_bytes(sector, src, sector_ofs);
        }

        offset += chunk;
        done += chunk;
    }

    done
}

fn write_at_node(node: &InodeDisk, buf: &[u8], mut offset: usize) -> usize {
    if node.depth == 0 {
        return write_at_direct(node, buf, offset);
    }

    let max_block_size = node.max_block_size();
    let length = node.length();
    let mut done = 0;

    let mut child = Box::new(InodeDisk::empty(0, false));

    while done < buf.len() && offset < length {
        let block_index = offset / max_block_size;
        let block_offset = offset % max_block_size;
        if block_index >= node.blocks_in_use() {
            break;
        }

        let want = min(
            buf.len() - done,
            min(length - offset, max_block_size - block_offset),
        );
        if want == 0 {
            break;
        }

        cache::read_sector(node.blocks[block_index], child.as_bytes_mut());
        let n = write_at_node(&child, &buf[done..done + want], block_offset);
        if n == 0 {
            break;
        }

        offset += n;
        done += n;
    }

    done
}

// ============================================================================
// 增长：深度与长度
// ============================================================================

/// 把根 inode 的树深提升到 new_depth，原有数据全部保留。
///
/// 逐层进行：把当前根的内容搬到新分配的扇区，根变成指向它的间接节点。
/// 中途分配失败时已完成的层次保持有效并落盘，调用者可以重试。
fn grow_depth(sector: Sector, node: &mut InodeDisk, new_depth: u32) -> bool {
    debug_assert!(new_depth <= MAX_DEPTH);

    if node.depth > new_depth {
        return false;
    }

    while node.depth < new_depth {
        let child_sector = match free_map::allocate() {
            Some(s) => s,
            None => {
                // 部分升深已经生效，落盘后报告失败。
                write_node(sector, node);
                return false;
            }
        };

        // 旧根内容整体搬到新扇区，根降级为单指针间接节点。
        write_node(child_sector, node);
        node.blocks = [0; INODE_BLOCK_COUNT];
        node.blocks[0] = child_sector;
        node.depth += 1;
    }

    write_node(sector, node);
    true
}

/// 把深度 0 的节点长度扩展到 size 字节。zero 为 true 时新扇区清零。
fn grow_length_direct(node: &mut InodeDisk, size: usize, zero: bool) -> bool {
    debug_assert_eq!(node.depth, 0);

    if size < node.length() {
        return false;
    }
    if size == node.length() {
        return true;
    }

    let old_sectors = bytes_to_sectors(node.length());
    let new_sectors = bytes_to_sectors(size);
    if new_sectors > INODE_BLOCK_COUNT {
        return false;
    }

    let mut allocated = old_sectors;
    while allocated < new_sectors {
        match free_map::allocate() {
            Some(s) => {
                node.blocks[allocated] = s;
                if zero {
                    let zeros = [0u8; SECTOR_SIZE];
                    cache::write_sector(s, &zeros);
                }
                allocated += 1;
            }
            None => break,
        }
    }

    // 分配不全则回滚本次新增的扇区。
    if allocated != new_sectors {
        for i in old_sectors..allocated {
            free_map::release(node.blocks[i]);
            node.blocks[i] = 0;
        }
        return false;
    }

    node.set_length(size);
    true
}

/// 把 sector 处的 inode 长度扩展到 length 字节。
///
/// 部分进展也会落盘。
fn grow_length_sector(sector: Sector, length: usize, zero: bool) -> bool {
    let mut node = read_node(sector);
    let success = grow_length_node(&mut node, length, zero);
    write_node(sector, &node);
    success
}

/// 把节点长度扩展到 length 字节，逐块推进并递归扩展子树。
fn grow_length_node(node: &mut InodeDisk, length: usize, zero: bool) -> bool {
    if node.depth == 0 {
        return grow_length_direct(node, length, zero);
    }
    if length < node.length() {
        return false;
    }
    if length > node.max_size() {
        return false;
    }

    let max_block_size = node.max_block_size();

    // 本轮新分配但尚未用上的块指针。
    let mut speculative: Option<usize> = None;

    while node.length() != length {
        let block_index = node.length() / max_block_size;
        let block_length = node.length() % max_block_size;

        let grow_left = length - node.length();
        let new_block_length = min(block_length + grow_left, max_block_size);

        // 零长块不落盘，首次触及时分配并写入空子节点。
        // 升深会留下一个空的旧根作为 blocks[0]，这种已有指针直接复用。
        if block_length == 0 && node.blocks[block_index] == 0 {
            match free_map::allocate() {
                Some(s) => {
                    node.blocks[block_index] = s;
                    speculative = Some(block_index);
                    create_empty(s, node.depth - 1, false);
                }
                None => break,
            }
        }

        if !grow_length_sector(node.blocks[block_index], new_block_length, zero) {
            break;
        }

        node.set_length(node.length() + (new_block_length - block_length));
        speculative = None;
    }

    // 最后一次分配的块没有派上用场就整棵还回去。
    if let Some(i) = speculative {
        let child = read_node(node.blocks[i]);
        remove_tree(&child);
        free_map::release(node.blocks[i]);
        node.blocks[i] = 0;
    }

    node.length() == length
}

// ============================================================================
// 释放
// ============================================================================

fn remove_tree_direct(node: &InodeDisk) {
    debug_assert_eq!(node.depth, 0);
    for i in 0..bytes_to_sectors(node.length()) {
        free_map::release(node.blocks[i]);
    }
}

/// 释放 node 引用的所有数据和子 inode 扇区（不含 node 自身所在扇区）。
fn remove_tree(node: &InodeDisk) {
    if node.depth == 0 {
        remove_tree_direct(node);
        return;
    }

    let mut child = Box::new(InodeDisk::empty(0, false));
    for i in 0..node.blocks_in_use() {
        cache::read_sector(node.blocks[i], child.as_bytes_mut());
        free_map::release(node.blocks[i]);
        remove_tree(&child);
    }
}

// ============================================================================
// 内存 inode 与打开表
// ============================================================================

struct InodeInner {
    open_cnt: usize,
    deny_write_cnt: usize,
    removed: bool,
    data: InodeDisk,
}

/// 内存中的 inode 句柄。
pub struct Inode {
    sector: Sector,
    inner: SpinLock<InodeInner>,
}

lazy_static! {
    /// 打开 inode 表：每个扇区至多一个句柄。
    static ref OPEN_INODES: SpinLock<Vec<Arc<Inode>>> = SpinLock::new(Vec::new());
}

/// 初始化 inode 层（清空打开表）。
pub fn init() {
    OPEN_INODES.lock().clear();
}

/// 在 sector 处创建长度 length 的 inode，数据区清零。
///
/// 失败时不保证数据扇区已回收，调用者应继以 [`discard`]。
pub(crate) fn create(sector: Sector, length: usize, is_dir: bool) -> bool {
    let depth = bytes_to_depth(length);
    create_empty(sector, depth, is_dir);
    grow_length_sector(sector, length, true)
}

/// 释放 sector 处未打开 inode 的数据扇区（创建半途失败时的清理）。
pub(crate) fn discard(sector: Sector) {
    let node = read_node(sector);
    remove_tree(&node);
}

/// 打开 sector 处的 inode。同一扇区重复打开返回同一句柄。
pub fn open(sector: Sector) -> Option<Arc<Inode>> {
    let mut list = OPEN_INODES.lock();

    if let Some(inode) = list.iter().find(|i| i.sector == sector) {
        inode.inner.lock().open_cnt += 1;
        return Some(inode.clone());
    }

    let mut data = InodeDisk::empty(0, false);
    cache::read_sector(sector, data.as_bytes_mut());
    debug_assert_eq!(data.magic, INODE_MAGIC);

    let inode = Arc::new(Inode {
        sector,
        inner: SpinLock::new(InodeInner {
            open_cnt: 1,
            deny_write_cnt: 0,
            removed: false,
            data,
        }),
    });
    list.push(inode.clone());
    Some(inode)
}

/// 重新打开一个已打开的 inode。
pub fn reopen(inode: &Arc<Inode>) -> Arc<Inode> {
    inode.inner.lock().open_cnt += 1;
    inode.clone()
}

/// 关闭 inode。最后一次关闭时若已标记删除则释放其全部扇区。
pub fn close(inode: Arc<Inode>) {
    let reclaim = {
        let mut inner = inode.inner.lock();
        debug_assert!(inner.open_cnt > 0);
        inner.open_cnt -= 1;
        if inner.open_cnt > 0 {
            return;
        }
        if inner.removed {
            Some(inner.data)
        } else {
            None
        }
    };

    OPEN_INODES.lock().retain(|i| !Arc::ptr_eq(i, &inode));

    if let Some(data) = reclaim {
        log::debug!("inode: reclaiming removed inode at sector {}", inode.sector);
        free_map::release(inode.sector);
        remove_tree(&data);
    }
}

impl Inode {
    /// inode 所在扇区号。
    pub fn sector(&self) -> Sector {
        self.sector
    }

    /// 文件长度（字节）。
    pub fn length(&self) -> usize {
        self.inner.lock().data.length()
    }

    /// 是否为目录。
    pub fn is_dir(&self) -> bool {
        self.inner.lock().data.is_dir != 0
    }

    /// 是否已标记删除。
    pub fn is_removed(&self) -> bool {
        self.inner.lock().removed
    }

    /// 标记删除；实际回收发生在最后一次关闭。
    pub fn remove(&self) {
        self.inner.lock().removed = true;
    }

    /// 从 offset 处读取至多 buf.len() 字节，返回实际读取数。
    /// 短读表示到达文件末尾。
    pub fn read_at(&self, buf: &mut [u8], offset: usize) -> usize {
        let data = self.inner.lock().data;
        read_at_node(&data, buf, offset)
    }

    /// 向 offset 处写入 buf，返回实际写入数。
    ///
    /// 越过文件末尾的写自动扩展文件；offset 与旧末尾之间补零。
    /// 写保护期间返回 0；扩展失败视作磁盘满，返回 0。
    pub fn write_at(&self, buf: &[u8], offset: usize) -> usize {
        let mut inner = self.inner.lock();
        if inner.deny_write_cnt > 0 {
            return 0;
        }

        let new_length = offset + buf.len();

        // 先保证树深足够。
        let depth = bytes_to_depth(new_length);
        if depth > inner.data.depth {
            let sector = self.sector;
            if !grow_depth(sector, &mut inner.data, depth) {
                return 0;
            }
        }

        // 旧末尾到 offset 之间是空洞，补零扩展。
        if inner.data.length() < offset {
            if !grow_length_root(self.sector, &mut inner.data, offset, true) {
                return 0;
            }
        }

        // 预留最终容量，数据马上会被覆盖，无需清零。
        if inner.data.length() < new_length {
            if !grow_length_root(self.sector, &mut inner.data, new_length, false) {
                return 0;
            }
        }

        write_at_node(&inner.data, buf, offset)
    }

    /// 禁止写入。每个打开者至多调用一次。
    pub fn deny_write(&self) {
        let mut inner = self.inner.lock();
        inner.deny_write_cnt += 1;
        debug_assert!(inner.deny_write_cnt <= inner.open_cnt);
    }

    /// 恢复写入。与 [`Inode::deny_write`] 成对调用。
    pub fn allow_write(&self) {
        let mut inner = self.inner.lock();
        debug_assert!(inner.deny_write_cnt > 0);
        debug_assert!(inner.deny_write_cnt <= inner.open_cnt);
        inner.deny_write_cnt -= 1;
    }

    /// 当前打开计数（用于测试）
    pub fn open_cnt(&self) -> usize {
        self.inner.lock().open_cnt
    }

    /// 当前写保护计数（用于测试）
    pub fn deny_write_cnt(&self) -> usize {
        self.inner.lock().deny_write_cnt
    }

    /// 当前树深（用于测试）
    pub fn depth(&self) -> u32 {
        self.inner.lock().data.depth
    }
}

/// 在根 inode 上扩展长度并落盘。
fn grow_length_root(sector: Sector, node: &mut InodeDisk, length: usize, zero: bool) -> bool {
    let success = grow_length_node(node, length, zero);
    write_node(sector, node);
    success
}
