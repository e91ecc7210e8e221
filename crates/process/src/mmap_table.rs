//! 内存映射标识表
//!
//! 与文件描述符表同构：活动映射的稠密数组，id 从 0 起。

use alloc::vec::Vec;
use mm::MmapFile;

/// 进程的映射标识表
pub struct MmapTable {
    slots: Vec<Option<MmapFile>>,
}

impl MmapTable {
    pub fn new() -> Self {
        MmapTable { slots: Vec::new() }
    }

    /// 登记一个映射，返回其 id。
    pub fn alloc(&mut self, mapping: MmapFile) -> usize {
        for id in 0..self.slots.len() {
            if self.slots[id].is_none() {
                self.slots[id] = Some(mapping);
                return id;
            }
        }
        self.slots.push(Some(mapping));
        self.slots.len() - 1
    }

    /// 取走 id 对应的映射。
    pub fn take(&mut self, id: usize) -> Option<MmapFile> {
        self.slots.get_mut(id).and_then(|s| s.take())
    }

    /// 取走全部映射（进程退出）。
    pub fn take_all(&mut self) -> Vec<MmapFile> {
        self.slots.iter_mut().filter_map(|s| s.take()).collect()
    }

    /// 活动映射数（用于测试）
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

impl Default for MmapTable {
    fn default() -> Self {
        Self::new()
    }
}
