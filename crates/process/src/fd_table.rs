//! 文件描述符表
//!
//! 从 fd 2 起的稠密数组；0 和 1 保留给标准输入输出（由控制台层接管）。
//! 空槽扫描失败时表长翻倍。

use alloc::vec::Vec;
use fs::File;

/// 标准流保留的描述符数
const FD_RESERVED: usize = 2;

/// 进程的文件描述符表
pub struct FdTable {
    slots: Vec<Option<File>>,
}

impl FdTable {
    pub fn new() -> Self {
        let mut slots = Vec::new();
        for _ in 0..FD_RESERVED {
            slots.push(None);
        }
        FdTable { slots }
    }

    /// 为 file 分配一个描述符。先扫描空槽，没有就翻倍扩表。
    pub fn alloc(&mut self, file: File) -> usize {
        for fd in FD_RESERVED..self.slots.len() {
            if self.slots[fd].is_none() {
                self.slots[fd] = Some(file);
                return fd;
            }
        }

        let fd = self.slots.len();
        let new_len = self.slots.len() * 2;
        self.slots.resize_with(new_len, || None);
        self.slots[fd] = Some(file);
        fd
    }

    /// 取得描述符对应的文件。
    pub fn get(&self, fd: usize) -> Option<&File> {
        if fd < FD_RESERVED {
            return None;
        }
        self.slots.get(fd).and_then(|s| s.as_ref())
    }

    /// 取得描述符对应的文件（可写位置）。
    pub fn get_mut(&mut self, fd: usize) -> Option<&mut File> {
        if fd < FD_RESERVED {
            return None;
        }
        self.slots.get_mut(fd).and_then(|s| s.as_mut())
    }

    /// 关闭描述符，返回其文件（随即可 drop）。
    pub fn close(&mut self, fd: usize) -> Option<File> {
        if fd < FD_RESERVED {
            return None;
        }
        self.slots.get_mut(fd).and_then(|s| s.take())
    }

    /// 取走全部打开的文件（进程退出）。
    pub fn take_all(&mut self) -> Vec<File> {
        self.slots.iter_mut().filter_map(|s| s.take()).collect()
    }

    /// 打开的描述符数（用于测试）
    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// 表容量（用于测试）
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}
