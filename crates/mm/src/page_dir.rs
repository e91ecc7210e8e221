//! 软件页目录
//!
//! 每个进程一份的用户页映射视图：用户页 → {内核帧, 可写, 脏, 访问}。
//! 硬件 MMU 的编程属于外部协作者；内核侧对映射的全部认知在这里，
//! 脏位与访问位也由访问路径在此维护。

use hashbrown::HashMap;

use crate::config::{is_user_vaddr, PGMASK};
use crate::kpage::Kpage;

#[derive(Debug, Clone, Copy)]
struct PdEntry {
    kpage: Kpage,
    writable: bool,
    dirty: bool,
    accessed: bool,
}

/// 进程页目录。
pub struct PageDir {
    map: HashMap<usize, PdEntry>,
}

impl PageDir {
    pub fn new() -> Self {
        PageDir {
            map: HashMap::new(),
        }
    }

    /// 建立 upage → kpage 的映射。已有映射时返回 false。
    pub fn set_page(&mut self, upage: usize, kpage: Kpage, writable: bool) -> bool {
        debug_assert!(upage & PGMASK == 0);
        debug_assert!(is_user_vaddr(upage));

        if self.map.contains_key(&upage) {
            return false;
        }
        self.map.insert(
            upage,
            PdEntry {
                kpage,
                writable,
                dirty: false,
                accessed: false,
            },
        );
        true
    }

    /// 解除 upage 的映射。
    pub fn clear_page(&mut self, upage: usize) {
        debug_assert!(upage & PGMASK == 0);
        self.map.remove(&upage);
    }

    /// upage 当前映射到的内核帧。
    pub fn get_page(&self, upage: usize) -> Option<Kpage> {
        self.map.get(&(upage & !PGMASK)).map(|e| e.kpage)
    }

    /// upage 是否可写。未映射时返回 false。
    pub fn is_writable(&self, upage: usize) -> bool {
        self.map
            .get(&(upage & !PGMASK))
            .map(|e| e.writable)
            .unwrap_or(false)
    }

    /// 读取脏位。未映射时返回 false。
    pub fn is_dirty(&self, upage: usize) -> bool {
        self.map
            .get(&(upage & !PGMASK))
            .map(|e| e.dirty)
            .unwrap_or(false)
    }

    /// 写入脏位。
    pub fn set_dirty(&mut self, upage: usize, dirty: bool) {
        if let Some(e) = self.map.get_mut(&(upage & !PGMASK)) {
            e.dirty = dirty;
        }
    }

    /// 读取访问位。未映射时返回 false。
    pub fn is_accessed(&self, upage: usize) -> bool {
        self.map
            .get(&(upage & !PGMASK))
            .map(|e| e.accessed)
            .unwrap_or(false)
    }

    /// 写入访问位。
    pub fn set_accessed(&mut self, upage: usize, accessed: bool) {
        if let Some(e) = self.map.get_mut(&(upage & !PGMASK)) {
            e.accessed = accessed;
        }
    }

    /// 当前映射数。
    pub fn mapped_pages(&self) -> usize {
        self.map.len()
    }

    /// 清空全部映射（进程退出）。
    pub fn clear_all(&mut self) {
        self.map.clear();
    }
}

impl Default for PageDir {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kp(addr: usize) -> Kpage {
        // 测试直接构造帧地址；页池不参与。
        Kpage::new(addr)
    }

    #[test]
    fn test_map_unmap() {
        let mut pd = PageDir::new();
        assert!(pd.set_page(0x8048_0000, kp(0xdead_0000), true));
        // 重复映射被拒绝
        assert!(!pd.set_page(0x8048_0000, kp(0xbeef_0000), true));
        assert_eq!(pd.get_page(0x8048_0000).unwrap().addr(), 0xdead_0000);
        assert_eq!(pd.get_page(0x8048_0123).unwrap().addr(), 0xdead_0000);

        pd.clear_page(0x8048_0000);
        assert!(pd.get_page(0x8048_0000).is_none());
    }

    #[test]
    fn test_dirty_accessed_bits() {
        let mut pd = PageDir::new();
        pd.set_page(0x1000, kp(0x2000), true);
        assert!(!pd.is_dirty(0x1000));
        assert!(!pd.is_accessed(0x1000));

        pd.set_dirty(0x1000, true);
        pd.set_accessed(0x1000, true);
        assert!(pd.is_dirty(0x1000));
        assert!(pd.is_accessed(0x1000));

        pd.set_accessed(0x1000, false);
        assert!(!pd.is_accessed(0x1000));
        // 未映射地址上的位操作是 no-op
        pd.set_dirty(0x9000, true);
        assert!(!pd.is_dirty(0x9000));
    }
}
