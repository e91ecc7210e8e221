//! 文件句柄
//!
//! 每个句柄维护独立的读写位置和写保护标志；底层 inode 由打开表共享。
//! 句柄离开作用域时自动关闭（写保护先于关闭解除）。

use alloc::sync::Arc;

use crate::inode::{self, Inode};

/// 打开的文件
pub struct File {
    inode: Arc<Inode>,
    pos: usize,
    deny_write: bool,
}

impl File {
    /// 以 inode 打开文件，接管其引用。
    pub(crate) fn new(inode: Arc<Inode>) -> File {
        File {
            inode,
            pos: 0,
            deny_write: false,
        }
    }

    /// 打开同一 inode 的新句柄，位置独立、不继承写保护。
    pub fn reopen(&self) -> File {
        File::new(inode::reopen(&self.inode))
    }

    /// 底层 inode。
    pub fn inode(&self) -> &Arc<Inode> {
        &self.inode
    }

    /// 文件长度（字节）。
    pub fn len(&self) -> usize {
        self.inode.length()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 从当前位置读取，推进位置，返回读取字节数。
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = self.inode.read_at(buf, self.pos);
        self.pos += n;
        n
    }

    /// 从指定偏移读取，不影响当前位置。
    pub fn read_at(&self, buf: &mut [u8], offset: usize) -> usize {
        self.inode.read_at(buf, offset)
    }

    /// 向当前位置写入，推进位置，返回写入字节数。
    pub fn write(&mut self, buf: &[u8]) -> usize {
        let n = self.inode.write_at(buf, self.pos);
        self.pos += n;
        n
    }

    /// 向指定偏移写入，不影响当前位置。
    pub fn write_at(&self, buf: &[u8], offset: usize) -> usize {
        self.inode.write_at(buf, offset)
    }

    /// 移动读写位置。
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// 当前读写位置。
    pub fn tell(&self) -> usize {
        self.pos
    }

    /// 禁止通过任何句柄写入底层 inode。本句柄关闭时自动解除。
    pub fn deny_write(&mut self) {
        if !self.deny_write {
            self.deny_write = true;
            self.inode.deny_write();
        }
    }

    /// 解除本句柄施加的写保护。
    pub fn allow_write(&mut self) {
        if self.deny_write {
            self.deny_write = false;
            self.inode.allow_write();
        }
    }
}

impl Drop for File {
    fn drop(&mut self) {
        if self.deny_write {
            self.inode.allow_write();
        }
        inode::close(self.inode.clone());
    }
}
