//! 目录层
//!
//! 目录是带 is_dir 标志的 inode，内容为定长目录项数组。
//! 每个目录在创建时写入 `.` 与 `..` 两个保留项，分别指向自身与父目录；
//! 二者对 readdir 不可见。

use alloc::string::String;
use alloc::sync::Arc;

use crate::inode::{self, Inode};
use crate::{context, FsError, ROOT_DIR_SECTOR};
use device::Sector;

/// 文件名最大长度（字节）
pub const NAME_MAX: usize = 14;

/// 新建目录预留的目录项数
const DIR_INITIAL_ENTRIES: usize = 16;

const DOT: &str = ".";
const DOTDOT: &str = "..";

/// 磁盘目录项
#[repr(C)]
#[derive(Clone, Copy)]
struct DirEntryDisk {
    /// 目标 inode 所在扇区
    inode_sector: Sector,
    /// NUL 结尾的名字
    name: [u8; NAME_MAX + 1],
    /// 是否在用
    in_use: u8,
}

/// 目录项大小
pub const DIR_ENTRY_SIZE: usize = core::mem::size_of::<DirEntryDisk>();

const _: () = assert!(DIR_ENTRY_SIZE == 20);

impl DirEntryDisk {
    fn unused() -> Self {
        DirEntryDisk {
            inode_sector: 0,
            name: [0; NAME_MAX + 1],
            in_use: 0,
        }
    }

    fn as_bytes(&self) -> &[u8] {
        // SAFETY: repr(C) 的纯整数结构。
        unsafe {
            core::slice::from_raw_parts(self as *const DirEntryDisk as *const u8, DIR_ENTRY_SIZE)
        }
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: 同上，任意位模式均为合法值。
        unsafe {
            core::slice::from_raw_parts_mut(self as *mut DirEntryDisk as *mut u8, DIR_ENTRY_SIZE)
        }
    }

    fn set_name(&mut self, name: &str) {
        debug_assert!(name.len() <= NAME_MAX);
        self.name = [0; NAME_MAX + 1];
        self.name[..name.len()].copy_from_slice(name.as_bytes());
    }

    fn name_matches(&self, name: &str) -> bool {
        let bytes = name.as_bytes();
        if bytes.len() > NAME_MAX {
            return false;
        }
        self.name[..bytes.len()] == *bytes && self.name[bytes.len()] == 0
    }

    fn name_string(&self) -> String {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_MAX);
        String::from_utf8_lossy(&self.name[..len]).into_owned()
    }
}

/// 打开的目录句柄，带 readdir 游标。
pub struct Dir {
    inode: Arc<Inode>,
    pos: usize,
}

impl Dir {
    /// 以 inode 打开目录，接管其引用。非目录报错并关闭。
    pub fn open(inode: Arc<Inode>) -> Result<Dir, FsError> {
        if !inode.is_dir() {
            inode::close(inode);
            return Err(FsError::NotDirectory);
        }
        Ok(Dir { inode, pos: 0 })
    }

    /// 打开根目录。
    pub fn open_root() -> Result<Dir, FsError> {
        let inode = inode::open(ROOT_DIR_SECTOR).ok_or(FsError::IoError)?;
        Dir::open(inode)
    }

    /// 打开当前进程的工作目录；未注册进程上下文时退回根目录。
    ///
    /// 工作目录已被删除时报错。
    pub fn open_current() -> Result<Dir, FsError> {
        let sector = context().and_then(|ctx| ctx.current_dir());
        match sector {
            None => Dir::open_root(),
            Some(sector) => {
                let inode = inode::open(sector).ok_or(FsError::IoError)?;
                if inode.is_removed() {
                    inode::close(inode);
                    return Err(FsError::NotFound);
                }
                Dir::open(inode)
            }
        }
    }

    /// 打开同一目录的新句柄。
    pub fn reopen(&self) -> Result<Dir, FsError> {
        Dir::open(inode::reopen(&self.inode))
    }

    /// 目录对应的 inode。
    pub fn inode(&self) -> &Arc<Inode> {
        &self.inode
    }

    /// 在目录中查找 name，返回打开的目标 inode。
    pub fn lookup(&self, name: &str) -> Result<Arc<Inode>, FsError> {
        let (entry, _) = self.find_entry(name).ok_or(FsError::NotFound)?;
        inode::open(entry.inode_sector).ok_or(FsError::IoError)
    }

    /// 添加一个目录项。
    pub fn add(&self, name: &str, sector: Sector) -> Result<(), FsError> {
        if name.is_empty() {
            return Err(FsError::InvalidPath);
        }
        if name.len() > NAME_MAX {
            return Err(FsError::NameTooLong);
        }
        if self.find_entry(name).is_some() {
            return Err(FsError::AlreadyExists);
        }

        // 找第一个空槽；没有空槽时 ofs 落在文件末尾，写入即扩展。
        let mut entry = DirEntryDisk::unused();
        let mut ofs = 0;
        while self.inode.read_at(entry.as_bytes_mut(), ofs) == DIR_ENTRY_SIZE {
            if entry.in_use == 0 {
                break;
            }
            ofs += DIR_ENTRY_SIZE;
        }

        entry.in_use = 1;
        entry.inode_sector = sector;
        entry.set_name(name);
        if self.inode.write_at(entry.as_bytes(), ofs) != DIR_ENTRY_SIZE {
            return Err(FsError::NoSpace);
        }
        Ok(())
    }

    /// 删除名为 name 的目录项并标记目标 inode 删除。
    ///
    /// 目标是目录时必须为空（`.`/`..` 除外）。
    pub fn remove(&self, name: &str) -> Result<(), FsError> {
        let (entry, ofs) = self.find_entry(name).ok_or(FsError::NotFound)?;
        let target = inode::open(entry.inode_sector).ok_or(FsError::IoError)?;

        if target.is_dir() && !is_empty(&target) {
            inode::close(target);
            return Err(FsError::DirectoryNotEmpty);
        }

        // 清除目录项。
        let mut cleared = entry;
        cleared.in_use = 0;
        if self.inode.write_at(cleared.as_bytes(), ofs) != DIR_ENTRY_SIZE {
            inode::close(target);
            return Err(FsError::IoError);
        }

        target.remove();
        inode::close(target);
        Ok(())
    }

    /// 读出下一个目录项的名字；`.` 和 `..` 被跳过。
    pub fn read_next(&mut self) -> Option<String> {
        let mut entry = DirEntryDisk::unused();
        while self.inode.read_at(entry.as_bytes_mut(), self.pos) == DIR_ENTRY_SIZE {
            self.pos += DIR_ENTRY_SIZE;
            if entry.in_use != 0 {
                if entry.name_matches(DOT) || entry.name_matches(DOTDOT) {
                    continue;
                }
                return Some(entry.name_string());
            }
        }
        None
    }

    /// 给新目录写入 `.` 与 `..`。失败时回滚已写入的 `.`。
    pub fn add_dot_entries(&self, parent: &Dir) -> Result<(), FsError> {
        self.add(DOT, self.inode.sector())?;

        if let Err(e) = self.add(DOTDOT, parent.inode.sector()) {
            let _ = self.remove(DOT);
            return Err(e);
        }
        Ok(())
    }

    fn find_entry(&self, name: &str) -> Option<(DirEntryDisk, usize)> {
        let mut entry = DirEntryDisk::unused();
        let mut ofs = 0;
        while self.inode.read_at(entry.as_bytes_mut(), ofs) == DIR_ENTRY_SIZE {
            if entry.in_use != 0 && entry.name_matches(name) {
                return Some((entry, ofs));
            }
            ofs += DIR_ENTRY_SIZE;
        }
        None
    }
}

impl Drop for Dir {
    fn drop(&mut self) {
        inode::close(self.inode.clone());
    }
}

/// 目录是否为空（忽略 `.`/`..`）。
fn is_empty(inode: &Arc<Inode>) -> bool {
    let mut entry = DirEntryDisk::unused();
    let mut ofs = 0;
    while inode.read_at(entry.as_bytes_mut(), ofs) == DIR_ENTRY_SIZE {
        ofs += DIR_ENTRY_SIZE;
        if entry.in_use != 0 && !entry.name_matches(DOT) && !entry.name_matches(DOTDOT) {
            return false;
        }
    }
    true
}

/// 在 sector 处创建一个空目录 inode。
pub(crate) fn create(sector: Sector) -> bool {
    inode::create(sector, DIR_INITIAL_ENTRIES * DIR_ENTRY_SIZE, true)
}
