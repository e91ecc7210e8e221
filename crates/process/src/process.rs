//! 进程资源
//!
//! 进程持有的全部可回收资源：页目录、补充页表、文件描述符表、
//! 映射标识表、工作目录和保持打开的可执行文件。
//! 进程内的结构不加锁（单线程属主）；跨 crate 暴露的只有工作目录单元，
//! 文件系统经注册的上下文读取它。
//!
//! 调度、等待与退出信号属于外部协作者，这里只记录退出码。

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};
use lazy_static::lazy_static;
use sync::SpinLock;

use device::Sector;
use fs::inode::{self, Inode};
use fs::{FsError, File};
use mm::{config, FileSlice, MmapFile, PageDir, SuppTable};

use crate::bridge::FileBacking;
use crate::fd_table::FdTable;
use crate::mmap_table::MmapTable;

/// 工作目录单元：进程与文件系统上下文共享。
pub type CwdCell = Arc<SpinLock<Option<Sector>>>;

static NEXT_PID: AtomicU32 = AtomicU32::new(1);

lazy_static! {
    /// 当前进程的工作目录单元；文件系统解析相对路径时读取。
    static ref CURRENT_CWD: SpinLock<Option<CwdCell>> = SpinLock::new(None);
}

struct CwdContext;

impl fs::FsContext for CwdContext {
    fn current_dir(&self) -> Option<Sector> {
        let cell = CURRENT_CWD.lock().clone()?;
        let sector = *cell.lock();
        sector
    }
}

static CWD_CONTEXT: CwdContext = CwdContext;

/// 向文件系统注册进程上下文。启动时调用一次。
pub fn init() {
    // SAFETY: 启动期单线程调用一次。
    unsafe { fs::register_context(&CWD_CONTEXT) };
}

/// 把 process 设为当前进程（其工作目录对文件系统可见）。
pub fn activate(process: &Process) {
    *CURRENT_CWD.lock() = Some(process.cwd.clone());
}

/// 清除当前进程。
pub fn deactivate() {
    *CURRENT_CWD.lock() = None;
}

/// 一个用户进程的资源集合
pub struct Process {
    pid: u32,
    pagedir: Arc<SpinLock<PageDir>>,
    /// 补充页表
    pub spt: SuppTable,
    /// 文件描述符表
    pub fds: FdTable,
    /// 内存映射标识表
    pub mmaps: MmapTable,
    cwd: CwdCell,
    /// 保持工作目录 inode 打开：被删除的目录要等引用者退场才回收，
    /// 文件系统也借此拒绝在已删除的工作目录里解析相对路径。
    cwd_handle: Option<Arc<Inode>>,
    executable: Option<File>,
    exit_code: Option<i32>,
}

impl Process {
    /// 创建一个空进程。
    pub fn new() -> Process {
        let pagedir = Arc::new(SpinLock::new(PageDir::new()));
        Process {
            pid: NEXT_PID.fetch_add(1, Ordering::Relaxed),
            spt: SuppTable::new(pagedir.clone()),
            pagedir,
            fds: FdTable::new(),
            mmaps: MmapTable::new(),
            cwd: Arc::new(SpinLock::new(None)),
            cwd_handle: None,
            executable: None,
            exit_code: None,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// 进程页目录。
    pub fn pagedir(&self) -> &Arc<SpinLock<PageDir>> {
        &self.pagedir
    }

    /// 当前工作目录的 inode 扇区。
    pub fn cwd(&self) -> Option<Sector> {
        *self.cwd.lock()
    }

    /// 切换工作目录到 path 处的目录。
    pub fn chdir(&mut self, path: &str) -> Result<(), FsError> {
        let dir = fs::open_dir(path)?;
        let handle = inode::reopen(dir.inode());
        let sector = handle.sector();
        drop(dir);

        if let Some(old) = self.cwd_handle.replace(handle) {
            inode::close(old);
        }
        *self.cwd.lock() = Some(sector);
        Ok(())
    }

    /// 打开 path 并分配描述符。
    pub fn open_fd(&mut self, path: &str) -> Result<usize, FsError> {
        let file = fs::open(path)?;
        Ok(self.fds.alloc(file))
    }

    /// 关闭描述符。
    pub fn close_fd(&mut self, fd: usize) -> bool {
        self.fds.close(fd).is_some()
    }

    /// 把描述符 fd 的文件映射到 uaddr，返回映射 id。
    pub fn mmap(&mut self, fd: usize, uaddr: usize) -> Option<usize> {
        if uaddr == 0 || uaddr & mm::PGMASK != 0 {
            return None;
        }

        let file = self.fds.get(fd)?;
        let backing = FileBacking::from_file(file);
        let mapping = MmapFile::create(&mut self.spt, &backing, uaddr)?;
        Some(self.mmaps.alloc(mapping))
    }

    /// 解除映射 id，脏页写回文件。
    pub fn munmap(&mut self, id: usize) -> bool {
        match self.mmaps.take(id) {
            Some(mapping) => {
                mapping.destroy(&mut self.spt);
                true
            }
            None => false,
        }
    }

    /// 打开可执行文件并施加写保护，保持到进程退出。
    pub fn set_executable(&mut self, path: &str) -> Result<(), FsError> {
        let mut file = fs::open(path)?;
        file.deny_write();
        self.executable = Some(file);
        Ok(())
    }

    /// 可执行文件句柄。
    pub fn executable(&self) -> Option<&File> {
        self.executable.as_ref()
    }

    /// 把可执行段登记为惰性装载的 Code 页。
    ///
    /// 逐页拆分 read_bytes/zero_bytes；页在首次缺页时才读入。
    pub fn map_code_segment(
        &mut self,
        file: &File,
        offset: usize,
        upage: usize,
        read_bytes: usize,
        zero_bytes: usize,
        writable: bool,
    ) -> bool {
        assert!((read_bytes + zero_bytes) % config::PGSIZE == 0);
        assert!(upage & mm::PGMASK == 0);

        let backing = FileBacking::from_file(file);

        let mut upage = upage;
        let mut offset = offset;
        let mut read_left = read_bytes;
        let mut zero_left = zero_bytes;

        while read_left > 0 || zero_left > 0 {
            let page_read = core::cmp::min(read_left, config::PGSIZE);
            let page_zero = config::PGSIZE - page_read;

            let slice = FileSlice {
                file: backing.clone(),
                offset,
                read_bytes: page_read,
                zero_bytes: page_zero,
            };
            if self.spt.insert_code(upage, slice, writable).is_none() {
                return false;
            }

            read_left -= page_read;
            zero_left -= page_zero;
            offset += page_read;
            upage += config::PGSIZE;
        }

        true
    }

    /// 进程退出：关闭全部描述符，解除全部映射，
    /// 释放可执行文件（写保护随句柄解除），清空补充页表与页目录。
    pub fn exit(&mut self, status: i32) {
        log::debug!("process {}: exit({})", self.pid, status);
        self.exit_code = Some(status);

        let files: Vec<File> = self.fds.take_all();
        drop(files);

        for mapping in self.mmaps.take_all() {
            mapping.destroy(&mut self.spt);
        }

        self.executable.take();

        *self.cwd.lock() = None;
        if let Some(handle) = self.cwd_handle.take() {
            inode::close(handle);
        }

        self.spt.remove_all();
    }

    /// 退出码（未退出时为 None）。
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }
}

impl Default for Process {
    fn default() -> Self {
        Self::new()
    }
}
