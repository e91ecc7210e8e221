//! 内存模拟块设备
//!
//! 用于测试和开发。

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use sync::SpinLock;

use super::{BlockDriver, Sector, SECTOR_SIZE};

/// 内存模拟的块设备
pub struct RamDisk {
    /// 存储数据
    data: SpinLock<Vec<u8>>,
}

impl RamDisk {
    /// 创建指定扇区数的内存磁盘，内容清零。
    pub fn new(sectors: usize) -> Arc<Self> {
        Arc::new(Self {
            data: SpinLock::new(vec![0u8; sectors * SECTOR_SIZE]),
        })
    }

    /// 从字节数组创建，长度必须是扇区大小的整数倍。
    pub fn from_bytes(data: Vec<u8>) -> Arc<Self> {
        assert!(data.len() % SECTOR_SIZE == 0);
        Arc::new(Self {
            data: SpinLock::new(data),
        })
    }

    /// 整盘内容快照（用于调试）
    pub fn raw_data(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    /// 将整盘内容清零。
    pub fn wipe(&self) {
        self.data.lock().fill(0);
    }
}

impl BlockDriver for RamDisk {
    fn read_block(&self, sector: Sector, buf: &mut [u8]) -> bool {
        if buf.len() != SECTOR_SIZE {
            return false;
        }

        let data = self.data.lock();
        let offset = sector as usize * SECTOR_SIZE;

        if offset + SECTOR_SIZE > data.len() {
            return false;
        }

        buf.copy_from_slice(&data[offset..offset + SECTOR_SIZE]);
        true
    }

    fn write_block(&self, sector: Sector, buf: &[u8]) -> bool {
        if buf.len() != SECTOR_SIZE {
            return false;
        }

        let mut data = self.data.lock();
        let offset = sector as usize * SECTOR_SIZE;

        if offset + SECTOR_SIZE > data.len() {
            return false;
        }

        data[offset..offset + SECTOR_SIZE].copy_from_slice(buf);
        true
    }

    fn total_sectors(&self) -> usize {
        self.data.lock().len() / SECTOR_SIZE
    }
}
