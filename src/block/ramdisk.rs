//! 内存块设备

use crate::error::{Error, ErrorKind, Result};
use crate::sync::SpinLock;

use super::BlockDevice;
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// 内存块设备
///
/// 以 `(dev, blockno)` 为键保存块内容，从未写过的块读出全 0。
/// 同时统计物理读写次数，测试里用它判断缓存是否真正访问了设备。
pub struct RamDisk {
    /// 块内容
    blocks: SpinLock<BTreeMap<(u32, u32), Box<[u8]>>>,
    /// 块大小（字节）
    block_size: usize,
    /// 物理读取次数
    reads: AtomicU64,
    /// 物理写入次数
    writes: AtomicU64,
    /// 读取是否注入失败
    fail_reads: AtomicBool,
    /// 是否只读
    read_only: bool,
}

impl RamDisk {
    /// 创建空的内存设备
    pub fn new(block_size: usize) -> Self {
        Self {
            blocks: SpinLock::new(BTreeMap::new(), "ramdisk"),
            block_size,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            fail_reads: AtomicBool::new(false),
            read_only: false,
        }
    }

    /// 创建只读内存设备
    pub fn new_read_only(block_size: usize) -> Self {
        Self {
            read_only: true,
            ..Self::new(block_size)
        }
    }

    /// 块大小（字节）
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// 物理读取次数
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// 物理写入次数
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// 之后的读取全部返回 I/O 错误（`true`）或恢复正常（`false`）
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }

    /// 绕过缓存直接写设备内容（准备测试数据）
    pub fn store(&self, dev: u32, blockno: u32, data: &[u8]) -> Result<()> {
        self.check_len(data.len())?;
        self.blocks.lock().insert((dev, blockno), data.into());
        Ok(())
    }

    /// 绕过缓存直接读设备内容，从未写过的块返回 `None`
    pub fn load(&self, dev: u32, blockno: u32) -> Option<Box<[u8]>> {
        self.blocks.lock().get(&(dev, blockno)).cloned()
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.block_size {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "buffer length does not match block size",
            ));
        }
        Ok(())
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&self, dev: u32, blockno: u32, buf: &mut [u8]) -> Result<()> {
        self.check_len(buf.len())?;
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(Error::new(ErrorKind::Io, "injected read failure"));
        }

        self.reads.fetch_add(1, Ordering::Relaxed);
        match self.blocks.lock().get(&(dev, blockno)) {
            Some(data) => buf.copy_from_slice(data),
            None => buf.fill(0),
        }
        Ok(())
    }

    fn write_block(&self, dev: u32, blockno: u32, buf: &[u8]) -> Result<()> {
        self.check_len(buf.len())?;
        if self.read_only {
            return Err(Error::new(ErrorKind::Unsupported, "device is read-only"));
        }

        self.writes.fetch_add(1, Ordering::Relaxed);
        let mut blocks = self.blocks.lock();
        match blocks.get_mut(&(dev, blockno)) {
            Some(data) => data.copy_from_slice(buf),
            None => {
                let mut data = vec![0u8; self.block_size].into_boxed_slice();
                data.copy_from_slice(buf);
                blocks.insert((dev, blockno), data);
            }
        }
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}

impl core::fmt::Debug for RamDisk {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RamDisk")
            .field("block_size", &self.block_size)
            .field("blocks", &self.blocks.lock().len())
            .field("reads", &self.read_count())
            .field("writes", &self.write_count())
            .field("read_only", &self.read_only)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwritten_block_reads_zero() {
        let disk = RamDisk::new(512);
        let mut buf = vec![0xAAu8; 512];
        disk.read_block(1, 9, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
        assert_eq!(disk.read_count(), 1);
        assert!(disk.load(1, 9).is_none());
    }

    #[test]
    fn test_write_then_read() {
        let disk = RamDisk::new(512);
        let data = vec![0x42u8; 512];
        disk.write_block(1, 3, &data).unwrap();
        assert_eq!(disk.write_count(), 1);

        let mut buf = vec![0u8; 512];
        disk.read_block(1, 3, &mut buf).unwrap();
        assert_eq!(buf, data);

        // 不同设备号是不同的块
        disk.read_block(2, 3, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_length_mismatch() {
        let disk = RamDisk::new(512);
        let mut short = vec![0u8; 100];
        let err = disk.read_block(1, 0, &mut short).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(disk.read_count(), 0);
    }

    #[test]
    fn test_injected_failure_and_read_only() {
        let disk = RamDisk::new(512);
        disk.set_fail_reads(true);
        let mut buf = vec![0u8; 512];
        assert_eq!(disk.read_block(1, 0, &mut buf).unwrap_err().kind(), ErrorKind::Io);
        disk.set_fail_reads(false);
        assert!(disk.read_block(1, 0, &mut buf).is_ok());

        let ro = RamDisk::new_read_only(512);
        assert!(ro.is_read_only());
        assert_eq!(ro.write_block(1, 0, &buf).unwrap_err().kind(), ErrorKind::Unsupported);
        assert_eq!(ro.write_count(), 0);
    }
}
