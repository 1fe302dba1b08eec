//! 块设备接口

use crate::error::Result;

/// 块设备接口
///
/// 读写都是同步的：调用线程阻塞到 I/O 完成。驱动自己负责并发控制，
/// 因此方法只需要 `&self`。
///
/// 缓存不重试、也不解释 I/O 错误，驱动返回的错误原样交给缓存的调用者。
///
/// # 示例
///
/// ```rust,ignore
/// use bcache_core::{BlockDevice, Result};
///
/// struct VirtioDisk {
///     // ...
/// }
///
/// impl BlockDevice for VirtioDisk {
///     fn read_block(&self, dev: u32, blockno: u32, buf: &mut [u8]) -> Result<()> {
///         self.rw(dev, blockno, buf.as_mut_ptr(), false)
///     }
///
///     fn write_block(&self, dev: u32, blockno: u32, buf: &[u8]) -> Result<()> {
///         self.rw(dev, blockno, buf.as_ptr() as *mut u8, true)
///     }
/// }
/// ```
pub trait BlockDevice: Send + Sync {
    /// 读取一个块
    ///
    /// # 参数
    ///
    /// * `dev` - 设备号
    /// * `blockno` - 块号
    /// * `buf` - 目标缓冲区，长度等于块大小
    fn read_block(&self, dev: u32, blockno: u32, buf: &mut [u8]) -> Result<()>;

    /// 写入一个块
    ///
    /// # 参数
    ///
    /// * `dev` - 设备号
    /// * `blockno` - 块号
    /// * `buf` - 源缓冲区，长度等于块大小
    fn write_block(&self, dev: u32, blockno: u32, buf: &[u8]) -> Result<()>;

    /// 是否只读
    fn is_read_only(&self) -> bool {
        false
    }
}

impl<D: BlockDevice + ?Sized> BlockDevice for &D {
    fn read_block(&self, dev: u32, blockno: u32, buf: &mut [u8]) -> Result<()> {
        (**self).read_block(dev, blockno, buf)
    }

    fn write_block(&self, dev: u32, blockno: u32, buf: &[u8]) -> Result<()> {
        (**self).write_block(dev, blockno, buf)
    }

    fn is_read_only(&self) -> bool {
        (**self).is_read_only()
    }
}

impl<D: BlockDevice + ?Sized> BlockDevice for alloc::sync::Arc<D> {
    fn read_block(&self, dev: u32, blockno: u32, buf: &mut [u8]) -> Result<()> {
        (**self).read_block(dev, blockno, buf)
    }

    fn write_block(&self, dev: u32, blockno: u32, buf: &[u8]) -> Result<()> {
        (**self).write_block(dev, blockno, buf)
    }

    fn is_read_only(&self) -> bool {
        (**self).is_read_only()
    }
}
