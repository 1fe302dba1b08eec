//! 块缓存常量定义
//!
//! 这些值只是 [`CacheConfig`](crate::cache::CacheConfig) 的默认值，
//! 实际大小在初始化时确定，之后不再改变。

/// 缓冲池中缓冲块的数量
pub const NBUF: usize = 30;

/// 散列桶数量（取素数，使 `(dev, blockno)` 分布更均匀）
pub const NBUCKET: usize = 13;

/// 块大小（字节）
pub const BSIZE: usize = 1024;

/// 散列时设备号左移的位数
pub(crate) const DEV_HASH_SHIFT: u32 = 27;
