//! bcache_core: 内核块缓冲缓存
//!
//! 固定容量、多核安全的磁盘块缓存：
//! - **分片散列索引**：每个桶一把自旋锁，命中路径互不干扰
//! - **近似 LRU**：按释放时刻的滴答值选择驱逐对象，释放是 O(1) 的
//! - **引用计数与钉住**：被引用的缓冲块永不被驱逐
//! - **每块睡眠锁**：持有者独占块内容，可以跨越设备 I/O
//!
//! # 示例
//!
//! ```rust,ignore
//! use bcache_core::{BufCache, CacheConfig, RamDisk, Ticks};
//!
//! let cache = BufCache::new(CacheConfig::default(), RamDisk::new(1024), Ticks::new())?;
//!
//! let mut buf = cache.fetch_locked(1, 33)?;
//! buf.data_mut()[0] = 0x42;
//! cache.persist(&buf)?;
//! cache.release(buf);
//! ```
//!
//! # 模块结构
//!
//! - [`error`] - 错误类型定义
//! - [`consts`] - 常量定义
//! - [`sync`] - 自旋锁与睡眠锁
//! - [`tick`] - 时钟滴答源
//! - [`block`] - 块设备抽象
//! - [`cache`] - 块缓存

#![cfg_attr(not(any(feature = "std", test)), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

/// 错误处理
pub mod error;

/// 常量定义
pub mod consts;

/// 同步原语
pub mod sync;

/// 时钟滴答
pub mod tick;

/// 块设备抽象
pub mod block;

/// 块缓存
pub mod cache;

// ===== 公共导出 =====

// 错误处理
pub use error::{fatal, Error, ErrorKind, Fatal, Result};

// 块设备
pub use block::{BlockDevice, RamDisk};

// 同步原语
pub use sync::{SleepLock, SpinLock};

// 滴答
pub use tick::{TickSource, Ticks};

// Cache
pub use cache::{BufCache, BufFlags, BufGuard, BufPin, BufferId, CacheConfig, CacheStats};
