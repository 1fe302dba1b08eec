//! 块缓存模块
//!
//! 固定数量的缓冲块在内存中缓存磁盘块内容，所有读写磁盘都经过这里。
//!
//! # 主要组件
//!
//! - [`BufCache`] - 块缓存，提供获取/写回/释放/钉住操作
//! - [`BufGuard`] - 持有排他锁的缓冲块
//! - [`BufPin`] - 只占引用计数的钉住句柄
//! - [`BufFlags`] - 缓冲块状态标志
//! - [`CacheConfig`] - 缓存配置
//! - [`CacheStats`] - 缓存统计信息
//!
//! # 并发结构
//!
//! 缓冲块按 `(dev, blockno)` 散列到若干个桶，每个桶一把自旋锁，
//! 命中路径只锁一个桶；未命中时在缓存全局锁下扫描全部桶，
//! 驱逐 `refcnt == 0` 中 `last_used` 最小的缓冲块。
//!
//! | 操作                          | 锁                                     |
//! |-------------------------------|----------------------------------------|
//! | [`BufCache::fetch_locked()`]  | 桶锁；未命中时全局锁 + 桶锁；然后睡眠锁 |
//! | [`BufCache::persist()`]       | 调用者已持有睡眠锁                      |
//! | [`BufCache::release()`]       | 先放睡眠锁，再锁桶                      |
//! | [`BufCache::pin()`] / [`BufCache::unpin()`] | 桶锁                     |

mod block_cache;
mod bucket;
mod buffer;
mod config;

pub use block_cache::{BufCache, BufGuard, BufPin, CacheStats};
pub use buffer::{BufFlags, BufferId};
pub use config::CacheConfig;
