//! 缓冲块结构
//!
//! 一个缓冲块拆成两部分，分别由不同的锁保护：
//!
//! - [`BufSlot`]：块内容和状态标志，由缓冲块自己的睡眠锁保护，
//!   固定存放在缓冲池数组里，永不移动；
//! - [`BufEntry`]：键 `(dev, blockno)`、引用计数和最近使用时间，
//!   存放在当前所属散列桶的列表里，由该桶的自旋锁保护，驱逐时随之在桶之间移动。
//!
//! 两者通过 [`BufferId`]（缓冲池下标）关联，不使用指针。

use crate::sync::{DefaultRelax, SleepLock};
use alloc::boxed::Box;
use alloc::vec;
use bitflags::bitflags;
use core::sync::atomic::{AtomicU8, Ordering};

/// 缓冲块 ID，即在缓冲池中的下标
pub type BufferId = usize;

bitflags! {
    /// 缓冲块状态标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BufFlags: u8 {
        /// 块内容与磁盘一致（已从设备读入）
        const VALID = 0x01;
        /// 块内容被修改过且尚未写回
        const DIRTY = 0x02;
    }
}

/// 缓冲池中的一个槽位
///
/// `flags` 只在两种情况下被访问：
/// 1. 持有 `data` 的睡眠锁时；
/// 2. 驱逐重新分配时（此时 `refcnt == 0`，没有任何人持有或等待睡眠锁）。
///
/// `R` 是睡眠锁被占用时的等待策略。
pub(crate) struct BufSlot<R = DefaultRelax> {
    flags: AtomicU8,
    pub(crate) data: SleepLock<Box<[u8]>, R>,
}

impl<R> BufSlot<R> {
    /// 创建块大小为 `block_size` 的空槽位
    pub(crate) fn new(block_size: usize) -> Self {
        Self {
            flags: AtomicU8::new(BufFlags::empty().bits()),
            data: SleepLock::new(vec![0u8; block_size].into_boxed_slice(), "buffer"),
        }
    }

    pub(crate) fn flags(&self) -> BufFlags {
        BufFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    pub(crate) fn insert(&self, flags: BufFlags) {
        self.flags.fetch_or(flags.bits(), Ordering::AcqRel);
    }

    pub(crate) fn remove(&self, flags: BufFlags) {
        self.flags.fetch_and(!flags.bits(), Ordering::AcqRel);
    }

    /// 换绑到新块时清空全部状态，迫使下一次读取访问设备
    pub(crate) fn invalidate(&self) {
        self.flags.store(BufFlags::empty().bits(), Ordering::Release);
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.flags().contains(BufFlags::VALID)
    }
}

impl<R> core::fmt::Debug for BufSlot<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BufSlot")
            .field("flags", &self.flags())
            .field("locked", &self.data.is_locked())
            .finish()
    }
}

/// 缓冲块元数据
///
/// # 字段说明
///
/// - `id`: 对应槽位在缓冲池中的下标
/// - `key`: 缓存的块 `(dev, blockno)`；从未分配过的槽位为 `None`，不会被查找命中
/// - `refcnt`: 活跃持有者数量（持锁者 + 钉住者），大于 0 时不能被驱逐
/// - `last_used`: 最近一次使用时的滴答值，仅在 `refcnt == 0` 时有意义，越小越先被驱逐
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BufEntry {
    pub(crate) id: BufferId,
    pub(crate) key: Option<(u32, u32)>,
    pub(crate) refcnt: u32,
    pub(crate) last_used: u64,
}

impl BufEntry {
    /// 初始化时的空条目
    pub(crate) fn new(id: BufferId) -> Self {
        Self {
            id,
            key: None,
            refcnt: 0,
            last_used: 0,
        }
    }

    /// 是否缓存了 `(dev, blockno)`
    #[inline]
    pub(crate) fn matches(&self, dev: u32, blockno: u32) -> bool {
        self.key == Some((dev, blockno))
    }

    /// 新增一个持有者并刷新使用时间
    pub(crate) fn get(&mut self, now: u64) {
        self.refcnt += 1;
        self.last_used = now;
    }

    /// 钉住：只增加引用计数
    pub(crate) fn pin(&mut self) {
        self.refcnt += 1;
    }

    /// 减少引用计数，返回减少后的值
    pub(crate) fn put(&mut self) -> u32 {
        debug_assert!(self.refcnt > 0, "refcnt underflow on buffer {}", self.id);
        self.refcnt = self.refcnt.saturating_sub(1);
        self.refcnt
    }

    /// 是否正在被引用
    #[inline]
    pub(crate) fn is_referenced(&self) -> bool {
        self.refcnt > 0
    }

    /// 换绑到新的块，由唯一的调用者持有
    pub(crate) fn rekey(&mut self, dev: u32, blockno: u32, now: u64) {
        debug_assert!(!self.is_referenced(), "rekey of referenced buffer {}", self.id);
        self.key = Some((dev, blockno));
        self.refcnt = 1;
        self.last_used = now;
    }
}
