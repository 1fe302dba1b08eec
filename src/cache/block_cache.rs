//! 块缓存实现
//!
//! # 锁的层次
//!
//! ```text
//! lock (缓存全局锁, SpinLock)       只在未命中路径上持有，串行化所有驱逐扫描
//!   └─ buckets[i] (桶锁, SpinLock)  保护桶的列表以及其中条目的键/refcnt/last_used
//! bufs[id].data (SleepLock)         保护块内容和 VALID/DIRTY 标志
//! ```
//!
//! - 命中路径只获取一个桶锁，从不碰全局锁；
//! - 驱逐扫描在全局锁下按下标升序获取桶锁，除"当前最佳候选所在的桶"外最多再持有
//!   正在扫描的那一个桶，因此多个扫描之间不会形成环形等待（全局锁也保证同一时刻只有一个扫描）；
//! - 睡眠锁总是在所有自旋锁释放之后才获取。
//!
//! # 近似 LRU
//!
//! 驱逐优先级完全由 `last_used` 滴答值决定，释放时不移动列表中的位置。
//! 释放是 O(1)、只锁一个桶的操作，代价是未命中时要 O(N) 扫描全部桶。

use crate::{
    block::BlockDevice,
    error::{fatal, Fatal, Result},
    sync::{DefaultRelax, SleepLockGuard, SpinLock, SpinLockGuard},
    tick::{TickSource, Ticks},
};

use super::bucket::{bucket_hash, Bucket};
use super::buffer::{BufEntry, BufFlags, BufSlot, BufferId};
use super::config::CacheConfig;
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::relax::RelaxStrategy;

/// 缓存统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// 查找次数（每次 `fetch_locked` 一次）
    pub lookups: u64,
    /// 命中次数（包括在全局锁下复查命中）
    pub hits: u64,
    /// 未命中次数
    pub misses: u64,
    /// 驱逐（重新分配槽位）次数
    pub evictions: u64,
    /// 驱逐时跨桶迁移的次数
    pub relocations: u64,
    /// 设备读取次数
    pub disk_reads: u64,
    /// 设备写入次数
    pub disk_writes: u64,
}

impl CacheStats {
    /// 计算命中率
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.hits as f64 / self.lookups as f64
        }
    }
}

#[derive(Debug, Default)]
struct StatCounters {
    lookups: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    relocations: AtomicU64,
    disk_reads: AtomicU64,
    disk_writes: AtomicU64,
}

impl StatCounters {
    #[inline]
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            lookups: self.lookups.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            relocations: self.relocations.load(Ordering::Relaxed),
            disk_reads: self.disk_reads.load(Ordering::Relaxed),
            disk_writes: self.disk_writes.load(Ordering::Relaxed),
        }
    }
}

/// 驱逐扫描过程中的最佳候选，连同其所在桶的锁一起持有
struct Candidate<'a> {
    bucket: usize,
    guard: SpinLockGuard<'a, Bucket>,
    pos: usize,
    last_used: u64,
}

/// 块缓存
///
/// 固定容量的 `(dev, blockno) -> 块内容` 缓存，所有子系统读写磁盘都经过它。
/// 启动时构造一次，之后以共享引用交给所有调用者。
///
/// # 使用
///
/// ```rust,ignore
/// let cache = BufCache::new(CacheConfig::default(), disk, Ticks::new())?;
///
/// let mut buf = cache.fetch_locked(ROOTDEV, 33)?;
/// buf.data_mut()[0] = 0x42;
/// cache.persist(&buf)?;
/// cache.release(buf);
/// ```
///
/// 返回的 [`BufGuard`] 持有缓冲块的排他锁，同一时刻只有一个调用者能访问块内容，
/// 因此不要长时间持有。
///
/// `R` 决定等待排他锁时做什么。内核应提供一个让出当前进程的策略，
/// 使等待者被挂起而不是空转：
///
/// ```rust,ignore
/// struct Reschedule;
///
/// impl RelaxStrategy for Reschedule {
///     fn relax() {
///         scheduler::yield_current();
///     }
/// }
///
/// let cache = BufCache::<_, _, Reschedule>::with_relax(CacheConfig::default(), disk, &TICKS)?;
/// ```
pub struct BufCache<D: BlockDevice, C: TickSource = Ticks, R: RelaxStrategy = DefaultRelax> {
    /// 缓存全局锁：串行化未命中路径
    lock: SpinLock<()>,
    /// 散列桶
    buckets: Box<[SpinLock<Bucket>]>,
    /// 缓冲池
    bufs: Box<[BufSlot<R>]>,
    /// 块设备
    device: D,
    /// 滴答源
    ticks: C,
    config: CacheConfig,
    stats: StatCounters,
}

impl<D: BlockDevice, C: TickSource> BufCache<D, C> {
    /// 使用默认等待策略创建块缓存，见 [`with_relax`](Self::with_relax)
    pub fn new(config: CacheConfig, device: D, ticks: C) -> Result<Self> {
        Self::with_relax(config, device, ticks)
    }
}

impl<D: BlockDevice, C: TickSource, R: RelaxStrategy> BufCache<D, C, R> {
    /// 创建并初始化块缓存，等待排他锁时使用策略 `R`
    ///
    /// 所有缓冲块一开始都放在 0 号桶里，`refcnt == 0`、`last_used == 0`，内容无效。
    ///
    /// # 错误
    ///
    /// 配置非法时返回 `InvalidInput`
    pub fn with_relax(config: CacheConfig, device: D, ticks: C) -> Result<Self> {
        config.validate()?;

        let mut first = Bucket::new();
        for id in 0..config.nbuf {
            first.push_front(BufEntry::new(id));
        }

        let mut buckets = Vec::with_capacity(config.nbucket);
        buckets.push(SpinLock::new(first, "bcache.bucket"));
        buckets.extend((1..config.nbucket).map(|_| SpinLock::new(Bucket::new(), "bcache.bucket")));

        let bufs: Vec<BufSlot<R>> = (0..config.nbuf)
            .map(|_| BufSlot::new(config.block_size))
            .collect();

        log::debug!(
            "[BCACHE] init: {} buffers, {} buckets, block size {}",
            config.nbuf,
            config.nbucket,
            config.block_size
        );

        Ok(Self {
            lock: SpinLock::new((), "bcache"),
            buckets: buckets.into_boxed_slice(),
            bufs: bufs.into_boxed_slice(),
            device,
            ticks,
            config,
            stats: StatCounters::default(),
        })
    }

    /// 获取 `(dev, blockno)` 对应的缓冲块，返回时持有其排他锁
    ///
    /// 块内容无效时先从设备同步读取（可能挂起调用者直到 I/O 完成）。
    ///
    /// # 错误
    ///
    /// 设备读取失败时原样返回设备错误，缓冲块已被释放且内容仍标记为无效。
    ///
    /// # Panics
    ///
    /// 所有缓冲块都被引用时以 [`Fatal::NoBuffers`] 中止。
    pub fn fetch_locked(&self, dev: u32, blockno: u32) -> Result<BufGuard<'_, D, C, R>> {
        let mut buf = self.bget(dev, blockno);
        if !buf.is_valid() {
            let data = buf.locked_mut("bread");
            StatCounters::bump(&self.stats.disk_reads);
            self.device.read_block(dev, blockno, data)?;
            self.bufs[buf.id].insert(BufFlags::VALID);
        }
        Ok(buf)
    }

    /// 把缓冲块内容同步写回设备，不释放排他锁
    ///
    /// 排他锁的所有权由 [`BufGuard`] 类型本身表达，拿到守卫就说明持有锁；
    /// 运行时只需检查守卫是否来自本缓存。
    ///
    /// # Panics
    ///
    /// 守卫属于另一个缓存（调用者不持有本缓存中该块的排他锁）时以 [`Fatal::NotLocked`] 中止。
    pub fn persist(&self, buf: &BufGuard<'_, D, C, R>) -> Result<()> {
        if !core::ptr::eq(self, buf.cache) {
            fatal(Fatal::NotLocked("bwrite"));
        }
        let data = buf.locked("bwrite");
        StatCounters::bump(&self.stats.disk_writes);
        self.device.write_block(buf.dev, buf.blockno, data)?;
        self.bufs[buf.id].remove(BufFlags::DIRTY);
        Ok(())
    }

    /// 释放缓冲块：先释放排他锁，再在所属桶的锁下减少引用计数
    ///
    /// 引用计数归零时记录当前滴答值，从此该块可以被驱逐。
    /// 不改变它在桶列表中的位置。丢弃 [`BufGuard`] 效果相同。
    ///
    /// # Panics
    ///
    /// 守卫属于另一个缓存时以 [`Fatal::NotLocked`] 中止。
    pub fn release(&self, buf: BufGuard<'_, D, C, R>) {
        if !core::ptr::eq(self, buf.cache) {
            fatal(Fatal::NotLocked("brelse"));
        }
        drop(buf);
    }

    /// 钉住缓冲块：只在所属桶的锁下增加引用计数，不涉及排他锁
    ///
    /// 钉住期间即使排他锁已释放，该块也不会被驱逐。
    /// 返回的 [`BufPin`] 交给 [`unpin`](Self::unpin) 或直接丢弃即解除钉住。
    pub fn pin(&self, buf: &BufGuard<'_, D, C, R>) -> BufPin<'_, D, C, R> {
        let mut bucket = self.bucket(buf.dev, buf.blockno).lock();
        self.entry_mut(&mut bucket, buf.id).pin();
        drop(bucket);

        BufPin {
            cache: self,
            id: buf.id,
            dev: buf.dev,
            blockno: buf.blockno,
        }
    }

    /// 解除钉住：只在所属桶的锁下减少引用计数
    pub fn unpin(&self, pin: BufPin<'_, D, C, R>) {
        drop(pin);
    }

    /// 获取统计信息快照
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// 缓存配置
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// 块设备
    pub fn device(&self) -> &D {
        &self.device
    }

    /// 滴答源
    pub fn ticks(&self) -> &C {
        &self.ticks
    }

    /// `(dev, blockno)` 当前的引用计数，未缓存时返回 `None`
    pub fn refcnt(&self, dev: u32, blockno: u32) -> Option<u32> {
        let mut bucket = self.bucket(dev, blockno).lock();
        bucket.find_mut(dev, blockno).map(|e| e.refcnt)
    }

    /// `(dev, blockno)` 是否在缓存中
    pub fn contains(&self, dev: u32, blockno: u32) -> bool {
        self.refcnt(dev, blockno).is_some()
    }

    /// `(dev, blockno)` 所属的桶下标
    pub fn bucket_of(&self, dev: u32, blockno: u32) -> usize {
        bucket_hash(dev, blockno, self.config.nbucket)
    }

    /// 第 `index` 个桶中的缓冲块数量
    pub fn bucket_len(&self, index: usize) -> usize {
        self.buckets[index].lock().len()
    }

    /// 所有桶中 `refcnt == 0` 的缓冲块数量（逐个加锁统计，结果仅供参考）
    pub fn free_count(&self) -> usize {
        self.buckets
            .iter()
            .map(|b| b.lock().iter().filter(|e| !e.is_referenced()).count())
            .sum()
    }

    fn bucket(&self, dev: u32, blockno: u32) -> &SpinLock<Bucket> {
        &self.buckets[self.bucket_of(dev, blockno)]
    }

    /// 在已加锁的桶里找到槽位 `id` 的条目
    ///
    /// 被引用的缓冲块不会被换绑，所以它一定在自己键对应的桶里。
    fn entry_mut<'b>(&self, bucket: &'b mut SpinLockGuard<'_, Bucket>, id: BufferId) -> &'b mut BufEntry {
        match bucket.find_id_mut(id) {
            Some(entry) => entry,
            None => panic!("bcache: buffer {} missing from its bucket", id),
        }
    }

    /// 查找或分配缓冲块，返回时持有排他锁、引用计数已加一
    fn bget(&self, dev: u32, blockno: u32) -> BufGuard<'_, D, C, R> {
        StatCounters::bump(&self.stats.lookups);

        let id = match self.lookup(dev, blockno) {
            Some(id) => id,
            None => self.recycle(dev, blockno),
        };

        // 所有自旋锁已释放，可以挂起等待
        let data = self.bufs[id].data.lock();
        BufGuard {
            cache: self,
            id,
            dev,
            blockno,
            data: Some(data),
        }
    }

    /// 命中路径：只获取目标桶的锁
    fn lookup(&self, dev: u32, blockno: u32) -> Option<BufferId> {
        let mut bucket = self.bucket(dev, blockno).lock();
        let entry = bucket.find_mut(dev, blockno)?;
        entry.get(self.ticks.now());
        StatCounters::bump(&self.stats.hits);
        log::trace!("[BCACHE] hit dev={} blockno={} buf={}", dev, blockno, entry.id);
        Some(entry.id)
    }

    /// 未命中路径：在全局锁下复查，然后驱逐全局最久未用的空闲缓冲块并迁移到目标桶
    fn recycle(&self, dev: u32, blockno: u32) -> BufferId {
        let cache_guard = self.lock.lock();
        let key = self.bucket_of(dev, blockno);

        // 释放桶锁到获取全局锁之间，别的调用者可能已经分配了同一个块
        {
            let mut bucket = self.buckets[key].lock();
            if let Some(entry) = bucket.find_mut(dev, blockno) {
                entry.get(self.ticks.now());
                StatCounters::bump(&self.stats.hits);
                log::trace!("[BCACHE] late hit dev={} blockno={} buf={}", dev, blockno, entry.id);
                return entry.id;
            }
        }

        StatCounters::bump(&self.stats.misses);

        let Some(victim) = self.scan_lru() else {
            drop(cache_guard);
            fatal(Fatal::NoBuffers);
        };

        let now = self.ticks.now();
        let Candidate { bucket: from, guard: mut source, pos, last_used } = victim;

        let id = if from == key {
            let entry = match source.get_mut(pos) {
                Some(entry) => entry,
                None => panic!("bcache: eviction candidate vanished"),
            };
            entry.rekey(dev, blockno, now);
            self.bufs[entry.id].invalidate();
            let id = entry.id;
            drop(source);
            id
        } else {
            let mut entry = match source.remove(pos) {
                Some(entry) => entry,
                None => panic!("bcache: eviction candidate vanished"),
            };
            drop(source);

            let mut target = self.buckets[key].lock();
            entry.rekey(dev, blockno, now);
            self.bufs[entry.id].invalidate();
            let id = entry.id;
            target.push_front(entry);
            StatCounters::bump(&self.stats.relocations);
            id
        };

        StatCounters::bump(&self.stats.evictions);
        log::debug!(
            "[BCACHE] miss dev={} blockno={}: evicted buf={} (last_used={}) from bucket {} into bucket {}",
            dev,
            blockno,
            id,
            last_used,
            from,
            key
        );

        drop(cache_guard);
        id
    }

    /// 按下标升序扫描全部桶，找出 `refcnt == 0` 且 `last_used` 最小的缓冲块
    ///
    /// 返回时仍持有候选所在桶的锁；没有可驱逐的缓冲块时返回 `None` 且不持有任何桶锁。
    /// 调用者必须持有全局锁。
    fn scan_lru(&self) -> Option<Candidate<'_>> {
        let mut best: Option<Candidate<'_>> = None;

        for (index, lock) in self.buckets.iter().enumerate() {
            let bucket = lock.lock();
            match bucket.lru_candidate(best.as_ref().map(|c| c.last_used)) {
                // 替换旧候选时释放其桶锁
                Some((pos, last_used)) => {
                    best = Some(Candidate {
                        bucket: index,
                        guard: bucket,
                        pos,
                        last_used,
                    });
                }
                None => drop(bucket),
            }
        }

        best
    }

    /// 释放排他锁之后的记账：减少引用计数，归零时记录使用时间
    fn brelse(&self, id: BufferId, dev: u32, blockno: u32) {
        let mut bucket = self.bucket(dev, blockno).lock();
        let now = self.ticks.now();
        let entry = self.entry_mut(&mut bucket, id);
        if entry.put() == 0 {
            entry.last_used = now;
        }
    }

    fn bunpin(&self, id: BufferId, dev: u32, blockno: u32) {
        let mut bucket = self.bucket(dev, blockno).lock();
        self.entry_mut(&mut bucket, id).put();
    }
}

impl<D: BlockDevice, C: TickSource, R: RelaxStrategy> core::fmt::Debug for BufCache<D, C, R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BufCache")
            .field("config", &self.config)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

/// 持有排他锁的缓冲块
///
/// 由 [`BufCache::fetch_locked`] 返回。存在期间调用者独占块内容；
/// 丢弃或交给 [`BufCache::release`] 时先释放排他锁，再减少引用计数。
pub struct BufGuard<'a, D: BlockDevice, C: TickSource = Ticks, R: RelaxStrategy = DefaultRelax> {
    cache: &'a BufCache<D, C, R>,
    id: BufferId,
    dev: u32,
    blockno: u32,
    /// 只在 drop 时取出，以便先释放排他锁再做引用计数记账
    data: Option<SleepLockGuard<'a, Box<[u8]>, R>>,
}

impl<'a, D: BlockDevice, C: TickSource, R: RelaxStrategy> BufGuard<'a, D, C, R> {
    /// 槽位 ID（同一个块在驻留期间 ID 不变）
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// 设备号
    pub fn dev(&self) -> u32 {
        self.dev
    }

    /// 块号
    pub fn blockno(&self) -> u32 {
        self.blockno
    }

    /// 块内容是否有效
    pub fn is_valid(&self) -> bool {
        self.cache.bufs[self.id].is_valid()
    }

    /// 块内容是否被修改且尚未写回
    pub fn is_dirty(&self) -> bool {
        self.cache.bufs[self.id].flags().contains(BufFlags::DIRTY)
    }

    /// 当前引用计数（持锁者与钉住者之和）
    pub fn refcnt(&self) -> u32 {
        let mut bucket = self.cache.bucket(self.dev, self.blockno).lock();
        self.cache.entry_mut(&mut bucket, self.id).refcnt
    }

    /// 只读访问块内容
    pub fn data(&self) -> &[u8] {
        self.locked("data")
    }

    /// 修改块内容，缓冲块被标记为脏
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.cache.bufs[self.id].insert(BufFlags::DIRTY);
        self.locked_mut("data_mut")
    }

    // `data` 只在 drop 中被取走
    fn locked(&self, op: &'static str) -> &[u8] {
        match &self.data {
            Some(guard) => &guard[..],
            None => fatal(Fatal::NotLocked(op)),
        }
    }

    fn locked_mut(&mut self, op: &'static str) -> &mut [u8] {
        match &mut self.data {
            Some(guard) => &mut guard[..],
            None => fatal(Fatal::NotLocked(op)),
        }
    }
}

impl<'a, D: BlockDevice, C: TickSource, R: RelaxStrategy> Drop for BufGuard<'a, D, C, R> {
    fn drop(&mut self) {
        drop(self.data.take());
        self.cache.brelse(self.id, self.dev, self.blockno);
    }
}

impl<'a, D: BlockDevice, C: TickSource, R: RelaxStrategy> core::fmt::Debug for BufGuard<'a, D, C, R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BufGuard")
            .field("id", &self.id)
            .field("dev", &self.dev)
            .field("blockno", &self.blockno)
            .field("flags", &self.cache.bufs[self.id].flags())
            .finish()
    }
}

/// 钉住的缓冲块
///
/// 只占一个引用计数、不持有排他锁。丢弃或交给 [`BufCache::unpin`] 时解除钉住。
pub struct BufPin<'a, D: BlockDevice, C: TickSource = Ticks, R: RelaxStrategy = DefaultRelax> {
    cache: &'a BufCache<D, C, R>,
    id: BufferId,
    dev: u32,
    blockno: u32,
}

impl<'a, D: BlockDevice, C: TickSource, R: RelaxStrategy> BufPin<'a, D, C, R> {
    /// 槽位 ID
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// 设备号
    pub fn dev(&self) -> u32 {
        self.dev
    }

    /// 块号
    pub fn blockno(&self) -> u32 {
        self.blockno
    }
}

impl<'a, D: BlockDevice, C: TickSource, R: RelaxStrategy> Drop for BufPin<'a, D, C, R> {
    fn drop(&mut self) {
        self.cache.bunpin(self.id, self.dev, self.blockno);
    }
}

impl<'a, D: BlockDevice, C: TickSource, R: RelaxStrategy> core::fmt::Debug for BufPin<'a, D, C, R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BufPin")
            .field("id", &self.id)
            .field("dev", &self.dev)
            .field("blockno", &self.blockno)
            .finish()
    }
}
