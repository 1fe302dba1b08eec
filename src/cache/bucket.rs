//! 散列桶
//!
//! 每个桶持有一个有序的 [`BufEntry`] 序列（表头在前），代替侵入式链表。
//! 插入/摘除都是按下标拼接序列，不做指针操作。

use crate::consts::DEV_HASH_SHIFT;

use super::buffer::{BufEntry, BufferId};
use alloc::collections::VecDeque;

/// 计算 `(dev, blockno)` 所属的桶下标
#[inline]
pub(crate) fn bucket_hash(dev: u32, blockno: u32, nbucket: usize) -> usize {
    ((dev.wrapping_shl(DEV_HASH_SHIFT) | blockno) as usize) % nbucket
}

/// 一个散列桶的缓冲块列表
#[derive(Debug, Default)]
pub(crate) struct Bucket {
    entries: VecDeque<BufEntry>,
}

impl Bucket {
    pub(crate) fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &BufEntry> {
        self.entries.iter()
    }

    /// 插入到表头
    pub(crate) fn push_front(&mut self, entry: BufEntry) {
        self.entries.push_front(entry);
    }

    /// 从列表中摘除第 `pos` 个条目
    pub(crate) fn remove(&mut self, pos: usize) -> Option<BufEntry> {
        self.entries.remove(pos)
    }

    pub(crate) fn get_mut(&mut self, pos: usize) -> Option<&mut BufEntry> {
        self.entries.get_mut(pos)
    }

    /// 按缓存键查找
    pub(crate) fn find_mut(&mut self, dev: u32, blockno: u32) -> Option<&mut BufEntry> {
        self.entries.iter_mut().find(|e| e.matches(dev, blockno))
    }

    /// 按槽位 ID 查找
    pub(crate) fn find_id_mut(&mut self, id: BufferId) -> Option<&mut BufEntry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    /// 在本桶中寻找可驱逐的候选
    ///
    /// 只考虑 `refcnt == 0` 的条目，返回 `last_used` 最小、且严格小于 `than`
    /// （若给出）的那个：`(列表位置, last_used)`。相等时保留靠前的条目。
    pub(crate) fn lru_candidate(&self, than: Option<u64>) -> Option<(usize, u64)> {
        let mut best = than;
        let mut found = None;
        for (pos, entry) in self.entries.iter().enumerate() {
            if entry.is_referenced() {
                continue;
            }
            if best.map_or(true, |b| entry.last_used < b) {
                best = Some(entry.last_used);
                found = Some((pos, entry.last_used));
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: BufferId, refcnt: u32, last_used: u64) -> BufEntry {
        BufEntry {
            id,
            key: Some((1, id as u32)),
            refcnt,
            last_used,
        }
    }

    #[test]
    fn test_hash() {
        assert_eq!(bucket_hash(0, 5, 13), 5);
        assert_eq!(bucket_hash(0, 18, 13), 5);
        // 设备号左移 27 位后参与散列
        assert_eq!(bucket_hash(1, 0, 13), (1usize << 27) % 13);
        // 高位溢出被截断而不是 panic
        assert_eq!(bucket_hash(32, 0, 13), 0);
        assert!(bucket_hash(u32::MAX, u32::MAX, 13) < 13);
    }

    #[test]
    fn test_push_front_and_find() {
        let mut bucket = Bucket::new();
        bucket.push_front(entry(0, 0, 0));
        bucket.push_front(entry(1, 0, 0));
        assert_eq!(bucket.len(), 2);

        let ids: alloc::vec::Vec<_> = bucket.iter().map(|e| e.id).collect();
        assert_eq!(ids, [1, 0]);

        assert_eq!(bucket.find_mut(1, 0).map(|e| e.id), Some(0));
        assert!(bucket.find_mut(2, 0).is_none());
        assert_eq!(bucket.find_id_mut(1).and_then(|e| e.key), Some((1, 1)));

        let removed = bucket.remove(0).unwrap();
        assert_eq!(removed.id, 1);
        assert_eq!(bucket.len(), 1);
    }

    #[test]
    fn test_lru_candidate_skips_referenced() {
        let mut bucket = Bucket::new();
        bucket.push_front(entry(0, 0, 9));
        bucket.push_front(entry(1, 2, 1));
        bucket.push_front(entry(2, 0, 4));

        // 列表顺序为 [2, 1, 0]，id 1 虽然最旧但被引用
        assert_eq!(bucket.lru_candidate(None), Some((0, 4)));
        assert_eq!(bucket.lru_candidate(Some(5)), Some((0, 4)));
        assert_eq!(bucket.lru_candidate(Some(4)), None);
    }

    #[test]
    fn test_lru_candidate_ties_keep_first() {
        let mut bucket = Bucket::new();
        bucket.push_front(entry(0, 0, 3));
        bucket.push_front(entry(1, 0, 3));
        assert_eq!(bucket.lru_candidate(None), Some((0, 3)));
        assert_eq!(bucket.get_mut(0).map(|e| e.id), Some(1));
    }

    #[test]
    fn test_lru_candidate_empty() {
        let mut bucket = Bucket::new();
        assert_eq!(bucket.lru_candidate(None), None);
        bucket.push_front(entry(0, 1, 0));
        assert_eq!(bucket.lru_candidate(None), None);
    }
}
