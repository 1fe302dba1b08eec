//! 时钟滴答源
//!
//! 缓存只把滴答值当作不透明的先后顺序键（决定驱逐优先级），不当作墙钟时间。

use core::sync::atomic::{AtomicU64, Ordering};

/// 单调不减的滴答计数器
///
/// 由调度器/定时器子系统提供，可在任意上下文读取。
pub trait TickSource: Send + Sync {
    /// 当前滴答值
    fn now(&self) -> u64;
}

impl<T: TickSource + ?Sized> TickSource for &T {
    fn now(&self) -> u64 {
        (**self).now()
    }
}

impl<T: TickSource + ?Sized> TickSource for alloc::sync::Arc<T> {
    fn now(&self) -> u64 {
        (**self).now()
    }
}

/// 基于原子变量的滴答计数器
///
/// 定时器中断处理函数调用 [`Ticks::tick`] 推进计数。
#[derive(Debug, Default)]
pub struct Ticks(AtomicU64);

impl Ticks {
    /// 从 0 开始计数
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// 推进一个滴答，返回推进后的值
    pub fn tick(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// 推进 `n` 个滴答，返回推进后的值
    pub fn advance(&self, n: u64) -> u64 {
        self.0.fetch_add(n, Ordering::Relaxed) + n
    }
}

impl TickSource for Ticks {
    fn now(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_monotonic() {
        let ticks = Ticks::new();
        assert_eq!(ticks.now(), 0);
        assert_eq!(ticks.tick(), 1);
        assert_eq!(ticks.advance(5), 6);
        assert_eq!(ticks.now(), 6);

        let by_ref: &dyn TickSource = &ticks;
        assert_eq!(by_ref.now(), 6);
    }
}
