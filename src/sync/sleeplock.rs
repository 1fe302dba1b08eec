//! 睡眠锁
//!
//! 用于可能长时间持有的锁（跨越设备 I/O）。锁被占用时，等待者调用
//! `R::relax()` 让出 CPU 后重试，而不是在自旋锁里空转。
//!
//! 内核中由调度器提供 `RelaxStrategy`（让出当前进程）；
//! 启用 `std` 特性时默认使用 `spin::relax::Yield`（`std::thread::yield_now`）。

use core::cell::UnsafeCell;
use core::fmt;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};

use spin::relax::RelaxStrategy;

use super::SpinLock;

/// 默认等待策略
#[cfg(feature = "std")]
pub type DefaultRelax = spin::relax::Yield;

/// 默认等待策略
#[cfg(not(feature = "std"))]
pub type DefaultRelax = spin::relax::Spin;

/// 排他睡眠锁
///
/// `locked` 状态字由内部自旋锁保护，数据本身只由当前持锁者访问。
/// 内部自旋锁只在检查/修改状态字的瞬间持有，等待期间不持有任何自旋锁。
pub struct SleepLock<T: ?Sized, R = DefaultRelax> {
    locked: SpinLock<bool>,
    name: &'static str,
    _relax: PhantomData<fn() -> R>,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send, R> Sync for SleepLock<T, R> {}
unsafe impl<T: ?Sized + Send, R> Send for SleepLock<T, R> {}

impl<T, R> SleepLock<T, R> {
    /// 创建新的睡眠锁
    pub const fn new(data: T, name: &'static str) -> Self {
        Self {
            locked: SpinLock::new(false, "sleeplock"),
            name,
            _relax: PhantomData,
            data: UnsafeCell::new(data),
        }
    }
}

impl<T: ?Sized, R: RelaxStrategy> SleepLock<T, R> {
    /// 获取锁，被占用时让出 CPU 并重试
    pub fn lock(&self) -> SleepLockGuard<'_, T, R> {
        loop {
            if let Some(guard) = self.try_lock() {
                return guard;
            }
            R::relax();
        }
    }

    /// 尝试获取锁，失败立即返回 `None`
    pub fn try_lock(&self) -> Option<SleepLockGuard<'_, T, R>> {
        let mut locked = self.locked.lock();
        if *locked {
            return None;
        }
        *locked = true;
        drop(locked);

        Some(SleepLockGuard {
            lock: self,
            _marker: PhantomData,
        })
    }
}

impl<T: ?Sized, R> SleepLock<T, R> {
    /// 锁当前是否被某个调用者持有
    pub fn is_locked(&self) -> bool {
        *self.locked.lock()
    }

    /// 锁的名字
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn unlock(&self) {
        let mut locked = self.locked.lock();
        debug_assert!(*locked, "sleeplock {} released while not held", self.name);
        *locked = false;
    }
}

impl<T: ?Sized, R> fmt::Debug for SleepLock<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SleepLock")
            .field("name", &self.name)
            .field("locked", &self.is_locked())
            .finish()
    }
}

/// 睡眠锁守卫
///
/// 守卫存在即说明持有锁；离开作用域时释放锁，下一个等待者在其下次重试时获得锁。
///
/// 共享守卫等于共享 `&T`，因此只有 `T: Sync` 时守卫才是 `Sync`：
///
/// ```compile_fail
/// use bcache_core::sync::SleepLockGuard;
/// use core::cell::Cell;
///
/// fn assert_sync<T: Sync>() {}
/// assert_sync::<SleepLockGuard<'static, Cell<u32>>>();
/// ```
pub struct SleepLockGuard<'a, T: ?Sized, R = DefaultRelax> {
    lock: &'a SleepLock<T, R>,
    // 关闭自动推导的 Send/Sync，由下面的 impl 给出
    _marker: PhantomData<*const ()>,
}

// 睡眠锁不记录持有者，可以在另一个线程释放
unsafe impl<T: ?Sized + Send, R> Send for SleepLockGuard<'_, T, R> {}
unsafe impl<T: ?Sized + Sync, R> Sync for SleepLockGuard<'_, T, R> {}

impl<'a, T: ?Sized, R> Deref for SleepLockGuard<'a, T, R> {
    type Target = T;

    fn deref(&self) -> &T {
        // 守卫存在期间只有它能访问数据
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T: ?Sized, R> DerefMut for SleepLockGuard<'a, T, R> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T: ?Sized, R> Drop for SleepLockGuard<'a, T, R> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spin::relax::Spin;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use std::vec::Vec;

    #[test]
    fn test_lock_unlock() {
        let lock: SleepLock<u32, Spin> = SleepLock::new(7, "test");
        assert_eq!(lock.name(), "test");
        assert!(!lock.is_locked());

        {
            let mut guard = lock.lock();
            assert!(lock.is_locked());
            assert!(lock.try_lock().is_none());
            *guard = 8;
        }

        assert!(!lock.is_locked());
        assert_eq!(*lock.lock(), 8);
    }

    #[test]
    fn test_guard_auto_traits() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<SleepLockGuard<'static, u32>>();
        assert_sync::<SleepLockGuard<'static, u32>>();
        // Cell 只能转移、不能共享
        assert_send::<SleepLockGuard<'static, core::cell::Cell<u32>>>();
        assert_sync::<SleepLock<core::cell::Cell<u32>>>();
    }

    #[test]
    fn test_waiter_blocks_until_release() {
        let lock: Arc<SleepLock<u32>> = Arc::new(SleepLock::new(0, "wait"));
        let acquired = Arc::new(AtomicBool::new(false));

        let guard = lock.lock();

        let waiter = {
            let lock = lock.clone();
            let acquired = acquired.clone();
            thread::spawn(move || {
                let mut g = lock.lock();
                *g += 1;
                acquired.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(20));
        assert!(!acquired.load(Ordering::SeqCst));

        drop(guard);
        waiter.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
        assert_eq!(*lock.lock(), 1);
    }

    #[test]
    fn test_mutual_exclusion() {
        let lock: Arc<SleepLock<(usize, bool)>> = Arc::new(SleepLock::new((0, false), "mutex"));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lock = lock.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        let mut g = lock.lock();
                        assert!(!g.1, "two holders inside the critical section");
                        g.1 = true;
                        g.0 += 1;
                        thread::yield_now();
                        g.1 = false;
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(lock.lock().0, 800);
    }
}
