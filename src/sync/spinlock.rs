//! 自旋锁
//!
//! 在 `spin::Mutex` 外包一层名字，便于日志和调试输出。

use core::fmt;

/// 自旋锁守卫，离开作用域时自动释放
pub type SpinLockGuard<'a, T> = spin::MutexGuard<'a, T>;

/// 忙等待互斥锁
///
/// 只用于短临界区，持有期间不允许挂起、不允许等待 [`SleepLock`](super::SleepLock)。
pub struct SpinLock<T: ?Sized> {
    name: &'static str,
    inner: spin::Mutex<T>,
}

impl<T> SpinLock<T> {
    /// 创建新的自旋锁
    pub const fn new(data: T, name: &'static str) -> Self {
        Self {
            name,
            inner: spin::Mutex::new(data),
        }
    }
}

impl<T: ?Sized> SpinLock<T> {
    /// 忙等待直到获取锁
    #[inline]
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        self.inner.lock()
    }

    /// 尝试获取锁，失败立即返回 `None`
    #[inline]
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        self.inner.try_lock()
    }

    /// 锁当前是否被持有（仅供诊断，结果可能立即过时）
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    /// 锁的名字
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T: ?Sized> fmt::Debug for SpinLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinLock")
            .field("name", &self.name)
            .field("locked", &self.is_locked())
            .finish()
    }
}
