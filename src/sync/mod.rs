//! 同步原语
//!
//! 块缓存用到两类锁，二者不可混用：
//!
//! - [`SpinLock`]：忙等待互斥锁，保护短临界区（缓存全局锁、每个散列桶的锁），
//!   临界区长度为 O(1) 或 O(桶长度)，持有期间绝不能挂起；
//! - [`SleepLock`]：排他锁，等待期间让出 CPU，可以跨设备 I/O 和调用者的任意工作持有。
//!
//! 获取 [`SleepLock`] 之前必须先释放所有 [`SpinLock`]。

mod sleeplock;
mod spinlock;

pub use self::sleeplock::{DefaultRelax, SleepLock, SleepLockGuard};
pub use self::spinlock::{SpinLock, SpinLockGuard};
