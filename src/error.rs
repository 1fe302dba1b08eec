//! 错误类型定义
//!
//! 两类错误严格分开：
//!
//! - [`Error`]：可恢复错误，通过 `Result` 返回给调用者（配置非法、设备报告 I/O 失败等）；
//! - [`Fatal`]：不变量被破坏，正确使用时永远不会发生，通过 [`fatal()`] 直接中止，
//!   从不作为 `Err` 返回。

use core::fmt;

/// 缓存操作错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: &'static str,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// I/O 错误（由设备驱动报告）
    Io,
    /// 无效参数
    InvalidInput,
    /// 不支持的操作
    Unsupported,
}

impl Error {
    /// 创建新错误
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self { kind, message }
    }

    /// 获取错误类型
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 获取错误消息
    pub const fn message(&self) -> &'static str {
        self.message
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result 类型别名
pub type Result<T> = core::result::Result<T, Error>;

/// 不可恢复的错误
///
/// 只在调用者违反协议或资源预算时出现，出现即说明内核其他部分有 bug。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fatal {
    /// 驱逐扫描找不到 `refcnt == 0` 的缓冲块：同时被引用的块数超过了缓冲池大小
    NoBuffers,
    /// 在未持有缓冲块排他锁的情况下调用了需要持锁的操作
    NotLocked(&'static str),
}

impl fmt::Display for Fatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fatal::NoBuffers => f.write_str("bget: no buffers"),
            Fatal::NotLocked(op) => write!(f, "{}: buffer not locked", op),
        }
    }
}

/// 以不可恢复错误中止当前执行流
///
/// 先记录 error 日志，再 panic。内核配置 `panic = "abort"` 时即整机停止。
#[cold]
#[track_caller]
pub fn fatal(reason: Fatal) -> ! {
    log::error!("[BCACHE] fatal: {}", reason);
    panic!("{}", reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_error_accessors() {
        let err = Error::new(ErrorKind::InvalidInput, "nbuf must be non-zero");
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(err.message(), "nbuf must be non-zero");
        assert_eq!(err.to_string(), "InvalidInput: nbuf must be non-zero");
    }

    #[test]
    fn test_fatal_messages() {
        assert_eq!(Fatal::NoBuffers.to_string(), "bget: no buffers");
        assert_eq!(
            Fatal::NotLocked("bwrite").to_string(),
            "bwrite: buffer not locked"
        );
    }

    #[test]
    #[should_panic(expected = "brelse: buffer not locked")]
    fn test_fatal_panics() {
        fatal(Fatal::NotLocked("brelse"));
    }
}
