//! 定义了拥塞控制引擎中所有可能的错误类型。
//! Defines all possible error types of the congestion control engine.
//!
//! None of these escape the controller entry points: the failing sample,
//! slope or decision is dropped and the next event proceeds normally.

use thiserror::Error;

/// The primary error type for the engine's internal collections.
/// 引擎内部集合的主要错误类型。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A collection could not grow any further.
    /// 集合无法继续增长。
    #[error("storage exhausted")]
    AllocationFailure,

    /// A median or removal was requested on an empty collection.
    /// 在空集合上请求了中位数或删除操作。
    #[error("collection is empty")]
    EmptyCollection,

    /// The requested 1-indexed rank range does not fit the collection.
    /// 请求的秩范围（从1开始）超出集合范围。
    #[error("rank range {start}..={end} is invalid for {len} entries")]
    OutOfRange { start: usize, end: usize, len: usize },

    /// A handle did not refer to a live entry.
    /// 句柄没有指向有效条目。
    #[error("handle does not refer to a live entry")]
    NullReference,
}

/// A specialized `Result` type for this library.
/// 本库专用的 `Result` 类型。
pub type Result<T> = std::result::Result<T, Error>;
