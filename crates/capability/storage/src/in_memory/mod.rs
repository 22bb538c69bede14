//! 内存存储实现模块
//!
//! 用于本地运行和测试。
//!
//! - ReadingStore: InMemoryReadingStore
//! - LatestReadingStore: InMemoryLatestReadingStore
//! - SourceConfigStore: InMemorySourceConfigStore

pub mod latest;
pub mod reading;
pub mod source;

pub use latest::*;
pub use reading::*;
pub use source::*;
