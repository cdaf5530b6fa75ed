//! 核心公共层：错误类型、优雅关闭

pub mod error;
pub mod shutdown;

pub use error::{DispatchError, ServerError};
pub use shutdown::{ShutdownManager, ShutdownReason};
