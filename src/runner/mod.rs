//! 外部工具执行层
//!
//! ProcessRunner 负责一次子进程调用：按参数向量启动（不经过 shell）、分别收集 stdout / stderr、
//! 与计时器赛跑，最后把结果归类为 ExitStatus。Dispatcher 只依赖这个 trait，测试里可替换成脚本化实现。

pub mod outcome;
pub mod subprocess;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

pub use outcome::{ExitStatus, ProcessOutcome, RunPhase};
pub use subprocess::SubprocessRunner;

/// 默认单次调用超时
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// 子进程执行 trait：argv[0] 为可执行文件，其余为参数
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// 执行一次并等待结果；任何失败都体现在 ProcessOutcome.status 中，不返回 Err
    async fn run(&self, argv: &[String], working_dir: &Path, timeout: Duration) -> ProcessOutcome;
}
