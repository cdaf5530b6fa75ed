//! FileOrganizer 控制面
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、优雅关闭
//! - **runner**: 外部工具子进程执行（捕获 stdout/stderr、超时、退出码分类）
//! - **dispatcher**: 操作请求 → 参数向量 → 执行结果
//! - **sessions**: 从 history 输出中解析可撤销的整理会话
//! - **server**: HTTP 接口（axum）
//! - **observability**: 日志初始化

pub mod config;
pub mod core;
pub mod dispatcher;
pub mod observability;
pub mod runner;
pub mod server;
pub mod sessions;

pub use dispatcher::{Dispatcher, OperationKind, OperationRequest, OperationResult, SessionListing};
pub use runner::{ExitStatus, ProcessOutcome, ProcessRunner, SubprocessRunner};
pub use sessions::{extract_sessions, MarkerLineParser, SessionParser, SessionRecord};
