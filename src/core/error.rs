//! 错误类型
//!
//! DispatchError 只覆盖「子进程启动之前」就能判定的问题；工具本身的失败、超时、启动失败
//! 都在 Dispatcher 内收敛为 OperationResult，不会以 Err 形式向上冒泡。

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// 分派阶段的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// 请求缺字段或字段非法；不会启动子进程，也不重试
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl DispatchError {
    /// 返回给调用方的简短说明（不带前缀）
    pub fn client_message(&self) -> &str {
        match self {
            DispatchError::InvalidRequest(msg) => msg,
        }
    }
}

/// 服务启动阶段的错误
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("FileOrganizer executable not found at: {}", .0.display())]
    ToolNotFound(PathBuf),

    #[error("Invalid listen address: {0}")]
    InvalidAddress(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}
