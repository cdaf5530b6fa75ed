//! 操作分派器
//!
//! 把 Preview / Organize / History / Undo 请求翻译成外部工具的参数向量，交给 ProcessRunner 执行，
//! 再把 ProcessOutcome 统一映射为 OperationResult。每种 ExitStatus 都有唯一对应的结果形态；
//! 只有请求本身不合法时才返回 Err（此时不会启动子进程）。每次调用输出结构化审计日志（JSON）。

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::{ModeFlags, ToolSection};
use crate::core::DispatchError;
use crate::runner::{ExitStatus, ProcessOutcome, ProcessRunner};
use crate::sessions::{MarkerLineParser, SessionParser, SessionRecord};

/// 成功但没有输出时的默认提示
pub const DEFAULT_SUCCESS_MESSAGE: &str = "Operation completed successfully";
/// 失败且两路输出都为空时的提示
pub const UNKNOWN_ERROR_OUTPUT: &str = "Unknown error occurred";
/// 超时且没有捕获到任何输出时的提示
pub const TIMEOUT_OUTPUT: &str = "The operation took too long to complete";

pub const TIMED_OUT_MESSAGE: &str = "operation timed out";
pub const LAUNCH_FAILED_MESSAGE: &str = "failed to start external tool";
pub const MISSING_PATH_MESSAGE: &str = "Folder path is required";

/// 操作种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Preview,
    Organize,
    History,
    Undo,
}

impl OperationKind {
    pub const ALL: [OperationKind; 4] = [
        OperationKind::Preview,
        OperationKind::Organize,
        OperationKind::History,
        OperationKind::Undo,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Preview => "preview",
            OperationKind::Organize => "organize",
            OperationKind::History => "history",
            OperationKind::Undo => "undo",
        }
    }

    /// 该操作对应的模式参数
    pub fn flag(self, flags: &ModeFlags) -> &str {
        match self {
            OperationKind::Preview => &flags.list,
            OperationKind::Organize => &flags.organize,
            OperationKind::History => &flags.history,
            OperationKind::Undo => &flags.undo,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Unknown operation: {s}"))
    }
}

/// 一次操作请求；session_id 只在 Undo 时使用，缺省时由外部工具自行选择（通常是最近一次）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    pub kind: OperationKind,
    pub target_path: String,
    pub session_id: Option<String>,
}

impl OperationRequest {
    pub fn new(kind: OperationKind, target_path: impl Into<String>) -> Self {
        Self {
            kind,
            target_path: target_path.into(),
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.target_path.is_empty() {
            return Err(DispatchError::InvalidRequest(MISSING_PATH_MESSAGE.to_string()));
        }
        Ok(())
    }
}

/// 返回给调用方的统一结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    pub output: String,
    #[serde(rename = "error", default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl OperationResult {
    /// ProcessOutcome → OperationResult（全覆盖映射）
    pub fn from_outcome(outcome: &ProcessOutcome) -> Self {
        match &outcome.status {
            ExitStatus::Success => {
                let stdout = outcome.stdout_lossy();
                Self {
                    success: true,
                    output: if stdout.is_empty() {
                        DEFAULT_SUCCESS_MESSAGE.to_string()
                    } else {
                        stdout
                    },
                    error_message: None,
                }
            }
            ExitStatus::Failure(code) => {
                let stderr = outcome.stderr_lossy();
                let output = if !stderr.is_empty() {
                    stderr
                } else {
                    let stdout = outcome.stdout_lossy();
                    if stdout.is_empty() {
                        UNKNOWN_ERROR_OUTPUT.to_string()
                    } else {
                        stdout
                    }
                };
                Self {
                    success: false,
                    output,
                    error_message: Some(format!("process exited with code {code}")),
                }
            }
            ExitStatus::TimedOut => {
                let mut output = outcome.stdout_lossy();
                let stderr = outcome.stderr_lossy();
                if !stderr.is_empty() {
                    if !output.is_empty() && !output.ends_with('\n') {
                        output.push('\n');
                    }
                    output.push_str(&stderr);
                }
                if output.is_empty() {
                    output = TIMEOUT_OUTPUT.to_string();
                }
                Self {
                    success: false,
                    output,
                    error_message: Some(TIMED_OUT_MESSAGE.to_string()),
                }
            }
            ExitStatus::LaunchFailed(_) => Self {
                success: false,
                output: String::new(),
                error_message: Some(LAUNCH_FAILED_MESSAGE.to_string()),
            },
        }
    }
}

/// 会话列表：history 调用本身的结果 + 解析出的会话（失败时为空）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionListing {
    pub result: OperationResult,
    pub sessions: Vec<SessionRecord>,
}

/// 分派器：持有执行器、解析器与工具调用参数；本身无可变状态，可在请求间共享
pub struct Dispatcher {
    runner: Arc<dyn ProcessRunner>,
    parser: Arc<dyn SessionParser>,
    executable: PathBuf,
    working_dir: PathBuf,
    timeout: Duration,
    flags: ModeFlags,
}

impl Dispatcher {
    pub fn new(runner: Arc<dyn ProcessRunner>, tool: &ToolSection) -> Self {
        Self {
            runner,
            parser: Arc::new(MarkerLineParser),
            executable: tool.executable.clone(),
            working_dir: tool.resolved_working_dir(),
            timeout: Duration::from_secs(tool.timeout_secs),
            flags: tool.flags.clone(),
        }
    }

    /// 替换 history 解析器
    pub fn with_parser(mut self, parser: Arc<dyn SessionParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 可执行文件之后的参数：[模式参数, 路径] (+ Undo 的会话 id)；路径与 id 原样传递
    pub fn mode_args(&self, request: &OperationRequest) -> Vec<String> {
        let mut args = vec![
            request.kind.flag(&self.flags).to_string(),
            request.target_path.clone(),
        ];
        if request.kind == OperationKind::Undo {
            if let Some(session_id) = &request.session_id {
                args.push(session_id.clone());
            }
        }
        args
    }

    /// 完整参数向量（argv[0] 为可执行文件）
    pub fn argv(&self, request: &OperationRequest) -> Vec<String> {
        let mut argv = vec![self.executable.to_string_lossy().into_owned()];
        argv.extend(self.mode_args(request));
        argv
    }

    /// 执行一次操作；不重试
    pub async fn dispatch(&self, request: &OperationRequest) -> Result<OperationResult, DispatchError> {
        request.validate()?;

        let argv = self.argv(request);
        let start = Instant::now();
        let outcome = self.runner.run(&argv, &self.working_dir, self.timeout).await;
        let result = OperationResult::from_outcome(&outcome);

        let audit = serde_json::json!({
            "event": "operation_audit",
            "kind": request.kind.as_str(),
            "target_path": request.target_path,
            "session_id": request.session_id,
            "ok": result.success,
            "outcome": outcome.status.label(),
            "duration_ms": start.elapsed().as_millis() as u64,
        });
        tracing::info!(audit = %audit.to_string(), "operation");
        if let ExitStatus::LaunchFailed(reason) = &outcome.status {
            tracing::error!(executable = %argv[0], reason = %reason, "external tool could not be started");
        }

        Ok(result)
    }

    /// 运行 History 并解析出可撤销的会话（最近一次在前）
    pub async fn list_sessions(&self, target_path: &str) -> Result<SessionListing, DispatchError> {
        let request = OperationRequest::new(OperationKind::History, target_path);
        let result = self.dispatch(&request).await?;
        let sessions = if result.success {
            self.parser.parse(&result.output)
        } else {
            Vec::new()
        };
        tracing::debug!(count = sessions.len(), "sessions extracted");
        Ok(SessionListing { result, sessions })
    }
}
