//! 单次执行的结果与生命周期阶段

/// 退出状态分类：每次执行恰好产生其中一种
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    /// 退出码 0
    Success,
    /// 非零退出码（被信号杀死时为 128 + 信号值）
    Failure(i32),
    /// 超过时限被强制终止
    TimedOut,
    /// 子进程没能启动，附带系统给出的原因（仅用于日志）
    LaunchFailed(String),
}

impl ExitStatus {
    pub fn from_code(code: i32) -> Self {
        if code == 0 {
            ExitStatus::Success
        } else {
            ExitStatus::Failure(code)
        }
    }

    /// 审计日志中的短名
    pub fn label(&self) -> &'static str {
        match self {
            ExitStatus::Success => "ok",
            ExitStatus::Failure(_) => "error",
            ExitStatus::TimedOut => "timeout",
            ExitStatus::LaunchFailed(_) => "launch_failed",
        }
    }
}

/// 一次外部工具调用的完整产出；由发起调用的 Dispatcher 独占
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutcome {
    pub fn new(status: ExitStatus, stdout: Vec<u8>, stderr: Vec<u8>) -> Self {
        Self {
            status,
            stdout,
            stderr,
        }
    }

    /// 启动失败：不带任何输出
    pub fn launch_failed(reason: impl Into<String>) -> Self {
        Self::new(ExitStatus::LaunchFailed(reason.into()), Vec::new(), Vec::new())
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// 单次调用的生命周期：Spawned → Running → {Exited | TimedOut | LaunchFailed}
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Spawned,
    Running,
    Exited(i32),
    TimedOut,
    LaunchFailed,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunPhase::Exited(_) | RunPhase::TimedOut | RunPhase::LaunchFailed
        )
    }

    /// 推进到下一阶段；非法迁移（例如终态之后再迁移）保持原状态并返回 false
    pub fn advance(&mut self, next: RunPhase) -> bool {
        let allowed = match (*self, next) {
            (RunPhase::Spawned, RunPhase::Running) => true,
            (RunPhase::Spawned, RunPhase::LaunchFailed) => true,
            (RunPhase::Running, RunPhase::Exited(_)) => true,
            (RunPhase::Running, RunPhase::TimedOut) => true,
            _ => false,
        };
        if allowed {
            tracing::debug!(from = ?*self, to = ?next, "process phase");
            *self = next;
        } else {
            tracing::warn!(from = ?*self, to = ?next, "ignored invalid process phase transition");
        }
        allowed
    }
}
