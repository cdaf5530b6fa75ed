//! 基于 tokio::process 的 ProcessRunner 实现
//!
//! stdout / stderr 由两个读取任务持续写入共享缓冲区（不设上限）；主流程在 child.wait() 与计时器之间
//! select，先完成的一方决定结果，另一方被丢弃。超时后 kill 并回收子进程，读取任务再给一小段收尾时间，
//! 已读到的部分输出随 TimedOut 一起返回。
//!
//! Unix 下子进程放进独立进程组，超时时对整个进程组发 SIGKILL，工具派生的孙进程一并结束。

use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use super::{ExitStatus, ProcessOutcome, ProcessRunner, RunPhase};

const READ_CHUNK_SIZE: usize = 8192;
const EXIT_CODE_SIGNAL_BASE: i32 = 128;
const DEFAULT_KILL_GRACE: Duration = Duration::from_millis(500);

type SharedBuf = Arc<Mutex<Vec<u8>>>;

/// 真实子进程执行器；不持有跨调用的状态，可被多个请求并发使用
pub struct SubprocessRunner {
    kill_grace: Duration,
}

impl SubprocessRunner {
    pub fn new() -> Self {
        Self {
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }

    /// 进程结束（或被杀）后，等待输出读取任务收尾的最长时间
    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }
}

impl Default for SubprocessRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessRunner for SubprocessRunner {
    async fn run(&self, argv: &[String], working_dir: &Path, timeout: Duration) -> ProcessOutcome {
        let mut phase = RunPhase::Spawned;
        let Some((program, args)) = argv.split_first() else {
            phase.advance(RunPhase::LaunchFailed);
            return ProcessOutcome::launch_failed("empty argument vector");
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                phase.advance(RunPhase::LaunchFailed);
                tracing::warn!(program = %program, error = %e, "failed to start external tool");
                return ProcessOutcome::launch_failed(e.to_string());
            }
        };

        let started = Instant::now();
        let stdout_buf: SharedBuf = Arc::default();
        let stderr_buf: SharedBuf = Arc::default();
        let stdout_task = child
            .stdout
            .take()
            .map(|reader| tokio::spawn(drain(reader, Arc::clone(&stdout_buf))));
        let stderr_task = child
            .stderr
            .take()
            .map(|reader| tokio::spawn(drain(reader, Arc::clone(&stderr_buf))));

        phase.advance(RunPhase::Running);
        tracing::debug!(program = %program, pid = ?child.id(), "external tool running");

        let status = tokio::select! {
            waited = child.wait() => match waited {
                Ok(status) => {
                    let code = exit_code(status);
                    phase.advance(RunPhase::Exited(code));
                    ExitStatus::from_code(code)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to wait for external tool");
                    kill_process_tree(&mut child).await;
                    phase.advance(RunPhase::Exited(-1));
                    ExitStatus::Failure(-1)
                }
            },
            _ = tokio::time::sleep(timeout) => {
                kill_process_tree(&mut child).await;
                phase.advance(RunPhase::TimedOut);
                tracing::warn!(
                    program = %program,
                    timeout_ms = timeout.as_millis() as u64,
                    "external tool timed out and was killed"
                );
                ExitStatus::TimedOut
            }
        };

        tokio::join!(
            settle(stdout_task, self.kill_grace),
            settle(stderr_task, self.kill_grace)
        );

        tracing::debug!(
            phase = ?phase,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "external tool finished"
        );

        ProcessOutcome::new(status, take_buf(&stdout_buf), take_buf(&stderr_buf))
    }
}

/// 杀掉子进程及其进程组，并回收子进程
async fn kill_process_tree(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // 负 pid 表示整个进程组（spawn 时 process_group(0)，组号即子进程 pid）
        let rc = unsafe { libc::kill(-(pid as i32), libc::SIGKILL) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                tracing::warn!(pid, error = %err, "failed to kill external tool process group");
            }
        }
    }
    if let Err(e) = child.kill().await {
        tracing::warn!(error = %e, "failed to kill external tool");
    }
}

async fn drain<R: AsyncRead + Unpin>(mut reader: R, sink: SharedBuf) {
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let mut buf = sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                buf.extend_from_slice(&chunk[..n]);
            }
            Err(e) => {
                tracing::debug!(error = %e, "output stream read failed");
                break;
            }
        }
    }
}

/// 等待读取任务结束；超过 grace 仍未结束（例如孙进程还占着管道）则放弃，已读内容保留
async fn settle(task: Option<JoinHandle<()>>, grace: Duration) {
    let Some(mut handle) = task else {
        return;
    };
    if tokio::time::timeout(grace, &mut handle).await.is_err() {
        handle.abort();
    }
}

fn take_buf(buf: &SharedBuf) -> Vec<u8> {
    std::mem::take(&mut *buf.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
}

fn exit_code(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return EXIT_CODE_SIGNAL_BASE + signal;
        }
    }
    -1
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    fn cwd() -> std::path::PathBuf {
        std::env::current_dir().unwrap()
    }

    #[tokio::test]
    async fn test_success_captures_stdout() {
        let runner = SubprocessRunner::new();
        let outcome = runner
            .run(&sh("echo organized"), &cwd(), Duration::from_secs(10))
            .await;
        assert_eq!(outcome.status, ExitStatus::Success);
        assert_eq!(outcome.stdout_lossy(), "organized\n");
        assert!(outcome.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_streams_are_captured_separately() {
        let runner = SubprocessRunner::new();
        let outcome = runner
            .run(&sh("echo out; echo err >&2; exit 3"), &cwd(), Duration::from_secs(10))
            .await;
        assert_eq!(outcome.status, ExitStatus::Failure(3));
        assert_eq!(outcome.stdout_lossy(), "out\n");
        assert_eq!(outcome.stderr_lossy(), "err\n");
    }

    #[tokio::test]
    async fn test_arguments_are_not_shell_interpreted() {
        let runner = SubprocessRunner::new();
        let argv = vec![
            "printf".to_string(),
            "%s|".to_string(),
            "a b; rm -rf /".to_string(),
            "$HOME".to_string(),
        ];
        let outcome = runner.run(&argv, &cwd(), Duration::from_secs(10)).await;
        assert_eq!(outcome.status, ExitStatus::Success);
        assert_eq!(outcome.stdout_lossy(), "a b; rm -rf /|$HOME|");
    }

    #[tokio::test]
    async fn test_working_directory_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let runner = SubprocessRunner::new();
        let outcome = runner
            .run(&["pwd".to_string()], dir.path(), Duration::from_secs(10))
            .await;
        assert_eq!(outcome.status, ExitStatus::Success);
        let reported = std::path::PathBuf::from(outcome.stdout_lossy().trim());
        assert_eq!(
            reported.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[tokio::test]
    async fn test_timeout_keeps_partial_output() {
        let runner = SubprocessRunner::new();
        let started = Instant::now();
        let outcome = runner
            .run(
                &sh("echo partial; exec sleep 30"),
                &cwd(),
                Duration::from_millis(300),
            )
            .await;
        assert_eq!(outcome.status, ExitStatus::TimedOut);
        assert_eq!(outcome.stdout_lossy(), "partial\n");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timed_out_process_is_reaped() {
        let runner = SubprocessRunner::new();
        let outcome = runner
            .run(&sh("echo $$; exec sleep 30"), &cwd(), Duration::from_millis(300))
            .await;
        assert_eq!(outcome.status, ExitStatus::TimedOut);
        let pid: u32 = outcome.stdout_lossy().trim().parse().unwrap();
        assert!(!std::path::Path::new(&format!("/proc/{pid}")).exists());
    }

    /// /proc/<pid> 不存在或已是僵尸（等待 init 回收）都算已结束
    #[cfg(target_os = "linux")]
    fn process_alive(pid: u32) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.split_whitespace().next())
                .map_or(false, |state| state != "Z" && state != "X"),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_backgrounded_grandchild() {
        let runner = SubprocessRunner::new();
        let outcome = runner
            .run(&sh("sleep 30 & echo $!; wait"), &cwd(), Duration::from_millis(300))
            .await;
        assert_eq!(outcome.status, ExitStatus::TimedOut);
        let grandchild: u32 = outcome.stdout_lossy().trim().parse().unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while process_alive(grandchild) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!process_alive(grandchild), "grandchild {grandchild} still running");
    }

    #[tokio::test]
    async fn test_missing_executable_fails_fast() {
        let runner = SubprocessRunner::new();
        let started = Instant::now();
        let outcome = runner
            .run(
                &["/nonexistent/FileOrganizer".to_string(), "--list".to_string()],
                &cwd(),
                Duration::from_secs(30),
            )
            .await;
        assert!(matches!(outcome.status, ExitStatus::LaunchFailed(_)));
        assert!(outcome.stdout.is_empty());
        assert!(outcome.stderr.is_empty());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_empty_argv_is_launch_failure() {
        let runner = SubprocessRunner::new();
        let outcome = runner.run(&[], &cwd(), Duration::from_secs(1)).await;
        assert!(matches!(outcome.status, ExitStatus::LaunchFailed(_)));
    }

    #[tokio::test]
    async fn test_signal_exit_is_reported_as_failure() {
        let runner = SubprocessRunner::new();
        let outcome = runner
            .run(&sh("kill -9 $$"), &cwd(), Duration::from_secs(10))
            .await;
        assert_eq!(outcome.status, ExitStatus::Failure(EXIT_CODE_SIGNAL_BASE + 9));
    }

    #[tokio::test]
    async fn test_concurrent_runs_do_not_share_output() {
        let runner = Arc::new(SubprocessRunner::new());
        let mut handles = Vec::new();
        for i in 0..4 {
            let runner = Arc::clone(&runner);
            handles.push(tokio::spawn(async move {
                let outcome = runner
                    .run(&sh(&format!("echo run-{i}")), &cwd(), Duration::from_secs(10))
                    .await;
                (i, outcome)
            }));
        }
        for handle in handles {
            let (i, outcome) = handle.await.unwrap();
            assert_eq!(outcome.stdout_lossy(), format!("run-{i}\n"));
        }
    }
}
