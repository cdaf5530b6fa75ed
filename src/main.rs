//! FileOrganizer 控制面
//!
//! 入口：初始化日志、加载配置、检查外部工具是否存在，然后启动 HTTP 服务直到收到关闭信号。
//!
//! 环境变量:
//! - FILEORG_CONFIG: 额外的配置文件路径
//! - FILEORG_PORT: 覆盖监听端口
//! - FILEORG__SECTION__KEY: 覆盖任意配置项（如 FILEORG__TOOL__EXECUTABLE）

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use fileorg::config::{load_config, ToolSection};
use fileorg::core::{ServerError, ShutdownManager};
use fileorg::server::{create_router, ServerState};
use fileorg::{observability, Dispatcher, SubprocessRunner};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(std::env::var_os("FILEORG_CONFIG").map(PathBuf::from))
        .map_err(ServerError::from)
        .context("Failed to load config")?;

    ensure_tool_present(&cfg.tool).context("Please build the FileOrganizer tool first")?;

    let runner = SubprocessRunner::new().with_kill_grace(Duration::from_millis(cfg.tool.kill_grace_ms));
    let dispatcher = Dispatcher::new(Arc::new(runner), &cfg.tool);
    let app = create_router(Arc::new(ServerState::new(dispatcher)));

    let port = std::env::var("FILEORG_PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(cfg.server.port);
    let host: IpAddr = cfg
        .server
        .host
        .parse()
        .map_err(|_| ServerError::InvalidAddress(cfg.server.host.clone()))?;
    let addr = SocketAddr::new(host, port);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;

    tracing::info!("FileOrganizer control plane: http://{}", addr);
    tracing::info!(
        executable = %cfg.tool.executable.display(),
        timeout_secs = cfg.tool.timeout_secs,
        "external tool configured"
    );

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.token().cancelled_owned())
        .await?;

    if shutdown.is_shutdown() {
        tracing::info!(reason = ?shutdown.reason(), "server stopped");
    } else {
        tracing::warn!("server stopped without a shutdown signal");
    }
    Ok(())
}

fn ensure_tool_present(tool: &ToolSection) -> Result<(), ServerError> {
    if tool.executable.exists() {
        Ok(())
    } else {
        Err(ServerError::ToolNotFound(tool.executable.clone()))
    }
}
