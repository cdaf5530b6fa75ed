//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `FILEORG__*` 覆盖（双下划线表示嵌套，如 `FILEORG__TOOL__TIMEOUT_SECS=120`）。

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub tool: ToolSection,
}

/// [server] 段：监听地址与端口
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// [tool] 段：外部整理工具的位置、工作目录、超时与各模式参数
#[derive(Debug, Clone, Deserialize)]
pub struct ToolSection {
    #[serde(default = "default_executable")]
    pub executable: PathBuf,
    /// 子进程工作目录，未设置时用可执行文件所在目录
    pub working_dir: Option<PathBuf>,
    /// 单次调用超时（秒）
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// 超时杀进程后，等待输出读取收尾的时间（毫秒）
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,
    #[serde(default)]
    pub flags: ModeFlags,
}

fn default_executable() -> PathBuf {
    PathBuf::from(format!("build/FileOrganizer{}", std::env::consts::EXE_SUFFIX))
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_kill_grace_ms() -> u64 {
    500
}

impl Default for ToolSection {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            working_dir: None,
            timeout_secs: default_timeout_secs(),
            kill_grace_ms: default_kill_grace_ms(),
            flags: ModeFlags::default(),
        }
    }
}

impl ToolSection {
    /// 实际使用的工作目录：显式配置优先，否则取可执行文件的父目录
    pub fn resolved_working_dir(&self) -> PathBuf {
        if let Some(dir) = &self.working_dir {
            return dir.clone();
        }
        match self.executable.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

/// [tool.flags] 段：每种操作对应的命令行模式参数
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ModeFlags {
    #[serde(default = "default_list_flag")]
    pub list: String,
    #[serde(default = "default_organize_flag")]
    pub organize: String,
    #[serde(default = "default_history_flag")]
    pub history: String,
    #[serde(default = "default_undo_flag")]
    pub undo: String,
}

fn default_list_flag() -> String {
    "--list".to_string()
}

fn default_organize_flag() -> String {
    "--organize".to_string()
}

fn default_history_flag() -> String {
    "--history".to_string()
}

fn default_undo_flag() -> String {
    "--undo".to_string()
}

impl Default for ModeFlags {
    fn default() -> Self {
        Self {
            list: default_list_flag(),
            organize: default_organize_flag(),
            history: default_history_flag(),
            undo: default_undo_flag(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 FILEORG__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 FILEORG__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("FILEORG")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
