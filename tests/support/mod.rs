//! 集成测试共用：用 shell 脚本模拟 FileOrganizer 可执行文件

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use fileorg::config::ToolSection;

/// 行为由路径参数控制：含 "fail" 时写 stderr 并以 2 退出，含 "hang" 时输出一行后挂起，
/// 含 "quiet" 时成功但不输出；history 模式输出两条会话，undo 回显收到的会话 id。
pub const FAKE_TOOL: &str = r#"#!/bin/sh
mode="$1"
target="$2"
case "$target" in
  *fail*) echo "Error: cannot access $target" >&2; exit 2 ;;
  *hang*) echo "Scanning $target"; exec sleep 30 ;;
  *quiet*) exit 0 ;;
esac
case "$mode" in
  --list) echo "Preview for $target: 3 files would be moved" ;;
  --organize) echo "Organized $target: 3 files moved" ;;
  --history)
    echo "=== Organization History for $target ==="
    echo "Session: 20240501_100000 (3 files moved)"
    echo "Session: 20240502_090000 (1 file moved)"
    ;;
  --undo)
    if [ -n "$3" ]; then echo "Undid session $3 in $target"; else echo "Undid latest session in $target"; fi
    ;;
  *) echo "Unknown mode: $mode" >&2; exit 64 ;;
esac
"#;

/// 在临时目录中写入可执行的假工具，返回 (临时目录, 工具配置)
pub fn fake_tool() -> (tempfile::TempDir, ToolSection) {
    let dir = tempfile::tempdir().unwrap();
    let executable = write_script(dir.path(), "FileOrganizer", FAKE_TOOL);
    let tool = ToolSection {
        executable,
        ..ToolSection::default()
    };
    (dir, tool)
}

pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
