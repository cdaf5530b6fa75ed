//! 整理会话解析
//!
//! 外部工具的 `--history` 输出是给人看的文本，其中形如 `Session: <id> (<n> files moved)` 的行
//! 对应一次可撤销的整理。解析规则藏在 SessionParser 后面，工具换了措辞只需替换解析器。

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// 候选行必须包含的标记
pub const SESSION_MARKER: &str = "Session:";

static SESSION_LINE_RE: OnceLock<Regex> = OnceLock::new();

/// 一次整理会话：id 由外部工具分配，本层不去重
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub file_count: u64,
}

impl SessionRecord {
    pub fn new(id: impl Into<String>, file_count: u64) -> Self {
        Self {
            id: id.into(),
            file_count,
        }
    }
}

/// 会话解析器：输入 history 文本，输出最近优先的会话列表；解析不出来时返回空列表
pub trait SessionParser: Send + Sync {
    fn parse(&self, history: &str) -> Vec<SessionRecord>;
}

/// 默认解析器：逐行匹配 `Session: <id> (<count> file(s) moved)`
///
/// "file"/"files"、"move"/"moved" 都接受且不区分；不匹配的候选行直接跳过。
/// 工具把新会话追加在末尾，所以结果按出现顺序反转。
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkerLineParser;

impl MarkerLineParser {
    fn parse_line(line: &str) -> Option<SessionRecord> {
        let re = SESSION_LINE_RE.get_or_init(|| {
            Regex::new(r"Session:\s*(\S+)\s*\((\d+)\s*files?\s*moved?\)").unwrap()
        });
        let cap = re.captures(line)?;
        let id = cap.get(1)?.as_str().to_string();
        let file_count = cap.get(2)?.as_str().parse::<u64>().ok()?;
        Some(SessionRecord { id, file_count })
    }
}

impl SessionParser for MarkerLineParser {
    fn parse(&self, history: &str) -> Vec<SessionRecord> {
        let mut sessions: Vec<SessionRecord> = history
            .lines()
            .filter(|line| line.contains(SESSION_MARKER))
            .filter_map(Self::parse_line)
            .collect();
        sessions.reverse();
        sessions
    }
}

/// 用默认解析器提取会话（最近一次在前）
pub fn extract_sessions(history: &str) -> Vec<SessionRecord> {
    MarkerLineParser.parse(history)
}
