//! 统一的文件记录
//!
//! 本地文件与远程条目都规整为 [`FileRecord`]，以 `(relative_path, name)` 作为比较键。

use crate::error::RecordError;
use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// 相对路径使用的分隔符
pub const SEPARATOR: char = '/';

/// 比较键
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub relative_path: String,
    pub name: String,
}

impl RecordKey {
    pub fn new(relative_path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.relative_path.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}{}{}", self.relative_path, SEPARATOR, self.name)
        }
    }
}

/// 记录所在的位置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "side", rename_all = "snake_case")]
pub enum Location {
    Local {
        /// 绝对路径
        path: PathBuf,
        /// 扫描时的本地根目录
        root: PathBuf,
    },
    Remote {
        id: u64,
        #[serde(default)]
        folder: bool,
        /// 仅对目录有意义：不含文件且不含非空子目录
        #[serde(default)]
        is_empty: bool,
        /// 同步根目录之下的祖先目录 ID，由浅到深
        #[serde(default)]
        ancestors: Vec<u64>,
    },
}

/// 文件记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub name: String,
    pub relative_path: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub modified_at: String,
    /// None 表示大小未知
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub content_digest: String,
    pub location: Location,
}

impl FileRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.relative_path.clone(), self.name.clone())
    }

    /// 检查名称和相对路径是否规范
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.name.is_empty() {
            return Err(RecordError::EmptyName);
        }
        if self.name.contains(SEPARATOR) || self.name.contains('\\') {
            return Err(RecordError::NameWithSeparator(self.name.clone()));
        }
        if !is_canonical_relative_path(&self.relative_path) {
            return Err(RecordError::NonCanonicalPath(self.relative_path.clone()));
        }
        Ok(())
    }

    pub fn is_folder(&self) -> bool {
        matches!(self.location, Location::Remote { folder: true, .. })
    }

    pub fn remote_id(&self) -> Option<u64> {
        match self.location {
            Location::Remote { id, .. } => Some(id),
            Location::Local { .. } => None,
        }
    }

    pub fn local_path(&self) -> Option<&Path> {
        match &self.location {
            Location::Local { path, .. } => Some(path),
            Location::Remote { .. } => None,
        }
    }

    /// 相对路径 + 文件名
    pub fn display_path(&self) -> String {
        self.key().to_string()
    }
}

/// 相对路径是否是规范形式：空串，或以 "/" 连接的非空段，且不含 ".."
pub fn is_canonical_relative_path(path: &str) -> bool {
    if path.is_empty() {
        return true;
    }
    if path.contains('\\') {
        return false;
    }
    path.split(SEPARATOR)
        .all(|seg| !seg.is_empty() && seg != "." && seg != "..")
}

/// 拼接相对路径段
pub fn join_relative(parent: &str, name: &str) -> String {
    match (parent.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (false, true) => parent.to_string(),
        (false, false) => format!("{}{}{}", parent, SEPARATOR, name),
    }
}

/// 格式化时间戳（UTC，秒精度）
pub fn format_timestamp(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// 解析时间戳，兼容 RFC 3339 以及不带时区的 "YYYY-MM-DD HH:MM:SS[.f]"（按本地时区）
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .and_then(|naive| Local.from_local_datetime(&naive).single())
        .map(|dt| dt.with_timezone(&Utc))
}

/// 远程描述字段中保存的元数据
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedMetadata {
    #[serde(rename = "SHA256", default)]
    pub sha256: String,
    #[serde(default)]
    pub ctime: String,
    #[serde(default)]
    pub utime: String,
}

impl EmbeddedMetadata {
    pub fn from_record(record: &FileRecord) -> Self {
        Self {
            sha256: record.content_digest.clone(),
            ctime: record.created_at.clone(),
            utime: record.modified_at.clone(),
        }
    }

    /// 解析描述字段；不是 JSON 对象时返回 None
    pub fn parse(description: &str) -> Option<Self> {
        serde_json::from_str(description.trim()).ok()
    }

    pub fn to_json(&self) -> String {
        serde_json::json!({
            "SHA256": self.sha256,
            "ctime": self.ctime,
            "utime": self.utime,
        })
        .to_string()
    }
}
