pub mod filejump;
pub mod local;
pub mod memory;

use crate::error::RemoteError;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub use filejump::FileJumpClient;
pub use local::LocalFileSystem;
pub use memory::MemoryRemote;

// ============ 公共常量 ============

/// 非 IO 操作超时（秒）- 列表, 删除等
pub const OP_TIMEOUT_SECS: u64 = 60;
/// IO 操作超时（秒）- 上传, 下载
pub const IO_TIMEOUT_SECS: u64 = 300;

/// 远程根目录的 ID
pub const ROOT_FOLDER_ID: u64 = 0;

/// 远程列表返回的条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    /// "folder" 或具体的文件类型（image, text ...）
    #[serde(rename = "type", default)]
    pub entry_type: String,
    /// 以 "/" 连接的祖先 ID 链（可能包含条目自身的 ID）
    #[serde(default)]
    pub path: String,
    /// 自由文本描述，同步时存放 JSON 元数据
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl RemoteEntry {
    pub fn is_folder(&self) -> bool {
        self.entry_type == "folder"
    }

    /// 祖先 ID 链中的数字段（不含自身）
    pub fn ancestor_ids(&self) -> Vec<u64> {
        self.path
            .split('/')
            .filter_map(|s| s.trim().parse::<u64>().ok())
            .filter(|id| *id != self.id)
            .collect()
    }

    /// 直接父目录，位于根目录下时为 0
    pub fn parent_id(&self) -> u64 {
        self.ancestor_ids().last().copied().unwrap_or(ROOT_FOLDER_ID)
    }
}

/// 一页列表结果
#[derive(Debug, Clone, Default)]
pub struct EntryPage {
    pub entries: Vec<RemoteEntry>,
    pub next_page: Option<u32>,
}

/// 远程存储接口
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// 列出目录下的直接子条目，`folder_id` 为 None 表示根目录
    async fn list_entries(
        &self,
        folder_id: Option<u64>,
        page: u32,
    ) -> Result<EntryPage, RemoteError>;

    /// 上传本地文件到指定的相对路径，返回新条目 ID
    async fn upload_file(
        &self,
        local_path: &Path,
        target_relative_path: &str,
    ) -> Result<u64, RemoteError>;

    /// 下载文件内容
    async fn download_file(&self, entry_id: u64) -> Result<Bytes, RemoteError>;

    /// 写入描述字段中的元数据
    async fn set_metadata(&self, entry_id: u64, metadata: &str) -> Result<(), RemoteError>;

    /// 删除条目（移入回收站或永久删除）
    async fn delete_entries(&self, entry_ids: &[u64], permanent: bool)
        -> Result<(), RemoteError>;

    /// 获取存储名称（用于日志）
    fn name(&self) -> &str;
}

/// 遍历得到的本地条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    pub path: PathBuf,
    pub is_dir: bool,
    /// 遍历时无法读取（权限不足等），其下的内容未知
    pub unreadable: bool,
}

impl WalkEntry {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
            unreadable: false,
        }
    }

    pub fn dir(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
            unreadable: false,
        }
    }

    pub fn unreadable(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
            unreadable: true,
        }
    }
}

/// 本地文件元数据
#[derive(Debug, Clone, Copy)]
pub struct LocalStat {
    pub size: u64,
    pub created: Option<SystemTime>,
    pub modified: Option<SystemTime>,
}

/// 尝试删除空目录的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirRemoval {
    Removed,
    NotEmpty,
    /// 目录已不存在
    Missing,
}

/// 本地文件系统接口
#[async_trait]
pub trait LocalFs: Send + Sync {
    /// 递归遍历，不含根目录本身；根目录不存在或不可读时返回错误，
    /// 子目录读取失败时以 `unreadable` 条目返回
    async fn walk(&self, root: &Path) -> std::io::Result<Vec<WalkEntry>>;

    async fn stat(&self, path: &Path) -> std::io::Result<LocalStat>;

    /// 文件内容的十六进制摘要
    async fn digest(&self, path: &Path) -> std::io::Result<String>;

    async fn remove(&self, path: &Path) -> std::io::Result<()>;

    /// 仅在目录为空时删除
    async fn remove_empty_dir(&self, path: &Path) -> std::io::Result<DirRemoval>;

    /// 原子写入文件，可选地恢复修改时间
    async fn write_file(
        &self,
        path: &Path,
        data: Bytes,
        modified: Option<SystemTime>,
    ) -> std::io::Result<()>;
}
