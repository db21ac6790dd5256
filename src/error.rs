//! 错误类型
//!
//! 单个条目的失败（记录损坏、传输失败）只影响该条目；
//! 只有远程服务整体不可达才会中止一次同步周期。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 输入记录不完整或格式错误，跳过并计数
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("文件名为空")]
    EmptyName,
    #[error("文件名包含路径分隔符: {0}")]
    NameWithSeparator(String),
    #[error("相对路径不规范: {0:?}")]
    NonCanonicalPath(String),
    #[error("读取文件信息失败: {path}: {message}")]
    Unreadable { path: String, message: String },
}

/// 远程存储调用失败
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("远程条目不存在: {0}")]
    NotFound(String),
    #[error("远程服务返回了无法识别的数据: {0}")]
    Protocol(String),
    #[error("远程服务返回状态 {status}: {body}")]
    Status { status: u16, body: String },
    #[error("HTTP 请求失败: {0}")]
    Http(#[from] reqwest::Error),
    #[error("本地 IO 失败: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound(_))
    }
}

/// 报告中记录的错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    NotFound,
    Protocol,
    Remote,
    Network,
    LocalIo,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::NotFound => write!(f, "not_found"),
            ErrorClass::Protocol => write!(f, "protocol"),
            ErrorClass::Remote => write!(f, "remote"),
            ErrorClass::Network => write!(f, "network"),
            ErrorClass::LocalIo => write!(f, "local_io"),
        }
    }
}

/// 单次上传/下载/删除失败
#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("本地文件操作失败: {0}")]
    Local(#[from] std::io::Error),
}

impl TransferError {
    pub fn class(&self) -> ErrorClass {
        match self {
            TransferError::Remote(RemoteError::NotFound(_)) => ErrorClass::NotFound,
            TransferError::Remote(RemoteError::Protocol(_)) => ErrorClass::Protocol,
            TransferError::Remote(RemoteError::Status { .. }) => ErrorClass::Remote,
            TransferError::Remote(RemoteError::Http(_)) => ErrorClass::Network,
            TransferError::Remote(RemoteError::Io(_)) | TransferError::Local(_) => {
                ErrorClass::LocalIo
            }
        }
    }

    /// 协议错误、404 和除 408/429 以外的 4xx（如令牌无效）重试也不会成功
    pub fn is_retryable(&self) -> bool {
        match self {
            TransferError::Remote(RemoteError::NotFound(_) | RemoteError::Protocol(_)) => false,
            TransferError::Remote(RemoteError::Status { status, .. }) => {
                !(400..500).contains(status) || matches!(*status, 408 | 429)
            }
            _ => true,
        }
    }
}

/// 会话文件读写失败
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("会话文件 IO 失败: {0}")]
    Io(#[from] std::io::Error),
    #[error("会话序列化失败: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 同步周期级别的错误
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("已有同步任务正在进行")]
    Busy,
    #[error("操作已取消")]
    Cancelled,
    #[error("远程服务不可达: {0}")]
    Remote(#[from] RemoteError),
    #[error("本地目录扫描失败: {0}")]
    Local(#[from] std::io::Error),
}
