//! 应用配置模块
//!
//! 所有配置都保存在同一个 `config.json` 中，按节读取：`log`、`remote`、`sync`。
//! 缺少的节使用默认值；格式错误的节同样回退到默认值并记录警告。

use crate::core::engine::{CollisionPolicy, Direction, ExecutorConfig};
use crate::core::scanner::ScanConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const APP_NAME: &str = "treesync";
pub const CONFIG_FILE: &str = "config.json";
/// 可代替配置文件提供访问令牌的环境变量
pub const TOKEN_ENV: &str = "TREESYNC_TOKEN";

/// 读取整个配置文件；不存在或无法解析时返回 None
fn read_config_value(config_dir: &Path) -> Option<serde_json::Value> {
    let content = fs::read_to_string(config_dir.join(CONFIG_FILE)).ok()?;
    match serde_json::from_str::<serde_json::Value>(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("配置文件格式错误，使用默认配置: {}", e);
            None
        }
    }
}

/// 读取配置文件中的一个节
pub fn load_section<T: DeserializeOwned + Default>(config_dir: &Path, section: &str) -> T {
    let Some(value) = read_config_value(config_dir).and_then(|c| c.get(section).cloned()) else {
        return T::default();
    };
    match serde_json::from_value::<T>(value) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("配置节 {} 格式错误，使用默认值: {}", section, e);
            T::default()
        }
    }
}

/// 写回配置文件中的一个节，保留其它节
pub fn save_section<T: Serialize>(config_dir: &Path, section: &str, value: &T) -> io::Result<()> {
    let config_file = config_dir.join(CONFIG_FILE);
    let mut config = read_config_value(config_dir)
        .filter(|v| v.is_object())
        .unwrap_or_else(|| serde_json::json!({}));

    config[section] = serde_json::to_value(value).map_err(io::Error::other)?;

    fs::create_dir_all(config_dir)?;
    let content = serde_json::to_string_pretty(&config).map_err(io::Error::other)?;
    fs::write(&config_file, content)
}

/// 默认应用配置目录
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|p| p.join(APP_NAME))
        .unwrap_or_else(|| PathBuf::from(format!(".{}", APP_NAME)))
}

/// 数据目录：默认配置目录，或其中 `data_path` 指向的已存在目录
pub fn data_dir() -> PathBuf {
    let default_dir = default_config_dir();
    read_config_value(&default_dir)
        .and_then(|config| config.get("data_path")?.as_str().map(PathBuf::from))
        .filter(|p| p.is_dir())
        .inspect(|p| debug!("使用自定义数据路径: {:?}", p))
        .unwrap_or(default_dir)
}

/// 远程服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub token: String,
    /// 列表接口每页条目数
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    /// 单个请求的超时（秒）
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://app.filejump.com/api/v1".to_string()
}

fn default_per_page() -> u32 {
    1000
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: String::new(),
            per_page: default_per_page(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RemoteConfig {
    /// 配置文件中没有令牌时从环境变量读取
    pub fn load(config_dir: &Path) -> Self {
        let mut config: Self = load_section(config_dir, "remote");
        if config.token.is_empty() {
            if let Ok(token) = std::env::var(TOKEN_ENV) {
                config.token = token;
            }
        }
        config
    }
}

/// 同步配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default)]
    pub local_folders: Vec<PathBuf>,
    /// 远程同步根目录 ID，空表示整个网盘
    #[serde(default)]
    pub remote_folders: Vec<u64>,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub collision_resolution: CollisionPolicy,
    #[serde(default)]
    pub delete_at_destination: bool,
    /// 远程删除是否跳过回收站
    #[serde(default)]
    pub permanent_delete: bool,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_transfers: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
    /// 最大文件大小（0 表示不限制）
    #[serde(default)]
    pub max_file_size: u64,
}

fn default_max_concurrent() -> usize {
    4
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1000
}

fn default_exclude_patterns() -> Vec<String> {
    ScanConfig::default().exclude_patterns
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            local_folders: Vec::new(),
            remote_folders: Vec::new(),
            direction: Direction::default(),
            collision_resolution: CollisionPolicy::default(),
            delete_at_destination: false,
            permanent_delete: false,
            max_concurrent_transfers: default_max_concurrent(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_delay(),
            exclude_patterns: default_exclude_patterns(),
            max_file_size: 0,
        }
    }
}

impl SyncSettings {
    pub fn load(config_dir: &Path) -> Self {
        load_section(config_dir, "sync")
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            exclude_patterns: self.exclude_patterns.clone(),
            max_file_size: self.max_file_size,
            ..ScanConfig::default()
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            max_concurrent_transfers: self.max_concurrent_transfers.max(1),
            max_retries: self.max_retries,
            retry_base_delay_ms: self.retry_base_delay_ms,
            permanent_delete: self.permanent_delete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let sync = SyncSettings::load(dir.path());
        assert_eq!(sync.direction, Direction::LocalToRemote);
        assert_eq!(sync.collision_resolution, CollisionPolicy::Overwrite);
        assert!(!sync.delete_at_destination);
        assert_eq!(sync.max_concurrent_transfers, 4);
    }

    #[test]
    fn test_sections_and_aliases() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{
                "remote": {"base_url": "https://drive.test/api", "token": "t", "per_page": 50},
                "sync": {"direction": "fj_to_local", "remote_folders": [7], "delete_at_destination": true}
            }"#,
        )
        .unwrap();

        let remote = RemoteConfig::load(dir.path());
        assert_eq!(remote.base_url, "https://drive.test/api");
        assert_eq!(remote.token, "t");
        assert_eq!(remote.per_page, 50);
        assert_eq!(remote.timeout_secs, 300);

        let sync = SyncSettings::load(dir.path());
        assert_eq!(sync.direction, Direction::RemoteToLocal);
        assert_eq!(sync.remote_folders, vec![7]);
        assert!(sync.delete_at_destination);
    }

    #[test]
    fn test_malformed_section_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"sync": {"direction": "sideways"}, "remote": {"per_page": 20}}"#,
        )
        .unwrap();

        let sync = SyncSettings::load(dir.path());
        assert_eq!(sync.direction, Direction::LocalToRemote);
        // 其它节不受影响
        assert_eq!(RemoteConfig::load(dir.path()).per_page, 20);
    }

    #[test]
    fn test_save_section_keeps_others() {
        let dir = tempfile::tempdir().unwrap();
        save_section(dir.path(), "remote", &RemoteConfig::default()).unwrap();
        let mut sync = SyncSettings::default();
        sync.max_retries = 9;
        save_section(dir.path(), "sync", &sync).unwrap();

        assert_eq!(SyncSettings::load(dir.path()).max_retries, 9);
        assert_eq!(RemoteConfig::load(dir.path()).per_page, 1000);
    }
}
