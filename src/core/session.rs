//! 同步会话状态
//!
//! 保存最近一次扫描得到的两侧文件列表以及同步方向等设置，
//! 下次启动时可以直接恢复而不必重新扫描。会话文件只是缓存，读取失败时视为没有会话。

use crate::core::engine::{CollisionPolicy, Direction};
use crate::core::record::FileRecord;
use crate::error::PersistenceError;
use crate::storage::RemoteEntry;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const SESSION_FILE: &str = "sync_session.json";

/// 会话文件中能识别的字段
const KNOWN_FIELDS: [&str; 8] = [
    "local_files",
    "local_unreadable",
    "local_folders",
    "remote_entries",
    "direction",
    "remote_folders",
    "collision_resolution",
    "delete_at_destination",
];

/// 一次同步会话的状态
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub local_files: Vec<FileRecord>,
    /// 扫描时无法读取的本地文件或目录（相对路径）
    #[serde(default)]
    pub local_unreadable: Vec<String>,
    #[serde(default)]
    pub local_folders: Vec<PathBuf>,
    #[serde(default)]
    pub remote_entries: Vec<RemoteEntry>,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub remote_folders: Vec<u64>,
    #[serde(default)]
    pub collision_resolution: CollisionPolicy,
    #[serde(default)]
    pub delete_at_destination: bool,
}

/// 会话文件存储
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// 在数据目录下使用默认文件名
    pub fn new(data_dir: &Path) -> Self {
        Self::at(data_dir.join(SESSION_FILE))
    }

    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// 写入同目录下的临时文件并 fsync，再重命名覆盖，不会留下半个文件
    pub fn save(&self, state: &SessionState) -> Result<(), PersistenceError> {
        let data = serde_json::to_vec(state)?;
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| SESSION_FILE.to_string());
        let temp_path = dir.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()));

        let written = (|| -> std::io::Result<()> {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(&data)?;
            file.sync_all()?;
            fs::rename(&temp_path, &self.path)
        })();
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }

        info!(
            "已保存会话: {} 个本地文件, {} 个远程条目 -> {:?}",
            state.local_files.len(),
            state.remote_entries.len(),
            self.path
        );
        Ok(())
    }

    /// 读取会话；文件不存在、损坏或不包含任何已知字段时返回 None
    pub fn load(&self) -> Option<SessionState> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) => {
                debug!("没有可恢复的会话 {:?}: {}", self.path, e);
                return None;
            }
        };

        let value: serde_json::Value = match serde_json::from_slice(&data) {
            Ok(value) => value,
            Err(e) => {
                warn!("会话文件已损坏，忽略: {}", e);
                return None;
            }
        };

        let recognised = value
            .as_object()
            .map(|obj| KNOWN_FIELDS.iter().any(|f| obj.contains_key(*f)))
            .unwrap_or(false);
        if !recognised {
            warn!("会话文件不包含可识别的字段，忽略");
            return None;
        }

        match serde_json::from_value::<SessionState>(value) {
            Ok(state) => {
                info!(
                    "恢复会话: {} 个本地文件, {} 个远程条目",
                    state.local_files.len(),
                    state.remote_entries.len()
                );
                Some(state)
            }
            Err(e) => {
                warn!("会话文件格式不兼容，忽略: {}", e);
                None
            }
        }
    }

    /// 删除会话文件
    pub fn clear(&self) -> Result<(), PersistenceError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::Location;

    fn sample() -> SessionState {
        SessionState {
            local_files: vec![FileRecord {
                name: "a.txt".into(),
                relative_path: "docs".into(),
                created_at: "2024-01-01T00:00:00Z".into(),
                modified_at: "2024-01-02T00:00:00Z".into(),
                size: Some(3),
                content_digest: "abc".into(),
                location: Location::Local {
                    path: PathBuf::from("/data/docs/a.txt"),
                    root: PathBuf::from("/data"),
                },
            }],
            local_unreadable: vec!["docs/private".into()],
            local_folders: vec![PathBuf::from("/data")],
            remote_entries: vec![RemoteEntry {
                id: 5,
                name: "docs".into(),
                entry_type: "folder".into(),
                path: "5".into(),
                description: None,
                file_size: None,
                created_at: None,
                updated_at: None,
            }],
            direction: Direction::Both,
            remote_folders: vec![5],
            collision_resolution: CollisionPolicy::RenameOld,
            delete_at_destination: true,
        }
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        assert!(!store.exists());
        assert_eq!(store.load(), None);

        store.save(&sample()).unwrap();
        assert!(store.exists());
        assert_eq!(store.load(), Some(sample()));

        // 只留下会话文件本身
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);

        store.clear().unwrap();
        assert!(!store.exists());
        store.clear().unwrap();
    }

    #[test]
    fn test_garbage_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());

        fs::write(store.path(), b"\x00\x01not json").unwrap();
        assert_eq!(store.load(), None);

        let full = serde_json::to_string(&sample()).unwrap();
        fs::write(store.path(), &full[..full.len() / 2]).unwrap();
        assert_eq!(store.load(), None);

        fs::write(store.path(), br#"{"unrelated": 1}"#).unwrap();
        assert_eq!(store.load(), None);

        fs::write(store.path(), b"[1, 2, 3]").unwrap();
        assert_eq!(store.load(), None);
    }

    #[test]
    fn test_partial_fields_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        fs::write(store.path(), br#"{"direction": "fj_to_local"}"#).unwrap();

        let state = store.load().unwrap();
        assert_eq!(state.direction, Direction::RemoteToLocal);
        assert_eq!(state.collision_resolution, CollisionPolicy::Overwrite);
        assert!(!state.delete_at_destination);
        assert!(state.local_files.is_empty());
    }
}
