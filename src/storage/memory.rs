//! 内存中的远程存储，路径和 ID 语义与真实服务一致，用于演练和测试

use super::{EntryPage, RemoteEntry, RemoteStorage, ROOT_FOLDER_ID};
use crate::core::record::{format_timestamp, SEPARATOR};
use crate::error::RemoteError;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;

struct Node {
    entry: RemoteEntry,
    parent: u64,
    data: Option<Bytes>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    nodes: BTreeMap<u64, Node>,
    failing_uploads: HashSet<String>,
    uploads: Vec<String>,
    downloads: Vec<u64>,
    deleted: Vec<u64>,
}

pub struct MemoryRemote {
    name: String,
    page_size: usize,
    state: Mutex<State>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self {
            name: "memory://".to_string(),
            page_size: 1000,
            state: Mutex::new(State {
                next_id: 1,
                ..Default::default()
            }),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn insert(
        state: &mut State,
        parent: Option<u64>,
        name: &str,
        entry_type: &str,
        data: Option<Bytes>,
    ) -> u64 {
        let id = state.next_id;
        state.next_id += 1;
        let parent = parent.unwrap_or(ROOT_FOLDER_ID);
        let path = match state.nodes.get(&parent) {
            Some(p) => format!("{}{}{}", p.entry.path, SEPARATOR, id),
            None => id.to_string(),
        };
        let now = format_timestamp(SystemTime::now());
        state.nodes.insert(
            id,
            Node {
                entry: RemoteEntry {
                    id,
                    name: name.to_string(),
                    entry_type: entry_type.to_string(),
                    path,
                    description: None,
                    file_size: data.as_ref().map(|d| d.len() as u64),
                    created_at: Some(now.clone()),
                    updated_at: Some(now),
                },
                parent,
                data,
            },
        );
        id
    }

    /// 创建目录，返回 ID
    pub fn add_folder(&self, parent: Option<u64>, name: &str) -> u64 {
        let mut state = self.lock();
        Self::insert(&mut state, parent, name, "folder", None)
    }

    /// 创建文件，返回 ID
    pub fn add_file(&self, parent: Option<u64>, name: &str, data: &[u8]) -> u64 {
        let mut state = self.lock();
        Self::insert(&mut state, parent, name, "file", Some(Bytes::copy_from_slice(data)))
    }

    /// 让上传到指定相对路径的请求失败
    pub fn fail_uploads_to(&self, relative_path: &str) {
        self.lock().failing_uploads.insert(relative_path.to_string());
    }

    /// 已成功上传的目标路径
    pub fn uploads(&self) -> Vec<String> {
        self.lock().uploads.clone()
    }

    pub fn downloads(&self) -> Vec<u64> {
        self.lock().downloads.clone()
    }

    pub fn deleted(&self) -> Vec<u64> {
        self.lock().deleted.clone()
    }

    pub fn entry(&self, id: u64) -> Option<RemoteEntry> {
        self.lock().nodes.get(&id).map(|n| n.entry.clone())
    }

    /// 按可读路径查找条目（如 "docs/a.txt"）
    pub fn find(&self, relative_path: &str) -> Option<RemoteEntry> {
        let state = self.lock();
        let mut parent = ROOT_FOLDER_ID;
        let mut found = None;
        for segment in relative_path.split(SEPARATOR).filter(|s| !s.is_empty()) {
            let node = state
                .nodes
                .values()
                .filter(|n| n.parent == parent && n.entry.name == segment)
                .last()?;
            parent = node.entry.id;
            found = Some(node.entry.clone());
        }
        found
    }

    pub fn len(&self) -> usize {
        self.lock().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().nodes.is_empty()
    }

    fn child_folder(state: &State, parent: u64, name: &str) -> Option<u64> {
        state
            .nodes
            .values()
            .find(|n| n.parent == parent && n.entry.is_folder() && n.entry.name == name)
            .map(|n| n.entry.id)
    }

    fn collect_subtree(state: &State, id: u64, out: &mut Vec<u64>) {
        out.push(id);
        let children: Vec<u64> = state
            .nodes
            .values()
            .filter(|n| n.parent == id && n.entry.id != id)
            .map(|n| n.entry.id)
            .collect();
        for child in children {
            Self::collect_subtree(state, child, out);
        }
    }
}

#[async_trait]
impl RemoteStorage for MemoryRemote {
    async fn list_entries(
        &self,
        folder_id: Option<u64>,
        page: u32,
    ) -> Result<EntryPage, RemoteError> {
        let state = self.lock();
        let parent = folder_id.unwrap_or(ROOT_FOLDER_ID);
        if parent != ROOT_FOLDER_ID && !state.nodes.contains_key(&parent) {
            return Err(RemoteError::NotFound(parent.to_string()));
        }

        let children: Vec<RemoteEntry> = state
            .nodes
            .values()
            .filter(|n| n.parent == parent)
            .map(|n| n.entry.clone())
            .collect();

        let page = page.max(1) as usize;
        let start = (page - 1) * self.page_size;
        let entries: Vec<RemoteEntry> =
            children.iter().skip(start).take(self.page_size).cloned().collect();
        let next_page = (start + self.page_size < children.len()).then_some(page as u32 + 1);

        Ok(EntryPage { entries, next_page })
    }

    async fn upload_file(
        &self,
        local_path: &Path,
        target_relative_path: &str,
    ) -> Result<u64, RemoteError> {
        let data = tokio::fs::read(local_path).await?;

        let mut state = self.lock();
        if state.failing_uploads.contains(target_relative_path) {
            return Err(RemoteError::Status {
                status: 500,
                body: format!("upload rejected: {}", target_relative_path),
            });
        }

        let segments: Vec<&str> = target_relative_path
            .split(SEPARATOR)
            .filter(|s| !s.is_empty())
            .collect();
        let Some((file_name, dirs)) = segments.split_last() else {
            return Err(RemoteError::Protocol("上传路径为空".to_string()));
        };

        let mut parent = ROOT_FOLDER_ID;
        for dir in dirs {
            parent = match Self::child_folder(&state, parent, dir) {
                Some(id) => id,
                None => Self::insert(&mut state, Some(parent), dir, "folder", None),
            };
        }
        let id = Self::insert(&mut state, Some(parent), file_name, "file", Some(Bytes::from(data)));
        state.uploads.push(target_relative_path.to_string());
        Ok(id)
    }

    async fn download_file(&self, entry_id: u64) -> Result<Bytes, RemoteError> {
        let mut state = self.lock();
        let data = match state.nodes.get(&entry_id) {
            None => return Err(RemoteError::NotFound(entry_id.to_string())),
            Some(node) => node
                .data
                .clone()
                .ok_or_else(|| RemoteError::Protocol(format!("{} 是目录", entry_id)))?,
        };
        state.downloads.push(entry_id);
        Ok(data)
    }

    async fn set_metadata(&self, entry_id: u64, metadata: &str) -> Result<(), RemoteError> {
        let mut state = self.lock();
        let node = state
            .nodes
            .get_mut(&entry_id)
            .ok_or_else(|| RemoteError::NotFound(entry_id.to_string()))?;
        node.entry.description = Some(metadata.to_string());
        Ok(())
    }

    async fn delete_entries(
        &self,
        entry_ids: &[u64],
        _permanent: bool,
    ) -> Result<(), RemoteError> {
        let mut state = self.lock();
        if let Some(missing) = entry_ids.iter().find(|id| !state.nodes.contains_key(id)) {
            return Err(RemoteError::NotFound(missing.to_string()));
        }
        for &id in entry_ids {
            let mut subtree = Vec::new();
            Self::collect_subtree(&state, id, &mut subtree);
            for removed in subtree {
                state.nodes.remove(&removed);
            }
            state.deleted.push(id);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
