//! 远程目录树
//!
//! 通过分页列表逐个目录读取远程条目，用显式工作栈代替递归调用，
//! 目录之间检查取消标志。读取结果存放在以下标索引的节点数组中，
//! 目录是否为空由一次后序遍历自底向上计算。

use crate::core::record::{join_relative, EmbeddedMetadata, FileRecord, Location, SEPARATOR};
use crate::core::resolver::{ancestors_below, resolve_below, resolve_path, FolderMap};
use crate::error::CycleError;
use crate::storage::{RemoteEntry, RemoteStorage, ROOT_FOLDER_ID};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 列表的第一页页码
pub const FIRST_PAGE: u32 = 1;

/// 树节点
#[derive(Debug, Clone)]
pub struct RemoteNode {
    pub entry: RemoteEntry,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub is_empty: bool,
}

/// 远程目录树
#[derive(Debug, Clone, Default)]
pub struct RemoteTree {
    nodes: Vec<RemoteNode>,
    index: HashMap<u64, usize>,
    folders: FolderMap,
}

impl RemoteTree {
    /// 从扁平的条目列表构建；重复 ID 以后出现的为准
    pub fn from_entries(entries: Vec<RemoteEntry>) -> Self {
        let mut unique: Vec<RemoteEntry> = Vec::with_capacity(entries.len());
        let mut position: HashMap<u64, usize> = HashMap::new();
        for entry in entries {
            match position.get(&entry.id) {
                Some(&pos) => {
                    debug!("重复的远程条目: {}", entry.id);
                    unique[pos] = entry;
                }
                None => {
                    position.insert(entry.id, unique.len());
                    unique.push(entry);
                }
            }
        }

        let folders = FolderMap::from_entries(&unique);
        let mut nodes: Vec<RemoteNode> = unique
            .into_iter()
            .map(|entry| RemoteNode {
                entry,
                parent: None,
                children: Vec::new(),
                is_empty: false,
            })
            .collect();

        for idx in 0..nodes.len() {
            let parent_id = nodes[idx].entry.parent_id();
            if let Some(&parent_idx) = position.get(&parent_id) {
                if parent_idx != idx && nodes[parent_idx].entry.is_folder() {
                    nodes[idx].parent = Some(parent_idx);
                    nodes[parent_idx].children.push(idx);
                }
            }
        }

        let mut tree = Self {
            nodes,
            index: position,
            folders,
        };
        tree.compute_emptiness();
        tree
    }

    /// 后序遍历计算目录是否为空
    fn compute_emptiness(&mut self) {
        // 0 未访问, 1 访问中, 2 已完成
        let mut state = vec![0u8; self.nodes.len()];
        for idx in 0..self.nodes.len() {
            if self.nodes[idx].parent.is_none() {
                self.visit(idx, &mut state);
            }
        }
        // 环中的节点没有根，单独处理
        for idx in 0..self.nodes.len() {
            if state[idx] == 0 {
                self.visit(idx, &mut state);
            }
        }
    }

    fn visit(&mut self, idx: usize, state: &mut [u8]) -> bool {
        match state[idx] {
            2 => return self.nodes[idx].is_empty,
            // 父子关系成环，保守地视为非空
            1 => return false,
            _ => {}
        }
        state[idx] = 1;

        let empty = if self.nodes[idx].entry.is_folder() {
            let children = self.nodes[idx].children.clone();
            let mut all_empty = true;
            for child in children {
                // 不短路，保证每个子节点都被计算
                let child_empty = self.visit(child, state);
                all_empty &= child_empty && self.nodes[child].entry.is_folder();
            }
            all_empty
        } else {
            false
        };

        self.nodes[idx].is_empty = empty;
        state[idx] = 2;
        empty
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn folder_map(&self) -> &FolderMap {
        &self.folders
    }

    pub fn get(&self, id: u64) -> Option<&RemoteNode> {
        self.index.get(&id).map(|&idx| &self.nodes[idx])
    }

    /// 目录是否为空；不是已知目录时返回 None
    pub fn is_empty_folder(&self, id: u64) -> Option<bool> {
        self.get(id)
            .filter(|n| n.entry.is_folder())
            .map(|n| n.is_empty)
    }

    /// 所有空目录的 ID
    pub fn empty_folders(&self) -> Vec<u64> {
        self.nodes
            .iter()
            .filter(|n| n.entry.is_folder() && n.is_empty)
            .map(|n| n.entry.id)
            .collect()
    }

    /// 目录自身的可读路径（含自身名称）；根目录为空串
    pub fn folder_path(&self, id: u64) -> Option<String> {
        if id == ROOT_FOLDER_ID {
            return Some(String::new());
        }
        let entry = &self.get(id).filter(|n| n.entry.is_folder())?.entry;
        Some(join_relative(
            &resolve_path(&entry.path, entry.id, &self.folders),
            &entry.name,
        ))
    }

    pub fn entries(&self) -> impl Iterator<Item = &RemoteEntry> {
        self.nodes.iter().map(|n| &n.entry)
    }

    pub fn to_entries(&self) -> Vec<RemoteEntry> {
        self.entries().cloned().collect()
    }

    /// 选定同步根目录下的所有记录（文件和目录），相对路径从根目录之下开始计算。
    /// 一个条目同时位于多个根目录下时只保留第一次出现。
    pub fn records(&self, sync_roots: &[u64]) -> Vec<FileRecord> {
        let roots: Vec<u64> = if sync_roots.is_empty() {
            vec![ROOT_FOLDER_ID]
        } else {
            sync_roots.to_vec()
        };

        let mut seen = HashSet::new();
        let mut records = Vec::new();
        for &root in &roots {
            for node in &self.nodes {
                let entry = &node.entry;
                if seen.contains(&entry.id) {
                    continue;
                }
                let Some(relative_path) =
                    resolve_below(&entry.path, entry.id, root, &self.folders)
                else {
                    continue;
                };
                seen.insert(entry.id);
                records.push(self.to_record(node, relative_path, root));
            }
        }
        records
    }

    fn to_record(&self, node: &RemoteNode, relative_path: String, root: u64) -> FileRecord {
        let entry = &node.entry;
        let created = entry.created_at.clone().unwrap_or_default();
        let updated = entry.updated_at.clone().unwrap_or_default();

        // 描述字段中保存的是上传时的本地时间，优先使用
        let (digest, created_at, modified_at) =
            match entry.description.as_deref().and_then(EmbeddedMetadata::parse) {
                Some(meta) => (
                    meta.sha256,
                    if meta.ctime.is_empty() { created } else { meta.ctime },
                    if meta.utime.is_empty() { updated } else { meta.utime },
                ),
                None => (String::new(), created, updated),
            };

        FileRecord {
            name: entry.name.clone(),
            relative_path,
            created_at,
            modified_at,
            size: if entry.is_folder() { None } else { entry.file_size },
            content_digest: digest,
            location: Location::Remote {
                id: entry.id,
                folder: entry.is_folder(),
                is_empty: entry.is_folder() && node.is_empty,
                ancestors: ancestors_below(&entry.path, entry.id, root),
            },
        }
    }
}

/// 远程目录树读取器
#[derive(Default)]
pub struct RemoteTreeReader {
    cancel_flag: Option<Arc<AtomicBool>>,
}

impl RemoteTreeReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建带取消标志的读取器
    pub fn with_cancel(cancel_flag: Arc<AtomicBool>) -> Self {
        Self {
            cancel_flag: Some(cancel_flag),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_flag
            .as_ref()
            .map(|f| f.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// 从 `start`（None 为根目录）开始读取整棵树。
    /// 任何目录列表失败都会中止读取，半棵树会导致错误的"仅本地存在"判断。
    pub async fn read(
        &self,
        remote: &dyn RemoteStorage,
        start: Option<u64>,
    ) -> Result<RemoteTree, CycleError> {
        info!("开始读取远程目录树: {}, 起点: {:?}", remote.name(), start);

        let mut entries = Vec::new();
        let mut visited = HashSet::new();
        // (目录 ID, 该目录的 ID 路径)
        let mut worklist: Vec<(Option<u64>, String)> = vec![(start, String::new())];

        while let Some((folder_id, folder_path)) = worklist.pop() {
            if self.is_cancelled() {
                return Err(CycleError::Cancelled);
            }
            if !visited.insert(folder_id) {
                warn!("目录被重复引用，跳过: {:?}", folder_id);
                continue;
            }

            let mut page = FIRST_PAGE;
            loop {
                let result = remote.list_entries(folder_id, page).await?;
                debug!(
                    "目录 {:?} 第 {} 页: {} 个条目",
                    folder_id,
                    page,
                    result.entries.len()
                );

                for mut entry in result.entries {
                    if entry.path.trim().is_empty() {
                        entry.path = if folder_path.is_empty() {
                            entry.id.to_string()
                        } else {
                            format!("{}{}{}", folder_path, SEPARATOR, entry.id)
                        };
                    }
                    if entry.is_folder() {
                        worklist.push((Some(entry.id), entry.path.clone()));
                    }
                    entries.push(entry);
                }

                match result.next_page {
                    Some(next) if next > page => page = next,
                    _ => break,
                }
            }
        }

        let tree = RemoteTree::from_entries(entries);
        info!(
            "远程目录树读取完成: {} 个条目, {} 个目录, {} 个空目录",
            tree.len(),
            tree.folder_map().len() - 1,
            tree.empty_folders().len()
        );
        Ok(tree)
    }
}
