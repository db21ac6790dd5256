//! 远程路径解析：把祖先 ID 链替换成目录名

use crate::core::record::SEPARATOR;
use crate::storage::{RemoteEntry, ROOT_FOLDER_ID};
use std::collections::HashMap;

/// 远程目录 ID -> 目录名，始终包含根目录 0 -> "root"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderMap {
    names: HashMap<u64, String>,
}

impl Default for FolderMap {
    fn default() -> Self {
        let mut names = HashMap::new();
        names.insert(ROOT_FOLDER_ID, "root".to_string());
        Self { names }
    }
}

impl FolderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从远程条目列表中收集所有目录
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a RemoteEntry>) -> Self {
        let mut map = Self::default();
        for entry in entries.into_iter().filter(|e| e.is_folder()) {
            map.insert(entry.id, entry.name.clone());
        }
        map
    }

    pub fn insert(&mut self, id: u64, name: impl Into<String>) {
        self.names.insert(id, name.into());
    }

    pub fn get(&self, id: u64) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// 去掉空段和条目自身 ID 之后的路径段
fn ancestor_segments(ancestor_path: &str, own_id: u64) -> Vec<&str> {
    let own = own_id.to_string();
    ancestor_path
        .split(SEPARATOR)
        .map(str::trim)
        .filter(|seg| !seg.is_empty() && *seg != own)
        .collect()
}

fn substitute(segment: &str, folders: &FolderMap) -> String {
    segment
        .parse::<u64>()
        .ok()
        .and_then(|id| folders.get(id))
        .unwrap_or(segment)
        .to_string()
}

/// 将祖先 ID 链解析为可读路径；无法解析的 ID 原样保留
pub fn resolve_path(ancestor_path: &str, own_id: u64, folders: &FolderMap) -> String {
    ancestor_segments(ancestor_path, own_id)
        .into_iter()
        .map(|seg| substitute(seg, folders))
        .collect::<Vec<_>>()
        .join(&SEPARATOR.to_string())
}

/// 只保留 `sync_root` 之下的路径段；条目不在 `sync_root` 之下时返回 None
pub fn resolve_below(
    ancestor_path: &str,
    own_id: u64,
    sync_root: u64,
    folders: &FolderMap,
) -> Option<String> {
    let segments = ancestor_segments(ancestor_path, own_id);
    let root = sync_root.to_string();
    let start = match segments.iter().position(|seg| *seg == root) {
        Some(pos) => pos + 1,
        None if sync_root == ROOT_FOLDER_ID => 0,
        None => return None,
    };
    Some(
        segments[start..]
            .iter()
            .map(|seg| substitute(seg, folders))
            .collect::<Vec<_>>()
            .join(&SEPARATOR.to_string()),
    )
}

/// `sync_root` 之下的祖先 ID（由浅到深），用于空目录清理
pub fn ancestors_below(ancestor_path: &str, own_id: u64, sync_root: u64) -> Vec<u64> {
    let ids: Vec<u64> = ancestor_segments(ancestor_path, own_id)
        .into_iter()
        .filter_map(|seg| seg.parse::<u64>().ok())
        .filter(|id| *id != ROOT_FOLDER_ID)
        .collect();
    match ids.iter().position(|id| *id == sync_root) {
        Some(pos) => ids[pos + 1..].to_vec(),
        None => ids,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folders() -> FolderMap {
        let mut map = FolderMap::new();
        map.insert(10, "docs");
        map.insert(11, "2024");
        map
    }

    #[test]
    fn test_root_always_present() {
        let map = FolderMap::new();
        assert_eq!(map.get(0), Some("root"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_resolve_substitutes_names() {
        assert_eq!(resolve_path("10/11/99", 99, &folders()), "docs/2024");
        assert_eq!(resolve_path("10/11", 99, &folders()), "docs/2024");
        assert_eq!(resolve_path("", 99, &folders()), "");
    }

    #[test]
    fn test_own_id_never_emitted() {
        // 自身 ID 恰好也是某个目录名的 key，也不能出现
        let mut map = folders();
        map.insert(99, "self");
        let resolved = resolve_path("10/99", 99, &map);
        assert_eq!(resolved, "docs");
        assert!(!resolved.split('/').any(|s| s == "99" || s == "self"));
    }

    #[test]
    fn test_unresolved_ids_pass_through() {
        assert_eq!(resolve_path("10/555/99", 99, &folders()), "docs/555");
        assert_eq!(resolve_path("10/abc/99", 99, &folders()), "docs/abc");
    }

    #[test]
    fn test_resolve_below_sync_root() {
        let map = folders();
        assert_eq!(resolve_below("10/11/99", 99, 10, &map).as_deref(), Some("2024"));
        assert_eq!(resolve_below("10/11/99", 99, 11, &map).as_deref(), Some(""));
        assert_eq!(resolve_below("10/11/99", 99, 0, &map).as_deref(), Some("docs/2024"));
        assert_eq!(resolve_below("10/11/99", 99, 42, &map), None);
    }

    #[test]
    fn test_ancestors_below() {
        assert_eq!(ancestors_below("10/11/99", 99, 0), vec![10, 11]);
        assert_eq!(ancestors_below("10/11/99", 99, 10), vec![11]);
        assert!(ancestors_below("10/11/99", 99, 11).is_empty());
    }
}
