//! 删除文件之后清理变空的目录
//!
//! 从被删除条目的父目录开始逐级向上，只删除当前确实为空的目录；
//! 遇到非空目录或到达同步根目录即停止。已经不存在的目录视为已清理，继续向上。

use crate::core::remote_tree::FIRST_PAGE;
use crate::error::TransferError;
use crate::storage::{DirRemoval, LocalFs, RemoteStorage};
use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 可清理空目录的一侧
#[async_trait]
pub trait PruneTarget: Send + Sync {
    type Dir: Clone + Eq + Hash + Debug + Send + Sync;

    async fn remove_if_empty(&self, dir: &Self::Dir) -> Result<DirRemoval, TransferError>;
}

pub struct LocalPruneTarget<'a> {
    fs: &'a dyn LocalFs,
}

impl<'a> LocalPruneTarget<'a> {
    pub fn new(fs: &'a dyn LocalFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl PruneTarget for LocalPruneTarget<'_> {
    type Dir = PathBuf;

    async fn remove_if_empty(&self, dir: &PathBuf) -> Result<DirRemoval, TransferError> {
        Ok(self.fs.remove_empty_dir(dir).await?)
    }
}

pub struct RemotePruneTarget<'a> {
    remote: &'a dyn RemoteStorage,
    permanent: bool,
}

impl<'a> RemotePruneTarget<'a> {
    pub fn new(remote: &'a dyn RemoteStorage, permanent: bool) -> Self {
        Self { remote, permanent }
    }
}

#[async_trait]
impl PruneTarget for RemotePruneTarget<'_> {
    type Dir = u64;

    async fn remove_if_empty(&self, dir: &u64) -> Result<DirRemoval, TransferError> {
        let page = match self.remote.list_entries(Some(*dir), FIRST_PAGE).await {
            Ok(page) => page,
            Err(e) if e.is_not_found() => return Ok(DirRemoval::Missing),
            Err(e) => return Err(e.into()),
        };
        if !page.entries.is_empty() {
            return Ok(DirRemoval::NotEmpty);
        }
        match self.remote.delete_entries(&[*dir], self.permanent).await {
            Ok(()) => Ok(DirRemoval::Removed),
            Err(e) if e.is_not_found() => Ok(DirRemoval::Missing),
            Err(e) => Err(e.into()),
        }
    }
}

/// 一次清理的结果
#[derive(Debug)]
pub struct PruneOutcome<D> {
    pub removed: Vec<D>,
    pub failed: Vec<(D, TransferError)>,
}

impl<D> Default for PruneOutcome<D> {
    fn default() -> Self {
        Self {
            removed: Vec::new(),
            failed: Vec::new(),
        }
    }
}

/// 空目录清理器，记住已经清理过的目录，同一批次中多条链共享前缀时不会重复请求
pub struct Pruner<T: PruneTarget> {
    target: T,
    settled: HashSet<T::Dir>,
}

impl<T: PruneTarget> Pruner<T> {
    pub fn new(target: T) -> Self {
        Self {
            target,
            settled: HashSet::new(),
        }
    }

    /// 清理一条目录链，`chain` 由深到浅排列，不包含同步根目录
    pub async fn prune_chain(&mut self, chain: &[T::Dir], outcome: &mut PruneOutcome<T::Dir>) {
        for dir in chain {
            if self.settled.contains(dir) {
                continue;
            }
            match self.target.remove_if_empty(dir).await {
                Ok(DirRemoval::Removed) => {
                    debug!("已删除空目录: {:?}", dir);
                    self.settled.insert(dir.clone());
                    outcome.removed.push(dir.clone());
                }
                Ok(DirRemoval::Missing) => {
                    self.settled.insert(dir.clone());
                }
                Ok(DirRemoval::NotEmpty) => break,
                Err(e) => {
                    warn!("清理空目录失败 {:?}: {}", dir, e);
                    outcome.failed.push((dir.clone(), e));
                    break;
                }
            }
        }
    }
}

/// 本地文件的父目录链（由深到浅），不包含根目录本身
pub fn local_chain(path: &Path, root: &Path) -> Vec<PathBuf> {
    path.ancestors()
        .skip(1)
        .take_while(|p| *p != root && p.starts_with(root))
        .map(Path::to_path_buf)
        .collect()
}

/// 远程条目的祖先目录链（由深到浅）
pub fn remote_chain(ancestors: &[u64]) -> Vec<u64> {
    ancestors.iter().rev().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{LocalFileSystem, MemoryRemote};

    #[test]
    fn test_local_chain_stops_at_root() {
        let chain = local_chain(Path::new("/r/a/b/f.txt"), Path::new("/r"));
        assert_eq!(chain, vec![PathBuf::from("/r/a/b"), PathBuf::from("/r/a")]);
        assert!(local_chain(Path::new("/r/f.txt"), Path::new("/r")).is_empty());
    }

    #[tokio::test]
    async fn test_local_prune_stops_at_non_empty() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("a/b/c")).unwrap();
        std::fs::write(root.join("a/keep.txt"), b"k").unwrap();

        let fs = LocalFileSystem::new();
        let mut pruner = Pruner::new(LocalPruneTarget::new(&fs));
        let mut outcome = PruneOutcome::default();
        let chain = local_chain(&root.join("a/b/c/gone.txt"), root);
        pruner.prune_chain(&chain, &mut outcome).await;

        assert_eq!(outcome.removed, vec![root.join("a/b/c"), root.join("a/b")]);
        assert!(outcome.failed.is_empty());
        assert!(root.join("a/keep.txt").exists());
        assert!(root.exists());
    }

    #[tokio::test]
    async fn test_local_prune_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("x/y")).unwrap();
        let fs = LocalFileSystem::new();
        let chain = local_chain(&root.join("x/y/f"), root);

        let mut first = PruneOutcome::default();
        Pruner::new(LocalPruneTarget::new(&fs))
            .prune_chain(&chain, &mut first)
            .await;
        assert_eq!(first.removed.len(), 2);

        // 目录已不存在，第二次不做任何事也不报错
        let mut second = PruneOutcome::default();
        Pruner::new(LocalPruneTarget::new(&fs))
            .prune_chain(&chain, &mut second)
            .await;
        assert!(second.removed.is_empty());
        assert!(second.failed.is_empty());
        assert!(root.exists());
    }

    #[tokio::test]
    async fn test_remote_prune() {
        let remote = MemoryRemote::new();
        let top = remote.add_folder(None, "top");
        let mid = remote.add_folder(Some(top), "mid");
        let leaf = remote.add_folder(Some(mid), "leaf");
        remote.add_file(Some(top), "keep.txt", b"k");

        let mut pruner = Pruner::new(RemotePruneTarget::new(&remote, false));
        let mut outcome = PruneOutcome::default();
        pruner
            .prune_chain(&remote_chain(&[top, mid, leaf]), &mut outcome)
            .await;

        assert_eq!(outcome.removed, vec![leaf, mid]);
        assert!(remote.entry(top).is_some());
        assert!(remote.entry(mid).is_none());

        // 再次清理同一条链不会重复删除
        let mut again = PruneOutcome::default();
        Pruner::new(RemotePruneTarget::new(&remote, false))
            .prune_chain(&remote_chain(&[top, mid, leaf]), &mut again)
            .await;
        assert!(again.removed.is_empty());
        assert!(again.failed.is_empty());
    }
}
