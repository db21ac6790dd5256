use super::{DirRemoval, LocalFs, LocalStat, WalkEntry};
use crate::core::digest;
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use walkdir::WalkDir;

/// 基于 tokio::fs 的本地文件系统
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }

    /// 与目标文件同目录的临时文件，保证 rename 不跨设备
    fn temp_path(path: &Path) -> PathBuf {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()))
    }
}

#[async_trait]
impl LocalFs for LocalFileSystem {
    async fn walk(&self, root: &Path) -> io::Result<Vec<WalkEntry>> {
        if !fs::try_exists(root).await? {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("本地目录不存在: {}", root.display()),
            ));
        }

        let root = root.to_path_buf();
        // 使用 spawn_blocking 避免阻塞 async runtime
        tokio::task::spawn_blocking(move || -> io::Result<Vec<WalkEntry>> {
            let mut entries = Vec::new();
            for item in WalkDir::new(&root).follow_links(false).min_depth(1) {
                match item {
                    Ok(entry) if entry.file_type().is_dir() => {
                        entries.push(WalkEntry::dir(entry.into_path()))
                    }
                    Ok(entry) => entries.push(WalkEntry::file(entry.into_path())),
                    Err(err) => match err.path().map(Path::to_path_buf) {
                        // 根目录本身读取失败，整个目录树未知
                        Some(path) if err.depth() > 0 && path != root => {
                            tracing::warn!("无法读取 {:?}: {}", path, err);
                            entries.push(WalkEntry::unreadable(path));
                        }
                        _ => return Err(io::Error::from(err)),
                    },
                }
            }
            Ok(entries)
        })
        .await
        .map_err(io::Error::other)?
    }

    async fn stat(&self, path: &Path) -> io::Result<LocalStat> {
        let metadata = fs::metadata(path).await?;
        let modified = metadata.modified().ok();
        Ok(LocalStat {
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            // 部分文件系统不支持创建时间
            created: metadata.created().ok().or(modified),
            modified,
        })
    }

    async fn digest(&self, path: &Path) -> io::Result<String> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || digest::hash_file(&path))
            .await
            .map_err(io::Error::other)?
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn remove_empty_dir(&self, path: &Path) -> io::Result<DirRemoval> {
        let mut entries = match fs::read_dir(path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(DirRemoval::Missing),
            Err(e) => return Err(e),
        };
        if entries.next_entry().await?.is_some() {
            return Ok(DirRemoval::NotEmpty);
        }
        // remove_dir 本身也会拒绝删除非空目录，检查与删除之间出现的新文件不会被误删
        match fs::remove_dir(path).await {
            Ok(()) => Ok(DirRemoval::Removed),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(DirRemoval::Missing),
            Err(e) => {
                if fs::read_dir(path).await?.next_entry().await?.is_some() {
                    Ok(DirRemoval::NotEmpty)
                } else {
                    Err(e)
                }
            }
        }
    }

    async fn write_file(
        &self,
        path: &Path,
        data: Bytes,
        modified: Option<SystemTime>,
    ) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // 使用临时文件写入，然后原子重命名
        let temp_path = Self::temp_path(path);
        let temp = temp_path.clone();
        let write_result = tokio::task::spawn_blocking(move || -> io::Result<()> {
            let file = std::fs::File::create(&temp)?;
            std::io::Write::write_all(&mut &file, &data)?;
            if let Some(time) = modified {
                file.set_modified(time)?;
            }
            file.sync_all()
        })
        .await
        .map_err(io::Error::other)?;

        if let Err(e) = write_result {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }

        if let Err(e) = fs::rename(&temp_path, path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_walk_skips_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/b/f.txt"), b"x").unwrap();

        let entries = LocalFileSystem::new().walk(dir.path()).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.path != dir.path()));
        assert!(entries
            .iter()
            .any(|e| !e.is_dir && e.path.ends_with("a/b/f.txt")));
    }

    #[tokio::test]
    async fn test_walk_missing_root_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = LocalFileSystem::new().walk(&dir.path().join("nope")).await;
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_remove_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::new();
        let full = dir.path().join("full");
        let empty = dir.path().join("empty");
        std::fs::create_dir(&full).unwrap();
        std::fs::create_dir(&empty).unwrap();
        std::fs::write(full.join("keep.txt"), b"k").unwrap();

        assert_eq!(fs.remove_empty_dir(&full).await.unwrap(), DirRemoval::NotEmpty);
        assert_eq!(fs.remove_empty_dir(&empty).await.unwrap(), DirRemoval::Removed);
        assert_eq!(fs.remove_empty_dir(&empty).await.unwrap(), DirRemoval::Missing);
        assert!(full.join("keep.txt").exists());
    }

    #[tokio::test]
    async fn test_write_file_sets_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("sub/out.txt");
        let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);

        LocalFileSystem::new()
            .write_file(&target, Bytes::from_static(b"data"), Some(mtime))
            .await
            .unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"data");
        let stat = LocalFileSystem::new().stat(&target).await.unwrap();
        assert_eq!(stat.size, 4);
        assert_eq!(stat.modified, Some(mtime));
        // 不留下临时文件
        assert_eq!(std::fs::read_dir(dir.path().join("sub")).unwrap().count(), 1);
    }
}
