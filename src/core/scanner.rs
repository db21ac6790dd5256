//! 本地目录扫描：遍历一个或多个本地根目录，生成带摘要的文件记录

use crate::core::record::{format_timestamp, join_relative, FileRecord, Location, SEPARATOR};
use crate::error::{CycleError, RecordError};
use crate::storage::LocalFs;
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 每处理多少个文件检查一次取消标志
const CANCEL_CHECK_INTERVAL: usize = 100;

/// 文件扫描器配置
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// 排除规则（glob patterns）
    pub exclude_patterns: Vec<String>,
    /// 最大文件大小（0 表示不限制）
    pub max_file_size: u64,
    /// 仅包含的扩展名（空表示不限制）
    pub include_extensions: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            exclude_patterns: vec![
                ".git/**".to_string(),
                ".svn/**".to_string(),
                "node_modules/**".to_string(),
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                "*.tmp".to_string(),
                "*.temp".to_string(),
                "~*".to_string(),
            ],
            max_file_size: 0,
            include_extensions: vec![],
        }
    }
}

/// 扫描结果
#[derive(Debug, Clone, Default)]
pub struct LocalScan {
    pub records: Vec<FileRecord>,
    /// 读取失败而跳过的文件
    pub skipped: Vec<RecordError>,
    /// 读取失败的文件或目录的相对路径，其下的本地内容未知
    pub unreadable: Vec<String>,
    /// 被排除规则或大小限制过滤掉的文件数
    pub excluded: usize,
}

impl LocalScan {
    fn merge(&mut self, other: LocalScan) {
        self.records.extend(other.records);
        self.skipped.extend(other.skipped);
        self.unreadable.extend(other.unreadable);
        self.excluded += other.excluded;
    }
}

/// 把 glob 转换为正则：`**` 跨目录，`*` 和 `?` 不跨目录
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut expr = String::from("(?i)^");
    let mut chars = pattern.trim_matches(SEPARATOR).chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                expr.push_str(".*");
            }
            '*' => expr.push_str("[^/]*"),
            '?' => expr.push_str("[^/]"),
            c => expr.push_str(&regex::escape(&c.to_string())),
        }
    }
    expr.push('$');
    match Regex::new(&expr) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!("无效的排除规则 {}: {}", pattern, e);
            None
        }
    }
}

/// 文件扫描器
pub struct FileScanner {
    config: ScanConfig,
    patterns: Vec<Regex>,
    cancel_flag: Option<Arc<AtomicBool>>,
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::with_config(ScanConfig::default())
    }
}

impl FileScanner {
    pub fn with_config(config: ScanConfig) -> Self {
        let patterns = config
            .exclude_patterns
            .iter()
            .filter_map(|p| glob_to_regex(p))
            .collect();
        Self {
            config,
            patterns,
            cancel_flag: None,
        }
    }

    /// 设置取消标志
    pub fn with_cancel(mut self, cancel_flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(cancel_flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_flag
            .as_ref()
            .map(|f| f.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// 检查路径是否应该被排除。规则可以匹配路径中任意一段起始的后缀，
    /// 所以 `.git/**` 也会排除子目录里的 `.git`
    fn should_exclude(&self, relative: &str) -> bool {
        let excluded = relative
            .match_indices(SEPARATOR)
            .map(|(i, _)| i + 1)
            .chain(std::iter::once(0))
            .any(|start| self.patterns.iter().any(|re| re.is_match(&relative[start..])));
        if excluded {
            return true;
        }

        if !self.config.include_extensions.is_empty() {
            let ext = Path::new(relative)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_lowercase())
                .unwrap_or_default();
            return !self
                .config
                .include_extensions
                .iter()
                .any(|e| e.trim_start_matches('.').to_lowercase() == ext);
        }

        false
    }

    /// 依次扫描多个根目录；任一根目录不存在或无法遍历时整体失败，
    /// 否则缺失的一侧会被当作已删除
    pub async fn scan_roots(
        &self,
        fs: &dyn LocalFs,
        roots: &[PathBuf],
    ) -> Result<LocalScan, CycleError> {
        let mut combined = LocalScan::default();
        for root in roots {
            let scan = self.scan_root(fs, root).await.map_err(|e| {
                if let CycleError::Local(io) = &e {
                    error!("扫描本地目录失败 {:?}: {}", root, io);
                }
                e
            })?;
            combined.merge(scan);
        }
        Ok(combined)
    }

    /// 扫描单个根目录
    pub async fn scan_root(&self, fs: &dyn LocalFs, root: &Path) -> Result<LocalScan, CycleError> {
        if self.is_cancelled() {
            return Err(CycleError::Cancelled);
        }
        info!("开始扫描本地目录: {:?}", root);

        let entries = fs.walk(root).await?;
        let mut scan = LocalScan::default();
        let mut dir_count = 0;
        let mut processed = 0usize;

        for entry in entries {
            if entry.unreadable {
                let relative = split_relative(root, &entry.path)
                    .map(|(parent, name)| join_relative(&parent, &name));
                if let Some(relative) = relative {
                    scan.skipped.push(RecordError::Unreadable {
                        path: entry.path.display().to_string(),
                        message: "无法遍历".to_string(),
                    });
                    scan.unreadable.push(relative);
                }
                continue;
            }
            if entry.is_dir {
                dir_count += 1;
                continue;
            }
            processed += 1;
            if processed % CANCEL_CHECK_INTERVAL == 0 && self.is_cancelled() {
                return Err(CycleError::Cancelled);
            }

            let Some((relative_path, name)) = split_relative(root, &entry.path) else {
                debug!("路径不在根目录下，跳过: {:?}", entry.path);
                continue;
            };
            let key = join_relative(&relative_path, &name);
            if self.should_exclude(&key) {
                debug!("排除文件: {:?}", entry.path);
                scan.excluded += 1;
                continue;
            }

            match self.read_record(fs, root, &entry.path, relative_path, name).await {
                Ok(Some(record)) => scan.records.push(record),
                Ok(None) => scan.excluded += 1,
                Err(e) => {
                    warn!("{}", e);
                    scan.skipped.push(e);
                    scan.unreadable.push(key);
                }
            }
        }

        info!(
            "本地扫描完成 {:?}: {} 个文件, {} 个目录, {} 个被排除, {} 个读取失败",
            root,
            scan.records.len(),
            dir_count,
            scan.excluded,
            scan.skipped.len()
        );
        Ok(scan)
    }

    async fn read_record(
        &self,
        fs: &dyn LocalFs,
        root: &Path,
        path: &Path,
        relative_path: String,
        name: String,
    ) -> Result<Option<FileRecord>, RecordError> {
        let unreadable = |e: std::io::Error| RecordError::Unreadable {
            path: path.display().to_string(),
            message: e.to_string(),
        };

        let stat = fs.stat(path).await.map_err(unreadable)?;
        if self.config.max_file_size > 0 && stat.size > self.config.max_file_size {
            debug!("跳过大文件: {:?} ({})", path, stat.size);
            return Ok(None);
        }
        let digest = fs.digest(path).await.map_err(unreadable)?;

        Ok(Some(FileRecord {
            name,
            relative_path,
            created_at: stat.created.map(format_timestamp).unwrap_or_default(),
            modified_at: stat.modified.map(format_timestamp).unwrap_or_default(),
            size: Some(stat.size),
            content_digest: digest,
            location: Location::Local {
                path: path.to_path_buf(),
                root: root.to_path_buf(),
            },
        }))
    }
}

/// 拆分为 (相对于根目录的父目录, 文件名)
fn split_relative(root: &Path, path: &Path) -> Option<(String, String)> {
    let relative = path.strip_prefix(root).ok()?;
    let mut segments: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().to_string()),
            _ => None,
        })
        .collect();
    let name = segments.pop()?;
    Some((segments.join(&SEPARATOR.to_string()), name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::digest::calculate_hash;
    use crate::storage::{DirRemoval, LocalFileSystem, LocalStat, WalkEntry};

    fn write(root: &Path, rel: &str, data: &[u8]) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, data).unwrap();
    }

    #[test]
    fn test_exclude_patterns() {
        let scanner = FileScanner::default();
        assert!(scanner.should_exclude(".git/config"));
        assert!(scanner.should_exclude("project/.git/objects/ab"));
        assert!(scanner.should_exclude("docs/.DS_Store"));
        assert!(scanner.should_exclude("a/b/scratch.TMP"));
        assert!(scanner.should_exclude("~lock.docx"));
        assert!(!scanner.should_exclude("docs/report.txt"));
        assert!(!scanner.should_exclude("gitlog/notes.md"));
    }

    #[test]
    fn test_include_extensions() {
        let scanner = FileScanner::with_config(ScanConfig {
            exclude_patterns: vec![],
            include_extensions: vec![".jpg".into(), "png".into()],
            ..Default::default()
        });
        assert!(!scanner.should_exclude("photos/a.JPG"));
        assert!(!scanner.should_exclude("b.png"));
        assert!(scanner.should_exclude("c.txt"));
    }

    #[test]
    fn test_split_relative() {
        let root = Path::new("/data/sync");
        assert_eq!(
            split_relative(root, Path::new("/data/sync/a/b/f.txt")),
            Some(("a/b".to_string(), "f.txt".to_string()))
        );
        assert_eq!(
            split_relative(root, Path::new("/data/sync/f.txt")),
            Some((String::new(), "f.txt".to_string()))
        );
        assert_eq!(split_relative(root, Path::new("/elsewhere/f.txt")), None);
    }

    #[tokio::test]
    async fn test_scan_root_builds_records() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", b"hello");
        write(dir.path(), "docs/2024/b.txt", b"world");
        write(dir.path(), "docs/skip.tmp", b"x");

        let scan = FileScanner::default()
            .scan_root(&LocalFileSystem::new(), dir.path())
            .await
            .unwrap();

        assert_eq!(scan.records.len(), 2);
        assert_eq!(scan.excluded, 1);
        let b = scan.records.iter().find(|r| r.name == "b.txt").unwrap();
        assert_eq!(b.relative_path, "docs/2024");
        assert_eq!(b.size, Some(5));
        assert_eq!(b.content_digest, calculate_hash(b"world"));
        assert!(!b.modified_at.is_empty());
        assert!(b.validate().is_ok());
        assert_eq!(b.local_path(), Some(dir.path().join("docs/2024/b.txt").as_path()));
    }

    #[tokio::test]
    async fn test_max_file_size() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "small.bin", &[0u8; 4]);
        write(dir.path(), "big.bin", &[0u8; 64]);

        let scanner = FileScanner::with_config(ScanConfig {
            max_file_size: 16,
            ..Default::default()
        });
        let scan = scanner.scan_root(&LocalFileSystem::new(), dir.path()).await.unwrap();
        assert_eq!(scan.records.len(), 1);
        assert_eq!(scan.records[0].name, "small.bin");
        assert_eq!(scan.excluded, 1);
    }

    #[tokio::test]
    async fn test_missing_root_fails_multi_scan() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "one/a.txt", b"a");

        let roots = vec![dir.path().join("one"), dir.path().join("missing")];
        let result = FileScanner::default()
            .scan_roots(&LocalFileSystem::new(), &roots)
            .await;
        match result {
            Err(CycleError::Local(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("unexpected: {:?}", other.map(|s| s.records.len())),
        }
    }

    /// 指定文件的摘要读取失败、指定目录无法遍历的文件系统
    struct FlakyFs {
        inner: LocalFileSystem,
        bad_file: PathBuf,
        bad_dir: PathBuf,
    }

    #[async_trait::async_trait]
    impl LocalFs for FlakyFs {
        async fn walk(&self, root: &Path) -> std::io::Result<Vec<WalkEntry>> {
            let mut entries = self.inner.walk(root).await?;
            entries.retain(|e| !e.path.starts_with(&self.bad_dir));
            entries.push(WalkEntry::unreadable(&self.bad_dir));
            Ok(entries)
        }

        async fn stat(&self, path: &Path) -> std::io::Result<LocalStat> {
            self.inner.stat(path).await
        }

        async fn digest(&self, path: &Path) -> std::io::Result<String> {
            if path == self.bad_file {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "locked",
                ));
            }
            self.inner.digest(path).await
        }

        async fn remove(&self, path: &Path) -> std::io::Result<()> {
            self.inner.remove(path).await
        }

        async fn remove_empty_dir(&self, path: &Path) -> std::io::Result<DirRemoval> {
            self.inner.remove_empty_dir(path).await
        }

        async fn write_file(
            &self,
            path: &Path,
            data: bytes::Bytes,
            modified: Option<std::time::SystemTime>,
        ) -> std::io::Result<()> {
            self.inner.write_file(path, data, modified).await
        }
    }

    #[tokio::test]
    async fn test_unreadable_entries_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "ok.txt", b"ok");
        write(dir.path(), "docs/locked.txt", b"x");
        write(dir.path(), "private/secret.txt", b"s");

        let fs = FlakyFs {
            inner: LocalFileSystem::new(),
            bad_file: dir.path().join("docs/locked.txt"),
            bad_dir: dir.path().join("private"),
        };
        let scan = FileScanner::default().scan_root(&fs, dir.path()).await.unwrap();

        assert_eq!(scan.records.len(), 1);
        assert_eq!(scan.records[0].name, "ok.txt");
        assert_eq!(scan.skipped.len(), 2);
        let mut unreadable = scan.unreadable.clone();
        unreadable.sort();
        assert_eq!(unreadable, vec!["docs/locked.txt".to_string(), "private".to_string()]);
    }

    #[tokio::test]
    async fn test_cancelled_scan() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", b"a");
        let scanner = FileScanner::default().with_cancel(Arc::new(AtomicBool::new(true)));
        let result = scanner.scan_root(&LocalFileSystem::new(), dir.path()).await;
        assert!(matches!(result, Err(CycleError::Cancelled)));
    }
}
