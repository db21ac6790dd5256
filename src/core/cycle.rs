//! 同步周期
//!
//! 串联 扫描 -> 保存会话 -> 比较 -> 执行，同一时间只允许一个扫描或执行在进行。

use crate::config::SyncSettings;
use crate::core::comparator::reconcile;
use crate::core::engine::{
    CollisionPolicy, Direction, ExecutorConfig, SyncExecutor, SyncReport, SyncTargets,
};
use crate::core::record::FileRecord;
use crate::core::remote_tree::{RemoteTree, RemoteTreeReader};
use crate::core::scanner::{FileScanner, ScanConfig};
use crate::core::session::{SessionState, SessionStore};
use crate::error::{CycleError, RemoteError};
use crate::storage::{LocalFs, RemoteStorage, ROOT_FOLDER_ID};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// 本次同步选择的目录和设置
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub local_folders: Vec<PathBuf>,
    /// 远程同步根目录，空表示整个网盘
    pub remote_folders: Vec<u64>,
    pub direction: Direction,
    pub collision_resolution: CollisionPolicy,
    pub delete_at_destination: bool,
}

impl From<&SyncSettings> for Selection {
    fn from(settings: &SyncSettings) -> Self {
        Self {
            local_folders: settings.local_folders.clone(),
            remote_folders: settings.remote_folders.clone(),
            direction: settings.direction,
            collision_resolution: settings.collision_resolution,
            delete_at_destination: settings.delete_at_destination,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CycleConfig {
    pub scan: ScanConfig,
    pub executor: ExecutorConfig,
}

impl From<&SyncSettings> for CycleConfig {
    fn from(settings: &SyncSettings) -> Self {
        Self {
            scan: settings.scan_config(),
            executor: settings.executor_config(),
        }
    }
}

pub struct SyncCycle {
    remote: Arc<dyn RemoteStorage>,
    local: Arc<dyn LocalFs>,
    store: SessionStore,
    config: CycleConfig,
    busy: AtomicBool,
    cancel_flag: Arc<AtomicBool>,
}

impl SyncCycle {
    pub fn new(
        remote: Arc<dyn RemoteStorage>,
        local: Arc<dyn LocalFs>,
        store: SessionStore,
        config: CycleConfig,
    ) -> Self {
        Self {
            remote,
            local,
            store,
            config,
            busy: AtomicBool::new(false),
            cancel_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 占用周期；已有任务在进行时立即返回 Busy
    fn begin(&self) -> Result<(), CycleError> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| CycleError::Busy)?;
        self.cancel_flag.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// 请求取消正在进行的扫描或执行
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
    }

    /// 上次保存的会话
    pub fn restore(&self) -> Option<SessionState> {
        self.store.load()
    }

    /// 读取两侧目录树，保存为新的会话
    pub async fn scan(&self, selection: &Selection) -> Result<SessionState, CycleError> {
        self.begin()?;
        scopeguard::defer! {
            self.busy.store(false, Ordering::SeqCst);
        }

        info!(
            "开始扫描: 本地 {:?}, 远程 {:?}",
            selection.local_folders, selection.remote_folders
        );

        let tree = RemoteTreeReader::with_cancel(self.cancel_flag.clone())
            .read(self.remote.as_ref(), None)
            .await?;
        check_remote_folders(&tree, &selection.remote_folders)?;

        let local = FileScanner::with_config(self.config.scan.clone())
            .with_cancel(self.cancel_flag.clone())
            .scan_roots(self.local.as_ref(), &selection.local_folders)
            .await?;

        let state = SessionState {
            local_files: local.records,
            local_unreadable: local.unreadable,
            local_folders: selection.local_folders.clone(),
            remote_entries: tree.to_entries(),
            direction: selection.direction,
            remote_folders: selection.remote_folders.clone(),
            collision_resolution: selection.collision_resolution,
            delete_at_destination: selection.delete_at_destination,
        };

        let store = self.store.clone();
        let snapshot = state.clone();
        match tokio::task::spawn_blocking(move || store.save(&snapshot)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("保存会话失败: {}", e),
            Err(e) => warn!("保存会话任务异常: {}", e),
        }
        Ok(state)
    }

    /// 比较并执行一次同步
    pub async fn run(&self, state: &SessionState) -> Result<SyncReport, CycleError> {
        self.begin()?;
        scopeguard::defer! {
            self.busy.store(false, Ordering::SeqCst);
        }

        let tree = RemoteTree::from_entries(state.remote_entries.clone());
        check_remote_folders(&tree, &state.remote_folders)?;

        let local_records: Arc<[FileRecord]> = state.local_files.clone().into();
        let remote_records: Arc<[FileRecord]> = tree.records(&state.remote_folders).into();
        let plan = reconcile(&local_records, &remote_records);
        info!(
            "比较完成: 仅本地 {}, 仅远程 {}, 不同 {}",
            plan.only_in_local.len(),
            plan.only_in_remote.len(),
            plan.in_both_but_different.len()
        );

        let targets = SyncTargets {
            local_root: state.local_folders.first().cloned(),
            remote_base: state
                .remote_folders
                .first()
                .and_then(|id| tree.folder_path(*id))
                .unwrap_or_default(),
        };
        let executor = SyncExecutor::new(
            self.remote.clone(),
            self.local.clone(),
            self.config.executor.clone(),
            targets,
        )
        .with_cancel(self.cancel_flag.clone())
        .with_unreadable(state.local_unreadable.clone());

        let report = executor
            .execute(
                &plan,
                state.direction,
                state.collision_resolution,
                state.delete_at_destination,
            )
            .await;

        // 执行过后保存的目录树已经过期，下次启动需要重新扫描
        if !report.cancelled {
            if let Err(e) = self.store.clear() {
                warn!("清除会话失败: {}", e);
            }
        }
        Ok(report)
    }
}

/// 选择的远程根目录必须存在于目录树中
fn check_remote_folders(tree: &RemoteTree, folders: &[u64]) -> Result<(), CycleError> {
    match folders
        .iter()
        .find(|&&id| id != ROOT_FOLDER_ID && tree.is_empty_folder(id).is_none())
    {
        Some(missing) => Err(CycleError::Remote(RemoteError::NotFound(format!(
            "远程目录 {}",
            missing
        )))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{LocalFileSystem, MemoryRemote};

    fn cycle(remote: Arc<MemoryRemote>, data_dir: &std::path::Path) -> SyncCycle {
        SyncCycle::new(
            remote,
            Arc::new(LocalFileSystem::new()),
            SessionStore::new(data_dir),
            CycleConfig {
                executor: ExecutorConfig {
                    retry_base_delay_ms: 1,
                    ..Default::default()
                },
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_busy_cycle_rejects_second_call() {
        let data = tempfile::tempdir().unwrap();
        let cycle = cycle(Arc::new(MemoryRemote::new()), data.path());

        cycle.busy.store(true, Ordering::SeqCst);
        let result = cycle.scan(&Selection::default()).await;
        assert!(matches!(result, Err(CycleError::Busy)));
        let result = cycle.run(&SessionState::default()).await;
        assert!(matches!(result, Err(CycleError::Busy)));
        // 被拒绝的调用不会释放别人的占用
        assert!(cycle.is_busy());
    }

    #[tokio::test]
    async fn test_busy_released_after_scan_and_error() {
        let data = tempfile::tempdir().unwrap();
        let cycle = cycle(Arc::new(MemoryRemote::new()), data.path());

        cycle.scan(&Selection::default()).await.unwrap();
        assert!(!cycle.is_busy());

        let bad = Selection {
            remote_folders: vec![404],
            ..Default::default()
        };
        assert!(matches!(cycle.scan(&bad).await, Err(CycleError::Remote(_))));
        assert!(!cycle.is_busy());
    }

    #[tokio::test]
    async fn test_scan_persists_and_restores() {
        let data = tempfile::tempdir().unwrap();
        let local = tempfile::tempdir().unwrap();
        std::fs::write(local.path().join("a.txt"), b"a").unwrap();
        let remote = Arc::new(MemoryRemote::new());
        let docs = remote.add_folder(None, "docs");
        remote.add_file(Some(docs), "r.txt", b"r");

        let cycle = cycle(remote, data.path());
        let selection = Selection {
            local_folders: vec![local.path().to_path_buf()],
            remote_folders: vec![docs],
            direction: Direction::Both,
            ..Default::default()
        };
        let state = cycle.scan(&selection).await.unwrap();
        assert_eq!(state.local_files.len(), 1);
        assert_eq!(state.remote_entries.len(), 2);

        let restored = cycle.restore().unwrap();
        assert_eq!(restored, state);
    }

    #[tokio::test]
    async fn test_run_clears_session() {
        let data = tempfile::tempdir().unwrap();
        let local = tempfile::tempdir().unwrap();
        std::fs::write(local.path().join("a.txt"), b"a").unwrap();
        let remote = Arc::new(MemoryRemote::new());
        let backup = remote.add_folder(None, "backup");

        let cycle = cycle(remote.clone(), data.path());
        let state = cycle
            .scan(&Selection {
                local_folders: vec![local.path().to_path_buf()],
                remote_folders: vec![backup],
                ..Default::default()
            })
            .await
            .unwrap();

        let report = cycle.run(&state).await.unwrap();
        assert_eq!(report.uploaded, 1);
        assert_eq!(remote.uploads(), vec!["backup/a.txt".to_string()]);
        assert!(cycle.restore().is_none());
        assert!(!cycle.is_busy());
    }
}
