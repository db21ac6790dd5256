//! 同步执行器
//!
//! 根据比较结果、同步方向和冲突策略执行上传、下载和删除，最后清理变空的目录。
//! 传输阶段并行执行（受 `max_concurrent_transfers` 限制），删除阶段在全部传输结束后进行。

use crate::core::comparator::SyncPlan;
use crate::core::pruner::{
    local_chain, remote_chain, LocalPruneTarget, PruneOutcome, Pruner, RemotePruneTarget,
};
use crate::core::record::{
    join_relative, parse_timestamp, EmbeddedMetadata, FileRecord, Location, SEPARATOR,
};
use crate::error::{ErrorClass, RemoteError, TransferError};
use crate::storage::{LocalFs, RemoteStorage};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering as CmpOrdering;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

pub const SKIP_CANCELLED: &str = "cancelled";
pub const SKIP_POLICY_UNSUPPORTED: &str = "collision policy not supported";
pub const SKIP_AMBIGUOUS: &str = "ambiguous modification time";
pub const SKIP_UNREADABLE: &str = "local copy unreadable";

/// 同步方向
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    #[serde(alias = "local_to_fj")]
    LocalToRemote,
    #[serde(alias = "fj_to_local")]
    RemoteToLocal,
    Both,
}

/// 两侧都存在且不同的文件如何处理
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    #[default]
    Overwrite,
    RenameOld,
    RenameNew,
}

/// 执行器配置
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// 最大并发传输数
    pub max_concurrent_transfers: usize,
    /// 最大重试次数
    pub max_retries: u32,
    /// 重试基础延迟（毫秒）
    pub retry_base_delay_ms: u64,
    /// 远程删除是否跳过回收站
    pub permanent_delete: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_transfers: 4,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            permanent_delete: false,
        }
    }
}

/// 传输目标位置
#[derive(Debug, Clone, Default)]
pub struct SyncTargets {
    /// 下载写入的本地根目录
    pub local_root: Option<PathBuf>,
    /// 上传目标目录的可读路径（相对网盘根目录），空串为网盘根目录
    pub remote_base: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Upload,
    Download,
    DeleteRemote,
    DeleteLocal,
    PruneLocalDir,
    PruneRemoteDir,
    /// 两侧都存在但无法决定传输方向，只会以跳过出现
    Compare,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Skipped { reason: String },
    Failed { class: ErrorClass, message: String },
}

impl Outcome {
    fn skipped(reason: &str) -> Self {
        Outcome::Skipped {
            reason: reason.to_string(),
        }
    }

    fn failed(err: &TransferError) -> Self {
        Outcome::Failed {
            class: err.class(),
            message: err.to_string(),
        }
    }
}

/// 报告中的一项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportItem {
    pub key: String,
    pub operation: Operation,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// 同步报告
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub start_time: i64,
    pub end_time: i64,
    pub duration_ms: u64,
    pub direction: Direction,
    pub uploaded: u32,
    pub downloaded: u32,
    pub deleted: u32,
    pub pruned: u32,
    pub skipped: u32,
    pub failed: u32,
    pub bytes_transferred: u64,
    pub malformed: usize,
    pub duplicates: usize,
    pub ignored_folders: usize,
    pub cancelled: bool,
    pub items: Vec<ReportItem>,
}

impl SyncReport {
    fn new(direction: Direction, plan: &SyncPlan) -> Self {
        Self {
            start_time: chrono::Utc::now().timestamp(),
            end_time: 0,
            duration_ms: 0,
            direction,
            uploaded: 0,
            downloaded: 0,
            deleted: 0,
            pruned: 0,
            skipped: 0,
            failed: 0,
            bytes_transferred: 0,
            malformed: plan.malformed,
            duplicates: plan.duplicates,
            ignored_folders: plan.ignored_folders,
            cancelled: false,
            items: Vec::new(),
        }
    }

    fn push(&mut self, item: ReportItem) {
        match (&item.outcome, item.operation) {
            (Outcome::Succeeded, Operation::Upload) => self.uploaded += 1,
            (Outcome::Succeeded, Operation::Download) => self.downloaded += 1,
            (Outcome::Succeeded, Operation::DeleteRemote | Operation::DeleteLocal) => {
                self.deleted += 1
            }
            (Outcome::Succeeded, Operation::PruneLocalDir | Operation::PruneRemoteDir) => {
                self.pruned += 1
            }
            (Outcome::Succeeded, Operation::Compare) => {}
            (Outcome::Skipped { .. }, _) => self.skipped += 1,
            (Outcome::Failed { .. }, _) => self.failed += 1,
        }
        self.items.push(item);
    }

    pub fn failures(&self) -> impl Iterator<Item = &ReportItem> {
        self.items
            .iter()
            .filter(|i| matches!(i.outcome, Outcome::Failed { .. }))
    }

    /// 没有失败项
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// 某个键上执行的操作及结果
    pub fn item(&self, key: &str, operation: Operation) -> Option<&ReportItem> {
        self.items
            .iter()
            .find(|i| i.key == key && i.operation == operation)
    }
}

/// 一次传输
#[derive(Debug, Clone)]
enum Transfer {
    Upload {
        record: FileRecord,
        target: String,
        /// 上传成功后需要删除的旧远程条目
        replaces: Option<FileRecord>,
    },
    Download {
        record: FileRecord,
        target: PathBuf,
    },
}

impl Transfer {
    fn key(&self) -> String {
        match self {
            Transfer::Upload { record, .. } | Transfer::Download { record, .. } => {
                record.display_path()
            }
        }
    }

    fn operation(&self) -> Operation {
        match self {
            Transfer::Upload { .. } => Operation::Upload,
            Transfer::Download { .. } => Operation::Download,
        }
    }
}

#[derive(Debug, Clone)]
enum Deletion {
    Remote(FileRecord),
    Local(FileRecord),
}

impl Deletion {
    fn key(&self) -> String {
        match self {
            Deletion::Remote(r) | Deletion::Local(r) => r.display_path(),
        }
    }

    fn operation(&self) -> Operation {
        match self {
            Deletion::Remote(_) => Operation::DeleteRemote,
            Deletion::Local(_) => Operation::DeleteLocal,
        }
    }
}

/// 由比较结果推导出的全部操作
#[derive(Debug, Default)]
struct Planned {
    transfers: Vec<Transfer>,
    deletions: Vec<Deletion>,
    /// 不执行的项（策略跳过、目标缺失）
    settled: Vec<ReportItem>,
}

/// 重试参数
#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    max_retries: u32,
    base_delay_ms: u64,
}

/// 带重试的操作执行，指数退避；不可重试的错误立即返回
async fn with_retry<T, F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> Result<T, TransferError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransferError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_retries && e.is_retryable() => {
                let delay = policy
                    .base_delay_ms
                    .saturating_mul(2_u64.saturating_pow(attempt));
                warn!(
                    "操作失败，{}ms 后重试 ({}/{}): {}: {}",
                    delay,
                    attempt + 1,
                    policy.max_retries,
                    what,
                    e
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
            Err(e) => {
                error!("操作最终失败 (已重试{}次): {}: {}", attempt, what, e);
                return Err(e);
            }
        }
    }
}

fn missing_location(record: &FileRecord) -> TransferError {
    TransferError::Remote(RemoteError::Protocol(format!(
        "记录缺少位置信息: {}",
        record.display_path()
    )))
}

/// 本地根目录下与键对应的路径
fn local_target(root: &Path, record: &FileRecord) -> PathBuf {
    record
        .relative_path
        .split(SEPARATOR)
        .filter(|s| !s.is_empty())
        .fold(root.to_path_buf(), |path, seg| path.join(seg))
        .join(&record.name)
}

/// 时间较新的一侧；无法比较时返回 None
fn newer_side(local: &FileRecord, remote: &FileRecord) -> Option<CmpOrdering> {
    let l = parse_timestamp(&local.modified_at)?;
    let r = parse_timestamp(&remote.modified_at)?;
    match l.cmp(&r) {
        CmpOrdering::Equal => None,
        ord => Some(ord),
    }
}

/// 同步执行器
pub struct SyncExecutor {
    remote: Arc<dyn RemoteStorage>,
    local: Arc<dyn LocalFs>,
    config: ExecutorConfig,
    targets: SyncTargets,
    /// 扫描时无法读取的本地相对路径，其下的条目不下载也不删除远程副本
    unreadable: Vec<String>,
    cancelled: Arc<AtomicBool>,
}

impl SyncExecutor {
    pub fn new(
        remote: Arc<dyn RemoteStorage>,
        local: Arc<dyn LocalFs>,
        config: ExecutorConfig,
        targets: SyncTargets,
    ) -> Self {
        Self {
            remote,
            local,
            config,
            targets,
            unreadable: Vec::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_unreadable(mut self, unreadable: Vec<String>) -> Self {
        self.unreadable = unreadable;
        self
    }

    /// 使用外部的取消标志
    pub fn with_cancel(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    /// 取消同步
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// 检查是否已取消
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.config.max_retries,
            base_delay_ms: self.config.retry_base_delay_ms,
        }
    }

    /// 本地对应位置在扫描时无法读取，本地是否存在该文件未知
    fn is_unreadable(&self, record: &FileRecord) -> bool {
        let key = record.display_path();
        self.unreadable.iter().any(|prefix| {
            prefix.is_empty()
                || key == *prefix
                || key
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with(SEPARATOR))
        })
    }

    fn upload(&self, record: &FileRecord, replaces: Option<FileRecord>) -> Transfer {
        Transfer::Upload {
            target: join_relative(&self.targets.remote_base, &record.display_path()),
            record: record.clone(),
            replaces,
        }
    }

    /// 下载到本地已有文件的位置，否则放到本地根目录下
    fn download(&self, record: &FileRecord, existing: Option<&Path>) -> Result<Transfer, ReportItem> {
        let target = match (existing, &self.targets.local_root) {
            (Some(path), _) => path.to_path_buf(),
            (None, Some(root)) => local_target(root, record),
            (None, None) => {
                let err = TransferError::Local(io::Error::new(
                    io::ErrorKind::NotFound,
                    "没有选择本地目录，无法下载",
                ));
                return Err(ReportItem {
                    key: record.display_path(),
                    operation: Operation::Download,
                    outcome: Outcome::failed(&err),
                });
            }
        };
        Ok(Transfer::Download {
            record: record.clone(),
            target,
        })
    }

    /// 把比较结果翻译为具体操作
    fn plan_operations(
        &self,
        plan: &SyncPlan,
        direction: Direction,
        policy: CollisionPolicy,
        delete_at_destination: bool,
    ) -> Planned {
        let mut planned = Planned::default();
        let push_download = |planned: &mut Planned, result: Result<Transfer, ReportItem>| {
            match result {
                Ok(t) => planned.transfers.push(t),
                Err(item) => planned.settled.push(item),
            }
        };
        let keep_unreadable = |planned: &mut Planned, record: &FileRecord, operation| {
            debug!("本地副本无法读取，跳过: {}", record.display_path());
            planned.settled.push(ReportItem {
                key: record.display_path(),
                operation,
                outcome: Outcome::skipped(SKIP_UNREADABLE),
            });
        };

        let uploads_local_only = matches!(direction, Direction::LocalToRemote | Direction::Both);
        let downloads_remote_only = matches!(direction, Direction::RemoteToLocal | Direction::Both);

        if uploads_local_only {
            for record in &plan.only_in_local {
                planned.transfers.push(self.upload(record, None));
            }
        }
        if downloads_remote_only {
            for record in &plan.only_in_remote {
                if self.is_unreadable(record) {
                    keep_unreadable(&mut planned, record, Operation::Download);
                    continue;
                }
                push_download(&mut planned, self.download(record, None));
            }
        }

        for pair in &plan.in_both_but_different {
            let operation = match direction {
                Direction::LocalToRemote => Some(Operation::Upload),
                Direction::RemoteToLocal => Some(Operation::Download),
                Direction::Both => match newer_side(&pair.local, &pair.remote) {
                    Some(CmpOrdering::Greater) => Some(Operation::Upload),
                    Some(_) => Some(Operation::Download),
                    None => None,
                },
            };

            let key = pair.local.display_path();
            let Some(operation) = operation else {
                debug!("修改时间无法判断新旧，跳过: {}", key);
                planned.settled.push(ReportItem {
                    key,
                    operation: Operation::Compare,
                    outcome: Outcome::skipped(SKIP_AMBIGUOUS),
                });
                continue;
            };

            if policy != CollisionPolicy::Overwrite {
                debug!("冲突策略 {:?} 不支持，跳过: {}", policy, key);
                planned.settled.push(ReportItem {
                    key,
                    operation,
                    outcome: Outcome::skipped(SKIP_POLICY_UNSUPPORTED),
                });
                continue;
            }

            match operation {
                Operation::Upload => {
                    // 双向模式从不删除
                    let replaces = (direction == Direction::LocalToRemote && delete_at_destination)
                        .then(|| pair.remote.clone());
                    planned.transfers.push(self.upload(&pair.local, replaces));
                }
                _ if self.is_unreadable(&pair.remote) => {
                    keep_unreadable(&mut planned, &pair.remote, Operation::Download)
                }
                _ => push_download(&mut planned, self.download(&pair.remote, pair.local.local_path())),
            }
        }

        if delete_at_destination {
            match direction {
                Direction::LocalToRemote => {
                    for record in &plan.only_in_remote {
                        if self.is_unreadable(record) {
                            keep_unreadable(&mut planned, record, Operation::DeleteRemote);
                        } else {
                            planned.deletions.push(Deletion::Remote(record.clone()));
                        }
                    }
                }
                Direction::RemoteToLocal => planned
                    .deletions
                    .extend(plan.only_in_local.iter().cloned().map(Deletion::Local)),
                Direction::Both => {}
            }
        }

        planned
    }

    /// 执行同步计划
    pub async fn execute(
        &self,
        plan: &SyncPlan,
        direction: Direction,
        policy: CollisionPolicy,
        delete_at_destination: bool,
    ) -> SyncReport {
        let started = Instant::now();
        let mut report = SyncReport::new(direction, plan);
        let planned = self.plan_operations(plan, direction, policy, delete_at_destination);

        info!(
            "开始执行同步: 方向 {:?}, 传输 {}, 删除 {}, 跳过 {}",
            direction,
            planned.transfers.len(),
            planned.deletions.len(),
            planned.settled.len()
        );

        for item in planned.settled {
            report.push(item);
        }

        let replaced = self.run_transfers(planned.transfers, &mut report).await;

        // 替换上传成功之后才删除旧条目
        let mut deletions: Vec<Deletion> = replaced.into_iter().map(Deletion::Remote).collect();
        deletions.extend(planned.deletions);
        let deleted = self.run_deletions(deletions, &mut report).await;

        if !deleted.is_empty() && !self.is_cancelled() {
            self.prune(&deleted, &mut report).await;
        }

        report.cancelled = self.is_cancelled();
        report.end_time = chrono::Utc::now().timestamp();
        report.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            "同步完成: 上传 {}, 下载 {}, 删除 {}, 清理目录 {}, 跳过 {}, 失败 {}",
            report.uploaded,
            report.downloaded,
            report.deleted,
            report.pruned,
            report.skipped,
            report.failed
        );
        report
    }

    /// 并行执行传输，返回上传成功后需要删除的旧远程条目
    async fn run_transfers(
        &self,
        transfers: Vec<Transfer>,
        report: &mut SyncReport,
    ) -> Vec<FileRecord> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_transfers.max(1)));
        let mut handles = Vec::new();
        let mut pending = transfers.into_iter();

        for transfer in pending.by_ref() {
            if self.is_cancelled() {
                report.push(ReportItem {
                    key: transfer.key(),
                    operation: transfer.operation(),
                    outcome: Outcome::skipped(SKIP_CANCELLED),
                });
                break;
            }

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("传输队列已关闭: {}", e);
                    break;
                }
            };
            let remote = self.remote.clone();
            let local = self.local.clone();
            let cancelled = self.cancelled.clone();
            let retry = self.retry_policy();
            let key = transfer.key();
            let operation = transfer.operation();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                // 等待许可期间可能已被取消
                if cancelled.load(Ordering::SeqCst) {
                    return (Outcome::skipped(SKIP_CANCELLED), 0, None);
                }
                match Self::run_transfer(remote.as_ref(), local.as_ref(), &transfer, retry).await {
                    Ok(bytes) => {
                        let replaced = match transfer {
                            Transfer::Upload { replaces, .. } => replaces,
                            Transfer::Download { .. } => None,
                        };
                        (Outcome::Succeeded, bytes, replaced)
                    }
                    Err(e) => (Outcome::failed(&e), 0, None),
                }
            });
            handles.push((key, operation, handle));
        }

        for transfer in pending {
            report.push(ReportItem {
                key: transfer.key(),
                operation: transfer.operation(),
                outcome: Outcome::skipped(SKIP_CANCELLED),
            });
        }

        let mut replaced = Vec::new();
        for (key, operation, handle) in handles {
            let outcome = match handle.await {
                Ok((outcome, bytes, old)) => {
                    report.bytes_transferred += bytes;
                    replaced.extend(old);
                    outcome
                }
                Err(e) => Outcome::failed(&TransferError::Local(io::Error::other(e.to_string()))),
            };
            report.push(ReportItem {
                key,
                operation,
                outcome,
            });
        }
        replaced
    }

    /// 执行单个传输，返回传输字节数
    async fn run_transfer(
        remote: &dyn RemoteStorage,
        local: &dyn LocalFs,
        transfer: &Transfer,
        retry: RetryPolicy,
    ) -> Result<u64, TransferError> {
        match transfer {
            Transfer::Upload { record, target, .. } => {
                let source = record.local_path().ok_or_else(|| missing_location(record))?;
                let target = target.as_str();
                debug!("上传: {:?} -> {}", source, target);

                let id = with_retry(retry, target, || async move {
                    remote
                        .upload_file(source, target)
                        .await
                        .map_err(TransferError::from)
                })
                .await?;

                let metadata = EmbeddedMetadata::from_record(record).to_json();
                let metadata = metadata.as_str();
                with_retry(retry, target, || async move {
                    remote
                        .set_metadata(id, metadata)
                        .await
                        .map_err(TransferError::from)
                })
                .await?;

                debug!("  上传完成: {} -> {}", target, id);
                Ok(record.size.unwrap_or(0))
            }
            Transfer::Download { record, target } => {
                let id = record.remote_id().ok_or_else(|| missing_location(record))?;
                let what = record.display_path();
                debug!("下载: {} -> {:?}", id, target);

                let data = with_retry(retry, &what, || async move {
                    remote.download_file(id).await.map_err(TransferError::from)
                })
                .await?;
                let bytes = data.len() as u64;

                let modified = parse_timestamp(&record.modified_at).map(SystemTime::from);
                let target = target.as_path();
                with_retry(retry, &what, || {
                    let data = data.clone();
                    async move {
                        local
                            .write_file(target, data, modified)
                            .await
                            .map_err(TransferError::from)
                    }
                })
                .await?;

                debug!("  写入完成: {:?} ({}字节)", target, bytes);
                Ok(bytes)
            }
        }
    }

    /// 依次执行删除，返回删除成功的记录
    async fn run_deletions(
        &self,
        deletions: Vec<Deletion>,
        report: &mut SyncReport,
    ) -> Vec<Deletion> {
        let retry = self.retry_policy();
        let permanent = self.config.permanent_delete;
        let mut deleted = Vec::new();

        for deletion in deletions {
            let key = deletion.key();
            let operation = deletion.operation();
            if self.is_cancelled() {
                report.push(ReportItem {
                    key,
                    operation,
                    outcome: Outcome::skipped(SKIP_CANCELLED),
                });
                continue;
            }

            let result = match &deletion {
                Deletion::Remote(record) => match record.remote_id() {
                    Some(id) => {
                        let remote = self.remote.as_ref();
                        with_retry(retry, &key, || async move {
                            match remote.delete_entries(&[id], permanent).await {
                                // 已经不存在
                                Err(e) if e.is_not_found() => Ok(()),
                                other => other.map_err(TransferError::from),
                            }
                        })
                        .await
                    }
                    None => Err(missing_location(record)),
                },
                Deletion::Local(record) => match record.local_path() {
                    Some(path) => {
                        let local = self.local.as_ref();
                        with_retry(retry, &key, || async move {
                            local.remove(path).await.map_err(TransferError::from)
                        })
                        .await
                    }
                    None => Err(missing_location(record)),
                },
            };

            let outcome = match result {
                Ok(()) => {
                    debug!("已删除: {} ({:?})", key, operation);
                    deleted.push(deletion);
                    Outcome::Succeeded
                }
                Err(e) => Outcome::failed(&e),
            };
            report.push(ReportItem {
                key,
                operation,
                outcome,
            });
        }
        deleted
    }

    /// 清理删除后变空的目录
    async fn prune(&self, deleted: &[Deletion], report: &mut SyncReport) {
        let mut local_pruner = Pruner::new(LocalPruneTarget::new(self.local.as_ref()));
        let mut local_outcome = PruneOutcome::default();
        let mut remote_pruner = Pruner::new(RemotePruneTarget::new(
            self.remote.as_ref(),
            self.config.permanent_delete,
        ));
        let mut remote_outcome = PruneOutcome::default();

        for deletion in deleted {
            match deletion {
                Deletion::Local(record) => {
                    if let Location::Local { path, root } = &record.location {
                        local_pruner
                            .prune_chain(&local_chain(path, root), &mut local_outcome)
                            .await;
                    }
                }
                Deletion::Remote(record) => {
                    if let Location::Remote { ancestors, .. } = &record.location {
                        remote_pruner
                            .prune_chain(&remote_chain(ancestors), &mut remote_outcome)
                            .await;
                    }
                }
            }
        }

        for dir in local_outcome.removed {
            report.push(ReportItem {
                key: dir.display().to_string(),
                operation: Operation::PruneLocalDir,
                outcome: Outcome::Succeeded,
            });
        }
        for (dir, e) in local_outcome.failed {
            report.push(ReportItem {
                key: dir.display().to_string(),
                operation: Operation::PruneLocalDir,
                outcome: Outcome::failed(&e),
            });
        }
        for id in remote_outcome.removed {
            report.push(ReportItem {
                key: id.to_string(),
                operation: Operation::PruneRemoteDir,
                outcome: Outcome::Succeeded,
            });
        }
        for (id, e) in remote_outcome.failed {
            report.push(ReportItem {
                key: id.to_string(),
                operation: Operation::PruneRemoteDir,
                outcome: Outcome::failed(&e),
            });
        }
    }
}
