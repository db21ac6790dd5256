//! 本地与远程记录比较
//!
//! [`reconcile`] 是两组记录的纯函数，不做任何 IO。两侧按 `(relative_path, name)`
//! 建立索引，输出三个互不相交的集合，并按键排序，与输入顺序无关。

use crate::core::record::{FileRecord, RecordKey};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// 两侧都存在但内容不同的一对记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DifferingPair {
    pub local: FileRecord,
    pub remote: FileRecord,
}

impl DifferingPair {
    pub fn key(&self) -> RecordKey {
        self.local.key()
    }
}

/// 比较结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    pub only_in_local: Vec<FileRecord>,
    pub only_in_remote: Vec<FileRecord>,
    pub in_both_but_different: Vec<DifferingPair>,
    /// 格式错误而跳过的记录数
    pub malformed: usize,
    /// 远程目录记录数（不参与比较）
    pub ignored_folders: usize,
    /// 同一侧重复键的次数
    pub duplicates: usize,
}

/// 计划统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub only_in_local: usize,
    pub only_in_remote: usize,
    pub different: usize,
    pub local_bytes: u64,
    pub remote_bytes: u64,
}

impl SyncPlan {
    /// 两侧完全一致
    pub fn is_empty(&self) -> bool {
        self.only_in_local.is_empty()
            && self.only_in_remote.is_empty()
            && self.in_both_but_different.is_empty()
    }

    pub fn summary(&self) -> PlanSummary {
        let size = |r: &FileRecord| r.size.unwrap_or(0);
        PlanSummary {
            only_in_local: self.only_in_local.len(),
            only_in_remote: self.only_in_remote.len(),
            different: self.in_both_but_different.len(),
            local_bytes: self.only_in_local.iter().map(size).sum::<u64>()
                + self.in_both_but_different.iter().map(|p| size(&p.local)).sum::<u64>(),
            remote_bytes: self.only_in_remote.iter().map(size).sum::<u64>()
                + self.in_both_but_different.iter().map(|p| size(&p.remote)).sum::<u64>(),
        }
    }
}

/// 摘要比较：两侧都为空时不比较；只有一侧为空视为不同
fn digests_differ(a: &str, b: &str) -> bool {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => false,
        (true, false) | (false, true) => true,
        (false, false) => a != b,
    }
}

/// 两条同键记录是否需要同步
pub fn records_differ(local: &FileRecord, remote: &FileRecord) -> bool {
    if local.size != remote.size {
        debug!(
            "文件大小不同: {} (local={:?}, remote={:?})",
            local.key(),
            local.size,
            remote.size
        );
        return true;
    }
    if local.modified_at != remote.modified_at {
        debug!(
            "修改时间不同: {} (local={}, remote={})",
            local.key(),
            local.modified_at,
            remote.modified_at
        );
        return true;
    }
    digests_differ(&local.content_digest, &remote.content_digest)
}

/// 按键建立索引，跳过格式错误的记录和远程目录
fn index<'a>(
    records: &'a [FileRecord],
    side: &str,
    plan: &mut SyncPlan,
) -> BTreeMap<RecordKey, &'a FileRecord> {
    let mut map = BTreeMap::new();
    for record in records {
        if record.is_folder() {
            plan.ignored_folders += 1;
            continue;
        }
        if let Err(e) = record.validate() {
            debug!("跳过格式错误的{}记录 {:?}: {}", side, record.display_path(), e);
            plan.malformed += 1;
            continue;
        }
        if map.insert(record.key(), record).is_some() {
            warn!("{}存在重复的文件: {}", side, record.key());
            plan.duplicates += 1;
        }
    }
    map
}

/// 比较本地与远程记录
pub fn reconcile(local: &[FileRecord], remote: &[FileRecord]) -> SyncPlan {
    let mut plan = SyncPlan::default();
    let local_map = index(local, "本地", &mut plan);
    let mut remote_map = index(remote, "远程", &mut plan);

    // BTreeMap 按键有序，输出自然有序
    for (key, local_record) in local_map {
        match remote_map.remove(&key) {
            None => plan.only_in_local.push(local_record.clone()),
            Some(remote_record) => {
                if records_differ(local_record, remote_record) {
                    plan.in_both_but_different.push(DifferingPair {
                        local: local_record.clone(),
                        remote: remote_record.clone(),
                    });
                }
            }
        }
    }
    plan.only_in_remote = remote_map.into_values().cloned().collect();

    debug!(
        "比较完成: 仅本地 {}, 仅远程 {}, 不同 {}, 格式错误 {}, 目录 {}, 重复 {}",
        plan.only_in_local.len(),
        plan.only_in_remote.len(),
        plan.in_both_but_different.len(),
        plan.malformed,
        plan.ignored_folders,
        plan.duplicates
    );
    plan
}
