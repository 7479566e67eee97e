//! 批次运行模型
//!
//! 批次持有全部工作项、运行配置和聚合计数。只有批次协调器持有
//! `BatchRun` 的可变引用，worker 的结果都经由协调器的事件循环写入。

use crate::error::{AppError, AppResult, InvokeError, WorkListError};
use crate::models::checkpoint::Checkpoint;
use crate::models::work_item::{ItemStatus, WorkItem, WorkRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// 续跑时如何对待上次失败的文档
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResumePolicy {
    /// 失败的文档从头重试
    #[default]
    RetryFailed,
    /// 保持失败状态
    KeepFailed,
}

/// 批次运行配置
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// 同时处理的文档数量
    pub concurrency: usize,
    /// 每分钟请求上限（0 表示不限速）
    pub requests_per_minute: u32,
    /// 每个文档最多尝试的次数（包含第一次）
    pub max_attempts: u32,
    /// 每完成多少个文档写一次检查点
    pub checkpoint_interval: usize,
    /// 启动时是否从检查点续跑
    pub resume: bool,
    pub resume_policy: ResumePolicy,
    /// 重试退避的初始等待
    pub retry_base_delay: Duration,
    /// 重试退避的最大等待
    pub retry_max_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            requests_per_minute: 60,
            max_attempts: 3,
            checkpoint_interval: 10,
            resume: true,
            resume_policy: ResumePolicy::RetryFailed,
            retry_base_delay: Duration::from_secs(2),
            retry_max_delay: Duration::from_secs(30),
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.concurrency == 0 {
            return Err(AppError::invalid_config("concurrency", "必须大于 0"));
        }
        if self.max_attempts == 0 {
            return Err(AppError::invalid_config("max_attempts", "必须大于 0"));
        }
        if self.checkpoint_interval == 0 {
            return Err(AppError::invalid_config("checkpoint_interval", "必须大于 0"));
        }
        if self.retry_max_delay < self.retry_base_delay {
            return Err(AppError::invalid_config(
                "retry_max_delay",
                "不能小于 retry_base_delay",
            ));
        }
        Ok(())
    }
}

/// 批次状态机：Created → Running → {Completed, Aborted}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Created,
    Running,
    Completed,
    Aborted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Created => "created",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// 聚合计数，`in_progress` 计入 pending
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounters {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub pending: usize,
}

impl BatchCounters {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped + self.pending
    }

    fn bucket(&mut self, status: ItemStatus) -> &mut usize {
        match status {
            ItemStatus::Success => &mut self.succeeded,
            ItemStatus::Failed => &mut self.failed,
            ItemStatus::Skipped => &mut self.skipped,
            ItemStatus::Pending | ItemStatus::InProgress => &mut self.pending,
        }
    }

    fn shift(&mut self, from: ItemStatus, to: ItemStatus) {
        *self.bucket(from) -= 1;
        *self.bucket(to) += 1;
    }
}

/// 合并检查点的结果
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeSummary {
    /// 恢复为终态的文档
    pub restored: usize,
    /// 重新排队的失败文档
    pub requeued: usize,
    /// 检查点中存在但清单中没有的文档
    pub unknown: usize,
}

/// 一次批次运行
#[derive(Debug, Clone)]
pub struct BatchRun {
    pub id: String,
    pub config: BatchConfig,
    pub state: RunState,
    pub created_at: DateTime<Utc>,
    /// 本次执行开始的时间
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    items: Vec<WorkItem>,
    index: HashMap<String, usize>,
    counters: BatchCounters,
}

impl BatchRun {
    /// 从工作清单创建批次，文档标识必须唯一
    pub fn new(
        id: impl Into<String>,
        records: Vec<WorkRecord>,
        config: BatchConfig,
    ) -> AppResult<Self> {
        let items = records
            .into_iter()
            .map(WorkItem::from_record)
            .collect::<Vec<_>>();
        Self::with_items(id.into(), items, config, Utc::now())
    }

    /// 直接从检查点重建批次（不需要工作清单）
    pub fn from_checkpoint(checkpoint: &Checkpoint, config: BatchConfig) -> AppResult<Self> {
        let mut run = Self::with_items(
            checkpoint.batch_id.clone(),
            checkpoint.items.clone(),
            config,
            checkpoint.created_at,
        )?;
        run.state = checkpoint.state;
        run.completed_at = checkpoint.completed_at;
        Ok(run)
    }

    fn with_items(
        id: String,
        items: Vec<WorkItem>,
        config: BatchConfig,
        created_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        let mut index = HashMap::with_capacity(items.len());
        let mut counters = BatchCounters::default();
        for (i, item) in items.iter().enumerate() {
            if index.insert(item.id.clone(), i).is_some() {
                return Err(WorkListError::DuplicateId(item.id.clone()).into());
            }
            *counters.bucket(item.status) += 1;
        }

        Ok(Self {
            id,
            config,
            state: RunState::Created,
            created_at,
            started_at: None,
            completed_at: None,
            items,
            index,
            counters,
        })
    }

    /// 合并上一次运行的检查点
    ///
    /// - `success` / `skipped` 保持终态，不会被再次处理
    /// - `failed` 按 [`ResumePolicy`] 重新排队或保持失败
    /// - `in_progress` 回到待处理
    /// - 清单里已标记为终态的文档不会被检查点改回未完成
    pub fn merge_checkpoint(&mut self, checkpoint: &Checkpoint) -> MergeSummary {
        let mut summary = MergeSummary::default();
        let policy = self.config.resume_policy;
        self.created_at = checkpoint.created_at;

        for prior in &checkpoint.items {
            let Some(&i) = self.index.get(&prior.id) else {
                warn!("检查点中的文档 {} 不在当前清单中，忽略", prior.id);
                summary.unknown += 1;
                continue;
            };

            let listed = self.items[i].status;
            let done =
                |status: ItemStatus| matches!(status, ItemStatus::Success | ItemStatus::Skipped);
            if done(listed) && !done(prior.status) {
                debug!(
                    "文档 {} 在清单中已是 {}，忽略检查点中的 {}",
                    prior.id, listed, prior.status
                );
                summary.restored += 1;
                continue;
            }

            let mut restored = prior.clone();
            restored.input = self.items[i].input.clone();
            match prior.status {
                ItemStatus::Success | ItemStatus::Skipped => summary.restored += 1,
                ItemStatus::Failed => match policy {
                    ResumePolicy::RetryFailed => {
                        restored.status = ItemStatus::Pending;
                        restored.attempt_count = 0;
                        summary.requeued += 1;
                    }
                    ResumePolicy::KeepFailed => summary.restored += 1,
                },
                ItemStatus::InProgress => restored.status = ItemStatus::Pending,
                ItemStatus::Pending => {}
            }

            let old = self.items[i].status;
            self.counters.shift(old, restored.status);
            self.items[i] = restored;
        }

        summary
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn item(&self, index: usize) -> &WorkItem {
        &self.items[index]
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn counters(&self) -> BatchCounters {
        self.counters
    }

    /// 需要分发的文档下标（保持清单顺序）
    pub fn pending_indices(&self) -> Vec<usize> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.needs_processing())
            .map(|(i, _)| i)
            .collect()
    }

    /// 所有文档都已到达终态
    pub fn all_terminal(&self) -> bool {
        self.counters.pending == 0
    }

    pub fn start(&mut self) {
        self.state = RunState::Running;
        self.started_at = Some(Utc::now());
        self.completed_at = None;
    }

    /// 结束运行：还有待处理文档就是 Aborted
    pub fn finish(&mut self) {
        self.state = if self.all_terminal() {
            RunState::Completed
        } else {
            RunState::Aborted
        };
        self.completed_at = Some(Utc::now());
    }

    fn set_status(&mut self, index: usize, status: ItemStatus) {
        let old = self.items[index].status;
        self.counters.shift(old, status);
        self.items[index].status = status;
    }

    pub fn mark_dispatched(&mut self, index: usize, at: DateTime<Utc>) {
        self.set_status(index, ItemStatus::InProgress);
        self.items[index].mark_in_progress(at);
    }

    pub fn record_success(
        &mut self,
        index: usize,
        payload: JsonValue,
        attempts: u32,
        finished_at: DateTime<Utc>,
    ) {
        self.set_status(index, ItemStatus::Success);
        let item = &mut self.items[index];
        item.attempt_count = attempts;
        item.result = Some(payload);
        item.last_error = None;
        item.last_error_kind = None;
        item.finished_at = Some(finished_at);
    }

    pub fn record_failure(
        &mut self,
        index: usize,
        error: &InvokeError,
        attempts: u32,
        finished_at: DateTime<Utc>,
    ) {
        self.set_status(index, ItemStatus::Failed);
        let item = &mut self.items[index];
        item.attempt_count = attempts;
        item.last_error = Some(error.message.clone());
        item.last_error_kind = Some(error.kind);
        item.finished_at = Some(finished_at);
    }

    pub fn record_skipped(&mut self, index: usize, reason: &str, finished_at: DateTime<Utc>) {
        self.set_status(index, ItemStatus::Skipped);
        let item = &mut self.items[index];
        item.last_error = Some(reason.to_string());
        item.last_error_kind = None;
        item.finished_at = Some(finished_at);
    }

    /// 重试等待中被取消：回到待处理，保留已尝试次数和最后一次错误
    pub fn record_interrupted(&mut self, index: usize, attempts: u32, error: Option<&InvokeError>) {
        self.set_status(index, ItemStatus::Pending);
        let item = &mut self.items[index];
        item.reset_to_pending();
        item.attempt_count = attempts;
        if let Some(error) = error {
            item.last_error = Some(error.message.clone());
            item.last_error_kind = Some(error.kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::work_item::InputRef;

    fn records(n: usize) -> Vec<WorkRecord> {
        (0..n)
            .map(|i| WorkRecord::new(format!("doc-{i}"), InputRef::new(format!("doc-{i}.pdf"))))
            .collect()
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let mut list = records(2);
        list.push(list[0].clone());
        let err = BatchRun::new("b", list, BatchConfig::default()).unwrap_err();
        assert!(matches!(err, AppError::WorkList(WorkListError::DuplicateId(id)) if id == "doc-0"));
    }

    #[test]
    fn test_counters_follow_transitions() {
        let mut run = BatchRun::new("b", records(4), BatchConfig::default()).unwrap();
        assert_eq!(run.counters().pending, 4);

        let now = Utc::now();
        run.mark_dispatched(0, now);
        run.record_success(0, serde_json::json!({"ok": true}), 1, now);
        run.mark_dispatched(1, now);
        run.record_failure(1, &InvokeError::permanent("bad input"), 1, now);
        run.record_skipped(2, "junk", now);

        let c = run.counters();
        assert_eq!((c.succeeded, c.failed, c.skipped, c.pending), (1, 1, 1, 1));
        assert_eq!(c.total(), 4);
        assert_eq!(run.pending_indices(), vec![3]);
        assert_eq!(run.item(1).last_error_kind, Some(ErrorKind::Permanent));
    }

    #[test]
    fn test_finish_marks_aborted_when_items_remain() {
        let mut run = BatchRun::new("b", records(2), BatchConfig::default()).unwrap();
        run.start();
        run.record_success(0, JsonValue::Null, 1, Utc::now());
        run.finish();
        assert_eq!(run.state, RunState::Aborted);

        run.record_success(1, JsonValue::Null, 1, Utc::now());
        run.finish();
        assert_eq!(run.state, RunState::Completed);
    }

    fn checkpoint_with_statuses(statuses: &[ItemStatus]) -> Checkpoint {
        let mut run = BatchRun::new("b", records(statuses.len()), BatchConfig::default()).unwrap();
        let now = Utc::now();
        for (i, status) in statuses.iter().enumerate() {
            match status {
                ItemStatus::Success => run.record_success(i, JsonValue::Null, 1, now),
                ItemStatus::Failed => {
                    run.record_failure(i, &InvokeError::transient("timeout"), 3, now)
                }
                ItemStatus::Skipped => run.record_skipped(i, "junk", now),
                ItemStatus::InProgress => run.mark_dispatched(i, now),
                ItemStatus::Pending => {}
            }
        }
        Checkpoint::snapshot(&run)
    }

    #[test]
    fn test_merge_requeues_failed_by_default() {
        let checkpoint = checkpoint_with_statuses(&[
            ItemStatus::Success,
            ItemStatus::Failed,
            ItemStatus::InProgress,
            ItemStatus::Skipped,
        ]);
        let mut run = BatchRun::new("b", records(4), BatchConfig::default()).unwrap();
        let summary = run.merge_checkpoint(&checkpoint);

        assert_eq!(summary.restored, 2);
        assert_eq!(summary.requeued, 1);
        assert_eq!(run.pending_indices(), vec![1, 2]);
        assert_eq!(run.item(1).attempt_count, 0);
        assert_eq!(run.counters().total(), 4);
    }

    #[test]
    fn test_merge_keeps_terminal_status_from_work_list() {
        let checkpoint = checkpoint_with_statuses(&[
            ItemStatus::Pending,
            ItemStatus::InProgress,
            ItemStatus::Failed,
            ItemStatus::Pending,
        ]);
        let mut records = records(4);
        records[0] = records[0].clone().with_status(ItemStatus::Success);
        records[1] = records[1].clone().with_status(ItemStatus::Skipped);
        records[2] = records[2].clone().with_status(ItemStatus::Success);
        let mut run = BatchRun::new("b", records, BatchConfig::default()).unwrap();
        let summary = run.merge_checkpoint(&checkpoint);

        assert_eq!(summary.restored, 3);
        assert_eq!(summary.requeued, 0);
        assert_eq!(run.item(0).status, ItemStatus::Success);
        assert_eq!(run.item(1).status, ItemStatus::Skipped);
        assert_eq!(run.item(2).status, ItemStatus::Success);
        assert_eq!(run.pending_indices(), vec![3]);
        let c = run.counters();
        assert_eq!((c.succeeded, c.failed, c.skipped, c.pending), (2, 0, 1, 1));
    }

    #[test]
    fn test_merge_keep_failed_policy() {
        let checkpoint = checkpoint_with_statuses(&[ItemStatus::Success, ItemStatus::Failed]);
        let config = BatchConfig {
            resume_policy: ResumePolicy::KeepFailed,
            ..BatchConfig::default()
        };
        let mut run = BatchRun::new("b", records(2), config).unwrap();
        run.merge_checkpoint(&checkpoint);

        assert!(run.all_terminal());
        assert_eq!(run.counters().failed, 1);
        assert_eq!(run.item(1).attempt_count, 3);
    }

    #[test]
    fn test_merge_ignores_unknown_items() {
        let checkpoint = checkpoint_with_statuses(&[ItemStatus::Success, ItemStatus::Success]);
        let mut run = BatchRun::new("b", records(1), BatchConfig::default()).unwrap();
        let summary = run.merge_checkpoint(&checkpoint);
        assert_eq!(summary.unknown, 1);
        assert_eq!(run.len(), 1);
        assert_eq!(run.counters().succeeded, 1);
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = BatchConfig {
            concurrency: 0,
            ..BatchConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(BatchConfig::default().validate().is_ok());
    }
}
