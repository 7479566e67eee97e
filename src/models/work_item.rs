//! 工作项模型
//!
//! 一个工作项对应一份待处理的扫描文档

use crate::error::ErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::path::PathBuf;

/// 工作项状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// 等待处理
    #[default]
    Pending,
    /// 已分配给某个 worker
    InProgress,
    /// 处理成功
    Success,
    /// 处理失败
    Failed,
    /// 跳过
    Skipped,
}

impl ItemStatus {
    /// 是否为终态
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ItemStatus::Success | ItemStatus::Failed | ItemStatus::Skipped
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::InProgress => "in_progress",
            ItemStatus::Success => "success",
            ItemStatus::Failed => "failed",
            ItemStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 输入引用：文档在磁盘上的位置和基本属性
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InputRef {
    pub path: PathBuf,
    #[serde(default)]
    pub byte_size: Option<u64>,
    #[serde(default)]
    pub content_type: Option<String>,
}

impl InputRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            byte_size: None,
            content_type: None,
        }
    }
}

/// 上游清单中的一条记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkRecord {
    pub id: String,
    pub input: InputRef,
    #[serde(default)]
    pub initial_status: ItemStatus,
}

impl WorkRecord {
    pub fn new(id: impl Into<String>, input: InputRef) -> Self {
        Self {
            id: id.into(),
            input,
            initial_status: ItemStatus::Pending,
        }
    }

    pub fn with_status(mut self, status: ItemStatus) -> Self {
        self.initial_status = status;
        self
    }
}

/// 工作项
///
/// 只有批次协调器会修改它；worker 拿到的是克隆，处理完后返回结果。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub input: InputRef,
    pub status: ItemStatus,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub last_error_kind: Option<ErrorKind>,
    pub result: Option<JsonValue>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkItem {
    pub fn new(id: impl Into<String>, input: InputRef) -> Self {
        Self {
            id: id.into(),
            input,
            status: ItemStatus::Pending,
            attempt_count: 0,
            last_error: None,
            last_error_kind: None,
            result: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// 从上游记录创建
    ///
    /// `in_progress` 和 `failed` 在新的运行中都视为待处理。
    pub fn from_record(record: WorkRecord) -> Self {
        let mut item = Self::new(record.id, record.input);
        item.status = match record.initial_status {
            ItemStatus::Success => ItemStatus::Success,
            ItemStatus::Skipped => ItemStatus::Skipped,
            _ => ItemStatus::Pending,
        };
        item
    }

    /// 是否需要分发给 worker
    pub fn needs_processing(&self) -> bool {
        matches!(self.status, ItemStatus::Pending | ItemStatus::InProgress)
    }

    /// 标记为已分配
    pub fn mark_in_progress(&mut self, at: DateTime<Utc>) {
        self.status = ItemStatus::InProgress;
        self.started_at = Some(at);
        self.finished_at = None;
    }

    /// 回到待处理状态，保留上一次的错误信息
    pub fn reset_to_pending(&mut self) {
        self.status = ItemStatus::Pending;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_record_keeps_only_terminal_initial_statuses() {
        let input = InputRef::new("a.pdf");
        let cases = [
            (ItemStatus::Pending, ItemStatus::Pending),
            (ItemStatus::InProgress, ItemStatus::Pending),
            (ItemStatus::Failed, ItemStatus::Pending),
            (ItemStatus::Success, ItemStatus::Success),
            (ItemStatus::Skipped, ItemStatus::Skipped),
        ];
        for (initial, expected) in cases {
            let item = WorkItem::from_record(WorkRecord::new("a", input.clone()).with_status(initial));
            assert_eq!(item.status, expected, "initial status {}", initial);
        }
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&ItemStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }
}
