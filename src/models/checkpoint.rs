//! 检查点快照
//!
//! 记录某一时刻批次内每个文档的状态，用于中断后续跑。

use crate::error::{AppResult, CheckpointError};
use crate::models::batch_run::{BatchRun, RunState};
use crate::models::work_item::WorkItem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;

/// 检查点
///
/// 清单中的每个文档在每一份检查点里都有一条记录。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub format_version: u32,
    pub batch_id: String,
    pub state: RunState,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// 写入时间，每次写入都会变化
    pub written_at: DateTime<Utc>,
    pub items: Vec<WorkItem>,
}

impl Checkpoint {
    /// 从批次生成快照
    pub fn snapshot(run: &BatchRun) -> Self {
        Self {
            format_version: CHECKPOINT_FORMAT_VERSION,
            batch_id: run.id.clone(),
            state: run.state,
            created_at: run.created_at,
            completed_at: run.completed_at,
            written_at: Utc::now(),
            items: run.items().to_vec(),
        }
    }

    pub fn to_json(&self) -> AppResult<Vec<u8>> {
        let bytes = serde_json::to_vec_pretty(self).map_err(CheckpointError::Serialize)?;
        Ok(bytes)
    }

    pub fn from_json(path: &str, bytes: &[u8]) -> AppResult<Self> {
        let checkpoint = serde_json::from_slice(bytes).map_err(|source| CheckpointError::Corrupt {
            path: path.to_string(),
            source,
        })?;
        Ok(checkpoint)
    }

    /// 上一次运行已完整结束，且没有任何待处理文档
    pub fn is_completed(&self) -> bool {
        self.state == RunState::Completed && self.items.iter().all(|i| i.status.is_terminal())
    }
}
