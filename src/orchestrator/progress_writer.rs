//! 检查点写入节奏 - 编排层
//!
//! 每完成 `interval` 个文档写一次检查点，开始和结束时各写一次

use std::sync::Arc;
use tracing::debug;

use crate::error::AppResult;
use crate::infrastructure::CheckpointStore;
use crate::models::batch_run::BatchRun;
use crate::models::checkpoint::Checkpoint;

pub struct ProgressWriter {
    store: Arc<dyn CheckpointStore>,
    interval: usize,
    since_flush: usize,
}

impl ProgressWriter {
    pub fn new(store: Arc<dyn CheckpointStore>, interval: usize) -> Self {
        Self {
            store,
            interval: interval.max(1),
            since_flush: 0,
        }
    }

    /// 一个文档到达终态，达到间隔时写检查点
    ///
    /// 返回这次是否写了检查点
    pub async fn record_terminal(&mut self, run: &BatchRun) -> AppResult<bool> {
        self.since_flush += 1;
        if self.since_flush < self.interval {
            return Ok(false);
        }
        self.flush(run).await?;
        Ok(true)
    }

    /// 立即写检查点
    pub async fn flush(&mut self, run: &BatchRun) -> AppResult<()> {
        let checkpoint = Checkpoint::snapshot(run);
        self.store.save(&checkpoint).await?;
        self.since_flush = 0;

        let counters = run.counters();
        debug!(
            "💾 检查点已写入: 批次 {} ({}) 成功 {} 失败 {} 跳过 {} 待处理 {}",
            run.id, run.state, counters.succeeded, counters.failed, counters.skipped, counters.pending
        );
        Ok(())
    }
}
