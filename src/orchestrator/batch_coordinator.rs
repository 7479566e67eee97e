//! 批次协调器 - 编排层
//!
//! ## 职责
//!
//! 1. **建立批次**：由工作清单创建 `BatchRun`，合并上一次的检查点
//! 2. **分发**：把待处理文档交给 `WorkerPool`
//! 3. **记账**：唯一修改 `BatchRun` 的地方，按事件顺序更新状态和计数
//! 4. **持久化**：开始、每隔若干文档、结束时写检查点
//! 5. **收尾**：生成 `Report`
//!
//! 状态变化：`Created` → `Running` → `Completed` / `Aborted`

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{AppError, AppResult};
use crate::infrastructure::{CheckpointStore, RateLimiter};
use crate::models::batch_run::{BatchConfig, BatchRun, RunState};
use crate::models::report::Report;
use crate::models::work_item::{ItemStatus, WorkRecord};
use crate::orchestrator::progress_writer::ProgressWriter;
use crate::orchestrator::worker_pool::{Job, PoolEvent, WorkerPool};
use crate::services::{Preparer, RemoteInvoker, RetryPolicy};
use crate::utils::logging;
use crate::workflow::{ItemCtx, ItemFlow, ProcessResult};

/// 批次协调器
pub struct BatchCoordinator {
    config: BatchConfig,
    preparer: Arc<dyn Preparer>,
    invoker: Arc<dyn RemoteInvoker>,
    store: Arc<dyn CheckpointStore>,
    limiter: Arc<RateLimiter>,
    cancel: CancellationToken,
}

impl BatchCoordinator {
    pub fn new(
        config: BatchConfig,
        preparer: Arc<dyn Preparer>,
        invoker: Arc<dyn RemoteInvoker>,
        store: Arc<dyn CheckpointStore>,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::per_minute(config.requests_per_minute));
        Self {
            config,
            preparer,
            invoker,
            store,
            limiter,
            cancel: CancellationToken::new(),
        }
    }

    /// 使用共享的限速器（多个协调器共用同一个远端配额时）
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    /// 取消令牌，触发后停止分发新文档
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        self.limiter.clone()
    }

    /// 运行一个批次直到全部完成或被取消
    ///
    /// 只有检查点读写失败、工作清单不合法等批次级错误会返回 `Err`，
    /// 单个文档的失败都记录在报告里。
    pub async fn run(&self, batch_id: &str, records: Vec<WorkRecord>) -> AppResult<Report> {
        self.config.validate()?;

        // ========== Created: 建立批次 ==========
        let mut run = BatchRun::new(batch_id, records, self.config.clone())?;
        let mut merged = None;

        if self.config.resume {
            if let Some(checkpoint) = self.store.load(batch_id).await? {
                let summary = run.merge_checkpoint(&checkpoint);
                if checkpoint.is_completed() && run.all_terminal() {
                    info!("✓ 批次 {} 已完成，没有需要处理的文档", batch_id);
                    run.state = RunState::Completed;
                    run.completed_at = checkpoint.completed_at;
                    return Ok(Report::from_run(&run));
                }
                merged = Some(summary);
            }
        }

        let pending = run.pending_indices();
        logging::log_run_loaded(batch_id, run.len(), pending.len(), merged);

        // ========== Running ==========
        run.start();
        let mut progress = ProgressWriter::new(self.store.clone(), self.config.checkpoint_interval);
        progress.flush(&run).await?;

        let total = pending.len();
        let jobs = pending
            .into_iter()
            .enumerate()
            .map(|(n, index)| {
                let item = run.item(index).clone();
                Job {
                    ctx: ItemCtx::new(batch_id, item.id.clone(), index, n + 1, total),
                    item,
                }
            })
            .collect::<Vec<_>>();

        let flow = Arc::new(ItemFlow::new(
            self.preparer.clone(),
            self.invoker.clone(),
            self.limiter.clone(),
            RetryPolicy::from_config(&self.config),
        ));
        let pool = WorkerPool::new(self.config.concurrency);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let dispatch = pool.run(flow, jobs, self.cancel.clone(), events_tx);
        let bookkeeping = async {
            let mut store_error: Option<AppError> = None;
            while let Some(event) = events_rx.recv().await {
                match event {
                    PoolEvent::Dispatched { index, at } => run.mark_dispatched(index, at),
                    PoolEvent::Finished {
                        index,
                        result,
                        finished_at,
                    } => {
                        if !apply_result(&mut run, index, result, finished_at) {
                            continue;
                        }
                        if store_error.is_some() {
                            continue;
                        }
                        if let Err(e) = progress.record_terminal(&run).await {
                            error!("❌ 检查点写入失败，停止分发: {}", e);
                            self.cancel.cancel();
                            store_error = Some(e);
                        }
                    }
                }
            }
            store_error
        };

        let (dispatched, store_error) = tokio::join!(dispatch, bookkeeping);
        info!("📤 本次共分发 {}/{} 个文档", dispatched, total);

        if let Some(e) = store_error {
            return Err(e);
        }

        // 没有收到结束事件的文档回到待处理
        for index in 0..run.len() {
            let item = run.item(index);
            if item.status == ItemStatus::InProgress {
                warn!("文档 {} 没有处理结果，回到待处理", item.id);
                let attempts = item.attempt_count;
                run.record_interrupted(index, attempts, None);
            }
        }

        // ========== Completed / Aborted ==========
        run.finish();
        if run.state == RunState::Aborted {
            warn!(
                "⏸️ 批次 {} 未完成，{} 个文档待处理",
                batch_id,
                run.counters().pending
            );
        }
        progress.flush(&run).await?;

        Ok(Report::from_run(&run))
    }
}

/// 把处理结果写入批次，返回文档是否到达终态
fn apply_result(
    run: &mut BatchRun,
    index: usize,
    result: ProcessResult,
    finished_at: DateTime<Utc>,
) -> bool {
    match result {
        ProcessResult::Succeeded { payload, attempts } => {
            run.record_success(index, payload, attempts, finished_at);
            true
        }
        ProcessResult::Failed { error, attempts } => {
            run.record_failure(index, &error, attempts, finished_at);
            true
        }
        ProcessResult::Skipped { reason } => {
            run.record_skipped(index, &reason, finished_at);
            true
        }
        ProcessResult::Interrupted {
            attempts,
            last_error,
        } => {
            run.record_interrupted(index, attempts, last_error.as_ref());
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CheckpointError, InvokeError};
    use crate::models::checkpoint::Checkpoint;
    use crate::models::work_item::InputRef;
    use crate::services::{NoopPreparer, PreparedInput};
    use async_trait::async_trait;
    use serde_json::Value as JsonValue;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        checkpoints: Mutex<HashMap<String, Checkpoint>>,
        saves: Mutex<usize>,
    }

    #[async_trait]
    impl CheckpointStore for MemoryStore {
        async fn load(&self, batch_id: &str) -> AppResult<Option<Checkpoint>> {
            Ok(self.checkpoints.lock().unwrap().get(batch_id).cloned())
        }

        async fn save(&self, checkpoint: &Checkpoint) -> AppResult<()> {
            *self.saves.lock().unwrap() += 1;
            self.checkpoints
                .lock()
                .unwrap()
                .insert(checkpoint.batch_id.clone(), checkpoint.clone());
            Ok(())
        }
    }

    struct Echo;

    #[async_trait]
    impl RemoteInvoker for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn invoke(&self, input: &PreparedInput) -> Result<JsonValue, InvokeError> {
            if input.item_id.starts_with("bad") {
                return Err(InvokeError::permanent("unsupported document"));
            }
            Ok(serde_json::json!({ "id": input.item_id }))
        }
    }

    fn config() -> BatchConfig {
        BatchConfig {
            concurrency: 2,
            requests_per_minute: 0,
            checkpoint_interval: 2,
            ..BatchConfig::default()
        }
    }

    fn records(ids: &[&str]) -> Vec<WorkRecord> {
        ids.iter()
            .map(|id| WorkRecord::new(*id, InputRef::new(format!("{id}.png"))))
            .collect()
    }

    fn coordinator(store: Arc<MemoryStore>) -> BatchCoordinator {
        BatchCoordinator::new(config(), Arc::new(NoopPreparer), Arc::new(Echo), store)
    }

    #[tokio::test]
    async fn test_run_to_completion() {
        let store = Arc::new(MemoryStore::default());
        let report = coordinator(store.clone())
            .run("b1", records(&["a", "b", "bad-c", "d", "e"]))
            .await
            .unwrap();

        assert!(report.complete);
        assert_eq!(report.succeeded, 4);
        assert_eq!(report.failed, 1);
        assert_eq!(report.outcome("bad-c").unwrap().attempts, 1);

        let checkpoint = store.load("b1").await.unwrap().unwrap();
        assert!(checkpoint.is_completed());
        // 初始 + 2 次间隔 + 结束
        assert_eq!(*store.saves.lock().unwrap(), 4);
    }

    #[tokio::test]
    async fn test_empty_work_list_completes() {
        let store = Arc::new(MemoryStore::default());
        let report = coordinator(store).run("empty", Vec::new()).await.unwrap();
        assert!(report.complete);
        assert_eq!(report.total, 0);
        assert_eq!(report.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_ids_rejected() {
        let store = Arc::new(MemoryStore::default());
        let err = coordinator(store.clone())
            .run("dup", records(&["a", "a"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::WorkList(_)));
        assert_eq!(*store.saves.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_new_items_added_to_completed_batch_are_processed() {
        let store = Arc::new(MemoryStore::default());
        coordinator(store.clone()).run("grow", records(&["a", "b"])).await.unwrap();

        let report = coordinator(store.clone())
            .run("grow", records(&["a", "b", "c"]))
            .await
            .unwrap();
        assert!(report.complete);
        assert_eq!(report.succeeded, 3);
    }

    #[tokio::test]
    async fn test_resume_disabled_ignores_checkpoint() {
        let store = Arc::new(MemoryStore::default());
        coordinator(store.clone()).run("fresh", records(&["a"])).await.unwrap();
        let saves = *store.saves.lock().unwrap();

        let mut config = config();
        config.resume = false;
        let again = BatchCoordinator::new(config, Arc::new(NoopPreparer), Arc::new(Echo), store.clone());
        let report = again.run("fresh", records(&["a"])).await.unwrap();
        assert_eq!(report.total_attempts, 1);
        assert!(*store.saves.lock().unwrap() > saves);
    }

    #[test]
    fn test_checkpoint_error_is_app_error() {
        let err: AppError = CheckpointError::Unavailable("disk".into()).into();
        assert!(err.to_string().contains("disk"));
    }
}
