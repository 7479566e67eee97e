//! 并发分发 - 编排层
//!
//! 用 Semaphore 控制同时处理的文档数量，每个文档一个 tokio 任务。
//! worker 不直接修改批次状态，只通过通道把事件交给协调器。

use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::{ErrorKind, InvokeError};
use crate::models::work_item::WorkItem;
use crate::workflow::{ItemCtx, ItemFlow, ProcessResult};

/// 一个待分发的文档
#[derive(Debug, Clone)]
pub struct Job {
    pub ctx: ItemCtx,
    pub item: WorkItem,
}

/// worker 发给协调器的事件
#[derive(Debug)]
pub enum PoolEvent {
    /// 文档已拿到并发许可，开始处理
    Dispatched { index: usize, at: DateTime<Utc> },
    /// 文档处理结束
    Finished {
        index: usize,
        result: ProcessResult,
        finished_at: DateTime<Utc>,
    },
}

/// 并发分发器
pub struct WorkerPool {
    concurrency: usize,
}

impl WorkerPool {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// 按顺序分发所有文档，等全部已分发的任务结束后返回已分发数量
    ///
    /// 取消后不再分发新文档，已分发的文档会正常结束。
    pub async fn run(
        &self,
        flow: Arc<ItemFlow>,
        jobs: Vec<Job>,
        cancel: CancellationToken,
        events: mpsc::UnboundedSender<PoolEvent>,
    ) -> usize {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut dispatched = 0usize;
        let total = jobs.len();

        for job in jobs {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            // 等待许可期间可能已经取消
            if cancel.is_cancelled() {
                break;
            }

            let index = job.ctx.index;
            if events
                .send(PoolEvent::Dispatched {
                    index,
                    at: Utc::now(),
                })
                .is_err()
            {
                break;
            }
            dispatched += 1;

            let flow = flow.clone();
            let cancel = cancel.clone();
            let events = events.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let Job { ctx, item } = job;

                let counter = AtomicU32::new(0);
                let result = AssertUnwindSafe(flow.run_counted(&item, &ctx, &cancel, &counter))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        let message = panic_message(panic.as_ref());
                        error!("{} 💥 处理过程中发生 panic: {}", ctx, message);
                        ProcessResult::Failed {
                            error: InvokeError::new(
                                ErrorKind::Internal,
                                format!("处理过程中发生 panic: {}", message),
                            ),
                            attempts: counter.load(Ordering::SeqCst),
                        }
                    });

                let _ = events.send(PoolEvent::Finished {
                    index,
                    result,
                    finished_at: Utc::now(),
                });
            });
        }

        if dispatched < total {
            info!("🛑 已停止分发，{} 个文档未分发", total - dispatched);
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("任务执行失败: {}", e);
            }
        }

        dispatched
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
