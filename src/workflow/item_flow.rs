//! 文档处理流程 - 流程层
//!
//! 核心职责：定义"一份文档"的完整处理流程
//!
//! 流程顺序：
//! 1. 本地预处理（不占用速率配额）
//! 2. 获取速率许可 → 远端调用
//! 3. 失败时按重试策略等待后回到第 2 步，或放弃
//!
//! 取消只在重试等待期间生效：正在进行的远端调用总是允许完成。

use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::InvokeError;
use crate::infrastructure::RateLimiter;
use crate::models::work_item::WorkItem;
use crate::services::{Preparation, Preparer, RemoteInvoker, RetryDecision, RetryPolicy};
use crate::workflow::item_ctx::ItemCtx;

/// 文档处理结果
#[derive(Debug, Clone)]
pub enum ProcessResult {
    /// 远端返回了结果
    Succeeded { payload: JsonValue, attempts: u32 },
    /// 永久失败或重试次数耗尽
    Failed { error: InvokeError, attempts: u32 },
    /// 预处理判定不需要处理
    Skipped { reason: String },
    /// 重试等待期间收到取消，文档回到待处理
    Interrupted {
        attempts: u32,
        last_error: Option<InvokeError>,
    },
}

/// 文档处理流程
///
/// - 不持有批次状态，只返回结果
/// - 所有远端调用都经过同一个 RateLimiter
pub struct ItemFlow {
    preparer: Arc<dyn Preparer>,
    invoker: Arc<dyn RemoteInvoker>,
    limiter: Arc<RateLimiter>,
    retry_policy: RetryPolicy,
}

impl ItemFlow {
    pub fn new(
        preparer: Arc<dyn Preparer>,
        invoker: Arc<dyn RemoteInvoker>,
        limiter: Arc<RateLimiter>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            preparer,
            invoker,
            limiter,
            retry_policy,
        }
    }

    pub async fn run(
        &self,
        item: &WorkItem,
        ctx: &ItemCtx,
        cancel: &CancellationToken,
    ) -> ProcessResult {
        let counter = AtomicU32::new(0);
        self.run_counted(item, ctx, cancel, &counter).await
    }

    /// 同 [`ItemFlow::run`]，每次远端调用前把 `counter` 加一
    ///
    /// 调用方在处理过程 panic 时仍能读到真实的调用次数。
    pub async fn run_counted(
        &self,
        item: &WorkItem,
        ctx: &ItemCtx,
        cancel: &CancellationToken,
        counter: &AtomicU32,
    ) -> ProcessResult {
        // ========== 1. 本地预处理 ==========
        let input = match self.preparer.prepare(item).await {
            Ok(Preparation::Ready(input)) => input,
            Ok(Preparation::Skip(reason)) => {
                info!("{} ⏭️ 跳过: {}", ctx, reason);
                return ProcessResult::Skipped { reason };
            }
            Err(error) => {
                error!("{} ❌ 预处理失败: {}", ctx, error);
                return ProcessResult::Failed { error, attempts: 0 };
            }
        };

        // ========== 2. 限速调用 + 重试 ==========
        loop {
            self.limiter.acquire().await;
            let attempts = counter.fetch_add(1, Ordering::SeqCst) + 1;
            debug!("{} 第 {} 次调用 {}", ctx, attempts, self.invoker.name());

            let error = match self.invoker.invoke(&input).await {
                Ok(payload) => {
                    info!("{} ✅ 处理成功 (尝试 {} 次)", ctx, attempts);
                    return ProcessResult::Succeeded { payload, attempts };
                }
                Err(error) => error,
            };

            match self.retry_policy.should_retry(attempts, &error) {
                RetryDecision::GiveUp => {
                    error!("{} ❌ 处理失败 (尝试 {} 次): {}", ctx, attempts, error);
                    return ProcessResult::Failed { error, attempts };
                }
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        "{} ⚠️ 第 {}/{} 次调用失败，{:?} 后重试: {}",
                        ctx, attempts, self.retry_policy.max_attempts, delay, error
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            info!("{} 🛑 重试等待被取消，文档保留为待处理", ctx);
                            return ProcessResult::Interrupted {
                                attempts,
                                last_error: Some(error),
                            };
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}
