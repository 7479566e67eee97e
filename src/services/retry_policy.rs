//! 重试策略 - 业务能力层
//!
//! 只决定"要不要重试、等多久"，不负责等待本身

use crate::error::InvokeError;
use crate::models::batch_run::BatchConfig;
use std::time::Duration;

/// 退避方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// 固定等待
    Fixed(Duration),
    /// 指数退避：base * 2^(attempt-1)，不超过 max
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// 第 `attempt` 次失败之后的等待时间（attempt 从 1 开始）
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(d) => d,
            Backoff::Exponential { base, max } => {
                let shift = attempt.saturating_sub(1).min(16);
                base.saturating_mul(1u32 << shift).min(max)
            }
        }
    }
}

/// 重试决策
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// 等待后重试
    RetryAfter(Duration),
    /// 放弃，文档标记为失败
    GiveUp,
}

/// 重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 最多尝试次数（包含第一次）
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(
            config.max_attempts,
            Backoff::Exponential {
                base: config.retry_base_delay,
                max: config.retry_max_delay,
            },
        )
    }

    /// 第 `attempt_count` 次尝试失败后是否重试
    ///
    /// 只有可重试的错误才会重试；服务端给出的等待时间比退避更长时以服务端为准。
    pub fn should_retry(&self, attempt_count: u32, error: &InvokeError) -> RetryDecision {
        if !error.kind.is_retryable() || attempt_count >= self.max_attempts {
            return RetryDecision::GiveUp;
        }

        let delay = self.backoff.delay_for(attempt_count);
        let delay = match error.retry_after {
            Some(hint) if hint > delay => hint,
            _ => delay,
        };
        RetryDecision::RetryAfter(delay)
    }
}
