//! 速率限制器 - 基础设施层
//!
//! 持有"上一次放行时间"这一共享资源，只暴露 acquire() 能力。
//! 同一批次内所有 worker 共用一个实例；不同批次各自持有，互不影响。

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::trace;

/// 速率限制器
///
/// 职责：
/// - 保证任意两次放行之间的间隔不小于最小间隔
/// - 最小间隔在每次 acquire 时实时读取，运行中可以调整
/// - 不保证等待者之间的公平性
#[derive(Debug)]
pub struct RateLimiter {
    min_interval_nanos: AtomicU64,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// 按每分钟请求数创建，0 表示不限速
    pub fn per_minute(requests_per_minute: u32) -> Self {
        Self::with_interval(interval_for(requests_per_minute))
    }

    /// 按最小间隔创建
    pub fn with_interval(min_interval: Duration) -> Self {
        Self {
            min_interval_nanos: AtomicU64::new(duration_nanos(min_interval)),
            last_call: Mutex::new(None),
        }
    }

    /// 当前生效的最小间隔
    pub fn min_interval(&self) -> Duration {
        Duration::from_nanos(self.min_interval_nanos.load(Ordering::Acquire))
    }

    pub fn set_min_interval(&self, min_interval: Duration) {
        self.min_interval_nanos
            .store(duration_nanos(min_interval), Ordering::Release);
    }

    pub fn set_requests_per_minute(&self, requests_per_minute: u32) {
        self.set_min_interval(interval_for(requests_per_minute));
    }

    /// 等待到可以发起调用为止，返回本次放行的时间
    ///
    /// 等待期间持有锁，后来者排在锁上，因此放行时间单调递增且间隔足够。
    pub async fn acquire(&self) -> Instant {
        let mut last_call = self.last_call.lock().await;
        let interval = self.min_interval();

        if let Some(previous) = *last_call {
            let elapsed = previous.elapsed();
            if elapsed < interval {
                let wait = interval - elapsed;
                trace!("速率限制: 等待 {:?}", wait);
                sleep(wait).await;
            }
        }

        let now = Instant::now();
        *last_call = Some(now);
        now
    }
}

fn interval_for(requests_per_minute: u32) -> Duration {
    if requests_per_minute == 0 {
        Duration::ZERO
    } else {
        Duration::from_secs(60) / requests_per_minute
    }
}

fn duration_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}
