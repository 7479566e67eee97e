//! 基础设施层（Infrastructure）
//!
//! 持有多个 worker 共享的稀缺资源，只暴露能力：
//! - `RateLimiter` - 远端调用的节奏
//! - `CheckpointStore` - 检查点的持久化

pub mod checkpoint_store;
pub mod rate_limiter;

pub use checkpoint_store::{CheckpointStore, FileCheckpointStore};
pub use rate_limiter::RateLimiter;
