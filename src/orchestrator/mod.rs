//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 应用入口
//! - 装配配置、远端调用、检查点存储
//! - 加载工作清单，处理 Ctrl-C，输出报告
//!
//! ### `batch_coordinator` - 批次协调器
//! - 合并检查点、驱动状态变化、唯一修改批次状态的地方
//!
//! ### `worker_pool` - 并发分发
//! - Semaphore 限制同时处理的文档数量，panic 隔离在单个文档内
//!
//! ### `progress_writer` - 检查点写入节奏
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (App)
//!     ↓
//! batch_coordinator (BatchRun + Report)
//!     ↓
//! worker_pool (并发) → progress_writer (检查点)
//!     ↓
//! workflow::ItemFlow (处理单个文档)
//!     ↓
//! services (预处理 / 远端调用 / 重试策略)
//!     ↓
//! infrastructure (RateLimiter / CheckpointStore)
//! ```

pub mod batch_coordinator;
pub mod batch_processor;
pub mod progress_writer;
pub mod worker_pool;

pub use batch_coordinator::BatchCoordinator;
pub use batch_processor::App;
pub use progress_writer::ProgressWriter;
pub use worker_pool::{Job, PoolEvent, WorkerPool};
