//! # Notarial Batch
//!
//! 批量处理扫描的公证文书：限速、可续跑、并发受控的批次运行器
//!
//! ## 架构设计
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 多个 worker 共享的资源
//! - `RateLimiter` - 所有远端调用共用的调用间隔
//! - `CheckpointStore` - 检查点持久化（文件实现原子替换）
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 只处理单个文档
//! - `Preparer` - 本地预处理（读取、大小、类型）
//! - `RemoteInvoker` - 远端调用（`LlmInvoker` / `OcrInvoker`）
//! - `RetryPolicy` / `error_classifier` - 错误分类和重试决策
//! - `FailureWriter` - 写失败列表
//!
//! ### ③ 流程层（Workflow）
//! - `ItemCtx` - 上下文封装（batch_id + 文档序号）
//! - `ItemFlow` - 单个文档的流程（预处理 → 限速 → 调用 → 重试）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_coordinator` - 批次状态、检查点、报告
//! - `orchestrator/worker_pool` - 并发分发
//! - `orchestrator/batch_processor` - 应用入口
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::{Config, TaskKind};
pub use error::{AppError, AppResult, ErrorKind, InvokeError};
pub use infrastructure::{CheckpointStore, FileCheckpointStore, RateLimiter};
pub use models::{BatchConfig, BatchRun, Checkpoint, ItemStatus, Report, RunState, WorkItem, WorkRecord};
pub use orchestrator::{App, BatchCoordinator};
pub use services::{Preparation, PreparedInput, Preparer, RemoteInvoker};
pub use workflow::{ItemCtx, ItemFlow, ProcessResult};
