//! 业务能力层（Services）
//!
//! 描述"我能做什么"，每个能力只处理单个文档，不关心批次和并发

pub mod error_classifier;
pub mod failure_writer;
pub mod invoker;
pub mod llm_service;
pub mod ocr_service;
pub mod preparation;
pub mod retry_policy;

pub use failure_writer::FailureWriter;
pub use invoker::{PreparedInput, RemoteInvoker};
pub use llm_service::{LlmInvoker, LlmTask};
pub use ocr_service::OcrInvoker;
pub use preparation::{DocumentPreparer, NoopPreparer, Preparation, Preparer};
pub use retry_policy::{Backoff, RetryDecision, RetryPolicy};
