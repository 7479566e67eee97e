//! 批量文档处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责把配置装配成一次批次运行。
//!
//! 1. **应用初始化**：校验配置，按任务选择远端调用（LLM / OCR）
//! 2. **加载清单**：读取工作清单文件，或扫描扫描件目录
//! 3. **中断处理**：Ctrl-C 触发取消，已分发的文档正常结束
//! 4. **输出结果**：写报告 JSON、失败列表，打印统计
//!
//! 单个批次的并发、限速和检查点都委托给 `BatchCoordinator`

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};

use crate::config::{Config, TaskKind};
use crate::infrastructure::FileCheckpointStore;
use crate::models::report::Report;
use crate::models::work_item::WorkRecord;
use crate::models::{inventory_folder, load_work_list};
use crate::orchestrator::batch_coordinator::BatchCoordinator;
use crate::services::{
    DocumentPreparer, FailureWriter, LlmInvoker, LlmTask, OcrInvoker, RemoteInvoker,
};
use crate::utils::logging::{log_startup, print_final_stats};

/// 应用主结构
pub struct App {
    config: Config,
    coordinator: BatchCoordinator,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);

        let batch_config = config.batch_config()?;
        let invoker = build_invoker(&config)?;
        info!("🔌 远端服务: {}", invoker.name());

        let coordinator = BatchCoordinator::new(
            batch_config,
            Arc::new(DocumentPreparer::new(config.max_file_bytes)),
            invoker,
            Arc::new(FileCheckpointStore::new(&config.checkpoint_dir)),
        );

        Ok(Self {
            config,
            coordinator,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<Report> {
        let records = self.load_records().await?;
        if records.is_empty() {
            warn!("⚠️ 工作清单为空");
        }

        let cancel = self.coordinator.cancellation_token();
        let signal = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("🛑 收到中断信号，停止分发新文档，等待进行中的文档结束...");
                cancel.cancel();
            }
        });

        let result = self.coordinator.run(&self.config.batch_id, records).await;
        signal.abort();
        let report = result.context("批次运行失败")?;

        self.write_report(&report).await?;

        let failure_log = if report.has_failures() {
            let writer = FailureWriter::with_path(self.config.failure_log_file.to_string_lossy());
            writer
                .write(&report.batch_id, &report.failures)
                .context("无法写入失败列表")?;
            Some(self.config.failure_log_file.as_path())
        } else {
            None
        };

        info!("\n{}", report);
        print_final_stats(&report, &self.config.report_file, failure_log);

        Ok(report)
    }

    /// 加载工作清单
    async fn load_records(&self) -> Result<Vec<WorkRecord>> {
        match &self.config.work_list {
            Some(path) => {
                info!("\n📁 正在读取工作清单: {}", path.display());
                Ok(load_work_list(path).await?)
            }
            None => {
                info!("\n📁 正在扫描目录: {}", self.config.input_folder.display());
                Ok(inventory_folder(&self.config.input_folder).await?)
            }
        }
    }

    async fn write_report(&self, report: &Report) -> Result<()> {
        let path = &self.config.report_file;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("无法创建目录: {}", parent.display()))?;
        }
        let json = serde_json::to_vec_pretty(report)?;
        fs::write(path, json)
            .await
            .with_context(|| format!("无法写入报告: {}", path.display()))?;
        Ok(())
    }
}

/// 按任务选择远端调用
fn build_invoker(config: &Config) -> Result<Arc<dyn RemoteInvoker>> {
    let invoker: Arc<dyn RemoteInvoker> = match config.task {
        TaskKind::Classify | TaskKind::Extract => {
            if config.llm_api_key.is_empty() {
                warn!("⚠️ 未设置 LLM_API_KEY");
            }
            let task = if config.task == TaskKind::Classify {
                LlmTask::Classify
            } else {
                LlmTask::Extract
            };
            Arc::new(LlmInvoker::new(config, task))
        }
        TaskKind::Ocr => {
            if config.ocr_endpoint.is_empty() {
                bail!("OCR 任务需要设置 OCR_ENDPOINT");
            }
            Arc::new(OcrInvoker::new(config).context("无法创建 OCR 客户端")?)
        }
    };
    Ok(invoker)
}
