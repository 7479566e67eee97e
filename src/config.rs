//! 程序配置
//!
//! 所有配置项都有默认值，可以用同名环境变量覆盖

use crate::error::{AppResult, ConfigError};
use crate::models::batch_run::{BatchConfig, ResumePolicy};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// 远端处理任务
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskKind {
    /// 视觉模型判断文档类型
    #[default]
    Classify,
    /// 视觉模型抽取结构化字段
    Extract,
    /// OCR 服务识别文字
    Ocr,
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classify" => Ok(TaskKind::Classify),
            "extract" => Ok(TaskKind::Extract),
            "ocr" => Ok(TaskKind::Ocr),
            other => Err(format!("未知任务: {}", other)),
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskKind::Classify => "classify",
            TaskKind::Extract => "extract",
            TaskKind::Ocr => "ocr",
        };
        f.write_str(name)
    }
}

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 批次ID，也决定检查点文件名
    pub batch_id: String,
    /// 工作清单文件（JSON / TOML），为空时扫描 `input_folder`
    pub work_list: Option<PathBuf>,
    /// 扫描件目录
    pub input_folder: PathBuf,
    pub checkpoint_dir: PathBuf,
    /// 运行报告（JSON）
    pub report_file: PathBuf,
    /// 失败文档列表
    pub failure_log_file: PathBuf,
    pub task: TaskKind,
    // --- 批次运行 ---
    pub concurrency: usize,
    pub requests_per_minute: u32,
    pub max_attempts: u32,
    pub checkpoint_interval: usize,
    pub resume: bool,
    /// 续跑时重试上次失败的文档
    pub retry_failed_on_resume: bool,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    /// 单个文件的大小上限
    pub max_file_bytes: u64,
    pub request_timeout: Duration,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    // --- OCR 配置 ---
    pub ocr_endpoint: String,
    pub ocr_token: String,
}

impl Default for Config {
    fn default() -> Self {
        let batch = BatchConfig::default();
        Self {
            batch_id: "notarial-batch".to_string(),
            work_list: None,
            input_folder: PathBuf::from("scans"),
            checkpoint_dir: PathBuf::from("checkpoints"),
            report_file: PathBuf::from("report.json"),
            failure_log_file: PathBuf::from("failed.txt"),
            task: TaskKind::default(),
            concurrency: batch.concurrency,
            requests_per_minute: batch.requests_per_minute,
            max_attempts: batch.max_attempts,
            checkpoint_interval: batch.checkpoint_interval,
            resume: batch.resume,
            retry_failed_on_resume: true,
            retry_base_delay: batch.retry_base_delay,
            retry_max_delay: batch.retry_max_delay,
            max_file_bytes: 20 * 1024 * 1024,
            request_timeout: Duration::from_secs(120),
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o".to_string(),
            ocr_endpoint: String::new(),
            ocr_token: String::new(),
        }
    }
}

impl Config {
    /// 从环境变量加载，未设置的项使用默认值
    pub fn from_env() -> AppResult<Self> {
        let default = Self::default();
        Ok(Self {
            batch_id: env::var("BATCH_ID").unwrap_or(default.batch_id),
            work_list: env::var("WORK_LIST")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            input_folder: env::var("INPUT_FOLDER").map(PathBuf::from).unwrap_or(default.input_folder),
            checkpoint_dir: env::var("CHECKPOINT_DIR").map(PathBuf::from).unwrap_or(default.checkpoint_dir),
            report_file: env::var("REPORT_FILE").map(PathBuf::from).unwrap_or(default.report_file),
            failure_log_file: env::var("FAILURE_LOG_FILE").map(PathBuf::from).unwrap_or(default.failure_log_file),
            task: parse_var("TASK", "classify | extract | ocr", default.task)?,
            concurrency: parse_var("MAX_CONCURRENCY", "usize", default.concurrency)?,
            requests_per_minute: parse_var("REQUESTS_PER_MINUTE", "u32", default.requests_per_minute)?,
            max_attempts: parse_var("MAX_ATTEMPTS", "u32", default.max_attempts)?,
            checkpoint_interval: parse_var("CHECKPOINT_INTERVAL", "usize", default.checkpoint_interval)?,
            resume: parse_var("RESUME", "bool", default.resume)?,
            retry_failed_on_resume: parse_var("RETRY_FAILED_ON_RESUME", "bool", default.retry_failed_on_resume)?,
            retry_base_delay: parse_millis("RETRY_BASE_DELAY_MS", default.retry_base_delay)?,
            retry_max_delay: parse_millis("RETRY_MAX_DELAY_MS", default.retry_max_delay)?,
            max_file_bytes: parse_var("MAX_FILE_BYTES", "u64", default.max_file_bytes)?,
            request_timeout: Duration::from_secs(parse_var(
                "REQUEST_TIMEOUT_SECS",
                "u64",
                default.request_timeout.as_secs(),
            )?),
            llm_api_key: env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            ocr_endpoint: env::var("OCR_ENDPOINT").unwrap_or(default.ocr_endpoint),
            ocr_token: env::var("OCR_TOKEN").unwrap_or(default.ocr_token),
        })
    }

    /// 批次运行配置（已校验）
    pub fn batch_config(&self) -> AppResult<BatchConfig> {
        let config = BatchConfig {
            concurrency: self.concurrency,
            requests_per_minute: self.requests_per_minute,
            max_attempts: self.max_attempts,
            checkpoint_interval: self.checkpoint_interval,
            resume: self.resume,
            resume_policy: if self.retry_failed_on_resume {
                ResumePolicy::RetryFailed
            } else {
                ResumePolicy::KeepFailed
            },
            retry_base_delay: self.retry_base_delay,
            retry_max_delay: self.retry_max_delay,
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_var<T: FromStr>(name: &str, expected_type: &str, default: T) -> AppResult<T> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => {
            parse_value(name, &value, expected_type).map_err(Into::into)
        }
        _ => Ok(default),
    }
}

fn parse_value<T: FromStr>(name: &str, value: &str, expected_type: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::EnvVarParseFailed {
            var_name: name.to_string(),
            value: value.to_string(),
            expected_type: expected_type.to_string(),
        })
}

fn parse_millis(name: &str, default: Duration) -> AppResult<Duration> {
    let millis = parse_var(name, "u64", default.as_millis() as u64)?;
    Ok(Duration::from_millis(millis))
}
