use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// 应用程序错误类型
///
/// 只有这一层的错误会中止整个批次运行；单个文档的失败记录在
/// [`InvokeError`] 中，永远不会向上传播。
#[derive(Debug, Error)]
pub enum AppError {
    /// 检查点存储错误
    #[error("检查点错误: {0}")]
    Checkpoint(#[from] CheckpointError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 工作清单错误
    #[error("工作清单错误: {0}")]
    WorkList(#[from] WorkListError),
}

/// 检查点存储错误
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// 读取检查点失败
    #[error("读取检查点失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 写入检查点失败
    #[error("写入检查点失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 检查点内容损坏
    #[error("检查点内容无法解析 ({path}): {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    /// 序列化失败
    #[error("检查点序列化失败: {0}")]
    Serialize(#[source] serde_json::Error),
    /// 检查点属于其他批次
    #[error("检查点批次不匹配: 期望 {expected}, 实际 {found}")]
    BatchMismatch { expected: String, found: String },
    /// 存储不可用
    #[error("检查点存储不可用: {0}")]
    Unavailable(String),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置值不合法
    #[error("配置项 {name} 不合法: {reason}")]
    InvalidValue { name: String, reason: String },
}

/// 工作清单错误
#[derive(Debug, Error)]
pub enum WorkListError {
    /// 文档标识重复
    #[error("文档标识重复: {0}")]
    DuplicateId(String),
    /// 读取失败
    #[error("读取工作清单失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 解析失败
    #[error("解析工作清单失败 ({path}): {message}")]
    ParseFailed { path: String, message: String },
    /// 不支持的清单格式
    #[error("不支持的工作清单格式: {0}")]
    UnsupportedFormat(String),
    /// 目录不存在
    #[error("目录不存在: {0}")]
    DirectoryNotFound(String),
}

/// 单个文档的错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 超时、限流、服务端临时错误，可以重试
    Transient,
    /// 输入错误、格式不支持、鉴权失败，不再重试
    Permanent,
    /// 本地预处理失败（文件损坏、不可读），从未发送到远端
    Preparation,
    /// 处理过程中出现的意外错误（panic 等）
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Transient => "transient",
            ErrorKind::Permanent => "permanent",
            ErrorKind::Preparation => "preparation",
            ErrorKind::Internal => "internal",
        }
    }

    /// 是否允许重试
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 远端调用（或本地预处理）失败
#[derive(Debug, Clone, Error)]
#[error("[{kind}] {message}")]
pub struct InvokeError {
    pub kind: ErrorKind,
    pub message: String,
    /// 服务端建议的等待时间（例如 Retry-After）
    pub retry_after: Option<Duration>,
}

impl InvokeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permanent, message)
    }

    pub fn preparation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Preparation, message)
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    pub fn invalid_config(name: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Config(ConfigError::InvalidValue {
            name: name.into(),
            reason: reason.into(),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
