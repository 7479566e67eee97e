//! 远端调用接口 - 业务能力层
//!
//! 分类、抽取、OCR 三类脚本的共同点只有一个：把一份文档交给远端服务，
//! 拿回一个结果或一个错误。批次运行器只依赖这个接口。

use crate::error::InvokeError;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value as JsonValue;
use std::path::PathBuf;

/// 本地预处理后、可以发送的文档
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedInput {
    pub item_id: String,
    pub source: PathBuf,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl PreparedInput {
    pub fn file_name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.item_id.clone())
    }

    pub fn base64(&self) -> String {
        STANDARD.encode(&self.data)
    }

    /// `data:<mime>;base64,...` 形式，供视觉模型使用
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.content_type, self.base64())
    }
}

/// 远端调用能力
///
/// 实现方负责把错误粗分为可重试 / 不可重试，其他一概不管。
#[async_trait]
pub trait RemoteInvoker: Send + Sync + 'static {
    /// 用于日志
    fn name(&self) -> &str;

    /// 处理一份文档
    async fn invoke(&self, input: &PreparedInput) -> Result<JsonValue, InvokeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_url() {
        let input = PreparedInput {
            item_id: "a".to_string(),
            source: PathBuf::from("scans/a.png"),
            content_type: "image/png".to_string(),
            data: b"hi".to_vec(),
        };
        assert_eq!(input.data_url(), "data:image/png;base64,aGk=");
        assert_eq!(input.file_name(), "a.png");
    }
}
