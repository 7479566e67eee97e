//! OCR 服务 - 业务能力层
//!
//! 调用独立的 OCR HTTP 服务，只负责"一份文档 → 一份文字"

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::InvokeError;
use crate::services::error_classifier::classify_status;
use crate::services::invoker::{PreparedInput, RemoteInvoker};

#[derive(Serialize)]
struct OcrRequest<'a> {
    file_name: String,
    content_type: &'a str,
    /// base64 编码的文件内容
    data: String,
}

/// OCR HTTP 调用
pub struct OcrInvoker {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl OcrInvoker {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: config.ocr_endpoint.clone(),
            token: config.ocr_token.clone(),
        })
    }
}

#[async_trait]
impl RemoteInvoker for OcrInvoker {
    fn name(&self) -> &str {
        "ocr"
    }

    async fn invoke(&self, input: &PreparedInput) -> Result<JsonValue, InvokeError> {
        debug!("调用 OCR 服务: {} ({} 字节)", input.item_id, input.data.len());

        let body = OcrRequest {
            file_name: input.file_name(),
            content_type: &input.content_type,
            data: input.base64(),
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if !self.token.is_empty() {
            request = request.bearer_auth(&self.token);
        }

        let response = request.send().await.map_err(|e| {
            // 超时和连接错误都可以重试
            let message = format!("OCR 请求失败: {}", e);
            if e.is_builder() {
                InvokeError::permanent(message)
            } else {
                InvokeError::transient(message)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after(&response);
            let text = response.text().await.unwrap_or_default();
            warn!("OCR 服务返回 {}: {}", status, truncate(&text, 200));

            let mut error = InvokeError::new(
                classify_status(status.as_u16()),
                format!("OCR 服务返回 {}: {}", status, truncate(&text, 200)),
            );
            if let Some(wait) = retry_after {
                error = error.with_retry_after(wait);
            }
            return Err(error);
        }

        response
            .json::<JsonValue>()
            .await
            .map_err(|e| InvokeError::transient(format!("OCR 响应无法解析: {}", e)))
    }
}

/// 解析 Retry-After（只支持秒数）
fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    if response.status() != StatusCode::TOO_MANY_REQUESTS
        && response.status() != StatusCode::SERVICE_UNAVAILABLE
    {
        return None;
    }
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn truncate(text: &str, max_len: usize) -> String {
    crate::utils::logging::truncate_text(text, max_len)
}
