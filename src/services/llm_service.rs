//! LLM 服务 - 业务能力层
//!
//! 把一页扫描件交给视觉大模型，做文档分类或字段抽取
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs, ImageDetail, ImageUrl,
    },
    Client,
};
use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{ErrorKind, InvokeError};
use crate::services::error_classifier::{classify_api_error, classify_message, is_rate_limited};
use crate::services::invoker::{PreparedInput, RemoteInvoker};

/// 被限流时至少等待的时间
const RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(10);

/// 交给大模型的任务
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmTask {
    /// 判断文档类型
    Classify,
    /// 抽取结构化字段
    Extract,
}

impl LlmTask {
    fn system_message(self) -> &'static str {
        match self {
            LlmTask::Classify => {
                "You are an assistant that classifies scanned notarial documents. \
                 Look at the page image and answer only with a JSON object."
            }
            LlmTask::Extract => {
                "You are an assistant that transcribes data from scanned notarial documents. \
                 Look at the page image and answer only with a JSON object."
            }
        }
    }

    fn user_message(self, file_name: &str) -> String {
        match self {
            LlmTask::Classify => format!(
                r#"Classify the document in file "{file_name}".
Return {{"document_type": string, "confidence": number between 0 and 1, "language": string}}.
Typical document types: deed, power_of_attorney, will, certificate, protocol_index, other."#
            ),
            LlmTask::Extract => format!(
                r#"Extract the structured data of the document in file "{file_name}".
Return {{"document_type": string, "date": string or null, "notary": string or null,
"protocol_number": string or null, "parties": [{{"name": string, "role": string}}],
"fields": object}}. Use null for anything you cannot read."#
            ),
        }
    }

    fn max_tokens(self) -> u32 {
        match self {
            LlmTask::Classify => 512,
            LlmTask::Extract => 4096,
        }
    }
}

/// 视觉大模型调用
///
/// 职责：
/// - 构建包含图片的请求
/// - 解析模型返回的 JSON
/// - 把 API 错误分类为可重试 / 不可重试
/// - 不关心速率限制和重试（由批次运行器负责）
pub struct LlmInvoker {
    client: Client<OpenAIConfig>,
    model_name: String,
    task: LlmTask,
    timeout: Duration,
}

impl LlmInvoker {
    /// 创建新的 LLM 调用器
    pub fn new(config: &Config, task: LlmTask) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
            task,
            timeout: config.request_timeout,
        }
    }

    fn build_request(&self, input: &PreparedInput) -> Result<CreateChatCompletionRequest, OpenAIError> {
        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(self.task.system_message())
            .build()?;

        let content_parts = vec![
            ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText {
                    text: self.task.user_message(&input.file_name()),
                },
            ),
            ChatCompletionRequestUserMessageContentPart::ImageUrl(
                ChatCompletionRequestMessageContentPartImage {
                    image_url: ImageUrl {
                        url: input.data_url(),
                        detail: Some(ImageDetail::High),
                    },
                },
            ),
        ];

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(ChatCompletionRequestUserMessageContent::Array(content_parts))
            .build()?;

        CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(vec![
                ChatCompletionRequestMessage::System(system_msg),
                ChatCompletionRequestMessage::User(user_msg),
            ])
            .temperature(0.0)
            .max_tokens(self.task.max_tokens())
            .build()
    }
}

#[async_trait]
impl RemoteInvoker for LlmInvoker {
    fn name(&self) -> &str {
        &self.model_name
    }

    async fn invoke(&self, input: &PreparedInput) -> Result<JsonValue, InvokeError> {
        debug!(
            "调用 LLM API，模型: {}，文档: {} ({} 字节)",
            self.model_name,
            input.item_id,
            input.data.len()
        );

        let request = self.build_request(input).map_err(|e| {
            InvokeError::permanent(format!("无法构建 LLM 请求: {}", e))
        })?;

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| InvokeError::transient(format!("LLM 请求超时 ({:?})", self.timeout)))?
            .map_err(|e| {
                let message = e.to_string();
                warn!("LLM API 调用失败: {}", message);
                let kind = match &e {
                    OpenAIError::ApiError(api) => classify_api_error(
                        api.r#type.as_deref(),
                        api.code.as_deref(),
                        &api.message,
                    ),
                    _ => classify_message(&message),
                };
                let error = InvokeError::new(kind, format!("LLM API 调用失败: {}", message));
                if is_rate_limited(&message) {
                    error.with_retry_after(RATE_LIMIT_COOLDOWN)
                } else {
                    error
                }
            })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| InvokeError::new(ErrorKind::Transient, "LLM 返回内容为空"))?;

        Ok(parse_model_reply(&content))
    }
}

/// 解析模型回复
///
/// 去掉 Markdown 代码块后按 JSON 解析，不是 JSON 时包装为 `{"text": ...}`
pub fn parse_model_reply(content: &str) -> JsonValue {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    match serde_json::from_str::<JsonValue>(body) {
        Ok(value) => value,
        Err(_) => {
            debug!("LLM 返回的不是 JSON，按文本保存");
            json!({ "text": trimmed })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let value = parse_model_reply(r#"{"document_type": "deed", "confidence": 0.9}"#);
        assert_eq!(value["document_type"], "deed");
    }

    #[test]
    fn test_parse_fenced_json() {
        let reply = "```json\n{\"document_type\": \"will\"}\n```";
        assert_eq!(parse_model_reply(reply)["document_type"], "will");

        let reply = "```\n[1, 2]\n```";
        assert_eq!(parse_model_reply(reply), json!([1, 2]));
    }

    #[test]
    fn test_parse_free_text() {
        let value = parse_model_reply("  I cannot read this page. ");
        assert_eq!(value, json!({"text": "I cannot read this page."}));
    }

    #[test]
    fn test_prompts_mention_file_name() {
        assert!(LlmTask::Classify.user_message("p1.jpg").contains("p1.jpg"));
        assert!(LlmTask::Extract.user_message("p2.jpg").contains("p2.jpg"));
        assert!(LlmTask::Extract.max_tokens() > LlmTask::Classify.max_tokens());
    }

    /// 需要真实的 API key：
    /// ```bash
    /// LLM_API_KEY=... cargo test test_live_classification -- --ignored --nocapture
    /// ```
    #[tokio::test]
    #[ignore]
    async fn test_live_classification() {
        let _ = tracing_subscriber::fmt::try_init();
        let config = Config::from_env().expect("配置加载失败");
        let invoker = LlmInvoker::new(&config, LlmTask::Classify);

        // 1x1 白色 PNG
        let png = vec![
            0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48,
            0x44, 0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x02, 0x00, 0x00,
            0x00, 0x90, 0x77, 0x53, 0xDE, 0x00, 0x00, 0x00, 0x0C, 0x49, 0x44, 0x41, 0x54, 0x08,
            0xD7, 0x63, 0xF8, 0xFF, 0xFF, 0x3F, 0x00, 0x05, 0xFE, 0x02, 0xFE, 0xDC, 0xCC, 0x59,
            0xE7, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
        ];
        let input = PreparedInput {
            item_id: "blank".to_string(),
            source: "blank.png".into(),
            content_type: "image/png".to_string(),
            data: png,
        };

        match invoker.invoke(&input).await {
            Ok(value) => println!("✅ LLM 响应: {}", value),
            Err(e) => panic!("LLM 调用失败: {}", e),
        }
    }
}
