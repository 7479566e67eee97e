//! 本地预处理 - 业务能力层
//!
//! 在拿到速率许可之前完成：读取文件、检查大小和类型。
//! 这里的失败都是本地错误，文档不会被发送到远端。

use crate::error::InvokeError;
use crate::models::content_type::{content_type_for, is_scanner_junk};
use crate::models::work_item::WorkItem;
use crate::services::invoker::PreparedInput;
use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

/// 预处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preparation {
    /// 可以发送
    Ready(PreparedInput),
    /// 不需要处理（记为 skipped）
    Skip(String),
}

/// 预处理能力
#[async_trait]
pub trait Preparer: Send + Sync + 'static {
    async fn prepare(&self, item: &WorkItem) -> Result<Preparation, InvokeError>;
}

/// 不读取文件，只把输入引用原样传下去
pub struct NoopPreparer;

#[async_trait]
impl Preparer for NoopPreparer {
    async fn prepare(&self, item: &WorkItem) -> Result<Preparation, InvokeError> {
        Ok(Preparation::Ready(PreparedInput {
            item_id: item.id.clone(),
            source: item.input.path.clone(),
            content_type: item
                .input
                .content_type
                .clone()
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            data: Vec::new(),
        }))
    }
}

/// 扫描文档预处理
///
/// - 扫描仪生成的无用文件直接跳过
/// - 类型不支持、文件为空、超过大小限制、内容与类型不符都视为本地错误
pub struct DocumentPreparer {
    max_bytes: u64,
}

impl DocumentPreparer {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }
}

#[async_trait]
impl Preparer for DocumentPreparer {
    async fn prepare(&self, item: &WorkItem) -> Result<Preparation, InvokeError> {
        let path = &item.input.path;

        if is_scanner_junk(path) {
            return Ok(Preparation::Skip(format!("扫描仪生成的文件: {}", path.display())));
        }

        let content_type = item
            .input
            .content_type
            .clone()
            .or_else(|| content_type_for(path).map(str::to_string))
            .ok_or_else(|| {
                InvokeError::preparation(format!("不支持的文件类型: {}", path.display()))
            })?;

        // 读取前先确认大小，避免把超大文件读进内存
        let size = match item.input.byte_size {
            Some(size) => size,
            None => fs::metadata(path)
                .await
                .map_err(|e| {
                    InvokeError::preparation(format!("无法读取文件 {}: {}", path.display(), e))
                })?
                .len(),
        };
        if size > self.max_bytes {
            return Err(too_large(size, self.max_bytes));
        }

        let data = fs::read(path).await.map_err(|e| {
            InvokeError::preparation(format!("无法读取文件 {}: {}", path.display(), e))
        })?;

        if data.is_empty() {
            return Err(InvokeError::preparation(format!("文件为空: {}", path.display())));
        }
        if data.len() as u64 > self.max_bytes {
            return Err(too_large(data.len() as u64, self.max_bytes));
        }
        if !magic_matches(&content_type, &data) {
            return Err(InvokeError::preparation(format!(
                "文件内容与类型 {} 不符，可能已损坏: {}",
                content_type,
                path.display()
            )));
        }

        debug!("预处理完成: {} ({} 字节, {})", item.id, data.len(), content_type);

        Ok(Preparation::Ready(PreparedInput {
            item_id: item.id.clone(),
            source: path.clone(),
            content_type,
            data,
        }))
    }
}

fn too_large(size: u64, max: u64) -> InvokeError {
    InvokeError::preparation(format!("文件过大: {} 字节, 上限 {} 字节", size, max))
}

/// 检查常见格式的文件头
fn magic_matches(content_type: &str, data: &[u8]) -> bool {
    match content_type {
        "application/pdf" => data.starts_with(b"%PDF"),
        "image/png" => data.starts_with(&[0x89, b'P', b'N', b'G']),
        "image/jpeg" => data.starts_with(&[0xFF, 0xD8]),
        "image/tiff" => data.starts_with(b"II*\0") || data.starts_with(b"MM\0*"),
        _ => true,
    }
}
