//! 文档处理上下文
//!
//! 封装"我正在处理哪个批次的第几个文档"这一信息

use std::fmt::Display;

/// 文档处理上下文
#[derive(Debug, Clone)]
pub struct ItemCtx {
    /// 批次ID
    pub batch_id: String,

    /// 文档标识
    pub item_id: String,

    /// 文档在批次中的下标
    pub index: usize,

    /// 本次运行中的分发序号（从1开始，仅用于日志显示）
    pub ordinal: usize,

    /// 本次运行需要处理的文档总数
    pub total: usize,
}

impl ItemCtx {
    pub fn new(
        batch_id: impl Into<String>,
        item_id: impl Into<String>,
        index: usize,
        ordinal: usize,
        total: usize,
    ) -> Self {
        Self {
            batch_id: batch_id.into(),
            item_id: item_id.into(),
            index,
            ordinal,
            total,
        }
    }
}

impl Display for ItemCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[批次 {} 文档 {}/{} {}]",
            self.batch_id, self.ordinal, self.total, self.item_id
        )
    }
}
