//! 日志工具模块
//!
//! 初始化 tracing，并提供批次运行各阶段的日志输出

use crate::config::Config;
use crate::models::batch_run::MergeSummary;
use crate::models::report::Report;
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// 初始化全局日志
///
/// 级别由 `RUST_LOG` 控制，默认 `info`。重复调用是安全的。
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 批量文档处理模式");
    info!("📦 批次: {} (任务: {})", config.batch_id, config.task);
    info!(
        "📊 最大并发数: {}, 每分钟请求上限: {}, 最多尝试: {} 次",
        config.concurrency, config.requests_per_minute, config.max_attempts
    );
    info!("{}", "=".repeat(60));
}

/// 记录批次加载信息
pub fn log_run_loaded(batch_id: &str, total: usize, pending: usize, merged: Option<MergeSummary>) {
    info!("✓ 批次 {} 共 {} 个文档", batch_id, total);
    if let Some(summary) = merged {
        info!(
            "♻️ 从检查点恢复: 保留 {} 个, 重新排队 {} 个失败文档",
            summary.restored, summary.requeued
        );
        if summary.unknown > 0 {
            warn!("⚠️ 检查点中有 {} 个文档不在清单中，已忽略", summary.unknown);
        }
    }
    info!("📋 本次需要处理 {} 个文档\n", pending);
}

/// 打印最终统计信息
pub fn print_final_stats(report: &Report, report_file: &Path, failure_log: Option<&Path>) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        report.finished_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", report.succeeded, report.total);
    info!("❌ 失败: {}", report.failed);
    info!("⏭️ 跳过: {}", report.skipped);
    if !report.complete {
        warn!("⏸️ 批次未完成，{} 个文档待处理，可再次运行续跑", report.pending);
    }
    info!(
        "⏱️ 耗时 {:.1} 秒, 吞吐 {:.1} 个/分钟",
        report.duration_secs, report.throughput_per_minute
    );
    info!("{}", "=".repeat(60));
    info!("\n报告已保存至: {}", report_file.display());
    if let Some(path) = failure_log {
        info!("失败列表已保存至: {}", path.display());
    }
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("escritura", 20), "escritura");
        assert_eq!(truncate_text("公证书第一页", 2), "公证...");
    }

    #[test]
    fn test_init_twice() {
        init();
        init();
    }
}
