//! 批次报告
//!
//! 无论批次正常完成还是被中断，都会生成一份报告。

use crate::error::ErrorKind;
use crate::models::batch_run::{BatchRun, RunState};
use crate::models::work_item::ItemStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// 单个文档的处理结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub id: String,
    pub status: ItemStatus,
    pub attempts: u32,
    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
    pub result: Option<JsonValue>,
}

/// 失败文档
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub id: String,
    pub kind: Option<ErrorKind>,
    pub attempts: u32,
    pub error: String,
}

/// 批次报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub batch_id: String,
    pub state: RunState,
    /// 是否所有文档都到达了终态
    pub complete: bool,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub pending: usize,
    pub total_attempts: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: f64,
    /// 每分钟完成的文档数
    pub throughput_per_minute: f64,
    pub items: Vec<ItemOutcome>,
    pub failures: Vec<FailureRecord>,
}

impl Report {
    pub fn from_run(run: &BatchRun) -> Self {
        let counters = run.counters();
        let started_at = run.started_at.unwrap_or(run.created_at);
        let finished_at = run.completed_at.unwrap_or_else(Utc::now);
        let duration_secs = (finished_at - started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let finished = counters.succeeded + counters.failed + counters.skipped;
        let throughput_per_minute = if duration_secs > 0.0 {
            finished as f64 * 60.0 / duration_secs
        } else {
            0.0
        };

        let items = run
            .items()
            .iter()
            .map(|item| ItemOutcome {
                id: item.id.clone(),
                status: item.status,
                attempts: item.attempt_count,
                error_kind: item.last_error_kind,
                error: item.last_error.clone(),
                result: item.result.clone(),
            })
            .collect::<Vec<_>>();

        let failures = run
            .items()
            .iter()
            .filter(|item| item.status == ItemStatus::Failed)
            .map(|item| FailureRecord {
                id: item.id.clone(),
                kind: item.last_error_kind,
                attempts: item.attempt_count,
                error: item.last_error.clone().unwrap_or_default(),
            })
            .collect();

        Self {
            batch_id: run.id.clone(),
            state: run.state,
            complete: run.state == RunState::Completed,
            total: counters.total(),
            succeeded: counters.succeeded,
            failed: counters.failed,
            skipped: counters.skipped,
            pending: counters.pending,
            total_attempts: run.items().iter().map(|i| i.attempt_count as u64).sum(),
            started_at,
            finished_at,
            duration_secs,
            throughput_per_minute,
            items,
            failures,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// 进程退出码：完整完成且没有失败时为 0
    pub fn exit_code(&self) -> i32 {
        if self.complete && !self.has_failures() {
            0
        } else {
            1
        }
    }

    pub fn outcome(&self, id: &str) -> Option<&ItemOutcome> {
        self.items.iter().find(|o| o.id == id)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(60))?;
        writeln!(f, "批次 {} 处理报告 ({})", self.batch_id, self.state)?;
        writeln!(f, "{}", "=".repeat(60))?;
        writeln!(f, "✅ 成功: {}/{}", self.succeeded, self.total)?;
        writeln!(f, "❌ 失败: {}", self.failed)?;
        writeln!(f, "⏭️ 跳过: {}", self.skipped)?;
        if self.pending > 0 {
            writeln!(f, "⏸️ 未完成: {}", self.pending)?;
        }
        writeln!(
            f,
            "⏱️ 耗时: {:.1} 秒, 吞吐: {:.1} 个/分钟, 总调用次数: {}",
            self.duration_secs, self.throughput_per_minute, self.total_attempts
        )?;
        if !self.failures.is_empty() {
            writeln!(f, "{}", "─".repeat(60))?;
            for failure in &self.failures {
                let kind = failure.kind.map(|k| k.as_str()).unwrap_or("unknown");
                writeln!(
                    f,
                    "  {} [{}] 尝试 {} 次: {}",
                    failure.id, kind, failure.attempts, failure.error
                )?;
            }
        }
        write!(f, "{}", "=".repeat(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InvokeError;
    use crate::models::batch_run::BatchConfig;
    use crate::models::work_item::{InputRef, WorkRecord};

    fn finished_run() -> BatchRun {
        let records = (0..4)
            .map(|i| WorkRecord::new(format!("d{i}"), InputRef::new(format!("d{i}.png"))))
            .collect();
        let mut run = BatchRun::new("report-test", records, BatchConfig::default()).unwrap();
        run.start();
        let now = Utc::now();
        run.record_success(0, serde_json::json!({"n": 0}), 1, now);
        run.record_success(1, serde_json::json!({"n": 1}), 3, now);
        run.record_failure(2, &InvokeError::permanent("unsupported format"), 1, now);
        run.record_skipped(3, "Thumbs.db", now);
        run.finish();
        run
    }

    #[test]
    fn test_report_counts_and_failures() {
        let report = Report::from_run(&finished_run());

        assert!(report.complete);
        assert_eq!(report.total, 4);
        assert_eq!(report.succeeded + report.failed + report.skipped, report.total);
        assert_eq!(report.total_attempts, 5);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, Some(ErrorKind::Permanent));
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.outcome("d1").unwrap().attempts, 3);
    }

    #[test]
    fn test_report_renders_failed_items() {
        let text = Report::from_run(&finished_run()).to_string();
        assert!(text.contains("report-test"));
        assert!(text.contains("d2 [permanent]"));
    }

    #[test]
    fn test_report_is_machine_readable() {
        let report = Report::from_run(&finished_run());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["state"], "completed");
        assert_eq!(json["failures"][0]["kind"], "permanent");
    }
}
