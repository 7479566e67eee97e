//! 失败记录写入服务 - 业务能力层
//!
//! 只负责把失败的文档追加到纯文本日志，方便人工复查

use crate::models::report::FailureRecord;
use anyhow::Result;
use std::fs::OpenOptions;
use std::io::Write;
use tracing::debug;

/// 失败记录写入服务
///
/// 每行一条：`批次 <id> | 文档 <id> | <类型> | 尝试 <n> 次 | <错误>`
pub struct FailureWriter {
    failure_file_path: String,
}

impl FailureWriter {
    /// 使用自定义文件路径创建
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            failure_file_path: path.into(),
        }
    }

    /// 追加写入一个批次的失败文档
    ///
    /// # 返回
    /// 返回写入的条数
    pub fn write(&self, batch_id: &str, failures: &[FailureRecord]) -> Result<usize> {
        if failures.is_empty() {
            return Ok(0);
        }

        debug!(
            "写入失败记录: 批次 {} | {} 条 -> {}",
            batch_id,
            failures.len(),
            self.failure_file_path
        );

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.failure_file_path)?;

        for failure in failures {
            let kind = failure.kind.map(|k| k.as_str()).unwrap_or("unknown");
            let line = format!(
                "批次 {} | 文档 {} | {} | 尝试 {} 次 | {}\n",
                batch_id,
                failure.id,
                kind,
                failure.attempts,
                failure.error.replace('\n', " ")
            );
            file.write_all(line.as_bytes())?;
        }

        Ok(failures.len())
    }
}

impl Default for FailureWriter {
    fn default() -> Self {
        Self::with_path("failed.txt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_appends_one_line_per_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("failed.txt");
        let writer = FailureWriter::with_path(path.to_string_lossy());

        let failures = vec![
            FailureRecord {
                id: "a.pdf".to_string(),
                kind: Some(ErrorKind::Permanent),
                attempts: 1,
                error: "401\nunauthorized".to_string(),
            },
            FailureRecord {
                id: "b.pdf".to_string(),
                kind: Some(ErrorKind::Transient),
                attempts: 3,
                error: "timeout".to_string(),
            },
        ];

        assert_eq!(writer.write("b1", &failures).unwrap(), 2);
        assert_eq!(writer.write("b2", &failures[..1]).unwrap(), 1);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "批次 b1 | 文档 a.pdf | permanent | 尝试 1 次 | 401 unauthorized");
        assert!(lines[1].contains("transient | 尝试 3 次"));
    }

    #[test]
    fn test_no_failures_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("failed.txt");
        let writer = FailureWriter::with_path(path.to_string_lossy());
        assert_eq!(writer.write("b1", &[]).unwrap(), 0);
        assert!(!path.exists());
    }
}
