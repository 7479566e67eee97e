//! 检查点存储 - 基础设施层
//!
//! 按批次标识保存最新的检查点。文件存储先写临时文件再原子替换，
//! 写入失败时上一份检查点保持完好。

use crate::error::{AppResult, CheckpointError};
use crate::models::checkpoint::Checkpoint;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// 检查点存储接口
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// 读取批次的检查点，不存在时返回 `None`
    async fn load(&self, batch_id: &str) -> AppResult<Option<Checkpoint>>;

    /// 保存检查点，覆盖同一批次的旧检查点
    async fn save(&self, checkpoint: &Checkpoint) -> AppResult<()>;
}

/// 基于文件的检查点存储
///
/// 文件位置：`<dir>/<batch_id>.checkpoint.json`
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// 批次对应的检查点文件路径
    pub fn path_for(&self, batch_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.checkpoint.json", sanitize_batch_id(batch_id)))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, batch_id: &str) -> AppResult<Option<Checkpoint>> {
        let path = self.path_for(batch_id);
        let path_str = path.display().to_string();

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CheckpointError::ReadFailed {
                    path: path_str,
                    source,
                }
                .into())
            }
        };

        let checkpoint = Checkpoint::from_json(&path_str, &bytes)?;
        if checkpoint.batch_id != batch_id {
            return Err(CheckpointError::BatchMismatch {
                expected: batch_id.to_string(),
                found: checkpoint.batch_id,
            }
            .into());
        }

        debug!("已读取检查点: {} ({} 个文档)", path_str, checkpoint.items.len());
        Ok(Some(checkpoint))
    }

    async fn save(&self, checkpoint: &Checkpoint) -> AppResult<()> {
        let path = self.path_for(&checkpoint.batch_id);
        let tmp_path = path.with_extension("json.tmp");
        let bytes = checkpoint.to_json()?;

        let write_failed = |source: std::io::Error| CheckpointError::WriteFailed {
            path: tmp_path.display().to_string(),
            source,
        };

        fs::create_dir_all(&self.dir).await.map_err(write_failed)?;

        let mut file = fs::File::create(&tmp_path).await.map_err(write_failed)?;
        file.write_all(&bytes).await.map_err(write_failed)?;
        file.sync_all().await.map_err(write_failed)?;
        drop(file);

        fs::rename(&tmp_path, &path)
            .await
            .map_err(|source| CheckpointError::WriteFailed {
                path: path.display().to_string(),
                source,
            })?;

        debug!("已写入检查点: {}", path.display());
        Ok(())
    }
}

/// 批次标识中只保留文件名安全的字符
fn sanitize_batch_id(batch_id: &str) -> String {
    batch_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::batch_run::{BatchConfig, BatchRun};
    use crate::models::work_item::{InputRef, WorkRecord};

    fn sample_checkpoint(batch_id: &str) -> Checkpoint {
        let records = vec![
            WorkRecord::new("a", InputRef::new("a.png")),
            WorkRecord::new("b", InputRef::new("b.png")),
        ];
        let mut run = BatchRun::new(batch_id, records, BatchConfig::default()).unwrap();
        run.record_success(0, serde_json::json!({"tipo": "poder"}), 1, chrono::Utc::now());
        Checkpoint::snapshot(&run)
    }

    #[tokio::test]
    async fn test_missing_checkpoint_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        assert!(store.load("nothing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("nested"));
        let checkpoint = sample_checkpoint("lote 2024/03");

        store.save(&checkpoint).await.unwrap();
        let loaded = store.load("lote 2024/03").await.unwrap().unwrap();
        assert_eq!(loaded, checkpoint);

        let path = store.path_for("lote 2024/03");
        assert!(path.ends_with("lote_2024_03.checkpoint.json"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_save_replaces_previous_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());

        let mut checkpoint = sample_checkpoint("b1");
        store.save(&checkpoint).await.unwrap();
        checkpoint.items.truncate(1);
        store.save(&checkpoint).await.unwrap();

        let loaded = store.load("b1").await.unwrap().unwrap();
        assert_eq!(loaded.items.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        std::fs::write(store.path_for("b1"), b"{ truncated").unwrap();

        let err = store.load("b1").await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::AppError::Checkpoint(CheckpointError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn test_batch_mismatch_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let checkpoint = sample_checkpoint("a:b");
        store.save(&checkpoint).await.unwrap();

        // "a:b" 与 "a_b" 映射到同一个文件
        let err = store.load("a_b").await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::AppError::Checkpoint(CheckpointError::BatchMismatch { .. })
        ));
    }
}
