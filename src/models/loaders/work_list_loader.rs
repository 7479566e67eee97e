use crate::error::{AppResult, WorkListError};
use crate::models::content_type::content_type_for;
use crate::models::work_item::{InputRef, WorkRecord};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

#[derive(Deserialize)]
struct WorkListFile {
    items: Vec<WorkRecord>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonWorkList {
    List(Vec<WorkRecord>),
    Wrapped(WorkListFile),
}

/// 从 JSON 或 TOML 文件加载工作清单
///
/// JSON 可以是记录数组，也可以是 `{ "items": [...] }`；
/// TOML 使用 `[[items]]` 表数组。
pub async fn load_work_list(path: &Path) -> AppResult<Vec<WorkRecord>> {
    let path_str = path.display().to_string();
    let content = fs::read_to_string(path)
        .await
        .map_err(|source| WorkListError::ReadFailed {
            path: path_str.clone(),
            source,
        })?;

    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase());

    let records = match ext.as_deref() {
        Some("json") => match serde_json::from_str::<JsonWorkList>(&content) {
            Ok(JsonWorkList::List(items)) => items,
            Ok(JsonWorkList::Wrapped(file)) => file.items,
            Err(e) => {
                return Err(WorkListError::ParseFailed {
                    path: path_str,
                    message: e.to_string(),
                }
                .into())
            }
        },
        Some("toml") => {
            toml::from_str::<WorkListFile>(&content)
                .map_err(|e| WorkListError::ParseFailed {
                    path: path_str.clone(),
                    message: e.to_string(),
                })?
                .items
        }
        _ => return Err(WorkListError::UnsupportedFormat(path_str).into()),
    };

    info!("✓ 从 {} 加载了 {} 条记录", path_str, records.len());
    Ok(records)
}

/// 扫描目录（递归），为每个文件生成一条待处理记录
///
/// 以 `.` 开头的隐藏文件除外。记录标识是相对路径，按路径排序。
pub async fn inventory_folder(folder: &Path) -> AppResult<Vec<WorkRecord>> {
    if !folder.is_dir() {
        return Err(WorkListError::DirectoryNotFound(folder.display().to_string()).into());
    }

    let mut files: Vec<(PathBuf, u64)> = Vec::new();
    let mut pending_dirs = vec![folder.to_path_buf()];

    while let Some(dir) = pending_dirs.pop() {
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|source| WorkListError::ReadFailed {
                path: dir.display().to_string(),
                source,
            })?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| WorkListError::ReadFailed {
                path: dir.display().to_string(),
                source,
            })?
        {
            let path = entry.path();
            let Ok(meta) = entry.metadata().await else {
                debug!("无法读取元数据，跳过: {}", path.display());
                continue;
            };
            if meta.is_dir() {
                pending_dirs.push(path);
            } else if meta.is_file() {
                let hidden_but_known = crate::models::content_type::is_scanner_junk(&path);
                let hidden = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with('.'))
                    .unwrap_or(false);
                if hidden && !hidden_but_known {
                    continue;
                }
                files.push((path, meta.len()));
            }
        }
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));

    let records = files
        .into_iter()
        .map(|(path, size)| {
            let id = path
                .strip_prefix(folder)
                .unwrap_or(&path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            let input = InputRef {
                content_type: content_type_for(&path).map(str::to_string),
                byte_size: Some(size),
                path,
            };
            WorkRecord::new(id, input)
        })
        .collect::<Vec<_>>();

    info!("✓ 在 {} 中找到 {} 个文件", folder.display(), records.len());
    Ok(records)
}
