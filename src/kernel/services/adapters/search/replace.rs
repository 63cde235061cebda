//! 按路径替换服务
//!
//! 逐个文件读入、整体替换后写回；单个文件失败回报 ReplaceError，继续处理其余文件

use super::{is_likely_binary, read_text_file};
use crate::kernel::services::ports::{
    FindConfig, Matcher, PathError, PathReplacer, ProjectMessage, TaskHandle,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::SyncSender;

pub struct PathReplaceService {
    runtime: tokio::runtime::Handle,
    config: FindConfig,
}

impl PathReplaceService {
    pub fn new(runtime: tokio::runtime::Handle, config: FindConfig) -> Self {
        Self { runtime, config }
    }
}

impl PathReplacer for PathReplaceService {
    fn replace_paths(
        &self,
        matcher: &Matcher,
        replacement: &str,
        expand_references: bool,
        paths: Vec<PathBuf>,
        tx: SyncSender<ProjectMessage>,
    ) -> TaskHandle {
        let task = TaskHandle::new();
        let task_id = task.id();
        let cancelled = task.cancelled_flag();
        let matcher = matcher.clone();
        let replacement = replacement.to_string();
        let max_file_size = self.config.max_file_size;

        self.runtime.spawn(async move {
            let tx_for_blocking = tx.clone();
            let result = tokio::task::spawn_blocking(move || {
                replace_paths_sync(
                    &paths,
                    &matcher,
                    &replacement,
                    expand_references,
                    max_file_size,
                    task_id,
                    &cancelled,
                    &tx_for_blocking,
                )
            })
            .await;

            if let Err(e) = result {
                tracing::error!(task_id, error = %e, "path replace task failed");
                let _ = tx.send(ProjectMessage::ReplaceComplete { task_id });
            }
        });

        task
    }
}

#[allow(clippy::too_many_arguments)]
fn replace_paths_sync(
    paths: &[PathBuf],
    matcher: &Matcher,
    replacement: &str,
    expand_references: bool,
    max_file_size: u64,
    task_id: u64,
    cancelled: &AtomicBool,
    tx: &SyncSender<ProjectMessage>,
) {
    for path in paths {
        if cancelled.load(Ordering::Relaxed) {
            break;
        }

        match replace_in_file(path, matcher, replacement, expand_references, max_file_size) {
            Ok(0) => {}
            Ok(replacements) => {
                let _ = tx.send(ProjectMessage::PathReplaced {
                    task_id,
                    path: path.clone(),
                    replacements,
                });
            }
            Err(error) => {
                let _ = tx.send(ProjectMessage::ReplaceError { task_id, error });
            }
        }
    }

    let _ = tx.send(ProjectMessage::ReplaceComplete { task_id });
}

fn replace_in_file(
    path: &Path,
    matcher: &Matcher,
    replacement: &str,
    expand_references: bool,
    max_file_size: u64,
) -> Result<usize, PathError> {
    let bytes = read_text_file(path, max_file_size)?;
    if is_likely_binary(&bytes) {
        return Ok(0);
    }
    let text = std::str::from_utf8(&bytes)
        .map_err(|_| PathError::new(path, "File is not valid UTF-8"))?;

    let (replaced, count) = matcher.replace_all(text, replacement, expand_references);
    if count > 0 {
        std::fs::write(path, replaced).map_err(|e| PathError::from_io(path, &e))?;
    }
    Ok(count)
}

#[cfg(test)]
#[path = "../../../../../tests/unit/kernel/services/adapters/search/replace.rs"]
mod tests;
