//! 按路径扫描服务
//!
//! - 使用 ignore crate 的并行遍历，自动利用多核，尊重 .gitignore
//! - pathsPattern 拆分后的每一项作为白名单 glob
//! - 每个命中的文件单独回报一条 PathResult，单个文件出错只回报 PathError

use super::{is_likely_binary, read_text_file};
use crate::kernel::services::ports::{
    FindConfig, Matcher, PathError, PathResult, PathScanner, PathSearchOptions, ProjectMessage,
    TaskHandle,
};
use ignore::overrides::{Override, OverrideBuilder};
use ignore::{WalkBuilder, WalkState};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::SyncSender;
use std::sync::Arc;

const PROGRESS_INTERVAL: usize = 100;

pub struct PathSearchService {
    runtime: tokio::runtime::Handle,
    root: PathBuf,
    config: FindConfig,
}

impl PathSearchService {
    pub fn new(runtime: tokio::runtime::Handle, root: PathBuf, config: FindConfig) -> Self {
        let root = root.canonicalize().unwrap_or(root);
        Self {
            runtime,
            root,
            config,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl PathScanner for PathSearchService {
    fn search_paths(
        &self,
        matcher: &Matcher,
        options: PathSearchOptions,
        tx: SyncSender<ProjectMessage>,
    ) -> TaskHandle {
        let task = TaskHandle::new();
        let task_id = task.id();
        let cancelled = task.cancelled_flag();
        let matcher = matcher.clone();
        let root = self.root.clone();
        let config = self.config.clone();

        self.runtime.spawn(async move {
            let cancelled_for_blocking = cancelled.clone();
            let tx_for_blocking = tx.clone();
            let result = tokio::task::spawn_blocking(move || {
                search_paths_parallel(
                    &root,
                    &matcher,
                    &options,
                    &config,
                    task_id,
                    &cancelled_for_blocking,
                    &tx_for_blocking,
                )
            })
            .await;

            if let Err(e) = result {
                if cancelled.load(Ordering::Relaxed) {
                    let _ = tx.send(ProjectMessage::SearchCancelled { task_id });
                } else {
                    tracing::error!(task_id, error = %e, "path search task failed");
                    let _ = tx.send(ProjectMessage::SearchComplete { task_id });
                }
            }
        });

        task
    }
}

fn build_overrides(root: &Path, paths: &[String]) -> Result<Override, ignore::Error> {
    let mut builder = OverrideBuilder::new(root);
    for path in paths {
        let trimmed = path.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            continue;
        }
        builder.add(trimmed)?;
        if !trimmed.contains(['*', '?', '[', '{']) {
            // 普通目录名同时匹配其下所有文件
            builder.add(&format!("{}/**", trimmed))?;
        }
    }
    builder.build()
}

fn search_paths_parallel(
    root: &Path,
    matcher: &Matcher,
    options: &PathSearchOptions,
    config: &FindConfig,
    task_id: u64,
    cancelled: &AtomicBool,
    tx: &SyncSender<ProjectMessage>,
) {
    let paths_searched = Arc::new(AtomicUsize::new(0));

    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(!config.include_hidden)
        .follow_links(config.follow_symlinks)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true);

    if !options.paths.is_empty() {
        match build_overrides(root, &options.paths) {
            Ok(overrides) => {
                builder.overrides(overrides);
            }
            Err(e) => {
                tracing::warn!(task_id, error = %e, "invalid paths pattern");
                let _ = tx.send(ProjectMessage::PathError {
                    task_id,
                    error: PathError::new(root, format!("Invalid paths pattern: {}", e)),
                });
                // 过滤条件无效时不回退成全量扫描
                let _ = tx.send(ProjectMessage::SearchComplete { task_id });
                return;
            }
        }
    }

    builder.build_parallel().run(|| {
        let matcher = matcher.clone();
        let tx = tx.clone();
        let paths_searched = paths_searched.clone();

        Box::new(move |entry| {
            if cancelled.load(Ordering::Relaxed) {
                return WalkState::Quit;
            }

            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    let _ = tx.send(ProjectMessage::PathError {
                        task_id,
                        error: PathError::new(root, e.to_string()),
                    });
                    return WalkState::Continue;
                }
            };

            let path = entry.path();
            if !path.is_file() {
                return WalkState::Continue;
            }

            let outcome = search_file(path, &matcher, options, config);
            if cancelled.load(Ordering::Relaxed) {
                return WalkState::Quit;
            }

            match outcome {
                Ok(Some(result)) => {
                    let _ = tx.send(ProjectMessage::PathResult {
                        task_id,
                        path: path.to_path_buf(),
                        result: Some(result),
                    });
                }
                Ok(None) => {}
                Err(error) => {
                    let _ = tx.send(ProjectMessage::PathError { task_id, error });
                }
            }

            let searched = paths_searched.fetch_add(1, Ordering::Relaxed) + 1;
            if searched % PROGRESS_INTERVAL == 0 {
                let _ = tx.send(ProjectMessage::PathsSearched {
                    task_id,
                    count: searched,
                });
            }

            WalkState::Continue
        })
    });

    if cancelled.load(Ordering::Relaxed) {
        let _ = tx.send(ProjectMessage::SearchCancelled { task_id });
        return;
    }

    let _ = tx.send(ProjectMessage::PathsSearched {
        task_id,
        count: paths_searched.load(Ordering::Relaxed),
    });
    let _ = tx.send(ProjectMessage::SearchComplete { task_id });
}

fn search_file(
    path: &Path,
    matcher: &Matcher,
    options: &PathSearchOptions,
    config: &FindConfig,
) -> Result<Option<PathResult>, PathError> {
    let bytes = read_text_file(path, config.max_file_size)?;
    if bytes.is_empty() || is_likely_binary(&bytes) {
        return Ok(None);
    }
    let Ok(text) = std::str::from_utf8(&bytes) else {
        return Ok(None);
    };

    let matches = matcher.scan_text(
        text,
        options.leading_context_line_count,
        options.trailing_context_line_count,
    );
    if matches.is_empty() {
        return Ok(None);
    }
    Ok(Some(PathResult::new(path, matches)))
}

#[cfg(test)]
#[path = "../../../../../tests/unit/kernel/services/adapters/search/global.rs"]
mod tests;
