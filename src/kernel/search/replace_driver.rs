//! 多文件替换：启动外部替换服务，折叠其流式回报

use crate::kernel::services::ports::{Matcher, PathError, PathReplacer, ProjectMessage, TaskHandle};
use std::path::PathBuf;
use std::sync::mpsc::SyncSender;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceProgress {
    PathReplaced { path: PathBuf, replacements: usize },
    Error(PathError),
    Finished,
}

#[derive(Debug, Default)]
pub struct MultiFileReplaceDriver {
    replaced_path_count: usize,
    replacement_count: usize,
    replacement_errors: Vec<PathError>,
    task: Option<TaskHandle>,
}

impl MultiFileReplaceDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// 启动一次替换；仍在进行的上一次替换会被取消
    pub fn start(
        &mut self,
        replacer: &dyn PathReplacer,
        matcher: &Matcher,
        replacement: &str,
        expand_references: bool,
        paths: Vec<PathBuf>,
        tx: SyncSender<ProjectMessage>,
    ) -> u64 {
        if let Some(task) = self.task.take() {
            debug!(task_id = task.id(), "replace superseded");
            task.cancel();
        }
        self.replaced_path_count = 0;
        self.replacement_count = 0;
        self.replacement_errors.clear();

        let path_count = paths.len();
        let task = replacer.replace_paths(matcher, replacement, expand_references, paths, tx);
        let task_id = task.id();
        info!(task_id, paths = path_count, "project replace started");
        self.task = Some(task);
        task_id
    }

    pub fn task_id(&self) -> Option<u64> {
        self.task.as_ref().map(TaskHandle::id)
    }

    pub fn is_replacing(&self) -> bool {
        self.task.is_some()
    }

    /// 折叠一条替换回报；不属于当前替换任务的消息返回 None
    pub fn apply_message(&mut self, msg: ProjectMessage) -> Option<ReplaceProgress> {
        if self.task_id() != Some(msg.task_id()) {
            return None;
        }

        match msg {
            ProjectMessage::PathReplaced {
                path, replacements, ..
            } => {
                if replacements > 0 {
                    self.replaced_path_count += 1;
                    self.replacement_count += replacements;
                }
                Some(ReplaceProgress::PathReplaced { path, replacements })
            }
            ProjectMessage::ReplaceError { error, .. } => {
                self.replacement_errors.push(error.clone());
                Some(ReplaceProgress::Error(error))
            }
            ProjectMessage::ReplaceComplete { task_id } => {
                info!(
                    task_id,
                    paths = self.replaced_path_count,
                    replacements = self.replacement_count,
                    errors = self.replacement_errors.len(),
                    "project replace finished"
                );
                self.task = None;
                Some(ReplaceProgress::Finished)
            }
            _ => None,
        }
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            info!(task_id = task.id(), "project replace cancelled");
            task.cancel();
        }
    }

    /// 取消进行中的替换并清空计数
    pub fn clear(&mut self) {
        self.cancel();
        self.replaced_path_count = 0;
        self.replacement_count = 0;
        self.replacement_errors.clear();
    }

    pub fn replaced_path_count(&self) -> usize {
        self.replaced_path_count
    }

    pub fn replacement_count(&self) -> usize {
        self.replacement_count
    }

    pub fn replacement_errors(&self) -> &[PathError] {
        &self.replacement_errors
    }
}

#[cfg(test)]
#[path = "../../../tests/unit/kernel/search/replace_driver.rs"]
mod tests;
