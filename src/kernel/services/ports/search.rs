use super::pattern::{CompileOptions, Matcher, PatternCompiler, PatternError};
use crate::models::Range;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::SyncSender;
use std::sync::Arc;

/// 单个路径上的扫描/替换失败，不会中断其余路径
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathError {
    pub path: PathBuf,
    pub message: String,
}

impl PathError {
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn from_io(path: impl Into<PathBuf>, err: &io::Error) -> Self {
        Self::new(path, err.to_string())
    }
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

// ==================== 查找选项 ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OptionField {
    FindPattern,
    ReplacePattern,
    UseRegex,
    CaseSensitive,
    WholeWord,
    InCurrentSelection,
    UseFunction,
    PathsPattern,
}

impl OptionField {
    pub fn name(&self) -> &'static str {
        match self {
            OptionField::FindPattern => "findPattern",
            OptionField::ReplacePattern => "replacePattern",
            OptionField::UseRegex => "useRegex",
            OptionField::CaseSensitive => "caseSensitive",
            OptionField::WholeWord => "wholeWord",
            OptionField::InCurrentSelection => "inCurrentSelection",
            OptionField::UseFunction => "useFunction",
            OptionField::PathsPattern => "pathsPattern",
        }
    }

    /// 改变这些字段会让当前匹配集失效
    pub fn invalidates_matches(&self) -> bool {
        matches!(
            self,
            OptionField::FindPattern
                | OptionField::UseRegex
                | OptionField::WholeWord
                | OptionField::CaseSensitive
                | OptionField::InCurrentSelection
        )
    }
}

impl fmt::Display for OptionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FindOptions {
    pub find_pattern: String,
    pub replace_pattern: String,
    pub use_regex: bool,
    pub case_sensitive: bool,
    pub whole_word: bool,
    pub in_current_selection: bool,
    pub use_function: bool,
    pub paths_pattern: String,
}

impl FindOptions {
    pub fn new(find_pattern: impl Into<String>) -> Self {
        Self {
            find_pattern: find_pattern.into(),
            ..Self::default()
        }
    }

    pub fn changed_fields(&self, other: &FindOptions) -> Vec<OptionField> {
        let mut changed = Vec::new();
        if self.find_pattern != other.find_pattern {
            changed.push(OptionField::FindPattern);
        }
        if self.replace_pattern != other.replace_pattern {
            changed.push(OptionField::ReplacePattern);
        }
        if self.use_regex != other.use_regex {
            changed.push(OptionField::UseRegex);
        }
        if self.case_sensitive != other.case_sensitive {
            changed.push(OptionField::CaseSensitive);
        }
        if self.whole_word != other.whole_word {
            changed.push(OptionField::WholeWord);
        }
        if self.in_current_selection != other.in_current_selection {
            changed.push(OptionField::InCurrentSelection);
        }
        if self.use_function != other.use_function {
            changed.push(OptionField::UseFunction);
        }
        if self.paths_pattern != other.paths_pattern {
            changed.push(OptionField::PathsPattern);
        }
        changed
    }

    /// 整体替换选项，返回实际发生变化的字段
    pub fn set(&mut self, next: FindOptions) -> Vec<OptionField> {
        let changed = self.changed_fields(&next);
        *self = next;
        changed
    }

    /// 替换文本是否展开 `$1` 等引用
    pub fn expands_references(&self) -> bool {
        self.use_regex || self.use_function
    }

    /// pathsPattern 按逗号拆分并去空白
    pub fn path_globs(&self) -> Vec<String> {
        split_paths_pattern(&self.paths_pattern)
    }

    pub fn compile(&self, size_limit: usize) -> std::result::Result<Matcher, PatternError> {
        PatternCompiler::compile(
            &self.find_pattern,
            &CompileOptions {
                use_regex: self.use_regex,
                case_sensitive: self.case_sensitive,
                whole_word: self.whole_word,
                unicode: true,
                size_limit,
            },
        )
    }
}

pub fn split_paths_pattern(paths_pattern: &str) -> Vec<String> {
    paths_pattern
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

// ==================== 匹配结果 ====================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub range: Range,
    pub match_text: String,
    pub line_text: String,
    pub line_text_offset: usize,
    pub leading_context_lines: Vec<String>,
    pub trailing_context_lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathResult {
    pub file_path: PathBuf,
    pub matches: Vec<Match>,
}

impl PathResult {
    pub fn new(file_path: impl Into<PathBuf>, matches: Vec<Match>) -> Self {
        Self {
            file_path: file_path.into(),
            matches,
        }
    }

    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSummary {
    pub find_pattern: String,
    pub replace_pattern: String,
    pub path_count: usize,
    pub match_count: usize,
    pub search_errors: Vec<PathError>,
    pub replaced_path_count: usize,
    pub replacement_count: usize,
    pub replacement_errors: Vec<PathError>,
}

// ==================== 外部服务契约 ====================

static TASK_ID: AtomicU64 = AtomicU64::new(1);

fn next_task_id() -> u64 {
    TASK_ID.fetch_add(1, Ordering::Relaxed)
}

/// 后台任务句柄：id 用于过滤过期消息，cancelled 标志通知后台停止
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: u64,
    cancelled: Arc<AtomicBool>,
}

impl TaskHandle {
    pub fn new() -> Self {
        Self {
            id: next_task_id(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn cancelled_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }
}

impl Default for TaskHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSearchOptions {
    pub paths: Vec<String>,
    pub leading_context_line_count: usize,
    pub trailing_context_line_count: usize,
}

/// 后台服务流式回报给结果模型的消息，均带任务 id
#[derive(Debug, Clone)]
pub enum ProjectMessage {
    /// `result` 为 None 表示该路径没有匹配
    PathResult {
        task_id: u64,
        path: PathBuf,
        result: Option<PathResult>,
    },
    PathError {
        task_id: u64,
        error: PathError,
    },
    PathsSearched {
        task_id: u64,
        count: usize,
    },
    SearchComplete {
        task_id: u64,
    },
    SearchCancelled {
        task_id: u64,
    },
    PathReplaced {
        task_id: u64,
        path: PathBuf,
        replacements: usize,
    },
    ReplaceError {
        task_id: u64,
        error: PathError,
    },
    ReplaceComplete {
        task_id: u64,
    },
}

impl ProjectMessage {
    pub fn task_id(&self) -> u64 {
        match self {
            ProjectMessage::PathResult { task_id, .. }
            | ProjectMessage::PathError { task_id, .. }
            | ProjectMessage::PathsSearched { task_id, .. }
            | ProjectMessage::SearchComplete { task_id }
            | ProjectMessage::SearchCancelled { task_id }
            | ProjectMessage::PathReplaced { task_id, .. }
            | ProjectMessage::ReplaceError { task_id, .. }
            | ProjectMessage::ReplaceComplete { task_id } => *task_id,
        }
    }
}

/// 按路径扫描的外部服务
pub trait PathScanner {
    fn search_paths(
        &self,
        matcher: &Matcher,
        options: PathSearchOptions,
        tx: SyncSender<ProjectMessage>,
    ) -> TaskHandle;
}

/// 按路径替换的外部服务
pub trait PathReplacer {
    fn replace_paths(
        &self,
        matcher: &Matcher,
        replacement: &str,
        expand_references: bool,
        paths: Vec<PathBuf>,
        tx: SyncSender<ProjectMessage>,
    ) -> TaskHandle;
}
