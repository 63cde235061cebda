//! 项目范围的查找结果
//!
//! - 路径按字节序有序保存，增删用二分定位，事件携带下标供视图局部更新
//! - 同一时刻最多一个进行中的搜索；后台消息带任务 id，过期任务的消息直接丢弃
//! - 所有状态变更都在 `apply_message` 中同步完成

use super::replace_driver::{MultiFileReplaceDriver, ReplaceProgress};
use crate::kernel::bus::{EventBus, EventReceiver};
use crate::kernel::services::ports::{
    unescape_escape_sequence, FindConfig, FindOptions, Matcher, PathError, PathReplacer,
    PathResult, PathScanner, PathSearchOptions, PatternError, ProjectMessage, SearchSummary,
    TaskHandle,
};
use crate::kernel::util::{insert_sorted, sorted_insert_index};
use crate::models::TextBuffer;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Idle,
    Searching,
    Finished,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultIndex {
    Inserted(usize),
    Updated(usize),
}

impl ResultIndex {
    pub fn index(&self) -> usize {
        match self {
            ResultIndex::Inserted(i) | ResultIndex::Updated(i) => *i,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResultEvent {
    DidAddResult {
        file_path: PathBuf,
        result: PathResult,
        index: ResultIndex,
    },
    DidRemoveResult {
        file_path: PathBuf,
        removed_index: usize,
    },
    DidStartSearching,
    DidCancelSearching,
    DidFinishSearching(SearchSummary),
    DidStartReplacing,
    DidFinishReplacing(SearchSummary),
    DidReplacePath {
        file_path: PathBuf,
        replacements: usize,
    },
    DidErrorForPath(PathError),
    DidClear(SearchSummary),
    DidNoopSearch,
    DidSearchPaths(usize),
    DidError(PatternError),
}

/// 搜索/替换句柄的最终结果
#[derive(Debug, Clone, PartialEq)]
pub enum SearchCompletion {
    Finished(SearchSummary),
    Cancelled,
    /// 模式未变化，没有重新搜索
    Skipped,
    /// 空模式：清空结果，不搜索
    Cleared,
    InvalidPattern(PatternError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchRequest {
    pub only_run_if_changed: bool,
    pub keep_replacement_state: bool,
}

/// `search` / `replace` 返回的句柄，可 await，也可用 `try_result` 轮询
#[derive(Debug)]
pub struct SearchHandle {
    rx: oneshot::Receiver<SearchCompletion>,
    completion: Option<SearchCompletion>,
}

impl SearchHandle {
    fn pending() -> (oneshot::Sender<SearchCompletion>, Self) {
        let (tx, rx) = oneshot::channel();
        (
            tx,
            Self {
                rx,
                completion: None,
            },
        )
    }

    fn ready(completion: SearchCompletion) -> Self {
        let (_, rx) = oneshot::channel();
        Self {
            rx,
            completion: Some(completion),
        }
    }

    /// 尚未结束时返回 None；发送端被丢弃视为取消
    pub fn try_result(&mut self) -> Option<SearchCompletion> {
        if self.completion.is_none() {
            match self.rx.try_recv() {
                Ok(completion) => self.completion = Some(completion),
                Err(oneshot::error::TryRecvError::Empty) => return None,
                Err(oneshot::error::TryRecvError::Closed) => {
                    self.completion = Some(SearchCompletion::Cancelled)
                }
            }
        }
        self.completion.clone()
    }
}

impl Future for SearchHandle {
    type Output = SearchCompletion;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(completion) = &this.completion {
            return Poll::Ready(completion.clone());
        }
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(result) => {
                let completion = result.unwrap_or(SearchCompletion::Cancelled);
                this.completion = Some(completion.clone());
                Poll::Ready(completion)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

struct ActiveSearch {
    task: TaskHandle,
    done: oneshot::Sender<SearchCompletion>,
}

fn compare_paths(a: &PathBuf, b: &PathBuf) -> Ordering {
    a.as_os_str().cmp(b.as_os_str())
}

pub struct ResultAggregator {
    scanner: Box<dyn PathScanner>,
    replacer: Box<dyn PathReplacer>,
    config: FindConfig,
    options: FindOptions,
    matcher: Option<Matcher>,
    tx: SyncSender<ProjectMessage>,
    rx: Receiver<ProjectMessage>,

    results: FxHashMap<PathBuf, PathResult>,
    paths: Vec<PathBuf>,
    path_count: usize,
    match_count: usize,
    search_errors: Vec<PathError>,
    paths_searched: usize,

    replace_driver: MultiFileReplaceDriver,
    pending_replace: Option<oneshot::Sender<SearchCompletion>>,

    active: bool,
    last_find_pattern: Option<String>,
    last_paths_pattern: Option<String>,
    search: Option<ActiveSearch>,
    search_state: SearchState,
    events: EventBus<ResultEvent>,
}

impl ResultAggregator {
    pub fn new(
        scanner: Box<dyn PathScanner>,
        replacer: Box<dyn PathReplacer>,
        config: FindConfig,
    ) -> Self {
        let (tx, rx) = mpsc::sync_channel(CHANNEL_CAPACITY);
        Self {
            scanner,
            replacer,
            config,
            options: FindOptions::default(),
            matcher: None,
            tx,
            rx,
            results: FxHashMap::default(),
            paths: Vec::new(),
            path_count: 0,
            match_count: 0,
            search_errors: Vec::new(),
            paths_searched: 0,
            replace_driver: MultiFileReplaceDriver::new(),
            pending_replace: None,
            active: false,
            last_find_pattern: None,
            last_paths_pattern: None,
            search: None,
            search_state: SearchState::Idle,
            events: EventBus::new(),
        }
    }

    pub fn subscribe(&mut self) -> EventReceiver<ResultEvent> {
        self.events.subscribe()
    }

    // ==================== 搜索 ====================

    pub fn search(&mut self, options: FindOptions, request: SearchRequest) -> SearchHandle {
        if request.only_run_if_changed
            && self.last_find_pattern.as_deref() == Some(options.find_pattern.as_str())
            && self.last_paths_pattern.as_deref() == Some(options.paths_pattern.as_str())
        {
            debug!(pattern = %options.find_pattern, "search skipped, pattern unchanged");
            self.events.emit(ResultEvent::DidNoopSearch);
            return SearchHandle::ready(SearchCompletion::Skipped);
        }

        if options.find_pattern.is_empty() {
            self.options = options;
            self.clear();
            return SearchHandle::ready(SearchCompletion::Cleared);
        }

        // 先编译，失败时保留上一次的选项、matcher 与结果
        let matcher = match options.compile(self.config.regex_size_limit) {
            Ok(matcher) => matcher,
            Err(error) => {
                warn!(pattern = %options.find_pattern, error = %error, "invalid find pattern");
                self.events.emit(ResultEvent::DidError(error.clone()));
                return SearchHandle::ready(SearchCompletion::InvalidPattern(error));
            }
        };

        if request.keep_replacement_state {
            self.clear_search_state();
        } else {
            self.clear();
        }

        self.last_find_pattern = Some(options.find_pattern.clone());
        self.last_paths_pattern = Some(options.paths_pattern.clone());
        self.options = options;
        self.active = true;

        let search_options = PathSearchOptions {
            paths: self.options.path_globs(),
            leading_context_line_count: self.config.leading_context_line_count,
            trailing_context_line_count: self.config.trailing_context_line_count,
        };
        let task = self
            .scanner
            .search_paths(&matcher, search_options, self.tx.clone());
        self.matcher = Some(matcher);

        info!(
            task_id = task.id(),
            pattern = %self.options.find_pattern,
            paths = %self.options.paths_pattern,
            "project search started"
        );
        let (done, handle) = SearchHandle::pending();
        self.search = Some(ActiveSearch { task, done });
        self.search_state = SearchState::Searching;
        self.events.emit(ResultEvent::DidStartSearching);
        handle
    }

    /// 取消进行中的搜索并清空结果，保留替换计数
    pub fn clear_search_state(&mut self) {
        let cancelled = self.cancel_search();
        self.results.clear();
        self.paths.clear();
        self.path_count = 0;
        self.match_count = 0;
        self.search_errors.clear();
        self.paths_searched = 0;
        self.matcher = None;
        self.active = false;
        if !cancelled {
            self.search_state = SearchState::Idle;
        }
    }

    /// 清空全部状态，包括替换计数与上一次的模式
    pub fn clear(&mut self) {
        self.clear_search_state();
        self.replace_driver.clear();
        if let Some(done) = self.pending_replace.take() {
            let _ = done.send(SearchCompletion::Cancelled);
        }
        self.last_find_pattern = None;
        self.last_paths_pattern = None;
        let summary = self.summary();
        self.events.emit(ResultEvent::DidClear(summary));
    }

    fn cancel_search(&mut self) -> bool {
        let Some(search) = self.search.take() else {
            return false;
        };
        search.task.cancel();
        let _ = search.done.send(SearchCompletion::Cancelled);
        info!(task_id = search.task.id(), "project search cancelled");
        self.search_state = SearchState::Cancelled;
        self.events.emit(ResultEvent::DidCancelSearching);
        true
    }

    fn finish_search(&mut self) {
        let Some(search) = self.search.take() else {
            return;
        };
        self.search_state = SearchState::Finished;
        let summary = self.summary();
        info!(
            task_id = search.task.id(),
            paths = self.path_count,
            matches = self.match_count,
            errors = self.search_errors.len(),
            "project search finished"
        );
        let _ = search.done.send(SearchCompletion::Finished(summary.clone()));
        if let Some(done) = self.pending_replace.take() {
            let _ = done.send(SearchCompletion::Finished(summary.clone()));
        }
        self.events.emit(ResultEvent::DidFinishSearching(summary));
    }

    // ==================== 结果增删 ====================

    /// 唯一的结果写入口：非空结果添加或更新，否则移除
    pub fn set_result(&mut self, file_path: PathBuf, result: Option<PathResult>) {
        match result {
            Some(result) if !result.is_empty() => self.add_result(file_path, result),
            _ => {
                self.remove_result(&file_path);
            }
        }
    }

    pub fn add_result(&mut self, file_path: PathBuf, result: PathResult) {
        let added = result.match_count();
        let index = match self.results.insert(file_path.clone(), result.clone()) {
            Some(previous) => {
                self.match_count -= previous.match_count();
                match sorted_insert_index(&self.paths, &file_path, compare_paths) {
                    Ok(i) => ResultIndex::Updated(i),
                    Err(i) => {
                        self.paths.insert(i, file_path.clone());
                        ResultIndex::Updated(i)
                    }
                }
            }
            None => {
                self.path_count += 1;
                ResultIndex::Inserted(insert_sorted(
                    &mut self.paths,
                    file_path.clone(),
                    compare_paths,
                ))
            }
        };
        self.match_count += added;
        self.events.emit(ResultEvent::DidAddResult {
            file_path,
            result,
            index,
        });
    }

    pub fn remove_result(&mut self, file_path: &Path) -> bool {
        let Some(previous) = self.results.remove(file_path) else {
            return false;
        };
        self.path_count -= 1;
        self.match_count -= previous.match_count();

        let file_path = file_path.to_path_buf();
        if let Ok(removed_index) = sorted_insert_index(&self.paths, &file_path, compare_paths) {
            self.paths.remove(removed_index);
            self.events.emit(ResultEvent::DidRemoveResult {
                file_path,
                removed_index,
            });
        }
        true
    }

    /// 已打开的缓冲区停止编辑后，只重扫这一个缓冲区
    pub fn on_contents_modified(&mut self, file_path: &Path, buffer: &TextBuffer) -> bool {
        if !self.active {
            return false;
        }
        let Some(matcher) = self.matcher.as_ref() else {
            return false;
        };

        let matches = matcher.scan_text(
            &buffer.text(),
            self.config.leading_context_line_count,
            self.config.trailing_context_line_count,
        );
        debug!(path = %file_path.display(), matches = matches.len(), "rescanned open buffer");
        let result = (!matches.is_empty()).then(|| PathResult::new(file_path, matches));
        self.set_result(file_path.to_path_buf(), result);

        let summary = self.summary();
        self.events.emit(ResultEvent::DidFinishSearching(summary));
        true
    }

    // ==================== 替换 ====================

    /// 在给定路径上执行替换，完成后自动重新搜索以同步结果
    pub fn replace(
        &mut self,
        paths_pattern: &str,
        replace_pattern: &str,
        paths: Vec<PathBuf>,
    ) -> SearchHandle {
        let Some(matcher) = self
            .matcher
            .clone()
            .filter(|_| !self.options.find_pattern.is_empty())
        else {
            debug!("replace skipped, no active find pattern");
            return SearchHandle::ready(SearchCompletion::Skipped);
        };

        self.options.paths_pattern = paths_pattern.to_string();
        self.options.replace_pattern = replace_pattern.to_string();
        let replacement = if self.options.use_regex {
            unescape_escape_sequence(replace_pattern)
        } else {
            replace_pattern.to_string()
        };

        self.active = false;
        self.replace_driver.start(
            self.replacer.as_ref(),
            &matcher,
            &replacement,
            self.options.expands_references(),
            paths,
            self.tx.clone(),
        );

        let (done, handle) = SearchHandle::pending();
        if let Some(previous) = self.pending_replace.replace(done) {
            let _ = previous.send(SearchCompletion::Cancelled);
        }
        self.events.emit(ResultEvent::DidStartReplacing);
        handle
    }

    fn finish_replace(&mut self) {
        let summary = self.summary();
        self.events.emit(ResultEvent::DidFinishReplacing(summary));

        let pending = self.pending_replace.take();
        let options = self.options.clone();
        let mut resync = self.search(
            options,
            SearchRequest {
                only_run_if_changed: false,
                keep_replacement_state: true,
            },
        );
        match resync.try_result() {
            Some(completion) => {
                // 重新搜索没有启动时恢复对打开缓冲区的跟踪
                self.active = self.matcher.is_some();
                if let Some(done) = pending {
                    let _ = done.send(completion);
                }
            }
            None => self.pending_replace = pending,
        }
    }

    // ==================== 消息折叠 ====================

    /// 取出通道中积压的全部消息并折叠，返回生效的条数
    pub fn process_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(msg) = self.rx.try_recv() {
            if self.apply_message(msg) {
                applied += 1;
            }
        }
        applied
    }

    /// 最多等待 `timeout` 收一条消息并折叠；消息生效才返回 true
    pub fn wait_message(&mut self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(msg) => self.apply_message(msg),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    pub fn apply_message(&mut self, msg: ProjectMessage) -> bool {
        let task_id = msg.task_id();
        if self.replace_driver.task_id() == Some(task_id) {
            return self.apply_replace_message(msg);
        }

        let is_current = self
            .search
            .as_ref()
            .is_some_and(|search| search.task.id() == task_id);
        if !is_current {
            debug!(task_id, "dropping stale project message");
            return false;
        }

        match msg {
            ProjectMessage::PathResult { path, result, .. } => self.set_result(path, result),
            ProjectMessage::PathError { error, .. } => {
                debug!(error = %error, "path search error");
                self.search_errors.push(error.clone());
                self.events.emit(ResultEvent::DidErrorForPath(error));
            }
            ProjectMessage::PathsSearched { count, .. } => {
                self.paths_searched = count;
                self.events.emit(ResultEvent::DidSearchPaths(count));
            }
            ProjectMessage::SearchComplete { .. } => self.finish_search(),
            ProjectMessage::SearchCancelled { .. } => {
                self.cancel_search();
            }
            ProjectMessage::PathReplaced { .. }
            | ProjectMessage::ReplaceError { .. }
            | ProjectMessage::ReplaceComplete { .. } => return false,
        }
        true
    }

    fn apply_replace_message(&mut self, msg: ProjectMessage) -> bool {
        match self.replace_driver.apply_message(msg) {
            Some(ReplaceProgress::PathReplaced { path, replacements }) => {
                self.events.emit(ResultEvent::DidReplacePath {
                    file_path: path,
                    replacements,
                });
            }
            Some(ReplaceProgress::Error(error)) => {
                self.events.emit(ResultEvent::DidErrorForPath(error));
            }
            Some(ReplaceProgress::Finished) => self.finish_replace(),
            None => return false,
        }
        true
    }

    // ==================== 查询 ====================

    pub fn options(&self) -> &FindOptions {
        &self.options
    }

    pub fn matcher(&self) -> Option<&Matcher> {
        self.matcher.as_ref()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn path_count(&self) -> usize {
        self.path_count
    }

    pub fn match_count(&self) -> usize {
        self.match_count
    }

    pub fn result(&self, file_path: &Path) -> Option<&PathResult> {
        self.results.get(file_path)
    }

    pub fn result_at(&self, index: usize) -> Option<&PathResult> {
        self.paths.get(index).and_then(|p| self.results.get(p))
    }

    pub fn search_errors(&self) -> &[PathError] {
        &self.search_errors
    }

    pub fn paths_searched(&self) -> usize {
        self.paths_searched
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn search_state(&self) -> SearchState {
        self.search_state
    }

    pub fn is_searching(&self) -> bool {
        self.search.is_some()
    }

    pub fn is_replacing(&self) -> bool {
        self.replace_driver.is_replacing()
    }

    pub fn summary(&self) -> SearchSummary {
        SearchSummary {
            find_pattern: self.options.find_pattern.clone(),
            replace_pattern: self.options.replace_pattern.clone(),
            path_count: self.path_count,
            match_count: self.match_count,
            search_errors: self.search_errors.clone(),
            replaced_path_count: self.replace_driver.replaced_path_count(),
            replacement_count: self.replace_driver.replacement_count(),
            replacement_errors: self.replace_driver.replacement_errors().to_vec(),
        }
    }
}

#[cfg(test)]
#[path = "../../../tests/unit/kernel/search/results.rs"]
mod tests;
