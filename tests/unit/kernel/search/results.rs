use super::*;
use crate::kernel::services::ports::{Match, PatternErrorKind};
use crate::models::{Point, Range};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;
use std::rc::Rc;

struct ScanCall {
    task: TaskHandle,
    pattern: String,
    options: PathSearchOptions,
    tx: SyncSender<ProjectMessage>,
}

#[derive(Clone, Default)]
struct FakeScanner {
    calls: Rc<RefCell<Vec<ScanCall>>>,
}

impl PathScanner for FakeScanner {
    fn search_paths(
        &self,
        matcher: &Matcher,
        options: PathSearchOptions,
        tx: SyncSender<ProjectMessage>,
    ) -> TaskHandle {
        let task = TaskHandle::new();
        self.calls.borrow_mut().push(ScanCall {
            task: task.clone(),
            pattern: matcher.pattern().to_string(),
            options,
            tx,
        });
        task
    }
}

impl FakeScanner {
    fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    fn task(&self, call: usize) -> TaskHandle {
        self.calls.borrow()[call].task.clone()
    }

    fn send(&self, call: usize, msg: impl FnOnce(u64) -> ProjectMessage) {
        let calls = self.calls.borrow();
        let call = &calls[call];
        call.tx.send(msg(call.task.id())).unwrap();
    }
}

struct ReplaceCall {
    task: TaskHandle,
    replacement: String,
    expand_references: bool,
    paths: Vec<PathBuf>,
    tx: SyncSender<ProjectMessage>,
}

#[derive(Clone, Default)]
struct FakeReplacer {
    calls: Rc<RefCell<Vec<ReplaceCall>>>,
}

impl PathReplacer for FakeReplacer {
    fn replace_paths(
        &self,
        _matcher: &Matcher,
        replacement: &str,
        expand_references: bool,
        paths: Vec<PathBuf>,
        tx: SyncSender<ProjectMessage>,
    ) -> TaskHandle {
        let task = TaskHandle::new();
        self.calls.borrow_mut().push(ReplaceCall {
            task: task.clone(),
            replacement: replacement.to_string(),
            expand_references,
            paths,
            tx,
        });
        task
    }
}

impl FakeReplacer {
    fn send(&self, call: usize, msg: impl FnOnce(u64) -> ProjectMessage) {
        let calls = self.calls.borrow();
        let call = &calls[call];
        call.tx.send(msg(call.task.id())).unwrap();
    }
}

fn aggregator() -> (ResultAggregator, FakeScanner, FakeReplacer) {
    let scanner = FakeScanner::default();
    let replacer = FakeReplacer::default();
    let aggregator = ResultAggregator::new(
        Box::new(scanner.clone()),
        Box::new(replacer.clone()),
        FindConfig::default(),
    );
    (aggregator, scanner, replacer)
}

fn result_with(path: &str, count: usize) -> PathResult {
    let matches = (0..count)
        .map(|row| Match {
            range: Range::new(Point::new(row, 0), Point::new(row, 3)),
            match_text: "cat".to_string(),
            line_text: "cat".to_string(),
            line_text_offset: 0,
            leading_context_lines: Vec::new(),
            trailing_context_lines: Vec::new(),
        })
        .collect();
    PathResult::new(path, matches)
}

fn path_result(path: &str, count: usize) -> impl FnOnce(u64) -> ProjectMessage {
    let path = path.to_string();
    move |task_id| ProjectMessage::PathResult {
        task_id,
        path: PathBuf::from(&path),
        result: Some(result_with(&path, count)),
    }
}

fn assert_invariants(aggregator: &ResultAggregator) {
    let paths = aggregator.paths();
    assert!(paths
        .windows(2)
        .all(|w| w[0].as_os_str() < w[1].as_os_str()));
    assert_eq!(aggregator.path_count(), paths.len());
    let total: usize = paths
        .iter()
        .map(|p| aggregator.result(p).map(PathResult::match_count).unwrap_or(0))
        .sum();
    assert_eq!(aggregator.match_count(), total);
}

#[test]
fn test_add_and_remove_keep_paths_sorted() {
    let (mut aggregator, _, _) = aggregator();
    let mut events = aggregator.subscribe();

    aggregator.add_result(PathBuf::from("c.txt"), result_with("c.txt", 2));
    aggregator.add_result(PathBuf::from("a.txt"), result_with("a.txt", 1));
    aggregator.add_result(PathBuf::from("b.txt"), result_with("b.txt", 3));
    aggregator.add_result(PathBuf::from("a.txt"), result_with("a.txt", 4));
    assert!(aggregator.remove_result(Path::new("c.txt")));
    assert!(!aggregator.remove_result(Path::new("missing.txt")));

    assert_eq!(
        aggregator.paths(),
        &[PathBuf::from("a.txt"), PathBuf::from("b.txt")]
    );
    assert_eq!(aggregator.path_count(), 2);
    assert_eq!(aggregator.match_count(), 7);
    assert_eq!(aggregator.result_at(1).map(|r| r.match_count()), Some(3));
    assert_invariants(&aggregator);

    let indexes: Vec<_> = events
        .drain()
        .into_iter()
        .map(|event| match event {
            ResultEvent::DidAddResult { index, .. } => format!("{:?}", index),
            ResultEvent::DidRemoveResult { removed_index, .. } => {
                format!("Removed({})", removed_index)
            }
            other => panic!("unexpected event {:?}", other),
        })
        .collect();
    assert_eq!(
        indexes,
        vec![
            "Inserted(0)",
            "Inserted(0)",
            "Inserted(1)",
            "Updated(0)",
            "Removed(2)"
        ]
    );
}

#[test]
fn test_paths_sort_by_bytes() {
    let (mut aggregator, _, _) = aggregator();
    aggregator.add_result(PathBuf::from("a/x.txt"), result_with("a/x.txt", 1));
    aggregator.add_result(PathBuf::from("a-b/x.txt"), result_with("a-b/x.txt", 1));
    assert_eq!(
        aggregator.paths(),
        &[PathBuf::from("a-b/x.txt"), PathBuf::from("a/x.txt")]
    );
}

#[test]
fn test_set_result_with_empty_result_removes() {
    let (mut aggregator, _, _) = aggregator();
    aggregator.set_result(PathBuf::from("a.txt"), Some(result_with("a.txt", 2)));
    assert_eq!(aggregator.match_count(), 2);

    aggregator.set_result(PathBuf::from("a.txt"), Some(result_with("a.txt", 0)));
    assert_eq!(aggregator.path_count(), 0);
    assert_eq!(aggregator.match_count(), 0);

    aggregator.set_result(PathBuf::from("b.txt"), Some(result_with("b.txt", 1)));
    aggregator.set_result(PathBuf::from("b.txt"), None);
    assert!(aggregator.result(Path::new("b.txt")).is_none());
    assert_invariants(&aggregator);
}

#[test]
fn test_random_mutations_keep_invariants() {
    let (mut aggregator, _, _) = aggregator();
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..500 {
        let path = format!("dir{}/file{}.rs", rng.random_range(0..3), rng.random_range(0..6));
        let count = rng.random_range(0..4);
        if rng.random_range(0..3) == 0 {
            aggregator.remove_result(Path::new(&path));
        } else {
            aggregator.set_result(PathBuf::from(&path), Some(result_with(&path, count)));
        }
        assert_invariants(&aggregator);
    }
}

#[test]
fn test_search_streams_results() {
    let (mut aggregator, scanner, _) = aggregator();
    let mut events = aggregator.subscribe();

    let mut options = FindOptions::new("cat");
    options.paths_pattern = "src, lib ,".to_string();
    let mut handle = aggregator.search(options, SearchRequest::default());
    assert_eq!(handle.try_result(), None);
    assert!(aggregator.is_searching());
    assert!(aggregator.is_active());
    assert_eq!(aggregator.search_state(), SearchState::Searching);

    {
        let calls = scanner.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].pattern, "cat");
        assert_eq!(calls[0].options.paths, vec!["src", "lib"]);
        assert_eq!(calls[0].options.leading_context_line_count, 1);
        assert_eq!(calls[0].options.trailing_context_line_count, 1);
    }

    scanner.send(0, path_result("src/b.rs", 2));
    scanner.send(0, path_result("src/a.rs", 1));
    scanner.send(0, |task_id| ProjectMessage::PathResult {
        task_id,
        path: PathBuf::from("lib/c.rs"),
        result: None,
    });
    scanner.send(0, |task_id| ProjectMessage::PathsSearched { task_id, count: 3 });
    scanner.send(0, |task_id| ProjectMessage::SearchComplete { task_id });
    assert_eq!(aggregator.process_pending(), 5);

    assert_eq!(
        aggregator.paths(),
        &[PathBuf::from("src/a.rs"), PathBuf::from("src/b.rs")]
    );
    assert_eq!(aggregator.match_count(), 3);
    assert_eq!(aggregator.paths_searched(), 3);
    assert_eq!(aggregator.search_state(), SearchState::Finished);
    assert!(!aggregator.is_searching());

    let summary = aggregator.summary();
    assert_eq!(summary.find_pattern, "cat");
    assert_eq!(summary.path_count, 2);
    assert_eq!(summary.match_count, 3);
    assert_eq!(handle.try_result(), Some(SearchCompletion::Finished(summary.clone())));

    let events = events.drain();
    assert!(matches!(events[0], ResultEvent::DidClear(_)));
    assert_eq!(events[1], ResultEvent::DidStartSearching);
    assert!(events.contains(&ResultEvent::DidSearchPaths(3)));
    assert_eq!(
        events.last(),
        Some(&ResultEvent::DidFinishSearching(summary))
    );
}

#[test]
fn test_new_search_cancels_previous() {
    let (mut aggregator, scanner, _) = aggregator();
    let mut first = aggregator.search(FindOptions::new("cat"), SearchRequest::default());
    scanner.send(0, path_result("early.txt", 1));

    let mut events = aggregator.subscribe();
    let mut second = aggregator.search(FindOptions::new("dog"), SearchRequest::default());
    assert_eq!(first.try_result(), Some(SearchCompletion::Cancelled));
    assert!(scanner.task(0).is_cancelled());
    assert!(!scanner.task(1).is_cancelled());
    assert_eq!(events.drain()[0], ResultEvent::DidCancelSearching);

    scanner.send(0, path_result("late.txt", 4));
    scanner.send(0, |task_id| ProjectMessage::SearchComplete { task_id });
    scanner.send(1, path_result("dog.txt", 1));
    assert_eq!(aggregator.process_pending(), 1);

    assert_eq!(aggregator.paths(), &[PathBuf::from("dog.txt")]);
    assert_eq!(aggregator.match_count(), 1);
    assert_eq!(second.try_result(), None);

    scanner.send(1, |task_id| ProjectMessage::SearchComplete { task_id });
    aggregator.process_pending();
    assert!(matches!(
        second.try_result(),
        Some(SearchCompletion::Finished(_))
    ));
}

#[test]
fn test_only_run_if_changed_is_noop() {
    let (mut aggregator, scanner, _) = aggregator();
    let request = SearchRequest {
        only_run_if_changed: true,
        keep_replacement_state: false,
    };
    aggregator.search(FindOptions::new("cat"), request);
    scanner.send(0, |task_id| ProjectMessage::SearchComplete { task_id });
    aggregator.process_pending();

    let mut events = aggregator.subscribe();
    let mut handle = aggregator.search(FindOptions::new("cat"), request);
    assert_eq!(handle.try_result(), Some(SearchCompletion::Skipped));
    assert_eq!(events.drain(), vec![ResultEvent::DidNoopSearch]);
    assert_eq!(scanner.call_count(), 1);

    let mut options = FindOptions::new("cat");
    options.paths_pattern = "src".to_string();
    aggregator.search(options, request);
    assert_eq!(scanner.call_count(), 2);
}

#[test]
fn test_empty_pattern_clears() {
    let (mut aggregator, scanner, _) = aggregator();
    let mut first = aggregator.search(FindOptions::new("cat"), SearchRequest::default());
    scanner.send(0, path_result("a.txt", 2));
    aggregator.process_pending();

    let mut events = aggregator.subscribe();
    let mut handle = aggregator.search(FindOptions::new(""), SearchRequest::default());
    assert_eq!(handle.try_result(), Some(SearchCompletion::Cleared));
    assert_eq!(first.try_result(), Some(SearchCompletion::Cancelled));
    assert_eq!(aggregator.path_count(), 0);
    assert_eq!(aggregator.match_count(), 0);
    assert!(!aggregator.is_active());
    assert_eq!(scanner.call_count(), 1);

    let events = events.drain();
    assert_eq!(events[0], ResultEvent::DidCancelSearching);
    assert!(matches!(events[1], ResultEvent::DidClear(_)));
}

#[test]
fn test_invalid_pattern_keeps_previous_results() {
    let (mut aggregator, scanner, _) = aggregator();
    let mut options = FindOptions::new("ca+t");
    options.use_regex = true;
    aggregator.search(options.clone(), SearchRequest::default());
    scanner.send(0, path_result("a.txt", 2));
    scanner.send(0, |task_id| ProjectMessage::SearchComplete { task_id });
    aggregator.process_pending();

    let mut events = aggregator.subscribe();
    options.find_pattern = "(cat".to_string();
    let mut handle = aggregator.search(options, SearchRequest::default());
    let Some(SearchCompletion::InvalidPattern(error)) = handle.try_result() else {
        panic!("expected invalid pattern");
    };
    assert_eq!(error.kind, PatternErrorKind::Syntax);
    assert_eq!(events.drain(), vec![ResultEvent::DidError(error)]);

    assert_eq!(scanner.call_count(), 1);
    assert_eq!(aggregator.path_count(), 1);
    assert_eq!(aggregator.match_count(), 2);
    assert_eq!(aggregator.options().find_pattern, "ca+t");
    assert_eq!(aggregator.matcher().map(Matcher::pattern), Some("ca+t"));
}

#[test]
fn test_replace_after_invalid_pattern_uses_last_valid_search() {
    let (mut aggregator, scanner, replacer) = aggregator();
    aggregator.search(FindOptions::new("cat"), SearchRequest::default());
    scanner.send(0, path_result("a.txt", 2));
    scanner.send(0, |task_id| ProjectMessage::SearchComplete { task_id });
    aggregator.process_pending();

    let mut invalid = FindOptions::new("(cat");
    invalid.use_regex = true;
    let mut handle = aggregator.search(invalid, SearchRequest::default());
    assert!(matches!(
        handle.try_result(),
        Some(SearchCompletion::InvalidPattern(_))
    ));
    assert_eq!(aggregator.options().find_pattern, "cat");
    assert!(!aggregator.options().use_regex);

    let mut handle = aggregator.replace("", "\\t", vec![PathBuf::from("a.txt")]);
    {
        let calls = replacer.calls.borrow();
        assert_eq!(calls[0].replacement, "\\t");
        assert!(!calls[0].expand_references);
    }

    replacer.send(0, |task_id| ProjectMessage::PathReplaced {
        task_id,
        path: PathBuf::from("a.txt"),
        replacements: 2,
    });
    replacer.send(0, |task_id| ProjectMessage::ReplaceComplete { task_id });
    aggregator.process_pending();

    assert_eq!(scanner.call_count(), 2);
    assert_eq!(scanner.calls.borrow()[1].pattern, "cat");
    assert_eq!(handle.try_result(), None);

    scanner.send(1, |task_id| ProjectMessage::SearchComplete { task_id });
    aggregator.process_pending();

    assert!(matches!(
        handle.try_result(),
        Some(SearchCompletion::Finished(_))
    ));
    assert_eq!(aggregator.match_count(), 0);
    assert!(aggregator.paths().is_empty());
    assert!(aggregator.is_active());
}

#[test]
fn test_wait_message_ignores_stale_messages() {
    let (mut aggregator, scanner, _) = aggregator();
    aggregator.search(FindOptions::new("cat"), SearchRequest::default());
    aggregator.search(FindOptions::new("dog"), SearchRequest::default());

    scanner.send(0, path_result("late.txt", 1));
    assert!(!aggregator.wait_message(Duration::from_millis(50)));
    assert_eq!(aggregator.path_count(), 0);

    assert!(!aggregator.wait_message(Duration::from_millis(10)));

    scanner.send(1, path_result("dog.txt", 1));
    assert!(aggregator.wait_message(Duration::from_millis(50)));
    assert_eq!(aggregator.paths(), &[PathBuf::from("dog.txt")]);
}

#[test]
fn test_contents_modified_rescans_open_buffer() {
    let (mut aggregator, scanner, _) = aggregator();
    let path = Path::new("/project/notes.txt");
    let buffer = TextBuffer::from_text("there is one items in here");
    assert!(!aggregator.on_contents_modified(path, &buffer));

    aggregator.search(FindOptions::new("items"), SearchRequest::default());
    scanner.send(0, |task_id| ProjectMessage::SearchComplete { task_id });
    aggregator.process_pending();

    assert!(aggregator.on_contents_modified(path, &buffer));
    assert_eq!(aggregator.match_count(), 1);
    let result = aggregator.result(path).unwrap();
    assert_eq!(result.matches[0].match_text, "items");
    assert_eq!(
        result.matches[0].range,
        Range::new(Point::new(0, 13), Point::new(0, 18))
    );

    let mut events = aggregator.subscribe();
    let edited = TextBuffer::from_text("no matches in here");
    assert!(aggregator.on_contents_modified(path, &edited));
    let events = events.drain();
    assert_eq!(
        events[0],
        ResultEvent::DidRemoveResult {
            file_path: path.to_path_buf(),
            removed_index: 0
        }
    );
    assert!(matches!(events[1], ResultEvent::DidFinishSearching(_)));
    assert_eq!(aggregator.match_count(), 0);
    assert!(aggregator.result(path).is_none());
}

#[test]
fn test_clear_resolves_pending_search_as_cancelled() {
    let (mut aggregator, scanner, _) = aggregator();
    let mut handle = aggregator.search(FindOptions::new("cat"), SearchRequest::default());
    let mut events = aggregator.subscribe();

    aggregator.clear();
    assert_eq!(handle.try_result(), Some(SearchCompletion::Cancelled));
    assert!(scanner.task(0).is_cancelled());
    assert_eq!(aggregator.search_state(), SearchState::Cancelled);
    assert_eq!(events.drain()[0], ResultEvent::DidCancelSearching);

    scanner.send(0, path_result("late.txt", 1));
    assert_eq!(aggregator.process_pending(), 0);
    assert_eq!(aggregator.path_count(), 0);
}

#[test]
fn test_service_cancellation_resolves_handle() {
    let (mut aggregator, scanner, _) = aggregator();
    let mut handle = aggregator.search(FindOptions::new("cat"), SearchRequest::default());
    scanner.send(0, |task_id| ProjectMessage::SearchCancelled { task_id });
    aggregator.process_pending();
    assert_eq!(handle.try_result(), Some(SearchCompletion::Cancelled));
    assert_eq!(aggregator.search_state(), SearchState::Cancelled);
}

#[test]
fn test_path_errors_are_collected() {
    let (mut aggregator, scanner, _) = aggregator();
    let mut events = aggregator.subscribe();
    aggregator.search(FindOptions::new("cat"), SearchRequest::default());

    let error = PathError::new("locked.txt", "Permission denied");
    let sent = error.clone();
    scanner.send(0, move |task_id| ProjectMessage::PathError {
        task_id,
        error: sent,
    });
    scanner.send(0, path_result("ok.txt", 1));
    scanner.send(0, |task_id| ProjectMessage::SearchComplete { task_id });
    aggregator.process_pending();

    assert_eq!(aggregator.search_errors(), &[error.clone()]);
    assert_eq!(aggregator.summary().search_errors, vec![error.clone()]);
    assert_eq!(aggregator.path_count(), 1);
    assert!(events
        .drain()
        .contains(&ResultEvent::DidErrorForPath(error)));
}

#[test]
fn test_replace_then_resync() {
    let (mut aggregator, scanner, replacer) = aggregator();
    aggregator.search(FindOptions::new("cat"), SearchRequest::default());
    scanner.send(0, path_result("a.txt", 2));
    scanner.send(0, |task_id| ProjectMessage::SearchComplete { task_id });
    aggregator.process_pending();

    let mut events = aggregator.subscribe();
    let mut handle = aggregator.replace("", "dog", vec![PathBuf::from("a.txt")]);
    assert!(!aggregator.is_active());
    assert!(aggregator.is_replacing());
    {
        let calls = replacer.calls.borrow();
        assert_eq!(calls[0].replacement, "dog");
        assert!(!calls[0].expand_references);
        assert_eq!(calls[0].paths, vec![PathBuf::from("a.txt")]);
    }

    replacer.send(0, |task_id| ProjectMessage::PathReplaced {
        task_id,
        path: PathBuf::from("a.txt"),
        replacements: 2,
    });
    replacer.send(0, |task_id| ProjectMessage::ReplaceComplete { task_id });
    assert_eq!(aggregator.process_pending(), 2);

    assert_eq!(scanner.call_count(), 2);
    assert_eq!(handle.try_result(), None);
    assert_eq!(aggregator.path_count(), 0);
    assert_eq!(aggregator.summary().replaced_path_count, 1);
    assert_eq!(aggregator.summary().replacement_count, 2);

    scanner.send(1, |task_id| ProjectMessage::SearchComplete { task_id });
    aggregator.process_pending();

    let summary = aggregator.summary();
    assert_eq!(summary.match_count, 0);
    assert_eq!(summary.replacement_count, 2);
    assert_eq!(summary.replace_pattern, "dog");
    assert_eq!(handle.try_result(), Some(SearchCompletion::Finished(summary)));
    assert!(aggregator.is_active());

    let events = events.drain();
    assert_eq!(events[0], ResultEvent::DidStartReplacing);
    assert_eq!(
        events[1],
        ResultEvent::DidReplacePath {
            file_path: PathBuf::from("a.txt"),
            replacements: 2
        }
    );
    assert!(matches!(events[2], ResultEvent::DidFinishReplacing(_)));
}

#[test]
fn test_replace_unescapes_in_regex_mode() {
    let (mut aggregator, _, replacer) = aggregator();
    let mut options = FindOptions::new("a");
    options.use_regex = true;
    aggregator.search(options, SearchRequest::default());

    aggregator.replace("", "\\t$0", vec![PathBuf::from("a.txt")]);
    let calls = replacer.calls.borrow();
    assert_eq!(calls[0].replacement, "\t$0");
    assert!(calls[0].expand_references);
}

#[test]
fn test_replace_without_pattern_is_skipped() {
    let (mut aggregator, _, replacer) = aggregator();
    let mut handle = aggregator.replace("", "dog", vec![PathBuf::from("a.txt")]);
    assert_eq!(handle.try_result(), Some(SearchCompletion::Skipped));
    assert!(replacer.calls.borrow().is_empty());
}

#[test]
fn test_await_search_handle() {
    let (mut aggregator, scanner, _) = aggregator();
    let handle = aggregator.search(FindOptions::new("cat"), SearchRequest::default());
    scanner.send(0, |task_id| ProjectMessage::SearchComplete { task_id });
    aggregator.process_pending();

    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let completion = rt.block_on(handle);
    assert!(matches!(completion, SearchCompletion::Finished(_)));
}
