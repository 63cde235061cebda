//! Headless find/replace core.

pub mod bus;
pub mod editor;
pub mod search;
pub mod services;
pub mod util;

pub use bus::{EventBus, EventReceiver};
pub use editor::{EditorSession, MatchIndex, MatchIndexEvent, MatchIndexState, ReplaceEngine};
pub use search::{
    MultiFileReplaceDriver, ResultAggregator, ResultEvent, SearchCompletion, SearchHandle,
    SearchRequest, SearchState,
};
