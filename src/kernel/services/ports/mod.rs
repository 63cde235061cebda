//! Service ports: traits + data contracts.

pub mod config;
pub mod pattern;
pub mod search;

pub use config::FindConfig;
pub use pattern::{
    unescape_escape_sequence, CompileOptions, Matcher, PatternCompiler, PatternError,
    PatternErrorKind,
};
pub use search::{
    split_paths_pattern, FindOptions, Match, OptionField, PathError, PathReplacer, PathResult,
    PathScanner, PathSearchOptions, ProjectMessage, SearchSummary, TaskHandle,
};
