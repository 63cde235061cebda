use super::pattern::DEFAULT_REGEX_SIZE_LIMIT;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FindConfig {
    pub leading_context_line_count: usize,
    pub trailing_context_line_count: usize,
    pub regex_size_limit: usize,
    pub max_file_size: u64,
    pub follow_symlinks: bool,
    pub include_hidden: bool,
}

impl Default for FindConfig {
    fn default() -> Self {
        Self {
            leading_context_line_count: 1,
            trailing_context_line_count: 1,
            regex_size_limit: DEFAULT_REGEX_SIZE_LIMIT,
            max_file_size: 8 * 1024 * 1024,
            follow_symlinks: false,
            include_hidden: false,
        }
    }
}
