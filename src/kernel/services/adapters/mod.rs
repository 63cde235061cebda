//! Service adapters: OS/runtime specific implementations (IO/async).

pub mod config;
pub mod search;

pub use config::{
    ensure_log_dir, ensure_settings_file, ensure_settings_file_at, get_settings_path,
    load_settings, load_settings_from, ConfigError,
};
pub use search::{PathReplaceService, PathSearchService};
