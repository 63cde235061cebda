//! 单缓冲区查找替换：实时匹配索引、缓冲区内替换、编辑会话

pub mod match_index;
pub mod replace;
pub mod session;

pub use match_index::{MatchIndex, MatchIndexEvent, MatchIndexState, MatchMarker};
pub use replace::ReplaceEngine;
pub use session::EditorSession;
