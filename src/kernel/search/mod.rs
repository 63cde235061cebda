//! 项目范围查找：结果聚合与多文件替换

pub mod replace_driver;
pub mod results;

pub use replace_driver::{MultiFileReplaceDriver, ReplaceProgress};
pub use results::{
    ResultAggregator, ResultEvent, ResultIndex, SearchCompletion, SearchHandle, SearchRequest,
    SearchState,
};
