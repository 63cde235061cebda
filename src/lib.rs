//! zfind - 查找替换核心库
//!
//! 模块结构：
//! - models: 数据模型（TextBuffer, Marker, EditOp）
//! - kernel: 无界面核心（MatchIndex, ReplaceEngine, ResultAggregator）
//! - kernel::services: 服务层（ports 契约 + adapters 实现）

pub mod kernel;
pub mod models;
