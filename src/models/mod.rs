//! 数据模型层

pub mod edit_op;
pub mod marker;
pub mod point;
pub mod text_buffer;

pub use edit_op::{BufferChange, EditOp};
pub use marker::{InvalidationPolicy, LayerId, Marker, MarkerId, MarkerLayer};
pub use point::{Point, Range};
pub use text_buffer::{slice_to_cow, BufferId, TextBuffer};
