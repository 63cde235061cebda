//! 文本缓冲区模型
//!
//! 职责：
//! - 文本存储（Rope）
//! - 选区
//! - 标记层（MarkerLayer）随编辑自动平移
//! - 事务：一次事务内的所有编辑合并为一个 Undo 步骤
//! - 变更合并：编辑产生的变更区间累积起来，由 `take_changes` 在停止输入后一次性取走

use super::edit_op::{coalesce_change, shift, BufferChange, EditOp};
use super::marker::{LayerId, MarkerId, MarkerLayer};
use super::point::{Point, Range};
use ropey::{Rope, RopeSlice};
use slotmap::SlotMap;
use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};

static BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// 从 RopeSlice 获取字符串，优先零拷贝
pub fn slice_to_cow(slice: RopeSlice<'_>) -> Cow<'_, str> {
    match slice.as_str() {
        Some(s) => Cow::Borrowed(s),
        None => Cow::Owned(slice.to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(u64);

pub struct TextBuffer {
    id: BufferId,
    rope: Rope,
    selection: (usize, usize),
    layers: SlotMap<LayerId, MarkerLayer>,
    pending_changes: Vec<BufferChange>,
    undo_stack: Vec<Vec<EditOp>>,
    redo_stack: Vec<Vec<EditOp>>,
    transaction: Option<Vec<EditOp>>,
    transaction_depth: usize,
}

impl TextBuffer {
    pub fn new() -> Self {
        Self::from_text("")
    }

    pub fn from_text(text: &str) -> Self {
        Self {
            id: BufferId(BUFFER_ID.fetch_add(1, Ordering::Relaxed)),
            rope: Rope::from_str(text),
            selection: (0, 0),
            layers: SlotMap::with_key(),
            pending_changes: Vec::new(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            transaction: None,
            transaction_depth: 0,
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn rope(&self) -> &Rope {
        &self.rope
    }

    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    pub fn len_bytes(&self) -> usize {
        self.rope.len_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.rope.len_bytes() == 0
    }

    pub fn len_lines(&self) -> usize {
        self.rope.len_lines()
    }

    /// 行文本（不含换行符）
    pub fn line_text(&self, row: usize) -> Option<String> {
        if row >= self.rope.len_lines() {
            return None;
        }
        let line = slice_to_cow(self.rope.line(row));
        let line = line.strip_suffix('\n').unwrap_or(&line);
        let line = line.strip_suffix('\r').unwrap_or(line);
        Some(line.to_string())
    }

    pub fn end_point(&self) -> Point {
        self.offset_to_point(self.rope.len_bytes())
    }

    pub fn full_range(&self) -> Range {
        Range::new(Point::ZERO, self.end_point())
    }

    // ==================== 坐标换算 ====================

    /// Point -> 字节偏移（越界时夹到合法位置）
    pub fn point_to_offset(&self, point: Point) -> usize {
        let last_row = self.rope.len_lines().saturating_sub(1);
        let row = point.row.min(last_row);
        let line_start = self.rope.line_to_char(row);
        let line = slice_to_cow(self.rope.line(row));
        let content = line.trim_end_matches(['\n', '\r']);
        let column = point.column.min(content.chars().count());
        self.rope.char_to_byte(line_start + column)
    }

    pub fn offset_to_point(&self, offset: usize) -> Point {
        let offset = offset.min(self.rope.len_bytes());
        let char_idx = self.rope.byte_to_char(offset);
        let row = self.rope.char_to_line(char_idx);
        let column = char_idx - self.rope.line_to_char(row);
        Point::new(row, column)
    }

    pub fn range_to_offsets(&self, range: Range) -> (usize, usize) {
        (
            self.point_to_offset(range.start),
            self.point_to_offset(range.end),
        )
    }

    pub fn offsets_to_range(&self, start: usize, end: usize) -> Range {
        Range::new(self.offset_to_point(start), self.offset_to_point(end))
    }

    pub fn text_in_range(&self, range: Range) -> String {
        let (start, end) = self.range_to_offsets(range);
        self.text_in_offsets(start, end)
    }

    pub fn text_in_offsets(&self, start: usize, end: usize) -> String {
        let len = self.rope.len_bytes();
        let start = self.rope.byte_to_char(start.min(len));
        let end = self.rope.byte_to_char(end.min(len));
        self.rope.slice(start..end).to_string()
    }

    // ==================== 选区 ====================

    pub fn selection(&self) -> Range {
        self.offsets_to_range(self.selection.0, self.selection.1)
    }

    pub fn selection_offsets(&self) -> (usize, usize) {
        self.selection
    }

    pub fn set_selection(&mut self, range: Range) {
        self.selection = self.range_to_offsets(range);
    }

    pub fn set_cursor(&mut self, point: Point) {
        self.set_selection(Range::empty(point));
    }

    pub fn has_selection(&self) -> bool {
        self.selection.0 != self.selection.1
    }

    // ==================== 标记层 ====================

    pub fn add_marker_layer(&mut self) -> LayerId {
        self.layers.insert(MarkerLayer::new())
    }

    pub fn remove_marker_layer(&mut self, layer: LayerId) -> bool {
        self.layers.remove(layer).is_some()
    }

    pub fn marker_layer(&self, layer: LayerId) -> Option<&MarkerLayer> {
        self.layers.get(layer)
    }

    pub fn marker_layer_mut(&mut self, layer: LayerId) -> Option<&mut MarkerLayer> {
        self.layers.get_mut(layer)
    }

    pub fn marker_range(&self, layer: LayerId, marker: MarkerId) -> Option<Range> {
        let marker = self.layers.get(layer)?.marker(marker)?;
        Some(self.offsets_to_range(marker.start(), marker.end()))
    }

    // ==================== 编辑 ====================

    /// 替换区间内的文本，返回新文本所占区间
    pub fn set_text_in_range(&mut self, range: Range, text: &str) -> Range {
        let (start, end) = self.range_to_offsets(range);
        let new_end = self.set_text_in_offsets(start, end, text);
        self.offsets_to_range(start, new_end)
    }

    pub fn insert(&mut self, point: Point, text: &str) -> Range {
        self.set_text_in_range(Range::empty(point), text)
    }

    pub fn delete(&mut self, range: Range) {
        self.set_text_in_range(range, "");
    }

    /// 字节区间版本，返回新文本结束位置
    pub fn set_text_in_offsets(&mut self, start: usize, end: usize, text: &str) -> usize {
        let len = self.rope.len_bytes();
        // 落在多字节字符中间的偏移向前对齐到字符边界
        let start = self.rope.char_to_byte(self.rope.byte_to_char(start.min(len)));
        let end = self.rope.char_to_byte(self.rope.byte_to_char(end.min(len))).max(start);
        let deleted = self.text_in_offsets(start, end);
        let op = EditOp::new(start, deleted, text.to_string());
        let new_end = op.new_end();
        if op.is_noop() {
            return new_end;
        }

        self.apply_op(&op);
        self.redo_stack.clear();
        match self.transaction.as_mut() {
            Some(ops) => ops.push(op),
            None => self.undo_stack.push(vec![op]),
        }
        new_end
    }

    /// 在一个事务内执行多次编辑，整体作为一个 Undo 步骤；支持嵌套
    pub fn transact<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        if self.transaction_depth == 0 {
            self.transaction = Some(Vec::new());
        }
        self.transaction_depth += 1;

        let result = f(self);

        self.transaction_depth -= 1;
        if self.transaction_depth == 0 {
            if let Some(ops) = self.transaction.take() {
                if !ops.is_empty() {
                    self.undo_stack.push(ops);
                }
            }
        }
        result
    }

    pub fn undo(&mut self) -> bool {
        if self.transaction_depth > 0 {
            return false;
        }
        let Some(ops) = self.undo_stack.pop() else {
            return false;
        };
        for op in ops.iter().rev() {
            self.apply_op(&op.inverse());
        }
        self.redo_stack.push(ops);
        true
    }

    pub fn redo(&mut self) -> bool {
        if self.transaction_depth > 0 {
            return false;
        }
        let Some(ops) = self.redo_stack.pop() else {
            return false;
        };
        for op in &ops {
            self.apply_op(op);
        }
        self.undo_stack.push(ops);
        true
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.pending_changes.is_empty()
    }

    /// 取走累积的变更（相当于 did-stop-changing），升序且互不相接
    pub fn take_changes(&mut self) -> Vec<BufferChange> {
        std::mem::take(&mut self.pending_changes)
    }

    fn apply_op(&mut self, op: &EditOp) {
        op.apply(&mut self.rope);

        for layer in self.layers.values_mut() {
            layer.apply_edit(op);
        }

        let (anchor, head) = self.selection;
        self.selection = (map_offset(anchor, op), map_offset(head, op));

        coalesce_change(&mut self.pending_changes, op);
    }
}

fn map_offset(offset: usize, op: &EditOp) -> usize {
    if offset <= op.start {
        offset
    } else if offset >= op.old_end() {
        shift(offset, op.delta())
    } else {
        op.new_end()
    }
}

impl Default for TextBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/models/text_buffer.rs"]
mod tests;
