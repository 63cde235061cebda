//! 编辑会话：一个缓冲区加上它的匹配索引
//!
//! 匹配索引随会话一起创建和销毁，不存在跨会话共享的全局缓存。
//! 编辑先在缓冲区内累积，调用 `stop_changing` 后统一交给索引做增量更新。

use super::match_index::{MatchIndex, MatchIndexEvent};
use super::replace::ReplaceEngine;
use crate::kernel::bus::EventReceiver;
use crate::kernel::services::ports::{FindConfig, FindOptions, OptionField};
use crate::models::{MarkerId, Point, Range, TextBuffer};

pub struct EditorSession {
    buffer: TextBuffer,
    index: MatchIndex,
}

impl EditorSession {
    pub fn new(text: &str, config: &FindConfig) -> Self {
        let mut buffer = TextBuffer::from_text(text);
        let mut index = MatchIndex::new(config);
        index.bind(&mut buffer);
        Self { buffer, index }
    }

    pub fn buffer(&self) -> &TextBuffer {
        &self.buffer
    }

    pub fn index(&self) -> &MatchIndex {
        &self.index
    }

    pub fn subscribe(&mut self) -> EventReceiver<MatchIndexEvent> {
        self.index.subscribe()
    }

    pub fn text(&self) -> String {
        self.buffer.text()
    }

    pub fn set_options(&mut self, options: FindOptions) -> Vec<OptionField> {
        self.index.set_options(&mut self.buffer, options)
    }

    // ==================== 编辑 ====================

    pub fn set_text_in_range(&mut self, range: Range, text: &str) -> Range {
        self.buffer.set_text_in_range(range, text)
    }

    pub fn insert(&mut self, point: Point, text: &str) -> Range {
        self.buffer.insert(point, text)
    }

    pub fn delete(&mut self, range: Range) {
        self.buffer.delete(range);
    }

    /// 字节区间编辑，返回新文本结束位置
    pub fn set_text_in_offsets(&mut self, start: usize, end: usize, text: &str) -> usize {
        self.buffer.set_text_in_offsets(start, end, text)
    }

    /// 停止输入：把累积的变更交给匹配索引
    pub fn stop_changing(&mut self) {
        let changes = self.buffer.take_changes();
        if changes.is_empty() {
            return;
        }
        self.index.on_buffer_edit(&mut self.buffer, &changes);
    }

    pub fn undo(&mut self) -> bool {
        let undone = self.buffer.undo();
        if undone {
            self.stop_changing();
        }
        undone
    }

    pub fn redo(&mut self) -> bool {
        let redone = self.buffer.redo();
        if redone {
            self.stop_changing();
        }
        redone
    }

    // ==================== 选区与导航 ====================

    pub fn selection(&self) -> Range {
        self.buffer.selection()
    }

    pub fn set_selection(&mut self, range: Range) {
        self.buffer.set_selection(range);
        self.index.on_selection_change(&self.buffer);
    }

    /// 选中光标之后的下一个匹配（回绕）
    pub fn find_next(&mut self) -> Option<Range> {
        let (start, end) = self.selection_offsets();
        let offset = if start == end { start } else { end };
        let id = self.index.marker_at_or_after(&self.buffer, offset)?;
        self.select_marker(id)
    }

    /// 选中光标之前的上一个匹配（回绕）
    pub fn find_previous(&mut self) -> Option<Range> {
        let (start, _) = self.selection_offsets();
        let id = self.index.marker_before(&self.buffer, start)?;
        self.select_marker(id)
    }

    /// 选中当前匹配；没有当前匹配时选中光标处或之后的第一个
    pub fn select_current(&mut self) -> Option<Range> {
        let id = match self.index.current_marker() {
            Some(id) => id,
            None => {
                let (start, _) = self.selection_offsets();
                self.index.marker_at_or_after(&self.buffer, start)?
            }
        };
        self.select_marker(id)
    }

    fn select_marker(&mut self, id: MarkerId) -> Option<Range> {
        let marker = self.index.match_marker(&self.buffer, id)?;
        self.set_selection(marker.range);
        Some(marker.range)
    }

    fn selection_offsets(&self) -> (usize, usize) {
        let (anchor, head) = self.buffer.selection_offsets();
        (anchor.min(head), anchor.max(head))
    }

    // ==================== 替换 ====================

    /// 替换当前匹配（没有时替换光标之后的第一个），然后选中下一个匹配
    pub fn replace_next(&mut self) -> Option<Range> {
        let id = match self.index.current_marker() {
            Some(id) => id,
            None => {
                let (start, _) = self.selection_offsets();
                self.index.marker_at_or_after(&self.buffer, start)?
            }
        };
        let replace_pattern = self.index.options().replace_pattern.clone();
        let replaced =
            ReplaceEngine::replace(&mut self.index, &mut self.buffer, &[id], &replace_pattern);
        let after = replaced.first()?.end;
        self.stop_changing();

        self.buffer.set_cursor(self.buffer.offset_to_point(after));
        self.index.on_selection_change(&self.buffer);
        let next = self.index.marker_at_or_after(&self.buffer, after)?;
        self.select_marker(next)
    }

    /// 替换全部匹配，返回替换次数
    pub fn replace_all(&mut self) -> usize {
        let markers = self.index.markers().to_vec();
        let replace_pattern = self.index.options().replace_pattern.clone();
        let replaced =
            ReplaceEngine::replace(&mut self.index, &mut self.buffer, &markers, &replace_pattern);
        self.stop_changing();
        replaced.len()
    }
}

#[cfg(test)]
#[path = "../../../tests/unit/kernel/editor/session.rs"]
mod tests;
