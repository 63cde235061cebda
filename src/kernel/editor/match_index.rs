//! 单缓冲区的实时匹配索引
//!
//! - 每个匹配对应缓冲区标记层中的一个 `Inside` 标记，编辑后由缓冲区自动平移
//! - `rebuild_all` 全量扫描有效范围（整个缓冲区，或 inCurrentSelection 时的选区）
//! - `on_buffer_edit` 只重扫受变更影响的窗口：窗口左端为变更前最后一个有效标记，
//!   右端一直扫到新扫出的匹配与一个未受影响的旧标记重合为止
//! - 当前匹配：范围与选区完全相同的标记

use crate::kernel::bus::{EventBus, EventReceiver};
use crate::kernel::services::ports::{
    FindConfig, FindOptions, Matcher, OptionField, PatternError,
};
use crate::models::{
    BufferChange, BufferId, InvalidationPolicy, LayerId, MarkerId, MarkerLayer, Range, TextBuffer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchIndexState {
    /// 未绑定缓冲区
    Uninitialized,
    /// 已绑定，标记尚未与选项同步
    Bound,
    Live,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchMarker {
    pub id: MarkerId,
    pub range: Range,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchIndexEvent {
    DidUpdate(Vec<MatchMarker>),
    DidError(PatternError),
    DidChangeCurrentResult(Option<MatchMarker>),
}

#[derive(Debug, Clone, Copy)]
struct Binding {
    buffer: BufferId,
    layer: LayerId,
    scope: Option<MarkerId>,
}

pub struct MatchIndex {
    options: FindOptions,
    size_limit: usize,
    binding: Option<Binding>,
    matcher: Option<Matcher>,
    markers: Vec<MarkerId>,
    current: Option<MarkerId>,
    state: MatchIndexState,
    events: EventBus<MatchIndexEvent>,
}

impl MatchIndex {
    pub fn new(config: &FindConfig) -> Self {
        Self {
            options: FindOptions::default(),
            size_limit: config.regex_size_limit,
            binding: None,
            matcher: None,
            markers: Vec::new(),
            current: None,
            state: MatchIndexState::Uninitialized,
            events: EventBus::new(),
        }
    }

    pub fn subscribe(&mut self) -> EventReceiver<MatchIndexEvent> {
        self.events.subscribe()
    }

    pub fn options(&self) -> &FindOptions {
        &self.options
    }

    pub fn state(&self) -> MatchIndexState {
        self.state
    }

    pub fn matcher(&self) -> Option<&Matcher> {
        self.matcher.as_ref()
    }

    pub fn is_bound_to(&self, buffer: &TextBuffer) -> bool {
        self.binding.is_some_and(|b| b.buffer == buffer.id())
    }

    /// 标记层，仅当 `buffer` 正是绑定的缓冲区时返回
    pub fn layer_for(&self, buffer: &TextBuffer) -> Option<LayerId> {
        self.binding
            .filter(|b| b.buffer == buffer.id())
            .map(|b| b.layer)
    }

    // ==================== 绑定 ====================

    /// 绑定到缓冲区并全量重建；之前绑定的其它缓冲区应先 `detach`
    pub fn bind(&mut self, buffer: &mut TextBuffer) {
        if !self.is_bound_to(buffer) {
            if self.binding.is_some() {
                tracing::debug!("match index rebound, previous buffer released");
            }
            self.markers.clear();
            self.current = None;
            self.binding = Some(Binding {
                buffer: buffer.id(),
                layer: buffer.add_marker_layer(),
                scope: None,
            });
            self.state = MatchIndexState::Bound;
        }
        self.rebuild_all(buffer);
    }

    pub fn detach(&mut self, buffer: &mut TextBuffer) {
        let Some(binding) = self.binding.take() else {
            return;
        };
        if binding.buffer == buffer.id() {
            buffer.remove_marker_layer(binding.layer);
        }
        self.markers.clear();
        self.matcher = None;
        self.state = MatchIndexState::Uninitialized;
        self.events.emit(MatchIndexEvent::DidUpdate(Vec::new()));
        if self.current.take().is_some() {
            self.events.emit(MatchIndexEvent::DidChangeCurrentResult(None));
        }
    }

    // ==================== 选项 ====================

    /// 更新选项，返回变化的字段；影响匹配集的字段变化时全量重建
    pub fn set_options(
        &mut self,
        buffer: &mut TextBuffer,
        options: FindOptions,
    ) -> Vec<OptionField> {
        let changed = self.options.set(options);
        let scope_changed = self.options.in_current_selection && self.scope_changed(buffer);
        if changed.iter().any(|field| field.invalidates_matches()) || scope_changed {
            self.rebuild_all(buffer);
        }
        changed
    }

    fn scope_changed(&self, buffer: &TextBuffer) -> bool {
        let Some(binding) = self.binding.filter(|b| b.buffer == buffer.id()) else {
            return false;
        };
        let selection = normalized_selection(buffer);
        let scope = binding.scope.and_then(|id| {
            buffer
                .marker_layer(binding.layer)
                .and_then(|layer| layer.marker(id))
                .map(|m| (m.start(), m.end()))
        });
        if selection.0 == selection.1 {
            scope.is_some()
        } else {
            scope != Some(selection)
        }
    }

    // ==================== 扫描 ====================

    pub fn rebuild_all(&mut self, buffer: &mut TextBuffer) {
        let Some(layer_id) = self.layer_for(buffer) else {
            return;
        };

        if let Some(layer) = buffer.marker_layer_mut(layer_id) {
            layer.clear();
        }
        self.markers.clear();
        self.matcher = None;

        let selection = normalized_selection(buffer);
        let scope = if self.options.in_current_selection && selection.0 < selection.1 {
            buffer
                .marker_layer_mut(layer_id)
                .map(|layer| {
                    layer.create_marker(selection.0..selection.1, InvalidationPolicy::Never)
                })
        } else {
            None
        };
        if let Some(binding) = self.binding.as_mut() {
            binding.scope = scope;
        }

        if self.options.find_pattern.is_empty() {
            self.publish_update(buffer);
            return;
        }

        let matcher = match self.options.compile(self.size_limit) {
            Ok(matcher) => matcher,
            Err(e) => {
                tracing::warn!(pattern = %e.pattern, error = %e, "find pattern rejected");
                self.events.emit(MatchIndexEvent::DidError(e));
                self.publish_update(buffer);
                return;
            }
        };

        let text = buffer.text();
        let (start, end) = self.effective_offsets(buffer);
        let found = matcher.find_in(&text, start, end);
        if let Some(layer) = buffer.marker_layer_mut(layer_id) {
            self.markers.extend(
                found
                    .into_iter()
                    .map(|range| layer.create_marker(range, InvalidationPolicy::Inside)),
            );
        }
        self.matcher = Some(matcher);

        tracing::debug!(count = self.markers.len(), "match index rebuilt");
        self.publish_update(buffer);
    }

    /// 增量更新；`changes` 为停止输入后合并的变更（编辑后坐标，升序）
    pub fn on_buffer_edit(&mut self, buffer: &mut TextBuffer, changes: &[BufferChange]) {
        if changes.is_empty() {
            return;
        }
        let Some(layer_id) = self.layer_for(buffer) else {
            return;
        };
        if self.state != MatchIndexState::Live {
            self.rebuild_all(buffer);
            return;
        }
        let Some(matcher) = self.matcher.clone() else {
            return;
        };

        let text = buffer.text();
        let (eff_start, eff_end) = self.effective_offsets(buffer);
        let haystack = &text[..eff_end];
        let Some(layer) = buffer.marker_layer_mut(layer_id) else {
            return;
        };

        // index 之前的标记已与新文本一致；resync 为上一次重扫停下的位置
        let mut index = 0usize;
        let mut resync: Option<usize> = None;
        let mut rescanned = 0usize;

        for change in changes {
            let change_start = change.start;
            let change_end = change.new_end();
            if resync.is_some_and(|cursor| change_end < cursor) {
                continue;
            }

            let mut preceding = None;
            let mut next = index;
            while let Some(marker) = self.markers.get(next).and_then(|id| layer.marker(*id)) {
                if !marker.is_valid() || marker.end() > change_start {
                    break;
                }
                preceding = Some(next);
                next += 1;
            }

            let window_first = preceding.unwrap_or(index);
            let scan_start = match preceding {
                Some(p) => marker_start(layer, self.markers[p]),
                None => index
                    .checked_sub(1)
                    .and_then(|prev| layer.marker(self.markers[prev]))
                    .map_or(eff_start, |m| m.end()),
            };

            let (created, removed_end, synced) = rescan_window(
                &matcher,
                haystack,
                layer,
                &self.markers,
                window_first,
                scan_start.max(eff_start),
                change_end,
            );

            let created_len = created.len();
            rescanned += created_len;
            self.markers.splice(window_first..removed_end, created);

            if synced {
                index = window_first + created_len;
                resync = self.markers.get(index).map(|id| marker_start(layer, *id));
            } else {
                index = self.markers.len();
                resync = Some(usize::MAX);
            }
        }

        // 没有被任何窗口覆盖的无效标记原地重建
        let tail = index.min(self.markers.len());
        for id in self.markers[tail..].iter_mut() {
            if layer.marker(*id).is_some_and(|m| !m.is_valid()) {
                if let Some(recreated) = layer.recreate_marker(*id) {
                    *id = recreated;
                }
            }
        }

        if self.current.is_some_and(|id| !layer.contains(id)) {
            self.current = None;
        }

        tracing::debug!(
            changes = changes.len(),
            rescanned,
            total = self.markers.len(),
            "match index updated"
        );
        self.publish_update(buffer);
    }

    /// 有效扫描范围（字节）
    fn effective_offsets(&self, buffer: &TextBuffer) -> (usize, usize) {
        let len = buffer.len_bytes();
        let scope = self.binding.and_then(|binding| {
            let id = binding.scope?;
            let marker = buffer.marker_layer(binding.layer)?.marker(id)?;
            Some((marker.start(), marker.end()))
        });
        match scope {
            Some((start, end)) => (start.min(len), end.min(len)),
            None => (0, len),
        }
    }

    // ==================== 当前匹配 ====================

    pub fn on_selection_change(&mut self, buffer: &TextBuffer) {
        self.refresh_current(buffer);
    }

    fn refresh_current(&mut self, buffer: &TextBuffer) {
        let current = self.marker_at_selection(buffer);
        if current == self.current {
            return;
        }
        self.current = current;
        let marker = current.and_then(|id| self.match_marker(buffer, id));
        self.events.emit(MatchIndexEvent::DidChangeCurrentResult(marker));
    }

    fn marker_at_selection(&self, buffer: &TextBuffer) -> Option<MarkerId> {
        let (start, end) = normalized_selection(buffer);
        if start == end {
            return None;
        }
        let layer = buffer.marker_layer(self.layer_for(buffer)?)?;
        let first = self
            .markers
            .partition_point(|id| layer.marker(*id).is_some_and(|m| m.start() < start));
        self.markers[first..]
            .iter()
            .map_while(|id| {
                let marker = layer.marker(*id)?;
                (marker.start() == start).then_some((*id, marker.end()))
            })
            .find(|(_, marker_end)| *marker_end == end)
            .map(|(id, _)| id)
    }

    /// 发出 did-update，并重新计算当前匹配
    pub(crate) fn publish_update(&mut self, buffer: &TextBuffer) {
        self.state = MatchIndexState::Live;
        let markers = self.marker_ranges(buffer);
        self.events.emit(MatchIndexEvent::DidUpdate(markers));
        self.refresh_current(buffer);
    }

    /// 从索引中移除并销毁一个标记
    pub(crate) fn remove_marker(&mut self, buffer: &mut TextBuffer, id: MarkerId) -> bool {
        let Some(position) = self.markers.iter().position(|m| *m == id) else {
            return false;
        };
        self.markers.remove(position);
        if self.current == Some(id) {
            self.current = None;
        }
        if let Some(layer) = self
            .layer_for(buffer)
            .and_then(|layer| buffer.marker_layer_mut(layer))
        {
            layer.destroy_marker(id);
        }
        true
    }

    // ==================== 查询 ====================

    pub fn markers(&self) -> &[MarkerId] {
        &self.markers
    }

    pub fn match_count(&self) -> usize {
        self.markers.len()
    }

    pub fn current_marker(&self) -> Option<MarkerId> {
        self.current
    }

    /// 当前匹配在全部匹配中的序号（用于 "3 of 7" 这类显示）
    pub fn current_index(&self) -> Option<usize> {
        let current = self.current?;
        self.markers.iter().position(|id| *id == current)
    }

    pub fn match_marker(&self, buffer: &TextBuffer, id: MarkerId) -> Option<MatchMarker> {
        let layer = self.layer_for(buffer)?;
        let marker = buffer.marker_layer(layer)?.marker(id)?;
        Some(MatchMarker {
            id,
            range: buffer.offsets_to_range(marker.start(), marker.end()),
            start: marker.start(),
            end: marker.end(),
        })
    }

    pub fn marker_ranges(&self, buffer: &TextBuffer) -> Vec<MatchMarker> {
        self.markers
            .iter()
            .filter_map(|id| self.match_marker(buffer, *id))
            .collect()
    }

    /// 第一个起点不早于 `offset` 的匹配，没有时回绕到第一个
    pub fn marker_at_or_after(&self, buffer: &TextBuffer, offset: usize) -> Option<MarkerId> {
        let layer = buffer.marker_layer(self.layer_for(buffer)?)?;
        let first = self
            .markers
            .partition_point(|id| layer.marker(*id).is_some_and(|m| m.start() < offset));
        self.markers
            .get(first)
            .or_else(|| self.markers.first())
            .copied()
    }

    /// 最后一个终点不晚于 `offset` 的匹配，没有时回绕到最后一个
    pub fn marker_before(&self, buffer: &TextBuffer, offset: usize) -> Option<MarkerId> {
        let layer = buffer.marker_layer(self.layer_for(buffer)?)?;
        let count = self
            .markers
            .partition_point(|id| layer.marker(*id).is_some_and(|m| m.end() <= offset));
        count
            .checked_sub(1)
            .and_then(|i| self.markers.get(i))
            .or_else(|| self.markers.last())
            .copied()
    }
}

/// 从 `scan_start` 开始重扫，直到新匹配与变更之后的一个有效旧标记完全重合
///
/// 返回 (窗口内的标记, 被替换区间的终点, 是否重合)；被替换区间内未保留的旧标记都已销毁。
fn rescan_window(
    matcher: &Matcher,
    haystack: &str,
    layer: &mut MarkerLayer,
    markers: &[MarkerId],
    window_first: usize,
    scan_start: usize,
    change_end: usize,
) -> (Vec<MarkerId>, usize, bool) {
    let mut created = Vec::new();
    let mut existing = window_first;
    let mut pos = scan_start;

    loop {
        let found = matcher.find_at(haystack, pos);
        let mut reused = None;

        while let Some(&id) = markers.get(existing) {
            if let (Some(found), Some(marker)) = (&found, layer.marker(id)) {
                if marker.start() >= found.end {
                    break;
                }
                if marker.is_valid() && marker.range() == *found {
                    if marker.start() >= change_end {
                        return (created, existing, true);
                    }
                    // 未被编辑且位置不变的标记原样保留
                    reused = Some(id);
                    existing += 1;
                    break;
                }
            }
            layer.destroy_marker(id);
            existing += 1;
        }

        let Some(found) = found else {
            return (created, existing, false);
        };
        pos = found.end;
        created.push(
            reused.unwrap_or_else(|| layer.create_marker(found, InvalidationPolicy::Inside)),
        );
    }
}

fn marker_start(layer: &MarkerLayer, id: MarkerId) -> usize {
    layer.marker(id).map_or(0, |m| m.start())
}

fn normalized_selection(buffer: &TextBuffer) -> (usize, usize) {
    let (anchor, head) = buffer.selection_offsets();
    (anchor.min(head), anchor.max(head))
}

#[cfg(test)]
#[path = "../../../tests/unit/kernel/editor/match_index.rs"]
mod tests;
