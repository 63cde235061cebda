//! 缓冲区内替换
//!
//! 一批替换在同一个事务里完成（一次 Undo 撤销全部），每处替换后立即把对应标记从索引中移除。

use super::match_index::MatchIndex;
use crate::kernel::services::ports::unescape_escape_sequence;
use crate::models::{MarkerId, TextBuffer};
use std::ops::Range;

pub struct ReplaceEngine;

impl ReplaceEngine {
    /// 按顺序替换 `markers` 对应的匹配，返回每处新文本的字节区间
    ///
    /// `markers` 按位置升序传入时，返回的区间在替换完成后仍然有效。
    pub fn replace(
        index: &mut MatchIndex,
        buffer: &mut TextBuffer,
        markers: &[MarkerId],
        replace_pattern: &str,
    ) -> Vec<Range<usize>> {
        if markers.is_empty() {
            return Vec::new();
        }
        let Some(layer) = index.layer_for(buffer) else {
            return Vec::new();
        };
        let Some(matcher) = index.matcher().cloned() else {
            return Vec::new();
        };

        let options = index.options();
        let replacement = if options.use_regex {
            unescape_escape_sequence(replace_pattern)
        } else {
            replace_pattern.to_string()
        };
        let expand = options.expands_references();

        let replaced = buffer.transact(|buffer| {
            let mut replaced = Vec::with_capacity(markers.len());
            for &id in markers {
                let Some((start, end)) = buffer
                    .marker_layer(layer)
                    .and_then(|l| l.marker(id))
                    .map(|m| (m.start(), m.end()))
                else {
                    continue;
                };
                let matched = buffer.text_in_offsets(start, end);
                let text = matcher.replace(&matched, &replacement, expand);
                let new_end = buffer.set_text_in_offsets(start, end, &text);
                index.remove_marker(buffer, id);
                replaced.push(start..new_end);
            }
            replaced
        });

        tracing::debug!(count = replaced.len(), "replaced matches in buffer");
        index.publish_update(buffer);
        replaced
    }
}

#[cfg(test)]
#[path = "../../../tests/unit/kernel/editor/replace.rs"]
mod tests;
