//! 位置跟踪标记（Marker）
//!
//! 标记绑定在缓冲区的一段字节区间上，每次编辑后自动平移；
//! `InvalidationPolicy::Inside` 的标记在区间内部被编辑时变为无效，
//! 只触碰边界或位于区间外的编辑不会让它失效。
//!
//! 边界语义为"排他"：在标记起点插入会把整个标记右移，在终点插入不会扩展标记。

use super::edit_op::{shift, EditOp};
use slotmap::{new_key_type, SlotMap};

new_key_type! {
    pub struct MarkerId;
    pub struct LayerId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationPolicy {
    Inside,
    Never,
}

#[derive(Debug, Clone)]
pub struct Marker {
    start: usize,
    end: usize,
    valid: bool,
    policy: InvalidationPolicy,
}

impl Marker {
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn policy(&self) -> InvalidationPolicy {
        self.policy
    }

    fn apply_edit(&mut self, op: &EditOp) {
        let s = op.start;
        let e = op.old_end();
        let delta = op.delta();

        if self.policy == InvalidationPolicy::Inside && s < self.end && e > self.start {
            self.valid = false;
        }

        self.start = if self.start < s {
            self.start
        } else if self.start >= e {
            shift(self.start, delta)
        } else {
            op.new_end()
        };

        self.end = if self.end <= s {
            self.end
        } else if self.end >= e {
            shift(self.end, delta)
        } else {
            s
        };

        if self.end < self.start {
            self.end = self.start;
        }
    }
}

#[derive(Debug, Default)]
pub struct MarkerLayer {
    markers: SlotMap<MarkerId, Marker>,
}

impl MarkerLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_marker(
        &mut self,
        range: std::ops::Range<usize>,
        policy: InvalidationPolicy,
    ) -> MarkerId {
        self.markers.insert(Marker {
            start: range.start,
            end: range.end.max(range.start),
            valid: true,
            policy,
        })
    }

    /// 重新创建一个有效标记（位置取旧标记当前位置），旧标记被销毁
    pub fn recreate_marker(&mut self, id: MarkerId) -> Option<MarkerId> {
        let old = self.markers.remove(id)?;
        Some(self.create_marker(old.range(), old.policy))
    }

    pub fn destroy_marker(&mut self, id: MarkerId) -> bool {
        self.markers.remove(id).is_some()
    }

    pub fn marker(&self, id: MarkerId) -> Option<&Marker> {
        self.markers.get(id)
    }

    pub fn contains(&self, id: MarkerId) -> bool {
        self.markers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn clear(&mut self) {
        self.markers.clear();
    }

    pub(crate) fn apply_edit(&mut self, op: &EditOp) {
        for marker in self.markers.values_mut() {
            marker.apply_edit(op);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/models/marker.rs"]
mod tests;
