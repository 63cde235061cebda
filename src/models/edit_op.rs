//! 编辑操作与变更区间
//!
//! - EditOp: 一次原子替换（删除 + 插入），字节偏移，可求逆，用于 Undo/Redo
//! - BufferChange: 停止输入后批量下发的变更区间（编辑后坐标），相邻/重叠的编辑会被合并

use ropey::Rope;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditOp {
    pub start: usize,
    pub deleted: String,
    pub inserted: String,
}

impl EditOp {
    pub fn new(start: usize, deleted: String, inserted: String) -> Self {
        Self {
            start,
            deleted,
            inserted,
        }
    }

    /// 编辑前坐标中的结束位置
    pub fn old_end(&self) -> usize {
        self.start + self.deleted.len()
    }

    /// 编辑后坐标中的结束位置
    pub fn new_end(&self) -> usize {
        self.start + self.inserted.len()
    }

    pub fn delta(&self) -> isize {
        self.inserted.len() as isize - self.deleted.len() as isize
    }

    pub fn is_noop(&self) -> bool {
        self.deleted == self.inserted
    }

    pub fn inverse(&self) -> EditOp {
        EditOp {
            start: self.start,
            deleted: self.inserted.clone(),
            inserted: self.deleted.clone(),
        }
    }

    /// 作用到 Rope 上（Rope 以字符为单位，这里做字节 -> 字符换算）
    pub fn apply(&self, rope: &mut Rope) {
        let start_char = rope.byte_to_char(self.start);
        if !self.deleted.is_empty() {
            let end_char = rope.byte_to_char(self.old_end());
            rope.remove(start_char..end_char);
        }
        if !self.inserted.is_empty() {
            rope.insert(start_char, &self.inserted);
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferChange {
    /// 起点（字节）
    pub start: usize,
    /// 被替换掉的旧文本长度（字节）
    pub old_extent: usize,
    /// 新文本长度（字节）
    pub new_extent: usize,
}

impl BufferChange {
    pub fn new_end(&self) -> usize {
        self.start + self.new_extent
    }

    pub fn old_end(&self) -> usize {
        self.start + self.old_extent
    }

    fn delta(&self) -> isize {
        self.new_extent as isize - self.old_extent as isize
    }
}

pub(crate) fn shift(pos: usize, delta: isize) -> usize {
    (pos as isize + delta).max(0) as usize
}

/// 把一次编辑并入待下发的变更列表
///
/// `pending` 始终按 start 升序、两两不相接，坐标为当前（最新）文本坐标。
pub fn coalesce_change(pending: &mut Vec<BufferChange>, op: &EditOp) {
    let delta = op.delta();
    let mut merged_start = op.start;
    let mut merged_end = op.old_end();
    let mut merged_delta_sum = 0isize;
    let mut merged_slot: Option<usize> = None;

    let previous = std::mem::take(pending);
    pending.reserve(previous.len() + 1);

    for change in previous {
        if change.new_end() < merged_start {
            pending.push(change);
        } else if change.start > merged_end {
            if merged_slot.is_none() {
                merged_slot = Some(pending.len());
                pending.push(BufferChange {
                    start: 0,
                    old_extent: 0,
                    new_extent: 0,
                });
            }
            pending.push(BufferChange {
                start: shift(change.start, delta),
                ..change
            });
        } else {
            merged_start = merged_start.min(change.start);
            merged_end = merged_end.max(change.new_end());
            merged_delta_sum += change.delta();
        }
    }

    let merged = BufferChange {
        start: merged_start,
        old_extent: ((merged_end - merged_start) as isize - merged_delta_sum).max(0) as usize,
        new_extent: shift(merged_end, delta) - merged_start,
    };

    match merged_slot {
        Some(slot) => pending[slot] = merged,
        None => pending.push(merged),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/models/edit_op.rs"]
mod tests;
