use std::cmp::Ordering;

/// 有序序列中 `value` 的位置：已存在返回 `Ok(index)`，否则返回 `Err(插入位置)`
pub fn sorted_insert_index<T>(
    items: &[T],
    value: &T,
    mut compare: impl FnMut(&T, &T) -> Ordering,
) -> Result<usize, usize> {
    items.binary_search_by(|probe| compare(probe, value))
}

/// 二分查找后插入，保持有序；返回插入位置
pub fn insert_sorted<T>(
    items: &mut Vec<T>,
    value: T,
    compare: impl FnMut(&T, &T) -> Ordering,
) -> usize {
    let index = match sorted_insert_index(items, &value, compare) {
        Ok(index) | Err(index) => index,
    };
    items.insert(index, value);
    index
}
