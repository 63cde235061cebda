use super::*;

#[test]
fn test_apply_and_inverse() {
    let mut rope = Rope::from_str("hello world");
    let op = EditOp::new(6, "world".to_string(), "rust".to_string());
    op.apply(&mut rope);
    assert_eq!(rope.to_string(), "hello rust");

    op.inverse().apply(&mut rope);
    assert_eq!(rope.to_string(), "hello world");
}

#[test]
fn test_apply_multibyte() {
    let mut rope = Rope::from_str("héllo");
    // "é" 占两个字节
    let op = EditOp::new(1, "é".to_string(), "e".to_string());
    op.apply(&mut rope);
    assert_eq!(rope.to_string(), "hello");
}

#[test]
fn test_coalesce_disjoint_changes_stay_sorted() {
    let mut pending = Vec::new();
    coalesce_change(&mut pending, &EditOp::new(10, String::new(), "ab".to_string()));
    coalesce_change(&mut pending, &EditOp::new(2, String::new(), "x".to_string()));

    assert_eq!(
        pending,
        vec![
            BufferChange {
                start: 2,
                old_extent: 0,
                new_extent: 1
            },
            BufferChange {
                start: 11,
                old_extent: 0,
                new_extent: 2
            },
        ]
    );
}

#[test]
fn test_coalesce_adjacent_typing() {
    let mut pending = Vec::new();
    coalesce_change(&mut pending, &EditOp::new(3, String::new(), "a".to_string()));
    coalesce_change(&mut pending, &EditOp::new(4, String::new(), "b".to_string()));
    coalesce_change(&mut pending, &EditOp::new(5, String::new(), "c".to_string()));

    assert_eq!(
        pending,
        vec![BufferChange {
            start: 3,
            old_extent: 0,
            new_extent: 3
        }]
    );
}

#[test]
fn test_coalesce_tracks_old_extent() {
    let mut pending = Vec::new();
    // 把 1 字节替换成 3 字节，再在末尾插入 1 字节
    coalesce_change(&mut pending, &EditOp::new(2, "x".to_string(), "abc".to_string()));
    coalesce_change(&mut pending, &EditOp::new(5, String::new(), "d".to_string()));

    assert_eq!(
        pending,
        vec![BufferChange {
            start: 2,
            old_extent: 1,
            new_extent: 4
        }]
    );
}

#[test]
fn test_coalesce_bridging_edit_merges_both_sides() {
    let mut pending = Vec::new();
    coalesce_change(&mut pending, &EditOp::new(2, String::new(), "a".to_string()));
    coalesce_change(&mut pending, &EditOp::new(8, String::new(), "b".to_string()));
    // 删除 [3, 8)，同时接触两个区间
    coalesce_change(&mut pending, &EditOp::new(3, "12345".to_string(), String::new()));

    assert_eq!(
        pending,
        vec![BufferChange {
            start: 2,
            old_extent: 5,
            new_extent: 2
        }]
    );
}
