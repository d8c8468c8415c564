// 完成判定与进度计算

use std::collections::BTreeSet;

/// 所有分片 `0..total` 是否都已到达
///
/// 按索引集合判定而不是按数量，越界索引不会让缺口被误判为完成
pub fn is_complete(present: &BTreeSet<u64>, total: u64) -> bool {
    total > 0 && present_count(present, total) == total
}

/// 有效分片数量（只统计 `< total` 的索引）
pub fn present_count(present: &BTreeSet<u64>, total: u64) -> u64 {
    present.range(..total).count() as u64
}

/// 第一个缺失的分片索引
pub fn first_missing(present: &BTreeSet<u64>, total: u64) -> Option<u64> {
    (0..total).find(|index| !present.contains(index))
}

/// 完成百分比 `floor(present * 100 / total)`，限制在 [0, 100]
pub fn percentage(present: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let value = (present.min(total) as u128 * 100) / total as u128;
    value.min(100) as u8
}
