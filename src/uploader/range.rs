// 分片范围校验
//
// 在写入任何数据之前，根据声明的分片大小 / 分片总数 / 文件总大小
// 推导出本分片应覆盖的字节区间，并核对实际内容长度

use super::descriptor::{LastChunk, UploadDescriptor};
use super::error::RangeError;

/// 校验通过的分片区间 `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedRange {
    pub start: u64,
    pub end: u64,
    pub len: u64,
    pub is_last: bool,
}

/// 校验分片描述符与实际内容长度
pub fn validate(descriptor: &UploadDescriptor, payload_len: u64) -> Result<ValidatedRange, RangeError> {
    let total_chunks = descriptor.total_chunk_count;
    let chunk_size = descriptor.chunk_size;
    let total_size = descriptor.total_file_size;
    let index = descriptor.chunk_index;

    if total_chunks == 0 {
        return Err(RangeError::EmptyUpload);
    }
    if chunk_size == 0 {
        return Err(RangeError::InvalidChunkSize);
    }
    if index >= total_chunks {
        return Err(RangeError::IndexOutOfRange {
            index,
            total: total_chunks,
        });
    }

    let inconsistent = || RangeError::InconsistentSize {
        chunk_size,
        total_chunks,
        total_size,
    };

    if !size_is_consistent(descriptor.last_chunk, chunk_size, total_chunks, total_size) {
        return Err(inconsistent());
    }

    // index < total_chunks 且大小一致时 start 不会溢出，这里仍使用 checked 运算
    let start = index.checked_mul(chunk_size).ok_or_else(inconsistent)?;

    if let Some(offset) = descriptor.byte_offset {
        if offset != start {
            return Err(RangeError::OffsetMismatch {
                expected: start,
                actual: offset,
            });
        }
    }

    let is_last = index + 1 == total_chunks;
    let end = if is_last {
        total_size
    } else {
        start.checked_add(chunk_size).ok_or_else(inconsistent)?
    };
    if end < start {
        return Err(inconsistent());
    }

    let len = end - start;
    if payload_len != len {
        return Err(RangeError::PayloadSizeMismatch {
            expected: len,
            actual: payload_len,
        });
    }

    Ok(ValidatedRange {
        start,
        end,
        len,
        is_last,
    })
}

/// 分片大小 x 分片数 与文件总大小是否一致
///
/// 乘法溢出的上界视为无穷大，溢出的下界视为不一致
fn size_is_consistent(rule: LastChunk, chunk_size: u64, total_chunks: u64, total_size: u64) -> bool {
    let at_most = |factor: u64| {
        chunk_size
            .checked_mul(factor)
            .map_or(true, |bound| total_size <= bound)
    };
    let below = |factor: u64| {
        chunk_size
            .checked_mul(factor)
            .map_or(true, |bound| total_size < bound)
    };
    let above = |factor: u64| {
        chunk_size
            .checked_mul(factor)
            .map_or(false, |bound| total_size > bound)
    };
    let at_least = |factor: u64| {
        chunk_size
            .checked_mul(factor)
            .map_or(false, |bound| total_size >= bound)
    };

    match rule {
        LastChunk::Shorter => {
            if total_chunks == 1 && total_size == 0 {
                return true;
            }
            above(total_chunks - 1) && at_most(total_chunks)
        }
        LastChunk::Absorbing => {
            if total_chunks == 1 {
                return below(2);
            }
            at_least(total_chunks) && total_chunks.checked_add(1).map_or(true, below)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn shorter(index: u64, total_chunks: u64, chunk_size: u64, total_size: u64) -> UploadDescriptor {
        UploadDescriptor {
            upload_id: "u1".to_string(),
            chunk_index: index,
            total_chunk_count: total_chunks,
            chunk_size,
            total_file_size: total_size,
            byte_offset: None,
            last_chunk: LastChunk::Shorter,
        }
    }

    fn absorbing(index: u64, total_chunks: u64, chunk_size: u64, total_size: u64) -> UploadDescriptor {
        UploadDescriptor {
            last_chunk: LastChunk::Absorbing,
            ..shorter(index, total_chunks, chunk_size, total_size)
        }
    }

    #[test]
    fn test_basic_checks() {
        assert_eq!(validate(&shorter(0, 0, 10, 0), 0), Err(RangeError::EmptyUpload));
        assert_eq!(validate(&shorter(0, 1, 0, 0), 0), Err(RangeError::InvalidChunkSize));
        assert_eq!(
            validate(&shorter(5, 5, 10, 50), 10),
            Err(RangeError::IndexOutOfRange { index: 5, total: 5 })
        );
    }

    #[test]
    fn test_shorter_last_chunk() {
        let range = validate(&shorter(2, 3, 100, 250), 50).unwrap();
        assert_eq!(
            range,
            ValidatedRange {
                start: 200,
                end: 250,
                len: 50,
                is_last: true
            }
        );

        let range = validate(&shorter(1, 3, 100, 250), 100).unwrap();
        assert_eq!((range.start, range.end, range.is_last), (100, 200, false));

        // 分片数声明过多 / 过少
        assert!(matches!(
            validate(&shorter(0, 4, 100, 250), 100),
            Err(RangeError::InconsistentSize { .. })
        ));
        assert!(matches!(
            validate(&shorter(0, 2, 100, 250), 100),
            Err(RangeError::InconsistentSize { .. })
        ));
    }

    #[test]
    fn test_empty_file_single_chunk() {
        let range = validate(&shorter(0, 1, 1024, 0), 0).unwrap();
        assert_eq!(range.len, 0);
        assert!(range.is_last);
    }

    #[test]
    fn test_absorbing_last_chunk() {
        // resumable.js: 2500 / 1024 => 2 个分片，最后一片 1476 bytes
        let range = validate(&absorbing(1, 2, 1024, 2500), 1476).unwrap();
        assert_eq!((range.start, range.end), (1024, 2500));

        // 小于一个分片的文件
        let range = validate(&absorbing(0, 1, 1024, 300), 300).unwrap();
        assert_eq!(range.len, 300);

        assert!(matches!(
            validate(&absorbing(0, 3, 1024, 2500), 1024),
            Err(RangeError::InconsistentSize { .. })
        ));
    }

    #[test]
    fn test_offset_and_payload_checks() {
        let mut descriptor = shorter(1, 3, 100, 250);
        descriptor.byte_offset = Some(150);
        assert_eq!(
            validate(&descriptor, 100),
            Err(RangeError::OffsetMismatch {
                expected: 100,
                actual: 150
            })
        );

        descriptor.byte_offset = Some(100);
        assert_eq!(
            validate(&descriptor, 99),
            Err(RangeError::PayloadSizeMismatch {
                expected: 100,
                actual: 99
            })
        );
    }

    #[test]
    fn test_overflow_is_rejected_not_panicking() {
        assert!(validate(&shorter(0, u64::MAX, u64::MAX, u64::MAX), 0).is_err());
        assert!(validate(&absorbing(1, u64::MAX, 2, u64::MAX), 2).is_err());
    }

    proptest! {
        #[test]
        fn prop_chunks_tile_the_file(total_size in 1u64..20_000, chunk_size in 1u64..2_000) {
            let total_chunks = total_size.div_ceil(chunk_size);
            let mut covered = 0u64;
            for index in 0..total_chunks {
                let expected = (total_size - index * chunk_size).min(chunk_size);
                let range = validate(&shorter(index, total_chunks, chunk_size, total_size), expected).unwrap();
                prop_assert_eq!(range.start, covered);
                covered = range.end;
            }
            prop_assert_eq!(covered, total_size);
        }
    }
}
