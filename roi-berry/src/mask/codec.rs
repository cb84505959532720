//! 行程与索引的定长二进制记录.
//!
//! 所有记录均为小端序、定长整数编码 (见 [`crate::consts::RUN_RECORD_SIZE`] 和
//! [`crate::consts::INDEX_RECORD_SIZE`]). 序列化后的掩膜就是按规范顺序首尾相接的记录,
//! 不带任何类型标记或版本号.

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{MaskIndex, MaskRun};
use crate::consts::{INDEX_RECORD_SIZE, RUN_RECORD_SIZE};
use crate::{MaskError, MaskResult};

/// 定长、小端序的 bincode 配置.
#[inline]
fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
}

fn encode<'a, T: Serialize + 'a, I: IntoIterator<Item = &'a T>>(it: I, capacity: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(capacity);
    for rec in it {
        options()
            .serialize_into(&mut buf, rec)
            .expect("serializing into a Vec<u8> never fails");
    }
    buf
}

fn decode<T: DeserializeOwned>(data: &[u8], record_size: usize, what: &str) -> MaskResult<Vec<T>> {
    if data.len() % record_size != 0 {
        return Err(MaskError::MalformedInput(format!(
            "{what} data length {} is not a multiple of the record size {record_size}",
            data.len()
        )));
    }
    data.chunks_exact(record_size)
        .map(|chunk| {
            options()
                .deserialize(chunk)
                .map_err(|e| MaskError::MalformedInput(e.to_string()))
        })
        .collect()
}

/// 将行程序列编码为字节流.
pub(crate) fn encode_runs(runs: &[MaskRun]) -> Vec<u8> {
    encode(runs, runs.len() * RUN_RECORD_SIZE)
}

/// 从字节流解码行程序列. 字节数不是记录大小的整数倍时返回 `MalformedInput`.
pub(crate) fn decode_runs(data: &[u8]) -> MaskResult<Vec<MaskRun>> {
    decode(data, RUN_RECORD_SIZE, "run")
}

/// 将索引序列编码为字节流.
pub(crate) fn encode_indexes(indexes: &[MaskIndex]) -> Vec<u8> {
    encode(indexes, indexes.len() * INDEX_RECORD_SIZE)
}

/// 从字节流解码索引序列.
pub(crate) fn decode_indexes(data: &[u8]) -> MaskResult<Vec<MaskIndex>> {
    decode(data, INDEX_RECORD_SIZE, "index")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_sizes() {
        let run = MaskRun::new(2..6, 7, 8, 5.0);
        assert_eq!(options().serialized_size(&run).unwrap(), RUN_RECORD_SIZE as u64);
        let index = MaskIndex::new(1, 2, 3);
        assert_eq!(options().serialized_size(&index).unwrap(), INDEX_RECORD_SIZE as u64);
    }

    #[test]
    fn test_run_layout() {
        let run = MaskRun::new(2..6, 7, 8, 5.0);
        let bytes = encode_runs(&[run]);
        let mut expected = Vec::new();
        expected.extend_from_slice(&2u32.to_le_bytes());
        expected.extend_from_slice(&4u32.to_le_bytes());
        expected.extend_from_slice(&7u32.to_le_bytes());
        expected.extend_from_slice(&8u32.to_le_bytes());
        expected.extend_from_slice(&5.0f32.to_le_bytes());
        assert_eq!(bytes, expected);
        assert_eq!(decode_runs(&bytes).unwrap(), vec![run]);
    }

    #[test]
    fn test_index_layout() {
        let bytes = encode_indexes(&[MaskIndex::new(1, 2, 3)]);
        assert_eq!(bytes, [1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0]);
        assert_eq!(decode_indexes(&bytes).unwrap(), vec![MaskIndex::new(1, 2, 3)]);
    }

    #[test]
    fn test_bad_length() {
        let bytes = encode_runs(&[MaskRun::new(0..1, 0, 0, 1.0)]);
        assert!(matches!(
            decode_runs(&bytes[..RUN_RECORD_SIZE - 1]),
            Err(MaskError::MalformedInput(_))
        ));
        assert!(matches!(
            decode_indexes(&[0u8; 13]),
            Err(MaskError::MalformedInput(_))
        ));
        assert!(decode_runs(&[]).unwrap().is_empty());
    }
}
