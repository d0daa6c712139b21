//! Checksum computation and the value codec.
//!
//! Values and checksums travel as big-endian unsigned byte strings. An empty
//! byte string decodes to zero.

use crate::types::Value;
use bytes::Bytes;

/// Sums every value yielded by `values`.
pub fn checksum<'a, I>(values: I) -> Value
where
    I: IntoIterator<Item = &'a Value>,
{
    values.into_iter().sum()
}

/// Encodes a value as big-endian unsigned bytes.
pub fn encode(value: &Value) -> Bytes {
    Bytes::from(value.to_bytes_be())
}

/// Decodes big-endian unsigned bytes into a value.
pub fn decode(bytes: &[u8]) -> Value {
    Value::from_bytes_be(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_sums_all_values() {
        let values = [Value::from(3_u32), Value::from(5_u32), Value::from(7_u32)];
        assert_eq!(checksum(&values), Value::from(15_u32));
    }

    #[test]
    fn checksum_of_nothing_is_zero() {
        assert_eq!(checksum(core::iter::empty()), Value::ZERO);
    }

    #[test]
    fn decode_empty_is_zero() {
        assert_eq!(decode(&[]), Value::ZERO);
    }

    #[test]
    fn encode_is_big_endian() {
        let value = Value::from(0x0102_u32);
        assert_eq!(encode(&value).as_ref(), &[0x01, 0x02]);
    }

    #[test]
    fn codec_preserves_values_wider_than_u64() {
        let value = Value::from(1_u32) << 200_u32;
        let bytes = encode(&value);
        assert_eq!(bytes.len(), 26);
        assert_eq!(decode(&bytes), value);
    }
}
