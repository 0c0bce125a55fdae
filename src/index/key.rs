//! Order-preserving key encodings.
//!
//! The B+tree compares keys as raw bytes. These helpers encode values so
//! that byte order matches value order: integers are written big-endian,
//! and signed integers have their sign bit flipped so negatives sort first.

use crate::common::{Error, Result};

pub fn encode_u32(value: u32) -> [u8; 4] {
    value.to_be_bytes()
}

pub fn decode_u32(key: &[u8]) -> Result<u32> {
    Ok(u32::from_be_bytes(fixed(key)?))
}

pub fn encode_i32(value: i32) -> [u8; 4] {
    ((value as u32) ^ (1 << 31)).to_be_bytes()
}

pub fn decode_i32(key: &[u8]) -> Result<i32> {
    Ok((u32::from_be_bytes(fixed(key)?) ^ (1 << 31)) as i32)
}

pub fn encode_u64(value: u64) -> [u8; 8] {
    value.to_be_bytes()
}

pub fn decode_u64(key: &[u8]) -> Result<u64> {
    Ok(u64::from_be_bytes(fixed(key)?))
}

pub fn encode_i64(value: i64) -> [u8; 8] {
    ((value as u64) ^ (1 << 63)).to_be_bytes()
}

pub fn decode_i64(key: &[u8]) -> Result<i64> {
    Ok((u64::from_be_bytes(fixed(key)?) ^ (1 << 63)) as i64)
}

/// Zero-pad `bytes` to `width`.
///
/// Padding makes `"ab"` and `"ab\0"` the same key.
///
/// # Errors
/// `Error::KeySize` if `bytes` is longer than `width`.
pub fn encode_bytes(bytes: &[u8], width: usize) -> Result<Vec<u8>> {
    if bytes.len() > width {
        return Err(Error::KeySize {
            expected: width,
            actual: bytes.len(),
        });
    }
    let mut key = vec![0u8; width];
    key[..bytes.len()].copy_from_slice(bytes);
    Ok(key)
}

fn fixed<const N: usize>(key: &[u8]) -> Result<[u8; N]> {
    key.try_into().map_err(|_| Error::KeySize {
        expected: N,
        actual: key.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_signed_order() {
        let values = [i32::MIN, -100, -1, 0, 1, 100, i32::MAX];
        for pair in values.windows(2) {
            assert!(encode_i32(pair[0]) < encode_i32(pair[1]));
        }
        assert_eq!(decode_i32(&encode_i32(-7)).unwrap(), -7);
    }

    #[test]
    fn test_bytes_padding() {
        assert_eq!(encode_bytes(b"ab", 4).unwrap(), vec![b'a', b'b', 0, 0]);
        assert!(matches!(
            encode_bytes(b"abcde", 4),
            Err(Error::KeySize {
                expected: 4,
                actual: 5
            })
        ));
    }

    #[test]
    fn test_decode_wrong_width() {
        assert!(decode_u32(&[1, 2, 3]).is_err());
        assert!(decode_i64(&[0; 4]).is_err());
    }

    proptest! {
        #[test]
        fn prop_u64_order_preserved(a: u64, b: u64) {
            prop_assert_eq!(a.cmp(&b), encode_u64(a).cmp(&encode_u64(b)));
            prop_assert_eq!(decode_u64(&encode_u64(a)).unwrap(), a);
        }

        #[test]
        fn prop_i64_order_preserved(a: i64, b: i64) {
            prop_assert_eq!(a.cmp(&b), encode_i64(a).cmp(&encode_i64(b)));
            prop_assert_eq!(decode_i64(&encode_i64(a)).unwrap(), a);
        }

        #[test]
        fn prop_u32_order_preserved(a: u32, b: u32) {
            prop_assert_eq!(a.cmp(&b), encode_u32(a).cmp(&encode_u32(b)));
        }
    }
}
