use serde::{Deserialize, Serialize};

#[cfg(target_endian = "big")]
pub const NATIVE_BYTE_ORDER: ByteOrder = ByteOrder::Big;

#[cfg(target_endian = "little")]
pub const NATIVE_BYTE_ORDER: ByteOrder = ByteOrder::Little;

/// Byte order / endianness of stored data.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    /// Big Endian
    Big,
    /// Little Endian
    #[default]
    Little,
}

impl ByteOrder {
    /// Whether data in this byte order can be used on this machine without swapping.
    pub fn is_native(self) -> bool {
        self == NATIVE_BYTE_ORDER
    }
}

/// Reverse the bytes of each `element_size` sized element of `data` in place.
///
/// Any trailing bytes that do not form a whole element are left untouched.
pub fn swap_bytes(data: &mut [u8], element_size: usize) {
    if element_size <= 1 {
        return;
    }
    for element in data.chunks_exact_mut(element_size) {
        element.reverse();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_byte_order() {
        assert!(NATIVE_BYTE_ORDER.is_native());
        let other = match NATIVE_BYTE_ORDER {
            ByteOrder::Big => ByteOrder::Little,
            ByteOrder::Little => ByteOrder::Big,
        };
        assert!(!other.is_native());
    }

    #[test]
    fn test_deserialise() {
        let little: ByteOrder = serde_json::from_str(r#""little""#).unwrap();
        assert_eq!(ByteOrder::Little, little);
        let big: ByteOrder = serde_json::from_str(r#""big""#).unwrap();
        assert_eq!(ByteOrder::Big, big);
    }

    #[test]
    fn test_swap_bytes() {
        let mut data = vec![1, 2, 3, 4, 5, 6, 7, 8];
        swap_bytes(&mut data, 4);
        assert_eq!(vec![4, 3, 2, 1, 8, 7, 6, 5], data);
        let value = 0x01020304_u32;
        let mut bytes = value.to_be_bytes();
        swap_bytes(&mut bytes, 4);
        assert_eq!(value.to_le_bytes(), bytes);
    }
}
