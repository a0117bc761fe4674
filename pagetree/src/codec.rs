//! Fixed-width encoding of keys and records.
//!
//! Pages store keys and records in slots of a fixed byte width, so every type
//! placed in a tree or counter implements [`FixedWidth`]. Comparisons are
//! never made on the encoded bytes; trees order keys with the type's `Ord`.
//!
//! Integers are big-endian so that their byte order also matches their
//! numeric order, which keeps files readable with a hex dump.

/// A value with a fixed-size byte encoding.
pub trait FixedWidth: Sized {
    /// Encoded size in bytes.
    const WIDTH: usize;

    /// Write the value into `out[..Self::WIDTH]`.
    fn encode(&self, out: &mut [u8]);

    /// Read a value from `bytes[..Self::WIDTH]`.
    fn decode(bytes: &[u8]) -> Self;
}

impl<const N: usize> FixedWidth for [u8; N] {
    const WIDTH: usize = N;

    fn encode(&self, out: &mut [u8]) {
        out[..N].copy_from_slice(self);
    }

    fn decode(bytes: &[u8]) -> Self {
        let mut value = [0u8; N];
        value.copy_from_slice(&bytes[..N]);
        value
    }
}

macro_rules! impl_fixed_width_int {
    ($($ty:ty),*) => {
        $(
            impl FixedWidth for $ty {
                const WIDTH: usize = std::mem::size_of::<$ty>();

                fn encode(&self, out: &mut [u8]) {
                    out[..Self::WIDTH].copy_from_slice(&self.to_be_bytes());
                }

                fn decode(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..Self::WIDTH]);
                    Self::from_be_bytes(raw)
                }
            }
        )*
    };
}

impl_fixed_width_int!(u16, u32, u64);

/// Composite keys: the fields are concatenated and compared as a tuple.
impl<A: FixedWidth, B: FixedWidth> FixedWidth for (A, B) {
    const WIDTH: usize = A::WIDTH + B::WIDTH;

    fn encode(&self, out: &mut [u8]) {
        self.0.encode(&mut out[..A::WIDTH]);
        self.1.encode(&mut out[A::WIDTH..Self::WIDTH]);
    }

    fn decode(bytes: &[u8]) -> Self {
        (
            A::decode(&bytes[..A::WIDTH]),
            B::decode(&bytes[A::WIDTH..Self::WIDTH]),
        )
    }
}

/// Copy `text` into a NUL-padded fixed-width field, truncating if too long.
#[must_use]
pub fn padded<const N: usize>(text: &[u8]) -> [u8; N] {
    let mut field = [0u8; N];
    let len = text.len().min(N);
    field[..len].copy_from_slice(&text[..len]);
    field
}

/// The bytes of a NUL-padded field without its padding.
#[must_use]
pub fn unpadded(field: &[u8]) -> &[u8] {
    let end = field.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &field[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded<T: FixedWidth>(value: &T) -> Vec<u8> {
        let mut out = vec![0u8; T::WIDTH];
        value.encode(&mut out);
        out
    }

    #[test]
    fn test_integers_are_big_endian() {
        assert_eq!(encoded(&0x0102_u16), vec![0x01, 0x02]);
        assert_eq!(encoded(&0x0102_0304_u32), vec![0x01, 0x02, 0x03, 0x04]);
        assert_eq!(u64::decode(&encoded(&42_u64)), 42);
        assert_eq!(u64::WIDTH, 8);
    }

    #[test]
    fn test_integer_bytes_sort_like_values() {
        let values = [0_u32, 1, 255, 256, 65_536, u32::MAX];
        for pair in values.windows(2) {
            assert!(encoded(&pair[0]) < encoded(&pair[1]));
        }
    }

    #[test]
    fn test_composite_key_layout() {
        let key: ([u8; 4], u64) = (*b"abcd", 7);
        let bytes = encoded(&key);

        assert_eq!(<([u8; 4], u64)>::WIDTH, 12);
        assert_eq!(&bytes[..4], b"abcd");
        assert_eq!(&bytes[4..], &7_u64.to_be_bytes());
        assert_eq!(<([u8; 4], u64)>::decode(&bytes), key);
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let bytes = [0, 0, 0, 9, 0xFF, 0xFF];
        assert_eq!(u32::decode(&bytes), 9);
    }

    #[test]
    fn test_padded_fields() {
        let name: [u8; 8] = padded(b"ten");
        assert_eq!(&name, b"ten\0\0\0\0\0");
        assert_eq!(unpadded(&name), b"ten");

        let truncated: [u8; 4] = padded(b"seventy");
        assert_eq!(&truncated, b"seve");
        assert_eq!(unpadded(&truncated), b"seve");

        assert_eq!(unpadded(&[0u8; 3]), b"");
    }
}
