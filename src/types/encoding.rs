//! Binary encoding and decoding traits shared by the bytecode format, linear
//! memory and the program file container.
//!
//! All multi-byte data uses little-endian byte order.
//!
//! # Binary Format
//!
//! - Integers: little-endian, fixed-width
//! - `f64`: IEEE-754 bit pattern, little-endian
//! - `usize`: encoded as `u64` for portability
//! - `bool`: single byte (0 = false, 1 = true, anything else is rejected)
//! - `Vec<T>`: 8-byte length prefix followed by elements
//! - Arrays `[T; N]`: elements serialized sequentially without length prefix
//!
//! VM values carry their own one-byte tag and string length prefix, see
//! [`crate::virtual_machine::value`].

use micro_derive::Error;

/// Sink for writing encoded bytes.
pub trait EncodeSink {
    /// Writes the given bytes to the sink.
    fn write(&mut self, bytes: &[u8]);
}

/// Counter for computing encoded size without allocating memory.
///
/// Used by `Encode::to_bytes` to pre-allocate exact capacity, and by linear
/// memory to bounds-check a store before touching the buffer.
pub struct SizeCounter {
    len: usize,
}

impl SizeCounter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self { len: 0 }
    }

    /// Returns the total number of bytes counted.
    pub fn len(&self) -> usize {
        self.len
    }
}

impl Default for SizeCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl EncodeSink for SizeCounter {
    fn write(&mut self, bytes: &[u8]) {
        self.len += bytes.len();
    }
}

impl EncodeSink for Vec<u8> {
    fn write(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

/// Trait for types that can be serialized to binary format.
pub trait Encode {
    /// Writes the binary representation to the given sink.
    fn encode<S: EncodeSink>(&self, out: &mut S);

    /// Returns the number of bytes `encode` will write.
    fn encoded_len(&self) -> usize {
        let mut counter = SizeCounter::new();
        self.encode(&mut counter);
        counter.len()
    }

    /// Serializes to a new byte buffer with exact capacity.
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode(&mut out);
        out
    }
}

/// Errors that can occur during decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Input ended before a fixed-width field was complete.
    #[error("unexpected end of input")]
    UnexpectedEof,
    /// A length-prefixed payload is shorter than its prefix claims.
    #[error("truncated payload: expected {expected} bytes, {remaining} remaining")]
    Truncated { expected: usize, remaining: usize },
    /// Data does not represent a valid value for the target type.
    #[error("invalid value")]
    InvalidValue,
    /// Length prefix exceeds maximum allowed size.
    #[error("length prefix too large")]
    LengthOverflow,
    /// Leading type tag is not one of the known value kinds.
    #[error("unknown type tag {0:#04x}")]
    UnknownTypeTag(u8),
    /// String payload is not valid UTF-8.
    #[error("string payload is not valid UTF-8")]
    InvalidUtf8,
}

/// Trait for types that can be deserialized from binary format.
pub trait Decode: Sized {
    /// Reads and decodes a value from the input buffer.
    ///
    /// Advances the input slice past the consumed bytes.
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError>;

    /// Decodes a value from a byte slice, requiring all bytes to be consumed.
    ///
    /// Returns `InvalidValue` if trailing bytes remain after decoding.
    fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        let mut input = data;
        let value = Self::decode(&mut input)?;

        if !input.is_empty() {
            return Err(DecodeError::InvalidValue);
        }

        Ok(value)
    }
}

/// Reads exactly `n` bytes from the input, advancing the slice.
pub(crate) fn read_bytes<'a>(input: &mut &'a [u8], n: usize) -> Result<&'a [u8], DecodeError> {
    if input.len() < n {
        return Err(DecodeError::UnexpectedEof);
    }
    let (bytes, rest) = input.split_at(n);
    *input = rest;
    Ok(bytes)
}

/// Reads exactly `N` bytes into an array.
fn read_array<const N: usize>(input: &mut &[u8]) -> Result<[u8; N], DecodeError> {
    let mut buf = [0u8; N];
    buf.copy_from_slice(read_bytes(input, N)?);
    Ok(buf)
}

impl Encode for u8 {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&[*self]);
    }
}

impl Decode for u8 {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let [b] = read_array::<1>(input)?;
        Ok(b)
    }
}

impl Encode for i8 {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&[*self as u8]);
    }
}

impl Decode for i8 {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let [b] = read_array::<1>(input)?;
        Ok(b as i8)
    }
}

// Fixed-size numeric types, including f64 through its LE bit pattern.
macro_rules! impl_fixed {
    ($($t:ty),*) => {
        $(
            impl Encode for $t {
                fn encode<S: EncodeSink>(&self, out: &mut S) {
                    out.write(&self.to_le_bytes());
                }
            }

            impl Decode for $t {
                fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
                    Ok(<$t>::from_le_bytes(read_array(input)?))
                }
            }
        )*
    };
}

impl_fixed!(u16, u32, u64, i16, i32, i64, f64);

impl Encode for usize {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        (*self as u64).encode(out);
    }
}

impl Decode for usize {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let v = u64::decode(input)?;
        usize::try_from(v).map_err(|_| DecodeError::LengthOverflow)
    }
}

impl Encode for bool {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&[*self as u8]);
    }
}

impl Decode for bool {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        match u8::decode(input)? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(DecodeError::InvalidValue),
        }
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.len().encode(out);
        for item in self {
            item.encode(out);
        }
    }
}

/// Maximum allowed length for decoded vectors to prevent memory exhaustion.
const MAX_VEC_LEN: usize = 16 * 1024 * 1024;

impl<T: Decode> Decode for Vec<T> {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let len = usize::decode(input)?;
        if len > MAX_VEC_LEN {
            return Err(DecodeError::LengthOverflow);
        }

        let mut vec = Vec::with_capacity(len.min(input.len()));
        for _ in 0..len {
            vec.push(T::decode(input)?);
        }
        Ok(vec)
    }
}

impl<T: Encode, const N: usize> Encode for [T; N] {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        for item in self {
            item.encode(out);
        }
    }
}

impl<T: Decode, const N: usize> Decode for [T; N] {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let mut vec = Vec::with_capacity(N);
        for _ in 0..N {
            vec.push(T::decode(input)?);
        }
        vec.try_into().map_err(|_| DecodeError::InvalidValue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_counter_accumulates() {
        let mut counter = SizeCounter::new();
        assert_eq!(counter.len(), 0);

        counter.write(&[1, 2, 3]);
        assert_eq!(counter.len(), 3);

        counter.write(&[4, 5]);
        assert_eq!(counter.len(), 5);
    }

    #[test]
    fn to_bytes_preallocates_exact_capacity() {
        let data: Vec<u8> = vec![1, 2, 3, 4, 5];
        let bytes = data.to_bytes();
        assert_eq!(bytes.len(), 8 + 5);
        assert_eq!(bytes.capacity(), bytes.len());
        assert_eq!(data.encoded_len(), 13);
    }

    #[test]
    fn i8_reinterprets_bit_pattern() {
        assert_eq!((-1i8).to_bytes(), vec![0xFF]);
        assert_eq!(i8::from_bytes(&[0x80]).unwrap(), i8::MIN);
    }

    #[test]
    fn i32_little_endian() {
        let val: i32 = 0x12345678;
        let bytes = val.to_bytes();
        assert_eq!(bytes, vec![0x78, 0x56, 0x34, 0x12]);
        assert_eq!(i32::from_bytes(&bytes).unwrap(), val);
    }

    #[test]
    fn i64_negative_values() {
        let bytes = (-1i64).to_bytes();
        assert_eq!(bytes, vec![0xFF; 8]);
        assert_eq!(i64::from_bytes(&bytes).unwrap(), -1);
    }

    #[test]
    fn f64_uses_le_bit_pattern() {
        let bytes = 1.5f64.to_bytes();
        assert_eq!(bytes, 1.5f64.to_bits().to_le_bytes().to_vec());
        assert_eq!(f64::from_bytes(&bytes).unwrap(), 1.5);
    }

    #[test]
    fn f64_preserves_nan_and_signed_zero() {
        assert!(f64::from_bytes(&f64::NAN.to_bytes()).unwrap().is_nan());
        let neg_zero = f64::from_bytes(&(-0.0f64).to_bytes()).unwrap();
        assert!(neg_zero == 0.0 && neg_zero.is_sign_negative());
    }

    #[test]
    fn usize_encoded_as_u64() {
        let bytes = 42usize.to_bytes();
        assert_eq!(bytes.len(), 8);
        assert_eq!(usize::from_bytes(&bytes).unwrap(), 42);
    }

    #[test]
    fn bool_encoding() {
        assert_eq!(false.to_bytes(), vec![0u8]);
        assert_eq!(true.to_bytes(), vec![1u8]);
        assert!(bool::from_bytes(&[1]).unwrap());
    }

    #[test]
    fn bool_invalid_value() {
        for invalid in [2u8, 128, 255] {
            let result = bool::from_bytes(&[invalid]);
            assert!(matches!(result, Err(DecodeError::InvalidValue)));
        }
    }

    #[test]
    fn vec_encoding_format() {
        let vec: Vec<u8> = vec![0xAA, 0xBB, 0xCC];
        let bytes = vec.to_bytes();
        assert_eq!(&bytes[0..8], &3u64.to_le_bytes());
        assert_eq!(&bytes[8..], &[0xAA, 0xBB, 0xCC]);
        assert_eq!(Vec::<u8>::from_bytes(&bytes).unwrap(), vec);
    }

    #[test]
    fn vec_length_overflow() {
        let bytes = ((MAX_VEC_LEN as u64) + 1).to_bytes();
        let result = Vec::<u8>::from_bytes(&bytes);
        assert!(matches!(result, Err(DecodeError::LengthOverflow)));
    }

    #[test]
    fn vec_claiming_more_than_input_fails_cleanly() {
        let mut bytes = 1000u64.to_bytes();
        bytes.extend_from_slice(&[1, 2, 3]);
        assert!(matches!(
            Vec::<u8>::from_bytes(&bytes),
            Err(DecodeError::UnexpectedEof)
        ));
    }

    #[test]
    fn array_no_length_prefix() {
        let arr: [u8; 4] = [1, 2, 3, 4];
        let bytes = arr.to_bytes();
        assert_eq!(bytes, vec![1, 2, 3, 4]);
        assert_eq!(<[u8; 4]>::from_bytes(&bytes).unwrap(), arr);
    }

    #[test]
    fn unexpected_eof_partial_input() {
        let result = i32::from_bytes(&[0x12, 0x34]);
        assert!(matches!(result, Err(DecodeError::UnexpectedEof)));
    }

    #[test]
    fn trailing_bytes_error() {
        let result = u8::from_bytes(&[42u8, 0xFF, 0xFF]);
        assert!(matches!(result, Err(DecodeError::InvalidValue)));
    }

    #[test]
    fn decode_advances_input() {
        let mut input: &[u8] = &[0x01, 0x02, 0x03, 0x04, 0x05];

        assert_eq!(u8::decode(&mut input).unwrap(), 0x01);
        assert_eq!(input.len(), 4);

        assert_eq!(u16::decode(&mut input).unwrap(), 0x0302);
        assert_eq!(input.len(), 2);
    }

    #[test]
    fn decode_error_display() {
        assert_eq!(
            DecodeError::UnknownTypeTag(9).to_string(),
            "unknown type tag 0x09"
        );
        assert_eq!(
            DecodeError::Truncated {
                expected: 4,
                remaining: 1
            }
            .to_string(),
            "truncated payload: expected 4 bytes, 1 remaining"
        );
    }
}
