//! Seekable read cursor over the loaded instruction stream.

use crate::types::encoding::Decode;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::value::Value;

/// Fixed-capacity bytecode buffer with a read cursor.
///
/// Reads are bounded by the loaded length; the cursor itself may be placed
/// anywhere up to the capacity (a jump there simply hits end-of-stream).
#[derive(Debug)]
pub struct BytecodeReader {
    data: Vec<u8>,
    capacity: usize,
    cursor: usize,
}

impl BytecodeReader {
    /// Creates an empty reader able to hold `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::new(),
            capacity,
            cursor: 0,
        }
    }

    /// Replaces the buffer contents and rewinds the cursor.
    pub fn load(&mut self, bytes: &[u8]) -> Result<(), VMError> {
        if bytes.len() > self.capacity {
            return Err(VMError::CapacityExceeded {
                length: bytes.len(),
                capacity: self.capacity,
            });
        }
        self.data.clear();
        self.data.extend_from_slice(bytes);
        self.cursor = 0;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Returns true once every loaded byte has been consumed.
    pub fn is_at_end(&self) -> bool {
        self.cursor >= self.data.len()
    }

    /// Moves the cursor to an absolute position.
    pub fn set_cursor(&mut self, position: usize) -> Result<(), VMError> {
        if position > self.capacity {
            return Err(VMError::OutOfRange {
                position,
                capacity: self.capacity,
            });
        }
        self.cursor = position;
        Ok(())
    }

    /// Reads exactly `count` bytes from the cursor.
    fn read_exact(&mut self, count: usize) -> Result<&[u8], VMError> {
        let start = self.cursor;
        let slice = start
            .checked_add(count)
            .and_then(|end| self.data.get(start..end))
            .ok_or(VMError::EndOfStream { offset: start })?;
        self.cursor = start + count;
        Ok(slice)
    }

    /// Decodes one `T` at the cursor, advancing past it only on success.
    fn read<T: Decode>(&mut self) -> Result<T, VMError> {
        let start = self.cursor;
        let mut input = self
            .data
            .get(start..)
            .ok_or(VMError::EndOfStream { offset: start })?;
        let value = T::decode(&mut input).map_err(|e| VMError::from_decode(e, start))?;
        self.cursor = self.data.len() - input.len();
        Ok(value)
    }

    pub fn read_byte(&mut self) -> Result<u8, VMError> {
        Ok(self.read_exact(1)?[0])
    }

    pub fn read_int(&mut self) -> Result<i32, VMError> {
        self.read()
    }

    pub fn read_long(&mut self) -> Result<i64, VMError> {
        self.read()
    }

    pub fn read_double(&mut self) -> Result<f64, VMError> {
        self.read()
    }

    pub fn read_bool(&mut self) -> Result<bool, VMError> {
        self.read()
    }

    /// Reads an untagged string: one length byte, then that many UTF-8 bytes.
    pub fn read_string(&mut self) -> Result<String, VMError> {
        let start = self.cursor;
        let len = self.read_byte()? as usize;
        let remaining = self.data.len() - self.cursor;
        if remaining < len {
            self.cursor = start;
            return Err(VMError::TruncatedStream {
                offset: start,
                expected: len,
                remaining,
            });
        }
        let bytes = self.read_exact(len)?;
        match std::str::from_utf8(bytes) {
            Ok(s) => Ok(s.to_owned()),
            Err(_) => Err(VMError::MalformedValue {
                offset: start,
                reason: "string payload is not valid UTF-8".into(),
            }),
        }
    }

    /// Reads a type tag and the payload it announces.
    pub fn read_tagged(&mut self) -> Result<Value, VMError> {
        self.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::encoding::Encode;

    fn reader(bytes: &[u8]) -> BytecodeReader {
        let mut r = BytecodeReader::new(64);
        r.load(bytes).unwrap();
        r
    }

    #[test]
    fn load_rejects_oversized_program() {
        let mut r = BytecodeReader::new(2);
        assert_eq!(
            r.load(&[1, 2, 3]),
            Err(VMError::CapacityExceeded {
                length: 3,
                capacity: 2
            })
        );
        assert!(r.load(&[1, 2]).is_ok());
    }

    #[test]
    fn reads_fixed_width_values_in_order() {
        let mut bytes = vec![0x7f];
        bytes.extend((-3i32).to_bytes());
        bytes.extend(i64::MAX.to_bytes());
        bytes.extend(0.5f64.to_bytes());
        bytes.push(1);

        let mut r = reader(&bytes);
        assert_eq!(r.read_byte().unwrap(), 0x7f);
        assert_eq!(r.read_int().unwrap(), -3);
        assert_eq!(r.read_long().unwrap(), i64::MAX);
        assert_eq!(r.read_double().unwrap(), 0.5);
        assert!(r.read_bool().unwrap());
        assert!(r.is_at_end());
        assert_eq!(r.read_byte(), Err(VMError::EndOfStream { offset: 22 }));
    }

    #[test]
    fn partial_read_reports_start_offset() {
        let mut r = reader(&[0xAA, 0x01, 0x02]);
        r.read_byte().unwrap();
        assert_eq!(r.read_int(), Err(VMError::EndOfStream { offset: 1 }));
        assert_eq!(r.cursor(), 1);
    }

    #[test]
    fn read_string_and_truncation() {
        let mut r = reader(&[3, b'a', b'b', b'c', 5, b'x']);
        assert_eq!(r.read_string().unwrap(), "abc");
        assert_eq!(
            r.read_string(),
            Err(VMError::TruncatedStream {
                offset: 4,
                expected: 5,
                remaining: 1
            })
        );
    }

    #[test]
    fn read_tagged_dispatches_on_tag() {
        let mut bytes = Value::String("hi".into()).to_bytes();
        bytes.extend(Value::Long(-9).to_bytes());
        bytes.extend([0x09]);

        let mut r = reader(&bytes);
        assert_eq!(r.read_tagged().unwrap(), Value::String("hi".into()));
        assert_eq!(r.read_tagged().unwrap(), Value::Long(-9));
        assert_eq!(r.read_tagged(), Err(VMError::UnknownTypeTag { tag: 9 }));
    }

    #[test]
    fn truncated_tagged_string() {
        let mut r = reader(&[5, 10, b'a']);
        assert_eq!(
            r.read_tagged(),
            Err(VMError::TruncatedStream {
                offset: 0,
                expected: 10,
                remaining: 1
            })
        );
    }

    #[test]
    fn set_cursor_bounds() {
        let mut r = reader(&[1, 2, 3]);
        r.set_cursor(2).unwrap();
        assert_eq!(r.read_byte().unwrap(), 3);

        // Past the loaded bytes but within capacity: seek succeeds, read fails.
        r.set_cursor(10).unwrap();
        assert_eq!(r.read_byte(), Err(VMError::EndOfStream { offset: 10 }));

        assert_eq!(
            r.set_cursor(65),
            Err(VMError::OutOfRange {
                position: 65,
                capacity: 64
            })
        );
    }
}
