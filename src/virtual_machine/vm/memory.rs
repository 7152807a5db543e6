use crate::types::encoding::{Decode, DecodeError, Encode};
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::value::{MAX_STRING_LEN, TypeTag, Value};

/// Linear byte-addressable memory.
///
/// Values are stored in their tagged form at program-chosen addresses. Only
/// the buffer bounds are checked: overlapping stores overwrite each other.
pub(crate) struct Memory {
    bytes: Vec<u8>,
}

impl Memory {
    /// Allocates `size` zeroed bytes.
    pub(crate) fn new(size: usize) -> Self {
        Self {
            bytes: vec![0; size],
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.bytes.len()
    }

    fn out_of_range(&self, address: usize, width: usize) -> VMError {
        VMError::AddressOutOfRange {
            address,
            width,
            capacity: self.bytes.len(),
        }
    }

    /// Writes `value` (tag and payload) starting at `address`.
    ///
    /// Nothing is written unless the whole value fits.
    pub(crate) fn store(&mut self, address: usize, value: &Value) -> Result<(), VMError> {
        if let Value::String(s) = value
            && s.len() > MAX_STRING_LEN
        {
            return Err(VMError::StringTooLong { length: s.len() });
        }

        let encoded = value.to_bytes();
        let end = address
            .checked_add(encoded.len())
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| self.out_of_range(address, encoded.len()))?;
        self.bytes[address..end].copy_from_slice(&encoded);
        Ok(())
    }

    /// Reads the tagged value stored at `address`.
    pub(crate) fn load(&self, address: usize) -> Result<Value, VMError> {
        let mut input = self
            .bytes
            .get(address..)
            .filter(|rest| !rest.is_empty())
            .ok_or_else(|| self.out_of_range(address, 1))?;
        let stored = input;

        Value::decode(&mut input).map_err(|e| match e {
            DecodeError::UnexpectedEof | DecodeError::Truncated { .. } => {
                self.out_of_range(address, encoded_width(stored))
            }
            other => VMError::from_decode(other, address),
        })
    }
}

/// Width the tagged value at the start of `stored` claims to occupy.
fn encoded_width(stored: &[u8]) -> usize {
    let payload = match TypeTag::try_from(stored[0]) {
        Ok(TypeTag::Byte) | Ok(TypeTag::Boolean) => 1,
        Ok(TypeTag::Int) => 4,
        Ok(TypeTag::Long) | Ok(TypeTag::Double) => 8,
        Ok(TypeTag::String) => 1 + stored.get(1).copied().unwrap_or(0) as usize,
        Err(_) => 0,
    };
    1 + payload
}
