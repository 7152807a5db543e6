//! Runtime values and their tagged binary form.
//!
//! Every serialized value starts with a one-byte [`TypeTag`] followed by a
//! payload whose width is fixed per tag, except strings, which carry a
//! one-byte length prefix. The same form is used inside the instruction
//! stream and in linear memory.
//!
//! ```text
//! BYTE    01 | i8
//! INT     02 | i32 (LE)
//! LONG    03 | i64 (LE)
//! DOUBLE  04 | f64 bits (LE)
//! STRING  05 | len:u8 | len bytes of UTF-8
//! BOOLEAN 06 | 00 or 01
//! ```

use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink, read_bytes};
use crate::virtual_machine::errors::VMError;
use std::fmt;

/// Longest string payload the one-byte length prefix can describe.
pub const MAX_STRING_LEN: usize = u8::MAX as usize;

/// Type tag byte preceding every serialized value.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TypeTag {
    Byte = 1,
    Int = 2,
    Long = 3,
    Double = 4,
    String = 5,
    Boolean = 6,
}

impl TryFrom<u8> for TypeTag {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Byte),
            2 => Ok(Self::Int),
            3 => Ok(Self::Long),
            4 => Ok(Self::Double),
            5 => Ok(Self::String),
            6 => Ok(Self::Boolean),
            _ => Err(DecodeError::UnknownTypeTag(value)),
        }
    }
}

/// A dynamically typed VM value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Byte(i8),
    Int(i32),
    Long(i64),
    Double(f64),
    /// At most [`MAX_STRING_LEN`] bytes; build with [`Value::string`] to check.
    String(String),
    Bool(bool),
}

impl Value {
    /// Builds a string value, rejecting payloads the length byte cannot hold.
    pub fn string(s: impl Into<String>) -> Result<Self, VMError> {
        let s = s.into();
        if s.len() > MAX_STRING_LEN {
            return Err(VMError::StringTooLong { length: s.len() });
        }
        Ok(Value::String(s))
    }

    pub fn tag(&self) -> TypeTag {
        match self {
            Value::Byte(_) => TypeTag::Byte,
            Value::Int(_) => TypeTag::Int,
            Value::Long(_) => TypeTag::Long,
            Value::Double(_) => TypeTag::Double,
            Value::String(_) => TypeTag::String,
            Value::Bool(_) => TypeTag::Boolean,
        }
    }

    /// Returns the type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Byte(_) => "byte",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Bool(_) => "boolean",
        }
    }

    /// Numeric view used by the zero-comparing jumps.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Byte(v) => Some(v as f64),
            Value::Int(v) => Some(v as f64),
            Value::Long(v) => Some(v as f64),
            Value::Double(v) => Some(v),
            Value::String(_) | Value::Bool(_) => None,
        }
    }

    /// Integer view used for exit statuses; longs keep their low 32 bits.
    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            Value::Byte(v) => Some(v as i32),
            Value::Int(v) => Some(v),
            Value::Long(v) => Some(v as i32),
            _ => None,
        }
    }
}

/// Formats doubles the way the textual output expects: `8.0`, `NaN`,
/// `Infinity`. Magnitudes below `1e-3` or from `1e7` up use scientific form
/// with an upper-case `E`, as in `1.0E16` or `1.5E-4`.
fn fmt_double(v: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if v.is_nan() {
        return f.write_str("NaN");
    }
    if v.is_infinite() {
        return f.write_str(if v > 0.0 { "Infinity" } else { "-Infinity" });
    }

    let magnitude = v.abs();
    if v == 0.0 || (1e-3..1e7).contains(&magnitude) {
        if v.fract() == 0.0 {
            write!(f, "{v:.1}")
        } else {
            write!(f, "{v}")
        }
    } else {
        let sci = format!("{v:e}");
        let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
        if mantissa.contains('.') {
            write!(f, "{mantissa}E{exponent}")
        } else {
            write!(f, "{mantissa}.0E{exponent}")
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Byte(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Double(v) => fmt_double(*v, f),
            Value::String(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl Encode for Value {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        (self.tag() as u8).encode(out);
        match self {
            Value::Byte(v) => v.encode(out),
            Value::Int(v) => v.encode(out),
            Value::Long(v) => v.encode(out),
            Value::Double(v) => v.encode(out),
            Value::String(s) => {
                // Over-long strings cannot be built through `Value::string`.
                // One built directly is cut at the last whole character that fits.
                let mut end = s.len().min(MAX_STRING_LEN);
                while !s.is_char_boundary(end) {
                    end -= 1;
                }
                let bytes = &s.as_bytes()[..end];
                (bytes.len() as u8).encode(out);
                out.write(bytes);
            }
            Value::Bool(b) => b.encode(out),
        }
    }
}

impl Decode for Value {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let tag = TypeTag::try_from(u8::decode(input)?)?;
        Ok(match tag {
            TypeTag::Byte => Value::Byte(i8::decode(input)?),
            TypeTag::Int => Value::Int(i32::decode(input)?),
            TypeTag::Long => Value::Long(i64::decode(input)?),
            TypeTag::Double => Value::Double(f64::decode(input)?),
            TypeTag::String => {
                let len = u8::decode(input)? as usize;
                if input.len() < len {
                    return Err(DecodeError::Truncated {
                        expected: len,
                        remaining: input.len(),
                    });
                }
                let bytes = read_bytes(input, len)?;
                let s = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)?;
                Value::String(s.to_owned())
            }
            TypeTag::Boolean => Value::Bool(bool::decode(input)?),
        })
    }
}
