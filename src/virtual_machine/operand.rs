use crate::types::encoding::{Encode, EncodeSink};
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::value::Value;

/// Discriminator byte that precedes every value-or-register operand.
///
/// Read positionally: the byte after the opcode (or after the previous
/// operand) is always a discriminator, never a type tag.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OperandKind {
    Register = 0x00,
    Value = 0x01,
}

impl TryFrom<u8> for OperandKind {
    type Error = VMError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::Register),
            0x01 => Ok(Self::Value),
            _ => Err(VMError::InvalidOperandKind {
                kind: value,
                offset: 0,
            }),
        }
    }
}

/// Source operand: a register reference or an immediate tagged value.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Register(u8),
    Value(Value),
}

impl Operand {
    pub fn kind(&self) -> OperandKind {
        match self {
            Operand::Register(_) => OperandKind::Register,
            Operand::Value(_) => OperandKind::Value,
        }
    }
}

impl Encode for Operand {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        (self.kind() as u8).encode(out);
        match self {
            Operand::Register(r) => r.encode(out),
            Operand::Value(v) => v.encode(out),
        }
    }
}
