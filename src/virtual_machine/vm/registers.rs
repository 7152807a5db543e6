use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::value::Value;

/// Register file holding VM values.
///
/// Slots start empty and each write replaces the slot's value and kind.
pub(crate) struct Registers {
    regs: Vec<Option<Value>>,
}

impl Registers {
    /// Creates a register file with `count` empty slots.
    pub(crate) fn new(count: usize) -> Self {
        Self {
            regs: vec![None; count],
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.regs.len()
    }

    /// Returns a reference to the value in register `idx`.
    ///
    /// Fails with [`VMError::IndexOutOfRange`] past the last slot and
    /// [`VMError::UninitializedRegister`] for a slot never written.
    pub(crate) fn get(&self, idx: u8) -> Result<&Value, VMError> {
        self.regs
            .get(idx as usize)
            .ok_or(VMError::IndexOutOfRange {
                index: idx,
                capacity: self.regs.len(),
            })?
            .as_ref()
            .ok_or(VMError::UninitializedRegister { index: idx })
    }

    /// Stores a value into register `idx`.
    pub(crate) fn set(&mut self, idx: u8, v: Value) -> Result<(), VMError> {
        let capacity = self.regs.len();
        let slot = self
            .regs
            .get_mut(idx as usize)
            .ok_or(VMError::IndexOutOfRange {
                index: idx,
                capacity,
            })?;
        *slot = Some(v);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get() {
        let mut regs = Registers::new(4);
        regs.set(3, Value::Int(9)).unwrap();
        assert_eq!(regs.get(3).unwrap(), &Value::Int(9));
    }

    #[test]
    fn write_replaces_kind() {
        let mut regs = Registers::new(1);
        regs.set(0, Value::Int(1)).unwrap();
        regs.set(0, Value::String("now a string".into())).unwrap();
        assert_eq!(regs.get(0).unwrap(), &Value::String("now a string".into()));
    }

    #[test]
    fn uninitialized_slot() {
        let regs = Registers::new(2);
        assert_eq!(regs.get(1), Err(VMError::UninitializedRegister { index: 1 }));
    }

    #[test]
    fn index_out_of_range() {
        let mut regs = Registers::new(2);
        assert_eq!(regs.capacity(), 2);
        assert_eq!(
            regs.set(2, Value::Bool(true)),
            Err(VMError::IndexOutOfRange {
                index: 2,
                capacity: 2
            })
        );
        assert!(matches!(
            regs.get(200),
            Err(VMError::IndexOutOfRange { index: 200, .. })
        ));
    }

    #[test]
    fn full_file_addresses_every_byte_index() {
        let mut regs = Registers::new(256);
        regs.set(255, Value::Byte(1)).unwrap();
        assert_eq!(regs.get(255).unwrap(), &Value::Byte(1));
    }
}
