//! Built-in operations reachable through the `call` instruction.
//!
//! A syscall is addressed by its position in the [`SyscallTable`]. The
//! assembler resolves `call NAME ...` to that index and the VM looks the
//! handler up again at run time, so both sides must use the same table.
//! Handlers receive the declared argument count and pull their operands
//! from the instruction stream themselves.

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::vm::VM;
use std::sync::Arc;

/// Handler signature: the running VM and the argument count from the stream.
pub type SyscallHandler = fn(&mut VM, u8) -> Result<(), VMError>;

/// A named syscall entry.
#[derive(Clone, Copy)]
pub struct Syscall {
    pub name: &'static str,
    pub handler: SyscallHandler,
}

impl std::fmt::Debug for Syscall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Syscall").field("name", &self.name).finish()
    }
}

/// Immutable index-addressed syscall registry. Cloning shares the entries.
#[derive(Clone, Debug)]
pub struct SyscallTable {
    entries: Arc<[Syscall]>,
}

impl SyscallTable {
    /// Builds a table; entry `i` is invoked by `call` with index `i`.
    ///
    /// Entries past index 255 are unreachable from bytecode.
    pub fn new(entries: Vec<Syscall>) -> Self {
        Self {
            entries: entries.into(),
        }
    }

    /// The built-in set: `PRINTLN` at index 0.
    pub fn standard() -> Self {
        Self::new(vec![Syscall {
            name: "PRINTLN",
            handler: println,
        }])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves a syscall name (case-sensitive) to its index.
    pub fn index_of(&self, name: &str) -> Option<u8> {
        self.entries
            .iter()
            .position(|s| s.name == name)
            .and_then(|i| u8::try_from(i).ok())
    }

    /// Returns a copy of the entry at `index`.
    pub fn get(&self, index: u8) -> Result<Syscall, VMError> {
        self.entries
            .get(index as usize)
            .copied()
            .ok_or(VMError::UnknownSyscall {
                index,
                available: self.entries.len(),
            })
    }

    /// Invokes syscall `index` on `vm` with `count` declared arguments.
    pub fn call(&self, index: u8, vm: &mut VM, count: u8) -> Result<(), VMError> {
        let syscall = self.get(index)?;
        (syscall.handler)(vm, count)
    }
}

impl Default for SyscallTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// Writes the textual form of exactly one operand followed by a newline.
fn println(vm: &mut VM, count: u8) -> Result<(), VMError> {
    if count != 1 {
        return Err(VMError::ArityMismatch {
            instruction: "PRINTLN".to_string(),
            expected: 1,
            actual: count as usize,
        });
    }
    let value = vm.read_operand()?;
    vm.write_line(&value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_lookup() {
        let table = SyscallTable::standard();
        assert_eq!(table.len(), 1);
        assert_eq!(table.index_of("PRINTLN"), Some(0));
        assert_eq!(table.index_of("println"), None);
        assert_eq!(table.get(0).unwrap().name, "PRINTLN");
    }

    #[test]
    fn unknown_index() {
        let table = SyscallTable::standard();
        assert_eq!(
            table.get(3).unwrap_err(),
            VMError::UnknownSyscall {
                index: 3,
                available: 1
            }
        );
    }

    #[test]
    fn custom_entries_keep_registration_order() {
        fn noop(_: &mut VM, _: u8) -> Result<(), VMError> {
            Ok(())
        }
        let table = SyscallTable::new(vec![
            Syscall {
                name: "NOOP",
                handler: noop,
            },
            Syscall {
                name: "PRINTLN",
                handler: println,
            },
        ]);
        assert_eq!(table.index_of("NOOP"), Some(0));
        assert_eq!(table.index_of("PRINTLN"), Some(1));
    }
}
