//! Micro register VM library.
//!
//! Provides the assembler, the bytecode format and the virtual machine that
//! executes it.

pub mod types;
pub mod utils;
pub mod virtual_machine;

mod test_utils;
