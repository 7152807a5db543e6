//! Register-based bytecode virtual machine and its assembler.
//!
//! Assembly source is compiled by [`assembler`] into a stream of one-byte
//! opcodes followed by their operands, which [`vm::VM`] decodes and
//! executes. Values in the stream, in registers and in memory share one
//! self-describing encoding: a type tag byte and a little-endian payload
//! (see [`value`]).
//!
//! # Modules
//!
//! - [`arithmetic`]: Numeric promotion for `add`/`sub`/`mul`/`div`
//! - [`assembler`]: Assembly parsing, diagnostics and bytecode generation
//! - [`bytecode`]: Cursor over the loaded instruction stream
//! - [`config`]: VM sizing, with environment overrides
//! - [`errors`]: Assembly and execution error types
//! - [`isa`]: Instruction set definition and opcode mappings
//! - [`operand`]: Value-or-register operand encoding
//! - [`program`]: On-disk program container
//! - [`syscall`]: Syscall registry used by `call`
//! - [`value`]: Tagged runtime values
//! - [`vm`]: Execution engine and its threaded handle

pub mod arithmetic;
pub mod assembler;
pub mod bytecode;
pub mod config;
pub mod errors;
pub mod isa;
#[cfg(test)]
mod isa_static_check;
pub mod operand;
pub mod program;
pub mod syscall;
pub mod value;
pub mod vm;
