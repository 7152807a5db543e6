use crate::types::encoding::DecodeError;
use micro_derive::Error;

/// Errors that can occur during assembly, loading or execution.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VMError {
    // ==================== Assembly ====================
    /// Assembly error with source position context (1-based line and column).
    #[error("line {line}:{offset}: {source}")]
    AssemblyError {
        line: usize,
        offset: usize,
        source: String,
    },
    /// Unrecognized instruction mnemonic.
    #[error("unknown instruction `{name}`")]
    UnknownInstruction { name: String },
    /// Wrong number of operands for an instruction or syscall.
    #[error("operand count mismatch for {instruction}: expected {expected}, got {actual}")]
    ArityMismatch {
        instruction: String,
        expected: usize,
        actual: usize,
    },
    /// Expected a register operand (`R0`..`R255`).
    #[error("invalid register `{token}`")]
    InvalidRegister { token: String },
    /// Token does not match the value literal grammar.
    #[error("invalid literal `{token}`")]
    InvalidLiteral { token: String },
    /// Memory address operand is not a byte.
    #[error("invalid address `{token}`, expected 0-255 or 0x00-0xff")]
    InvalidAddress { token: String },
    /// String literal without its closing quote.
    #[error("unterminated string literal starting at column {column}")]
    UnterminatedString { column: usize },
    /// Label line with nothing before the colon.
    #[error("empty label name")]
    EmptyLabel,
    /// Label defined more than once.
    #[error("duplicate label `{label}`")]
    DuplicateLabel { label: String },
    /// Reference to a label that is never declared.
    #[error("undefined label `{label}`")]
    UndefinedLabel { label: String },
    /// `call` names a syscall that is not registered.
    #[error("unknown syscall `{name}`")]
    UnknownSyscallName { name: String },
    /// `call` passes more arguments than fit the count byte.
    #[error("too many syscall arguments: {count} (max 255)")]
    TooManyArguments { count: usize },
    /// A string literal or concatenation result exceeds 255 bytes.
    #[error("string of {length} bytes exceeds the 255-byte limit")]
    StringTooLong { length: usize },
    /// File I/O error while reading source or writing output.
    #[error("io error on {path}: {source}")]
    IoError { path: String, source: String },

    // ==================== Loading ====================
    /// Program is larger than the configured bytecode capacity.
    #[error("program of {length} bytes exceeds bytecode capacity {capacity}")]
    CapacityExceeded { length: usize, capacity: usize },
    /// Program container could not be decoded.
    #[error("invalid program file: {reason}")]
    ProgramDecode { reason: String },
    /// Configuration value rejected.
    #[error("invalid configuration {key}={value}: {reason}")]
    InvalidConfig {
        key: &'static str,
        value: String,
        reason: &'static str,
    },

    // ==================== Execution ====================
    /// Unknown opcode encountered in bytecode.
    #[error("invalid instruction {opcode:#04x} at offset {offset}")]
    InvalidInstruction { opcode: u8, offset: usize },
    /// Bytecode ended where an opcode was expected.
    #[error("program ended at offset {offset} without executing halt")]
    MissingHalt { offset: usize },
    /// Read past the end of the loaded bytecode.
    #[error("unexpected end of bytecode at offset {offset}")]
    EndOfStream { offset: usize },
    /// Length-prefixed payload runs past the end of the bytecode.
    #[error("truncated value at offset {offset}: expected {expected} bytes, {remaining} remaining")]
    TruncatedStream {
        offset: usize,
        expected: usize,
        remaining: usize,
    },
    /// Leading byte of a tagged value is not a known type tag.
    #[error("unknown type tag {tag:#04x}")]
    UnknownTypeTag { tag: u8 },
    /// Tagged value payload is malformed (bad boolean byte, invalid UTF-8).
    #[error("malformed value at offset {offset}: {reason}")]
    MalformedValue { offset: usize, reason: String },
    /// Operand discriminator is neither REGISTER nor VALUE.
    #[error("invalid operand kind {kind:#04x} at offset {offset}")]
    InvalidOperandKind { kind: u8, offset: usize },
    /// Cursor moved past the bytecode capacity.
    #[error("position {position} out of range (capacity {capacity})")]
    OutOfRange { position: usize, capacity: usize },
    /// Jump to a location id whose `LOC` marker has not executed yet.
    #[error("unresolved location {id}")]
    UnresolvedLocation { id: u8 },
    /// Operand kind not accepted by the instruction.
    #[error("{instruction} expected {expected}, got {actual}")]
    TypeMismatch {
        instruction: &'static str,
        expected: &'static str,
        actual: &'static str,
    },
    /// Integer or floating zero divisor.
    #[error("division by zero")]
    DivisionByZero,
    /// Zero byte or long divisor, which bypasses the explicit zero check.
    #[error("native {type_name} division by zero")]
    NativeDivisionFault { type_name: &'static str },
    /// Register index exceeds the register file size.
    #[error("register index {index} out of range (capacity {capacity})")]
    IndexOutOfRange { index: u8, capacity: usize },
    /// Read of a register that was never written.
    #[error("register R{index} is uninitialized")]
    UninitializedRegister { index: u8 },
    /// Memory access (tag plus payload) crosses the end of linear memory.
    #[error("memory access of {width} bytes at {address} out of range (capacity {capacity})")]
    AddressOutOfRange {
        address: usize,
        width: usize,
        capacity: usize,
    },
    /// Syscall index not present in the table.
    #[error("unknown syscall index {index} ({available} registered)")]
    UnknownSyscall { index: u8, available: usize },
    /// Writing syscall output failed.
    #[error("output error: {source}")]
    OutputError { source: String },
    /// `run` or `start` called on a VM that already ran.
    #[error("vm already started")]
    AlreadyStarted,
    /// The worker thread could not be spawned or panicked.
    #[error("vm worker thread failed: {reason}")]
    WorkerFailed { reason: String },
}

impl VMError {
    /// Maps a codec failure at bytecode `offset` onto the runtime taxonomy.
    pub(crate) fn from_decode(err: DecodeError, offset: usize) -> Self {
        match err {
            DecodeError::UnexpectedEof => VMError::EndOfStream { offset },
            DecodeError::Truncated {
                expected,
                remaining,
            } => VMError::TruncatedStream {
                offset,
                expected,
                remaining,
            },
            DecodeError::UnknownTypeTag(tag) => VMError::UnknownTypeTag { tag },
            other => VMError::MalformedValue {
                offset,
                reason: other.to_string(),
            },
        }
    }
}
