//! Assembly language parser and bytecode compiler.
//!
//! Converts assembly source into the instruction stream executed by the
//! [`VM`](super::vm::VM). Uses [`for_each_instruction!`](crate::for_each_instruction)
//! to generate the assembler IR, mnemonic lookup and operand parsing.
//!
//! # Syntax
//!
//! ```text
//! ; comment
//! loop:                     ; label
//!     load R0 5             ; register operands are R0..R255
//!     add R0 "x" R1         ; operands are separated by whitespace
//!     call PRINTLN R1
//!     jnz R0 loop
//!     halt 0
//! ```
//!
//! - Mnemonics are lowercase; syscall names match the syscall table exactly
//! - Everything from `;` to the end of the line is dropped, even inside quotes
//! - Value literals: `"text"`, `0x1f` (byte), `12L` (long), `1.5D` (double),
//!   `true`/`false`, plain decimals (byte if it fits in 8 bits, else int)
//! - A label line `name:` marks the position of the next instruction
//!
//! # Labels
//!
//! Labels are numbered by the count of real instructions before them (a
//! one-byte counter that wraps after 255) and emitted as `loc id` markers.
//! Jump operands are resolved against every label in the file, so forward
//! references assemble; the VM only learns where a label is when its marker
//! executes, so a forward jump fails at run time.

use crate::define_instructions;
use crate::error;
use crate::for_each_instruction;
use crate::types::encoding::Encode;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::Instruction;
use crate::virtual_machine::operand::Operand;
use crate::virtual_machine::syscall::SyscallTable;
use crate::virtual_machine::value::Value;
use std::collections::HashMap;
use std::fmt::Write;
use std::fs;
use std::path::Path;

const COMMENT_CHAR: char = ';';
const LABEL_SUFFIX: char = ':';
const REGISTER_PREFIX: char = 'R';

/// Formats a compiler-style diagnostic for assembly failures.
fn render_assembly_diagnostic(
    file: &str,
    source: &str,
    line: usize,
    offset: usize,
    message: &str,
) -> String {
    let mut diag = String::new();
    let _ = writeln!(diag, "error: {message}");
    let _ = writeln!(diag, " --> {file}:{line}:{offset}");

    if let Some(raw_line) = source.lines().nth(line.saturating_sub(1)) {
        let line_text = raw_line.trim_end_matches('\r');
        let underline = " ".repeat(offset.saturating_sub(1));
        let _ = writeln!(diag, "     |");
        let _ = writeln!(diag, "{:>4} | {}", line, line_text);
        let _ = writeln!(diag, "     | {}^", underline);
    }

    diag
}

/// Logs a diagnostic for `err`, with a source excerpt when it carries a position.
fn log_assembly_error(file: &str, source: &str, err: &VMError) {
    match err {
        VMError::AssemblyError {
            line,
            offset,
            source: message,
        } => {
            for diag_line in render_assembly_diagnostic(file, source, *line, *offset, message).lines()
            {
                error!("{diag_line}");
            }
        }
        other => error!("{file}: {other}"),
    }
}

/// A syscall invocation as written in source: resolved index plus operands.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SyscallCall {
    pub(crate) index: u8,
    pub(crate) args: Vec<Operand>,
}

/// Label and syscall resolution state shared by both passes.
struct AsmContext<'s> {
    labels: HashMap<String, u8>,
    syscalls: &'s SyscallTable,
}

impl<'s> AsmContext<'s> {
    fn new(syscalls: &'s SyscallTable) -> Self {
        Self {
            labels: HashMap::new(),
            syscalls,
        }
    }

    fn define_label(&mut self, name: &str, id: u8) -> Result<(), VMError> {
        if self.labels.contains_key(name) {
            return Err(VMError::DuplicateLabel {
                label: name.to_string(),
            });
        }
        self.labels.insert(name.to_string(), id);
        Ok(())
    }

    fn resolve_label(&self, name: &str) -> Result<u8, VMError> {
        self.labels
            .get(name)
            .copied()
            .ok_or_else(|| VMError::UndefinedLabel {
                label: name.to_string(),
            })
    }

    fn resolve_syscall(&self, name: &str) -> Result<u8, VMError> {
        self.syscalls
            .index_of(name)
            .ok_or_else(|| VMError::UnknownSyscallName {
                name: name.to_string(),
            })
    }
}

#[derive(Debug, Clone)]
struct Token<'a> {
    text: &'a str,
    /// 1-based column offset in the line.
    offset: usize,
}

/// Splits a comment-free line on whitespace, keeping quoted runs together.
fn tokenize(line: &str) -> Result<Vec<Token<'_>>, VMError> {
    let mut out = Vec::with_capacity(4);

    let mut start: Option<usize> = None;
    let mut quote_col = 0;
    let mut in_str = false;

    for (i, b) in line.bytes().enumerate() {
        match b {
            b'"' => {
                if start.is_none() {
                    start = Some(i);
                }
                if !in_str {
                    quote_col = i + 1;
                }
                in_str = !in_str;
            }
            b' ' | b'\t' | b'\r' if !in_str => {
                if let Some(s) = start.take() {
                    out.push(Token {
                        text: &line[s..i],
                        offset: s + 1,
                    });
                }
            }
            _ => {
                if start.is_none() {
                    start = Some(i);
                }
            }
        }
    }

    if in_str {
        return Err(VMError::UnterminatedString { column: quote_col });
    }

    if let Some(s) = start {
        out.push(Token {
            text: &line[s..],
            offset: s + 1,
        });
    }

    Ok(out)
}

/// Parse a register token like `R0`, `R255`.
pub(crate) fn parse_reg(tok: &str) -> Result<u8, VMError> {
    tok.strip_prefix(REGISTER_PREFIX)
        .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|digits| digits.parse::<u8>().ok())
        .ok_or_else(|| VMError::InvalidRegister {
            token: tok.to_string(),
        })
}

fn looks_like_register(tok: &str) -> bool {
    tok.strip_prefix(REGISTER_PREFIX)
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

fn strip_hex_prefix(tok: &str) -> Option<&str> {
    tok.strip_prefix("0x").or_else(|| tok.strip_prefix("0X"))
}

/// Parse a value literal.
///
/// Precedence: string, hex byte, `L` long, `D` double, boolean, decimal byte,
/// decimal int. Hex is tried before the `D` suffix so `0x1D` is a byte.
pub(crate) fn parse_value(tok: &str) -> Result<Value, VMError> {
    let invalid = || VMError::InvalidLiteral {
        token: tok.to_string(),
    };

    if let Some(rest) = tok.strip_prefix('"') {
        let text = rest.strip_suffix('"').ok_or_else(invalid)?;
        if text.contains('"') {
            return Err(invalid());
        }
        return Value::string(text);
    }

    if let Some(hex) = strip_hex_prefix(tok) {
        return u8::from_str_radix(hex, 16)
            .map(|b| Value::Byte(b as i8))
            .map_err(|_| invalid());
    }

    if let Some(digits) = tok.strip_suffix(['L', 'l']) {
        return digits.parse::<i64>().map(Value::Long).map_err(|_| invalid());
    }

    if let Some(digits) = tok.strip_suffix(['D', 'd']) {
        return digits.parse::<f64>().map(Value::Double).map_err(|_| invalid());
    }

    match tok {
        "true" => return Ok(Value::Bool(true)),
        "false" => return Ok(Value::Bool(false)),
        _ => {}
    }

    if let Ok(b) = tok.parse::<i8>() {
        return Ok(Value::Byte(b));
    }
    tok.parse::<i32>().map(Value::Int).map_err(|_| invalid())
}

/// Parse a value-or-register operand.
pub(crate) fn parse_operand(tok: &str) -> Result<Operand, VMError> {
    if looks_like_register(tok) {
        return parse_reg(tok).map(Operand::Register);
    }
    parse_value(tok).map(Operand::Value)
}

/// Parse a one-byte memory address (`0`-`255` or `0x00`-`0xff`).
pub(crate) fn parse_addr(tok: &str) -> Result<u8, VMError> {
    let parsed = match strip_hex_prefix(tok) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => tok.parse::<u8>(),
    };
    parsed.map_err(|_| VMError::InvalidAddress {
        token: tok.to_string(),
    })
}

/// Checks if a comment-free, trimmed line is a label definition.
fn is_label_def(line: &str) -> bool {
    line.ends_with(LABEL_SUFFIX)
}

/// Extracts the label name from a label definition line.
fn label_name(line: &str) -> &str {
    line[..line.len() - 1].trim()
}

/// Error raised while parsing one instruction, with the column to blame.
type Located = (usize, VMError);

fn next_token<'t, 'a>(
    it: &mut std::slice::Iter<'t, Token<'a>>,
    instruction: &str,
) -> Result<&'t Token<'a>, Located> {
    it.next().ok_or_else(|| {
        (
            1,
            VMError::ArityMismatch {
                instruction: instruction.to_string(),
                expected: 1,
                actual: 0,
            },
        )
    })
}

macro_rules! define_parse_instruction {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:expr, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ]
        ),* $(,)?
    ) => {

        // =========================
        // Assembler IR
        // =========================
        #[derive(Debug, Clone, PartialEq)]
        enum AsmInstr {
            $(
                $name {
                    $( $field: define_instructions!(@ty $kind) ),*
                },
            )*
        }

        impl AsmInstr {
            /// Encodes the assembly instruction into bytecode
            fn assemble(&self, out: &mut Vec<u8>) {
                match self {
                    $(
                        AsmInstr::$name { $( $field ),* } => {
                            out.push($opcode);
                            $(
                                define_instructions!(@emit out, $kind, $field);
                            )*
                        }
                    ),*
                }
            }
        }

        /// Looks up a source mnemonic. `loc` is reserved for label markers.
        fn instruction_from_str(name: &str) -> Result<Instruction, VMError> {
            match name {
                $( $mnemonic if $mnemonic != Instruction::Loc.mnemonic() => Ok(Instruction::$name), )*
                _ => Err(VMError::UnknownInstruction {
                    name: name.to_string(),
                }),
            }
        }

        /// Parse one instruction from tokens into [`AsmInstr`].
        fn parse_instruction(
            ctx: &AsmContext,
            tokens: &[Token],
        ) -> Result<AsmInstr, Located> {
            let Some(first) = tokens.first() else {
                return Err((1, VMError::UnknownInstruction { name: String::new() }));
            };

            let instr = instruction_from_str(first.text).map_err(|e| (first.offset, e))?;

            match instr {
                $(
                    Instruction::$name => {
                        const MIN: usize = 0 $( + define_parse_instruction!(@min $kind) )*;
                        const MAX: usize = 0usize $( .saturating_add(define_parse_instruction!(@max $kind)) )*;
                        let actual = tokens.len() - 1;
                        if actual < MIN || actual > MAX {
                            return Err((first.offset, VMError::ArityMismatch {
                                instruction: first.text.to_string(),
                                expected: if actual < MIN { MIN } else { MAX },
                                actual,
                            }));
                        }

                        define_parse_instruction!(
                            @construct ctx tokens; $name $( $field : $kind ),*
                        )
                    }
                ),*
            }
        }
    };

    // ---------- operand counts ----------
    (@min Status)  => { 0usize };
    (@min $kind:ident) => { 1usize };

    (@max Status)  => { 1usize };
    (@max Syscall) => { usize::MAX };
    (@max $kind:ident) => { 1usize };

    // ---------- parsing ----------
    (@construct $ctx:ident $tokens:ident; $name:ident $( $field:ident : $kind:ident ),* ) => {{
        let mut it = $tokens[1..].iter();
        Ok(AsmInstr::$name {
            $(
                $field: define_parse_instruction!(@parse_operand $kind, it, $ctx, $tokens[0].text)?,
            )*
        })
    }};

    (@parse_operand Reg, $it:ident, $ctx:expr, $mnemonic:expr) => {{
        let tok = next_token(&mut $it, $mnemonic)?;
        parse_reg(tok.text).map_err(|e| (tok.offset, e))
    }};

    (@parse_operand Src, $it:ident, $ctx:expr, $mnemonic:expr) => {{
        let tok = next_token(&mut $it, $mnemonic)?;
        parse_operand(tok.text).map_err(|e| (tok.offset, e))
    }};

    (@parse_operand Addr, $it:ident, $ctx:expr, $mnemonic:expr) => {{
        let tok = next_token(&mut $it, $mnemonic)?;
        parse_addr(tok.text).map_err(|e| (tok.offset, e))
    }};

    (@parse_operand Loc, $it:ident, $ctx:expr, $mnemonic:expr) => {{
        let tok = next_token(&mut $it, $mnemonic)?;
        $ctx.resolve_label(tok.text).map_err(|e| (tok.offset, e))
    }};

    (@parse_operand Status, $it:ident, $ctx:expr, $mnemonic:expr) => {{
        match $it.next() {
            Some(tok) => parse_operand(tok.text).map_err(|e| (tok.offset, e)),
            None => Ok::<Operand, Located>(Operand::Value(Value::Byte(0))),
        }
    }};

    (@parse_operand Syscall, $it:ident, $ctx:expr, $mnemonic:expr) => {{
        let name = next_token(&mut $it, $mnemonic)?;
        let index = $ctx.resolve_syscall(name.text).map_err(|e| (name.offset, e))?;
        let args = $it
            .by_ref()
            .map(|tok| parse_operand(tok.text).map_err(|e| (tok.offset, e)))
            .collect::<Result<Vec<_>, Located>>()?;
        if args.len() > u8::MAX as usize {
            return Err((name.offset, VMError::TooManyArguments { count: args.len() }));
        }
        Ok::<SyscallCall, Located>(SyscallCall { index, args })
    }};
}

for_each_instruction!(define_parse_instruction);

/// One meaningful source line after pass 1.
enum SourceLine<'a> {
    Label { id: u8 },
    Instruction { line: usize, tokens: Vec<Token<'a>> },
}

/// Removes the comment suffix, if any.
fn strip_comment(raw: &str) -> &str {
    match raw.find(COMMENT_CHAR) {
        Some(pos) => &raw[..pos],
        None => raw,
    }
}

fn located(line: usize, offset: usize, err: VMError) -> VMError {
    VMError::AssemblyError {
        line,
        offset,
        source: err.to_string(),
    }
}

/// Two-pass assembly.
///
/// Pass 1: strips comments, classifies lines, assigns label ids from the
/// instruction counter and checks mnemonics.
///
/// Pass 2: parses operands with label and syscall resolution and emits bytecode.
fn assemble_lines(source: &str, syscalls: &SyscallTable) -> Result<Vec<u8>, VMError> {
    let mut ctx = AsmContext::new(syscalls);
    let mut lines = Vec::new();
    let mut counter: u8 = 0;

    for (idx, raw) in source.lines().enumerate() {
        let line_no = idx + 1;
        let code = strip_comment(raw);
        let trimmed = code.trim();
        if trimmed.is_empty() {
            continue;
        }
        let column = code.len() - code.trim_start().len() + 1;

        if is_label_def(trimmed) {
            let name = label_name(trimmed);
            if name.is_empty() {
                return Err(located(line_no, column, VMError::EmptyLabel));
            }
            ctx.define_label(name, counter)
                .map_err(|e| located(line_no, column, e))?;
            lines.push(SourceLine::Label { id: counter });
            continue;
        }

        let tokens = tokenize(code).map_err(|e| match e {
            VMError::UnterminatedString { column: at } => located(line_no, at, e),
            other => located(line_no, column, other),
        })?;
        instruction_from_str(tokens[0].text).map_err(|e| located(line_no, tokens[0].offset, e))?;
        counter = counter.wrapping_add(1);
        lines.push(SourceLine::Instruction {
            line: line_no,
            tokens,
        });
    }

    let mut bytecode = Vec::new();
    for line in lines {
        match line {
            SourceLine::Label { id } => AsmInstr::Loc { id }.assemble(&mut bytecode),
            SourceLine::Instruction { line, tokens } => {
                let instr = parse_instruction(&ctx, &tokens)
                    .map_err(|(offset, e)| located(line, offset, e))?;
                instr.assemble(&mut bytecode);
            }
        }
    }

    Ok(bytecode)
}

/// Assemble a full source string into bytecode using the standard syscalls.
pub fn assemble_source(source: &str) -> Result<Vec<u8>, VMError> {
    assemble_lines(source, &SyscallTable::standard())
}

/// Assemble against a custom syscall table.
///
/// The VM running the output must be given the same table.
pub fn assemble_with_syscalls(source: &str, syscalls: &SyscallTable) -> Result<Vec<u8>, VMError> {
    assemble_lines(source, syscalls)
}

/// Convenience: assemble directly from file path.
///
/// Logs a compiler-style diagnostic with a source excerpt on failure.
pub fn assemble_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>, VMError> {
    let path_ref = path.as_ref();
    let name = path_ref.display().to_string();
    let source = fs::read_to_string(path_ref).map_err(|e| VMError::IoError {
        path: name.clone(),
        source: e.to_string(),
    })?;

    let result = assemble_source(&source);
    if let Err(err) = &result {
        log_assembly_error(&name, &source, err);
    }
    result
}
