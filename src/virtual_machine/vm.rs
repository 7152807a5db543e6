//! Core virtual machine implementation.
//!
//! The VM reads one opcode at a time from its [`BytecodeReader`], decodes the
//! operands the instruction declares and dispatches to an `op_*` handler.
//! Execution ends at `halt`, which yields the program's exit status, or at
//! the first fault.
//!
//! Jump targets are location ids. A `loc` marker records the position right
//! after itself when it executes, and jumps look that position up, so a jump
//! can only reach a label whose marker already ran.

mod memory;
mod registers;

use crate::debug;
use crate::virtual_machine::arithmetic;
use crate::virtual_machine::bytecode::BytecodeReader;
use crate::virtual_machine::config::VmConfig;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::Instruction;
use crate::virtual_machine::operand::OperandKind;
use crate::virtual_machine::syscall::SyscallTable;
use crate::virtual_machine::value::Value;
use memory::Memory;
use registers::Registers;
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};
use std::thread::{self, JoinHandle};

/// Name given to the thread spawned by [`VM::start`].
pub const WORKER_THREAD_NAME: &str = "micro-vm";

/// Lifecycle of a VM. Moves forward only: `Idle`, `Running`, then `Halted` or `Faulted`.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VmState {
    Idle = 0,
    Running = 1,
    Halted = 2,
    Faulted = 3,
}

impl VmState {
    fn from_u8(raw: u8) -> VmState {
        match raw {
            0 => VmState::Idle,
            1 => VmState::Running,
            2 => VmState::Halted,
            _ => VmState::Faulted,
        }
    }
}

/// Execution state shared between a VM and the handles observing it.
///
/// The exit status is written before the state flips to `Halted`, so a
/// reader that sees `Halted` also sees the final status.
#[derive(Debug)]
pub struct ExecStatus {
    state: AtomicU8,
    exit_status: AtomicI32,
}

impl ExecStatus {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(VmState::Idle as u8),
            exit_status: AtomicI32::new(0),
        }
    }

    pub fn state(&self) -> VmState {
        VmState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Exit status of a halted program; `None` until then.
    pub fn exit_status(&self) -> Option<i32> {
        match self.state() {
            VmState::Halted => Some(self.exit_status.load(Ordering::Relaxed)),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == VmState::Running
    }

    fn begin(&self) -> Result<(), VMError> {
        self.state
            .compare_exchange(
                VmState::Idle as u8,
                VmState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(|_| VMError::AlreadyStarted)
    }

    fn halt(&self, status: i32) {
        self.exit_status.store(status, Ordering::Relaxed);
        self.state.store(VmState::Halted as u8, Ordering::Release);
    }

    fn fault(&self) {
        self.state.store(VmState::Faulted as u8, Ordering::Release);
    }
}

/// Handle to a VM running on its own thread.
pub struct VmHandle {
    status: Arc<ExecStatus>,
    thread: JoinHandle<Result<i32, VMError>>,
}

impl VmHandle {
    pub fn state(&self) -> VmState {
        self.status.state()
    }

    pub fn exit_status(&self) -> Option<i32> {
        self.status.exit_status()
    }

    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }

    /// Blocks until the program halts or faults.
    pub fn join(self) -> Result<i32, VMError> {
        match self.thread.join() {
            Ok(result) => result,
            Err(_) => {
                self.status.fault();
                Err(VMError::WorkerFailed {
                    reason: "vm thread panicked".to_string(),
                })
            }
        }
    }
}

/// Whether execution continues after an instruction.
enum Flow {
    Next,
    Halt(i32),
}

macro_rules! exec_vm {
    // Entry point
    (
        vm = $vm:ident,
        instr = $instr:ident,
        { $( $variant:ident => $handler:ident ( $( $field:ident : $kind:ident ),* $(,)? ) ),* $(,)? }
    ) => {{
        match $instr {
            $(
                Instruction::$variant => {
                    let instr_name = $instr.mnemonic();
                    $( let $field = exec_vm!(@read $vm, $kind)?; )*
                    $vm.$handler(instr_name, $( $field ),*)
                }
            ),*
        }
    }};

    // Raw one-byte operands
    (@read $vm:ident, Reg) => {{
        $vm.reader.read_byte()
    }};

    (@read $vm:ident, Addr) => {{
        $vm.reader.read_byte()
    }};

    (@read $vm:ident, Loc) => {{
        $vm.reader.read_byte()
    }};

    // Discriminated operands, resolved to a value
    (@read $vm:ident, Src) => {{
        $vm.read_operand()
    }};

    (@read $vm:ident, Status) => {{
        $vm.read_operand()
    }};

    // Syscall index and argument count; the handler reads the arguments
    (@read $vm:ident, Syscall) => {{
        let index = $vm.reader.read_byte()?;
        let count = $vm.reader.read_byte()?;
        Ok::<(u8, u8), VMError>((index, count))
    }};
}

/// Bytecode virtual machine.
///
/// Owns its bytecode, registers and memory. Run it in place with
/// [`run`](VM::run) or on a worker thread with [`start`](VM::start); either
/// may happen once per VM.
pub struct VM {
    reader: BytecodeReader,
    registers: Registers,
    memory: Memory,
    /// Location id to the bytecode position after its `loc` marker.
    locations: HashMap<u8, usize>,
    syscalls: SyscallTable,
    output: Box<dyn Write + Send>,
    status: Arc<ExecStatus>,
}

impl VM {
    /// Creates a VM sized by `config` with `program` loaded at offset 0.
    pub fn new(config: &VmConfig, program: &[u8]) -> Result<Self, VMError> {
        config.validate()?;
        let capacity = config.bytecode_capacity.unwrap_or(program.len());
        let mut reader = BytecodeReader::new(capacity);
        reader.load(program)?;

        Ok(Self {
            reader,
            registers: Registers::new(config.register_count),
            memory: Memory::new(config.memory_size),
            locations: HashMap::new(),
            syscalls: SyscallTable::standard(),
            output: Box::new(io::stdout()),
            status: Arc::new(ExecStatus::new()),
        })
    }

    /// Replaces the syscall table. Must match the table the program was assembled against.
    pub fn with_syscalls(mut self, syscalls: SyscallTable) -> Self {
        self.syscalls = syscalls;
        self
    }

    /// Redirects syscall output (stdout by default).
    pub fn with_output<W: Write + Send + 'static>(mut self, output: W) -> Self {
        self.output = Box::new(output);
        self
    }

    pub fn state(&self) -> VmState {
        self.status.state()
    }

    pub fn exit_status(&self) -> Option<i32> {
        self.status.exit_status()
    }

    /// Value currently held by register `index`.
    pub fn register(&self, index: u8) -> Result<&Value, VMError> {
        self.registers.get(index)
    }

    /// Executes on the calling thread until `halt` or a fault.
    pub fn run(&mut self) -> Result<i32, VMError> {
        self.status.begin()?;
        self.drive()
    }

    /// Executes on a new thread named [`WORKER_THREAD_NAME`].
    ///
    /// The VM is already `Running` when this returns.
    pub fn start(mut self) -> Result<VmHandle, VMError> {
        self.status.begin()?;
        let status = Arc::clone(&self.status);
        let thread = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || self.drive())
            .map_err(|e| {
                status.fault();
                VMError::WorkerFailed {
                    reason: e.to_string(),
                }
            })?;
        Ok(VmHandle { status, thread })
    }

    fn drive(&mut self) -> Result<i32, VMError> {
        debug!(
            "vm start: {} bytes of bytecode, {} registers, {} bytes of memory",
            self.reader.len(),
            self.registers.capacity(),
            self.memory.capacity()
        );
        match self.execute() {
            Ok(code) => {
                self.status.halt(code);
                debug!("vm halted with status {code}");
                Ok(code)
            }
            Err(err) => {
                self.status.fault();
                debug!("vm faulted: {err}");
                Err(err)
            }
        }
    }

    fn execute(&mut self) -> Result<i32, VMError> {
        loop {
            let offset = self.reader.cursor();
            if self.reader.is_at_end() {
                return Err(VMError::MissingHalt { offset });
            }
            let opcode = self.reader.read_byte()?;
            let instr = Instruction::try_from(opcode)
                .map_err(|_| VMError::InvalidInstruction { opcode, offset })?;
            debug!("{offset:>6}: {}", instr.mnemonic());

            if let Flow::Halt(code) = self.exec(instr)? {
                return Ok(code);
            }
        }
    }

    /// Executes a single instruction.
    fn exec(&mut self, instruction: Instruction) -> Result<Flow, VMError> {
        exec_vm! {
            vm = self,
            instr = instruction,
            {
                Load => op_load(dst: Reg, src: Src),
                Store => op_store(addr: Addr, src: Src),
                Fetch => op_fetch(addr: Addr, dst: Reg),
                Add => op_add(a: Src, b: Src, dst: Reg),
                Sub => op_sub(a: Src, b: Src, dst: Reg),
                Mul => op_mul(a: Src, b: Src, dst: Reg),
                Div => op_div(a: Src, b: Src, dst: Reg),
                Halt => op_halt(status: Status),
                Jez => op_jez(cond: Src, target: Loc),
                Jmz => op_jmz(cond: Src, target: Loc),
                Jlz => op_jlz(cond: Src, target: Loc),
                Jnz => op_jnz(cond: Src, target: Loc),
                Jit => op_jit(cond: Src, target: Loc),
                Jif => op_jif(cond: Src, target: Loc),
                Jump => op_jump(target: Loc),
                Loc => op_loc(id: Loc),
                Call => op_call(syscall: Syscall),
            }
        }
    }

    /// Reads a value-or-register operand at the cursor.
    ///
    /// Registers are resolved to a copy of their current value. Syscall
    /// handlers call this once per declared argument.
    pub fn read_operand(&mut self) -> Result<Value, VMError> {
        let offset = self.reader.cursor();
        let raw = self.reader.read_byte()?;
        match OperandKind::try_from(raw) {
            Ok(OperandKind::Register) => {
                let index = self.reader.read_byte()?;
                self.registers.get(index).cloned()
            }
            Ok(OperandKind::Value) => self.reader.read_tagged(),
            Err(_) => Err(VMError::InvalidOperandKind { kind: raw, offset }),
        }
    }

    /// Writes `line` and a newline to the output sink.
    pub fn write_line(&mut self, line: &str) -> Result<(), VMError> {
        writeln!(self.output, "{line}")
            .and_then(|_| self.output.flush())
            .map_err(|e| VMError::OutputError {
                source: e.to_string(),
            })
    }

    fn jump_to(&mut self, id: u8) -> Result<Flow, VMError> {
        let position = *self
            .locations
            .get(&id)
            .ok_or(VMError::UnresolvedLocation { id })?;
        self.reader.set_cursor(position)?;
        Ok(Flow::Next)
    }

    fn jump_if(&mut self, taken: bool, target: u8) -> Result<Flow, VMError> {
        if taken {
            self.jump_to(target)
        } else {
            Ok(Flow::Next)
        }
    }

    fn numeric(instr: &'static str, v: &Value) -> Result<f64, VMError> {
        v.as_f64().ok_or(VMError::TypeMismatch {
            instruction: instr,
            expected: "numeric operand",
            actual: v.type_name(),
        })
    }

    fn boolean(instr: &'static str, v: &Value) -> Result<bool, VMError> {
        match v {
            Value::Bool(b) => Ok(*b),
            other => Err(VMError::TypeMismatch {
                instruction: instr,
                expected: "boolean operand",
                actual: other.type_name(),
            }),
        }
    }

    fn op_load(&mut self, _instr: &'static str, dst: u8, src: Value) -> Result<Flow, VMError> {
        self.registers.set(dst, src)?;
        Ok(Flow::Next)
    }

    fn op_store(&mut self, _instr: &'static str, addr: u8, src: Value) -> Result<Flow, VMError> {
        self.memory.store(addr as usize, &src)?;
        Ok(Flow::Next)
    }

    fn op_fetch(&mut self, _instr: &'static str, addr: u8, dst: u8) -> Result<Flow, VMError> {
        let value = self.memory.load(addr as usize)?;
        self.registers.set(dst, value)?;
        Ok(Flow::Next)
    }

    fn op_add(&mut self, _instr: &'static str, a: Value, b: Value, dst: u8) -> Result<Flow, VMError> {
        self.registers.set(dst, arithmetic::add(&a, &b)?)?;
        Ok(Flow::Next)
    }

    fn op_sub(&mut self, _instr: &'static str, a: Value, b: Value, dst: u8) -> Result<Flow, VMError> {
        self.registers.set(dst, arithmetic::sub(&a, &b)?)?;
        Ok(Flow::Next)
    }

    fn op_mul(&mut self, _instr: &'static str, a: Value, b: Value, dst: u8) -> Result<Flow, VMError> {
        self.registers.set(dst, arithmetic::mul(&a, &b)?)?;
        Ok(Flow::Next)
    }

    fn op_div(&mut self, _instr: &'static str, a: Value, b: Value, dst: u8) -> Result<Flow, VMError> {
        self.registers.set(dst, arithmetic::div(&a, &b)?)?;
        Ok(Flow::Next)
    }

    fn op_halt(&mut self, instr: &'static str, status: Value) -> Result<Flow, VMError> {
        let code = status.as_i32().ok_or(VMError::TypeMismatch {
            instruction: instr,
            expected: "integer status",
            actual: status.type_name(),
        })?;
        Ok(Flow::Halt(code))
    }

    fn op_jez(&mut self, instr: &'static str, cond: Value, target: u8) -> Result<Flow, VMError> {
        let v = Self::numeric(instr, &cond)?;
        self.jump_if(v == 0.0, target)
    }

    fn op_jmz(&mut self, instr: &'static str, cond: Value, target: u8) -> Result<Flow, VMError> {
        let v = Self::numeric(instr, &cond)?;
        self.jump_if(v > 0.0, target)
    }

    fn op_jlz(&mut self, instr: &'static str, cond: Value, target: u8) -> Result<Flow, VMError> {
        let v = Self::numeric(instr, &cond)?;
        self.jump_if(v < 0.0, target)
    }

    fn op_jnz(&mut self, instr: &'static str, cond: Value, target: u8) -> Result<Flow, VMError> {
        let v = Self::numeric(instr, &cond)?;
        self.jump_if(v != 0.0, target)
    }

    fn op_jit(&mut self, instr: &'static str, cond: Value, target: u8) -> Result<Flow, VMError> {
        let b = Self::boolean(instr, &cond)?;
        self.jump_if(b, target)
    }

    fn op_jif(&mut self, instr: &'static str, cond: Value, target: u8) -> Result<Flow, VMError> {
        let b = Self::boolean(instr, &cond)?;
        self.jump_if(!b, target)
    }

    fn op_jump(&mut self, _instr: &'static str, target: u8) -> Result<Flow, VMError> {
        self.jump_to(target)
    }

    fn op_loc(&mut self, _instr: &'static str, id: u8) -> Result<Flow, VMError> {
        self.locations.insert(id, self.reader.cursor());
        Ok(Flow::Next)
    }

    fn op_call(&mut self, _instr: &'static str, (index, count): (u8, u8)) -> Result<Flow, VMError> {
        let syscalls = self.syscalls.clone();
        syscalls.call(index, self, count)?;
        Ok(Flow::Next)
    }
}
