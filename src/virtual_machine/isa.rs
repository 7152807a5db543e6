//! Instruction Set Architecture (ISA) definitions.
//!
//! The [`for_each_instruction!`](crate::for_each_instruction) macro holds the
//! canonical instruction list and invokes a callback macro for code
//! generation, so the assembler, the VM dispatcher and the ISA pin test all
//! derive from one table.
//!
//! This module generates:
//! - The [`Instruction`] enum with opcode mappings
//! - `TryFrom<u8>` for decoding opcodes
//!
//! # Bytecode Format
//!
//! Each instruction is one opcode byte followed by its operands:
//! - `Reg`, `Addr`, `Loc`: one raw byte (register index, memory address, location id)
//! - `Src`, `Status`: discriminator byte, then a register byte or a tagged value
//! - `Syscall`: syscall index byte, argument count byte, then that many `Src` operands

use crate::virtual_machine::errors::VMError;

/// Invokes a callback macro with the complete instruction definition list.
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Data movement
            // =========================
            /// load dst, src ; dst = src
            Load = 0x00, "load" => [dst: Reg, src: Src],
            /// store addr, src ; memory[addr] = src
            Store = 0x0a, "store" => [addr: Addr, src: Src],
            /// fetch addr, dst ; dst = memory[addr]
            Fetch = 0x0e, "fetch" => [addr: Addr, dst: Reg],
            // =========================
            // Arithmetic
            // =========================
            /// add a, b, dst ; dst = a + b (string operands concatenate)
            Add = 0x01, "add" => [a: Src, b: Src, dst: Reg],
            /// sub a, b, dst ; dst = a - b
            Sub = 0x02, "sub" => [a: Src, b: Src, dst: Reg],
            /// mul a, b, dst ; dst = a * b
            Mul = 0x03, "mul" => [a: Src, b: Src, dst: Reg],
            /// div a, b, dst ; dst = a / b
            Div = 0x04, "div" => [a: Src, b: Src, dst: Reg],
            // =========================
            // Control flow
            // =========================
            /// halt [status] ; stop with exit status (default 0)
            Halt = 0x05, "halt" => [status: Status],
            /// jez src, label ; jump if src == 0
            Jez = 0x06, "jez" => [cond: Src, target: Loc],
            /// jmz src, label ; jump if src > 0
            Jmz = 0x07, "jmz" => [cond: Src, target: Loc],
            /// jlz src, label ; jump if src < 0
            Jlz = 0x08, "jlz" => [cond: Src, target: Loc],
            /// jnz src, label ; jump if src != 0
            Jnz = 0x09, "jnz" => [cond: Src, target: Loc],
            /// jit src, label ; jump if src is true
            Jit = 0x0f, "jit" => [cond: Src, target: Loc],
            /// jif src, label ; jump if src is false
            Jif = 0x12, "jif" => [cond: Src, target: Loc],
            /// jump label ; unconditional jump
            Jump = 0x0c, "jump" => [target: Loc],
            /// loc id ; records the current offset for location id (assembler-emitted)
            Loc = 0x0d, "loc" => [id: Loc],
            /// call NAME, args... ; invoke a syscall with the given operands
            Call = 0x0b, "call" => [syscall: Syscall],
        }
    };
}

#[macro_export]
macro_rules! define_instructions {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:expr, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ]
        ),* $(,)?
    ) => {
        // =========================
        // VM instruction enum
        // =========================
        #[derive(Copy, Clone, Debug, Eq, PartialEq)]
        pub enum Instruction {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl TryFrom<u8> for Instruction {
            type Error = VMError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $opcode => Ok(Instruction::$name), )*
                    _ => Err(VMError::InvalidInstruction {
                        opcode: value,
                        offset: 0,
                    }),
                }
            }
        }

        impl Instruction {
            /// Every instruction, in table order.
            pub const ALL: &'static [Instruction] = &[ $( Instruction::$name, )* ];

            /// Returns the assembly mnemonic for this instruction.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Instruction::$name => $mnemonic, )*
                }
            }
        }
    };

    // ---------- types ----------
    (@ty Reg)     => { u8 };
    (@ty Addr)    => { u8 };
    (@ty Loc)     => { u8 };
    (@ty Src)     => { Operand };
    (@ty Status)  => { Operand };
    (@ty Syscall) => { SyscallCall };

    // ---------- encoding ----------
    (@emit $out:ident, Reg, $v:ident) => {
        $out.push(*$v);
    };

    (@emit $out:ident, Addr, $v:ident) => {
        $out.push(*$v);
    };

    (@emit $out:ident, Loc, $v:ident) => {
        $out.push(*$v);
    };

    (@emit $out:ident, Src, $v:ident) => {
        $v.encode($out);
    };

    (@emit $out:ident, Status, $v:ident) => {
        $v.encode($out);
    };

    (@emit $out:ident, Syscall, $v:ident) => {
        $out.push($v.index);
        $out.push($v.args.len() as u8);
        for arg in &$v.args {
            arg.encode($out);
        }
    };
}

for_each_instruction!(define_instructions);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_try_from_invalid() {
        assert!(matches!(
            Instruction::try_from(0xFF),
            Err(VMError::InvalidInstruction { opcode: 0xFF, .. })
        ));
        assert!(Instruction::try_from(0x10).is_err());
    }

    #[test]
    fn opcodes_roundtrip() {
        for instr in Instruction::ALL {
            assert_eq!(Instruction::try_from(*instr as u8).unwrap(), *instr);
        }
        assert_eq!(Instruction::ALL.len(), 17);
    }

    #[test]
    fn mnemonics_are_lowercase_and_unique() {
        let mut seen = std::collections::HashSet::new();
        for instr in Instruction::ALL {
            let m = instr.mnemonic();
            assert_eq!(m, m.to_lowercase());
            assert!(seen.insert(m), "duplicate mnemonic {m}");
        }
        assert_eq!(Instruction::Jif as u8, 0x12);
        assert_eq!(Instruction::Fetch.mnemonic(), "fetch");
    }
}
