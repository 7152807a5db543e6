//! Bytecode program container.
//!
//! A compiled program on disk is a magic header, a format version and the
//! length-prefixed instruction stream. The bytecode itself is stored
//! verbatim, so [`Program::code`] is exactly what the assembler produced.

use crate::types::encoding::{Decode, DecodeError, Encode};
use crate::virtual_machine::errors::VMError;
use micro_derive::BinaryCodec;
use std::fmt;
use std::fs;
use std::path::Path;

/// Magic bytes identifying a serialized program.
const MAGIC: &[u8; 5] = b"MICRO";

/// Current container format version.
const CURRENT_VERSION: Version = Version::new(1, 0, 0);

/// Container format version. A reader accepts any version with its own major.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, BinaryCodec)]
struct Version {
    major: u8,
    minor: u8,
    patch: u8,
}

impl Version {
    const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Assembled bytecode ready to be written to or read from disk.
#[derive(Debug, Clone, PartialEq, Eq, BinaryCodec)]
pub struct Program {
    /// Instruction stream, loaded at offset 0.
    pub code: Vec<u8>,
}

fn decode_failure(err: DecodeError) -> VMError {
    VMError::ProgramDecode {
        reason: err.to_string(),
    }
}

impl Program {
    pub fn new(code: Vec<u8>) -> Self {
        Self { code }
    }

    /// Serializes the program with its magic header and version.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(MAGIC.len() + 3 + self.encoded_len());
        MAGIC.encode(&mut out);
        CURRENT_VERSION.encode(&mut out);
        self.encode(&mut out);
        out
    }

    /// Deserializes a program, rejecting foreign files and newer major versions.
    pub fn from_bytes(mut input: &[u8]) -> Result<Self, VMError> {
        if input.len() < MAGIC.len() || &<[u8; 5]>::decode(&mut input).map_err(decode_failure)? != MAGIC
        {
            return Err(VMError::ProgramDecode {
                reason: "bad magic".to_string(),
            });
        }

        let version = Version::decode(&mut input).map_err(decode_failure)?;
        if version.major != CURRENT_VERSION.major {
            return Err(VMError::ProgramDecode {
                reason: format!("unsupported version {version} (reader is {CURRENT_VERSION})"),
            });
        }

        let program = Program::decode(&mut input).map_err(decode_failure)?;
        if !input.is_empty() {
            return Err(VMError::ProgramDecode {
                reason: format!("{} trailing bytes", input.len()),
            });
        }
        Ok(program)
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<(), VMError> {
        let path = path.as_ref();
        fs::write(path, self.to_bytes()).map_err(|e| VMError::IoError {
            path: path.display().to_string(),
            source: e.to_string(),
        })
    }

    pub fn read_from<P: AsRef<Path>>(path: P) -> Result<Self, VMError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| VMError::IoError {
            path: path.display().to_string(),
            source: e.to_string(),
        })?;
        Self::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_machine::assembler::assemble_source;

    fn sample() -> Program {
        Program::new(assemble_source("load R0 5\ncall PRINTLN R0\nhalt").unwrap())
    }

    #[test]
    fn header_layout() {
        let bytes = sample().to_bytes();
        assert_eq!(&bytes[..5], b"MICRO");
        assert_eq!(&bytes[5..8], &[1, 0, 0]);
        assert!(bytes.ends_with(&sample().code));
    }

    #[test]
    fn decode_restores_code() {
        let program = sample();
        assert_eq!(Program::from_bytes(&program.to_bytes()).unwrap(), program);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = sample().to_bytes();
        bytes[0] = b'X';
        assert_eq!(
            Program::from_bytes(&bytes),
            Err(VMError::ProgramDecode {
                reason: "bad magic".into()
            })
        );
        assert!(Program::from_bytes(b"MIC").is_err());
    }

    #[test]
    fn rejects_other_major_version() {
        let mut bytes = sample().to_bytes();
        bytes[5] = 2;
        match Program::from_bytes(&bytes) {
            Err(VMError::ProgramDecode { reason }) => {
                assert!(reason.contains("unsupported version 2.0.0"), "{reason}")
            }
            other => panic!("unexpected {other:?}"),
        }

        // Minor and patch bumps stay readable.
        let mut bytes = sample().to_bytes();
        bytes[6] = 9;
        assert!(Program::from_bytes(&bytes).is_ok());
    }

    #[test]
    fn rejects_truncated_and_trailing_bytes() {
        let bytes = sample().to_bytes();
        assert!(matches!(
            Program::from_bytes(&bytes[..bytes.len() - 1]),
            Err(VMError::ProgramDecode { .. })
        ));

        let mut bytes = sample().to_bytes();
        bytes.push(0);
        assert_eq!(
            Program::from_bytes(&bytes),
            Err(VMError::ProgramDecode {
                reason: "1 trailing bytes".into()
            })
        );
    }

    #[test]
    fn file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prog.mc");
        let program = sample();
        program.write_to(&path).unwrap();
        assert_eq!(Program::read_from(&path).unwrap(), program);
        assert!(matches!(
            Program::read_from(dir.path().join("absent.mc")),
            Err(VMError::IoError { .. })
        ));
    }
}
