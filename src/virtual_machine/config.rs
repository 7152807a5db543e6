//! VM sizing configuration.

use crate::virtual_machine::errors::VMError;
use std::env;

/// Bytes of linear memory a VM gets unless configured otherwise (2 MiB).
pub const DEFAULT_MEMORY_SIZE: usize = 2 * 1024 * 1024;
/// Register slots addressable by a one-byte index.
pub const MAX_REGISTERS: usize = 256;

pub const ENV_MEMORY: &str = "MICRO_MEMORY";
pub const ENV_REGISTERS: &str = "MICRO_REGISTERS";
pub const ENV_BYTECODE_CAPACITY: &str = "MICRO_BYTECODE_CAPACITY";

/// Sizes of the buffers a [`VM`](super::vm::VM) allocates at construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VmConfig {
    /// Bytecode buffer capacity; `None` sizes it to the loaded program.
    pub bytecode_capacity: Option<usize>,
    /// Linear memory size in bytes.
    pub memory_size: usize,
    /// Number of register slots, at most [`MAX_REGISTERS`].
    pub register_count: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            bytecode_capacity: None,
            memory_size: DEFAULT_MEMORY_SIZE,
            register_count: MAX_REGISTERS,
        }
    }
}

impl VmConfig {
    /// Defaults overlaid with `MICRO_MEMORY`, `MICRO_REGISTERS` and
    /// `MICRO_BYTECODE_CAPACITY` when set.
    pub fn from_env() -> Result<Self, VMError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, VMError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_MEMORY) {
            config.memory_size = parse_size(ENV_MEMORY, &raw)?;
        }
        if let Some(raw) = lookup(ENV_REGISTERS) {
            config.register_count = parse_size(ENV_REGISTERS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_BYTECODE_CAPACITY) {
            config.bytecode_capacity = Some(parse_size(ENV_BYTECODE_CAPACITY, &raw)?);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), VMError> {
        if self.register_count == 0 || self.register_count > MAX_REGISTERS {
            return Err(VMError::InvalidConfig {
                key: ENV_REGISTERS,
                value: self.register_count.to_string(),
                reason: "register count must be between 1 and 256",
            });
        }
        Ok(())
    }
}

fn parse_size(key: &'static str, raw: &str) -> Result<usize, VMError> {
    raw.trim()
        .parse::<usize>()
        .map_err(|_| VMError::InvalidConfig {
            key,
            value: raw.to_string(),
            reason: "expected a non-negative integer",
        })
}
