//! Serialization primitives shared by the VM and the program container.

pub mod encoding;
