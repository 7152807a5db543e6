//! Test utilities shared by the VM test suites.

#[cfg(test)]
pub mod utils {
    use crate::virtual_machine::assembler::assemble_source;
    use crate::virtual_machine::config::VmConfig;
    use crate::virtual_machine::vm::VM;
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    /// Cloneable in-memory sink; every clone appends to the same buffer.
    #[derive(Clone, Default)]
    pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        /// Everything written so far, as UTF-8.
        pub fn contents(&self) -> String {
            let bytes = self.0.lock().unwrap();
            String::from_utf8(bytes.clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Small VM config so tests do not allocate the full default memory.
    pub fn test_config() -> VmConfig {
        VmConfig {
            bytecode_capacity: None,
            memory_size: 1024,
            register_count: 256,
        }
    }

    /// Assembles `source` and builds a VM whose output goes to the returned buffer.
    pub fn vm_for(source: &str) -> (VM, SharedBuffer) {
        let program = assemble_source(source).expect("assembly failed");
        let out = SharedBuffer::default();
        let vm = VM::new(&test_config(), &program)
            .expect("vm construction failed")
            .with_output(out.clone());
        (vm, out)
    }
}
