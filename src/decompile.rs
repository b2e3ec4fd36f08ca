//! EMC2 bytes → Kyra source. The disassembler half of the pair described in
//! spec.md §5.

use crate::disasm;
use crate::error::Result;
use crate::program::Program;

/// Decompile a FORM/EMC2 container into Kyra source text.
pub fn decompile(bytes: &[u8]) -> Result<String> {
    let program = Program::from_bytes(bytes)?;
    disasm::disassemble(&program)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decompiles_minimal_program() {
        let program = Program { order: vec![0], strings: Vec::new(), data: vec![0x8000], text_present: false };
        let bytes = program.to_bytes();
        let src = decompile(&bytes).unwrap();
        assert!(src.contains("strings"));
    }
}
