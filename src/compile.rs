//! Kyra source → EMC2 bytes. The compiler half of the pair described in
//! spec.md §5: `compile(decompile(b)) == b` for every well-formed `b`.

use crate::desugar;
use crate::error::Result;
use crate::lexer;
use crate::lower;
use crate::parser;
use crate::pragma::{self, TextPragma};

/// Compile Kyra source text into a FORM/EMC2 container.
///
/// Runs the pragma scan over the raw text first (it has to see the literal
/// `# text: ...` comment before the desugar pass can drop it), then
/// desugars structured control, lexes, parses, and lowers.
pub fn compile(source: &str) -> Result<Vec<u8>> {
    let text_pragma = pragma::scan(source);
    let desugared = desugar::desugar(source)?;
    let lexed = lexer::tokenize(&desugared);
    if let Some(err) = lexed.errors.into_iter().next() {
        return Err(err.into());
    }
    let file = parser::parse(&lexed.tokens)?;
    let mut program = lower::lower(&file)?;

    program.text_present = match text_pragma {
        Some(TextPragma::Present) => true,
        Some(TextPragma::Absent) => false,
        None => !program.strings.is_empty(),
    };

    Ok(program.to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompile::decompile;

    #[test]
    fn compiles_minimal_program() {
        let src = "strings = {}\n\nglobals = [0]\n\nreturn acc\n";
        let bytes = compile(src).unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn round_trips_through_decompile() {
        let src = "strings = {}\n\nglobals = [0]\n\nreturn acc\n";
        let bytes = compile(src).unwrap();
        let decompiled = decompile(&bytes).unwrap();
        let recompiled = compile(&decompiled).unwrap();
        assert_eq!(bytes, recompiled);
    }

    #[test]
    fn honors_absent_text_pragma_over_strings() {
        let src = "# text: absent\nstrings = {\n    s0: 'hi',\n}\n\nglobals = [0]\n\nreturn acc\n";
        let bytes = compile(src).unwrap();
        let program = crate::program::Program::from_bytes(&bytes).unwrap();
        assert!(!program.text_present);
    }
}
