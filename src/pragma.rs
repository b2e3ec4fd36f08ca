//! Pragma scanner. See spec.md §4.6.
//!
//! Scans raw source lines (before lexing) for `# text: present` or
//! `# text: absent`. The last occurrence wins; absence defers to the
//! default of TEXT present iff `strings` is non-empty.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextPragma {
    Present,
    Absent,
}

/// Scan `source` for the last recognized `# text: ...` pragma comment.
pub fn scan(source: &str) -> Option<TextPragma> {
    let mut result = None;
    for line in source.lines() {
        match line.trim() {
            "# text: present" => result = Some(TextPragma::Present),
            "# text: absent" => result = Some(TextPragma::Absent),
            _ => {}
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_none_when_absent() {
        assert_eq!(scan("strings = {}\n"), None);
    }

    #[test]
    fn last_occurrence_wins() {
        let src = "# text: present\nfoo(1)\n# text: absent\n";
        assert_eq!(scan(src), Some(TextPragma::Absent));
    }

    #[test]
    fn ignores_unrelated_comments() {
        assert_eq!(scan("# just a note\nfoo(1)\n"), None);
    }
}
