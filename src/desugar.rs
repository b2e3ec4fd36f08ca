//! Structured-control desugar pass. See spec.md §4.5.1.
//!
//! Runs over raw source text before lexing. Recognizes `if <expr>:`,
//! `elif <expr>:`, and `else:` blocks, built from indentation (tabs or
//! multiples of four spaces; mixing the two within a file is an error),
//! and rewrites them into the flat `instr_15`/long-jump form the lowerer
//! already understands. The condition text itself is discarded — EMC2's
//! conditional operand is always the dynamic top-of-stack.

use crate::error::{Error, ParseError, ParseErrorKind, Span};

struct LogicalLine {
    level: usize,
    line_no: usize,
    text: String,
}

/// Desugar `source`, returning flat Kyra statement text with one fresh
/// `if_else_N`/`if_end_N` label pair minted per recognized block.
pub fn desugar(source: &str) -> Result<String, Error> {
    let lines = parse_logical_lines(source)?;
    let mut pos = 0usize;
    let mut counter = 0usize;
    let mut out = Vec::new();
    desugar_block(&lines, &mut pos, 0, &mut counter, &mut out)?;
    if pos != lines.len() {
        let bad = &lines[pos];
        return Err(ParseError {
            kind: ParseErrorKind::UnexpectedToken,
            message: "unexpected indentation".to_string(),
            span: Span::point(bad.line_no, 1, 0),
        }
        .into());
    }
    Ok(out.join("\n"))
}

fn parse_logical_lines(source: &str) -> Result<Vec<LogicalLine>, Error> {
    let mut lines = Vec::new();
    for (i, raw) in source.lines().enumerate() {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let level = indent_level(raw, i + 1)?;
        lines.push(LogicalLine { level, line_no: i + 1, text: trimmed.to_string() });
    }
    Ok(lines)
}

fn indent_level(raw: &str, line_no: usize) -> Result<usize, Error> {
    let leading: String = raw.chars().take_while(|c| *c == ' ' || *c == '\t').collect();
    if leading.is_empty() {
        return Ok(0);
    }
    let tabs = leading.chars().filter(|&c| c == '\t').count();
    let spaces = leading.chars().filter(|&c| c == ' ').count();
    if tabs > 0 && spaces > 0 {
        return Err(ParseError {
            kind: ParseErrorKind::UnexpectedToken,
            message: "mixed tabs and spaces in indentation".to_string(),
            span: Span::point(line_no, 1, 0),
        }
        .into());
    }
    if tabs > 0 {
        return Ok(tabs);
    }
    if spaces % 4 != 0 {
        return Err(ParseError {
            kind: ParseErrorKind::UnexpectedToken,
            message: "indentation must be a multiple of four spaces".to_string(),
            span: Span::point(line_no, 1, 0),
        }
        .into());
    }
    Ok(spaces / 4)
}

fn is_if(text: &str) -> bool {
    text.starts_with("if ") && text.ends_with(':')
}

fn is_elif(text: &str) -> bool {
    text.starts_with("elif ") && text.ends_with(':')
}

fn is_else(text: &str) -> bool {
    text == "else:"
}

fn desugar_block(
    lines: &[LogicalLine],
    pos: &mut usize,
    level: usize,
    counter: &mut usize,
    out: &mut Vec<String>,
) -> Result<(), Error> {
    while *pos < lines.len() && lines[*pos].level == level {
        if is_if(&lines[*pos].text) {
            desugar_if_or_elif(lines, pos, level, counter, out)?;
        } else {
            out.push(lines[*pos].text.clone());
            *pos += 1;
            // Deeper indentation here isn't a control suite — it's a brace
            // body like `strings = {\n    key: 'value',\n}`. Pass it
            // through verbatim rather than treating it as structural.
            while *pos < lines.len() && lines[*pos].level > level {
                out.push(lines[*pos].text.clone());
                *pos += 1;
            }
        }
    }
    Ok(())
}

/// Consume an `if`/`elif` header at `lines[*pos]`, its suite, and any
/// trailing `elif`/`else` chain at the same `level`, emitting the flat
/// `instr_15`/jump form described in spec.md §4.5.1.
fn desugar_if_or_elif(
    lines: &[LogicalLine],
    pos: &mut usize,
    level: usize,
    counter: &mut usize,
    out: &mut Vec<String>,
) -> Result<(), Error> {
    *pos += 1;

    let mut then_out = Vec::new();
    if *pos < lines.len() && lines[*pos].level > level {
        let inner_level = lines[*pos].level;
        desugar_block(lines, pos, inner_level, counter, &mut then_out)?;
    }

    let has_continuation =
        *pos < lines.len() && lines[*pos].level == level && (is_elif(&lines[*pos].text) || is_else(&lines[*pos].text));

    let n = *counter;
    *counter += 1;
    let end_label = format!("if_end_{n}");
    let else_label = if has_continuation { format!("if_else_{n}") } else { end_label.clone() };

    out.push("instr_15(1, 0x00)".to_string());
    out.push(format!("jmp(4, {else_label})"));
    out.extend(then_out);

    if has_continuation {
        out.push(format!("jmp(4, {end_label})"));
        out.push(format!("{else_label}:"));
        if is_elif(&lines[*pos].text) {
            desugar_if_or_elif(lines, pos, level, counter, out)?;
        } else {
            *pos += 1;
            if *pos < lines.len() && lines[*pos].level > level {
                let inner_level = lines[*pos].level;
                desugar_block(lines, pos, inner_level, counter, out)?;
            }
        }
    }

    out.push(format!("{end_label}:"));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desugars_plain_if() {
        let src = "if cond:\n    speak(0x01)\n";
        let out = desugar(src).unwrap();
        assert_eq!(out, "instr_15(1, 0x00)\njmp(4, if_end_0)\nspeak(0x01)\nif_end_0:");
    }

    #[test]
    fn desugars_if_else() {
        let src = "if cond:\n    speak(0x01)\nelse:\n    speak(0x02)\n";
        let out = desugar(src).unwrap();
        assert_eq!(
            out,
            "instr_15(1, 0x00)\njmp(4, if_else_0)\nspeak(0x01)\njmp(4, if_end_0)\nif_else_0:\nspeak(0x02)\nif_end_0:"
        );
    }

    #[test]
    fn desugars_elif_chain_as_nested_if() {
        let src = "if a:\n    speak(0x01)\nelif b:\n    speak(0x02)\nelse:\n    speak(0x03)\n";
        let out = desugar(src).unwrap();
        assert_eq!(
            out,
            "instr_15(1, 0x00)\n\
             jmp(4, if_else_0)\n\
             speak(0x01)\n\
             jmp(4, if_end_0)\n\
             if_else_0:\n\
             instr_15(1, 0x00)\n\
             jmp(4, if_else_1)\n\
             speak(0x02)\n\
             jmp(4, if_end_1)\n\
             if_else_1:\n\
             speak(0x03)\n\
             if_end_1:\n\
             if_end_0:"
        );
    }

    #[test]
    fn passes_through_non_control_statements() {
        let src = "label start\npush(0x01)\n";
        assert_eq!(desugar(src).unwrap(), "label start\npush(0x01)");
    }

    #[test]
    fn rejects_mixed_tabs_and_spaces() {
        let src = "if cond:\n \tspeak(0x01)\n";
        assert!(desugar(src).is_err());
    }

    #[test]
    fn passes_through_multiline_brace_bodies() {
        let src = "strings = {\n    s0: 'hi',\n}\n\npush(0x01)\n";
        assert_eq!(desugar(src).unwrap(), "strings = {\ns0: 'hi',\n}\npush(0x01)");
    }
}
