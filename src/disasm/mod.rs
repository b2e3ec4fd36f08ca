//! The disassembler: turns a [`Program`] into Kyra source text.
//!
//! Runs the passes of spec.md §4.3 in sequence — executed-PC discovery,
//! label universe construction, structural hiding, text-key inference —
//! then walks the code PC-ordered trying sugar folds before falling back to
//! a raw `instr_N` print, exactly mirroring how the teacher's encoder tries
//! specific instruction forms before giving up.

pub mod fold;
pub mod labels;
pub mod structure;
pub mod text_keys;

use std::collections::BTreeSet;

use log::{debug, trace};

use crate::error::Result;
use crate::instr::{call_alias, FLAGS_TWO_WORD, FLAGS_VALUE, OP_CALL, OP_IFNOT, OP_LEAVE, OP_PUSH};
use crate::program::Program;
use crate::word::decode_word;
use labels::Labels;

/// Disassemble a program into Kyra source text. See spec.md §4.3.
pub fn disassemble(program: &Program) -> Result<String> {
    debug!("disassemble: {} words, {} strings", program.data.len(), program.strings.len());

    let pass_a = labels::discover(&program.data);
    trace!("pass A: {} executed PCs", pass_a.executed_pcs.len());

    let labels = labels::build(program, &pass_a);
    trace!("pass B: {} labeled PCs", labels.pc_to_names.len());

    let text_keys = text_keys::infer_text_keys(&program.data, &pass_a, &program.strings);
    trace!("pass D: {} text keys", text_keys.len());

    let mut hidden = BTreeSet::new();
    structure::collect_hidden(&program.data, (0, program.data.len()), &pass_a, &mut hidden);
    trace!("pass C: {} hidden PCs", hidden.len());

    let mut lines = Vec::new();
    emit_range(
        &program.data,
        (0, program.data.len()),
        0,
        &pass_a,
        &labels,
        &text_keys,
        &mut lines,
    );
    trace!("pass E/F: {} rendered lines before sweep", lines.len());

    let mut out = String::new();
    out.push_str(&render_strings(&program.strings, &text_keys));
    out.push_str("\n\n");
    out.push_str(&render_globals(program));
    out.push_str("\n\n");
    for line in &lines {
        out.push_str(line);
        out.push('\n');
    }

    let swept = sweep_unreferenced_labels(&out);
    debug!("disassemble: done, {} bytes of source", swept.len());
    Ok(swept)
}

fn render_strings(strings: &[String], text_keys: &[String]) -> String {
    if strings.is_empty() {
        return "strings = {}".to_string();
    }
    let mut s = String::from("strings = {\n");
    for (key, value) in text_keys.iter().zip(strings.iter()) {
        s.push_str(&format!("    {key}: {},\n", quote_kyra_string(value)));
    }
    s.push('}');
    s
}

fn render_globals(program: &Program) -> String {
    let names: Vec<String> = (0..program.order.len()).map(|i| format!("global_{i}")).collect();
    format!("globals = [{}]", names.join(", "))
}

fn quote_kyra_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for b in s.bytes() {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7E => out.push(b as char),
            _ => out.push_str(&format!("\\x{b:02X}")),
        }
    }
    out.push('\'');
    out
}

fn label_ref(labels: &Labels, target: usize) -> String {
    labels
        .pc_to_names
        .get(&target)
        .and_then(|names| {
            names
                .iter()
                .find(|n| n.starts_with("global_") || n.starts_with("func_"))
                .or_else(|| names.first())
        })
        .cloned()
        .unwrap_or_else(|| format!("label_{target}"))
}

fn sorted_names(names: &[String]) -> Vec<String> {
    let mut v = names.to_vec();
    v.sort_by_key(|n| (!n.starts_with("global_"), n.clone()));
    v
}

fn emit_range(
    data: &[u16],
    range: (usize, usize),
    indent: usize,
    pass_a: &labels::PassA,
    labels: &Labels,
    text_keys: &[String],
    out: &mut Vec<String>,
) {
    let pad = "    ".repeat(indent);
    let mut pc = range.0;
    while pc < range.1 {
        if let Some(names) = labels.pc_to_names.get(&pc) {
            for name in sorted_names(names) {
                out.push(format!("{pad}label {name}"));
            }
        }

        if let Some(shape) = structure::recognize(data, pc, range.1, pass_a) {
            out.push(format!("{pad}if cond:"));
            emit_range(data, shape.then_range, indent + 1, pass_a, labels, text_keys, out);
            if let Some(else_range) = shape.else_range {
                out.push(format!("{pad}else:"));
                emit_range(data, else_range, indent + 1, pass_a, labels, text_keys, out);
            }
            pc = shape.end;
            continue;
        }

        if let Some(folded) = try_fold(data, pc, range.1, pass_a, labels, text_keys) {
            out.push(format!("{pad}{}", folded.text));
            pc = folded.next_pc;
            continue;
        }

        let (text, next_pc) = print_raw(data, pc, labels);
        out.push(format!("{pad}{text}"));
        pc = next_pc;
    }

    if let Some(names) = labels.pc_to_names.get(&range.1) {
        if range.1 == data.len() {
            for name in sorted_names(names) {
                out.push(format!("{pad}label {name}"));
            }
        }
    }
}

fn try_fold(
    data: &[u16],
    pc: usize,
    block_end: usize,
    pass_a: &labels::PassA,
    labels: &Labels,
    text_keys: &[String],
) -> Option<fold::Folded> {
    fold::try_return_pure(data, pc, block_end, pass_a)
        .or_else(|| fold::try_return_func_call(data, pc, block_end, pass_a, labels))
        .or_else(|| fold::try_return_native_call(data, pc, block_end, pass_a, text_keys))
        .or_else(|| fold::try_return_acc(data, pc, block_end))
        .or_else(|| fold::try_func_call(data, pc, block_end, pass_a, labels))
        .or_else(|| fold::try_native_call(data, pc, block_end, pass_a, text_keys))
}

fn print_raw(data: &[u16], pc: usize, labels: &Labels) -> (String, usize) {
    let w = decode_word(data[pc]);
    if w.is_long {
        return (format!("jmp(0, {})", label_ref(labels, w.long_target())), pc + 1);
    }
    match (w.opcode, w.flags) {
        (OP_PUSH, FLAGS_TWO_WORD) => {
            let val = data.get(pc + 1).copied().unwrap_or(0);
            (format!("push16(0x{val:04x})"), pc + 2)
        }
        (OP_PUSH, FLAGS_VALUE) => (format!("push(0x{:02x})", w.arg as u8), pc + 1),
        (OP_IFNOT, FLAGS_TWO_WORD) => {
            let operand = data.get(pc + 1).copied().unwrap_or(0);
            let ow = decode_word(operand);
            let target = if ow.is_long {
                label_ref(labels, ow.long_target())
            } else {
                ow.arg.to_string()
            };
            (format!("ifnot(1, {target})"), pc + 2)
        }
        (OP_LEAVE, FLAGS_VALUE) => (format!("leave(0x{:02x})", w.arg), pc + 1),
        (OP_CALL, FLAGS_VALUE) => {
            let name = call_alias(w.arg as u8)
                .map(str::to_string)
                .unwrap_or_else(|| format!("call_{}", w.arg));
            (format!("{name}()"), pc + 1)
        }
        _ => (format!("instr_{}({}, {})", w.opcode, w.flags, w.arg), pc + 1),
    }
}

/// Remove any `label label_N` line whose name never appears elsewhere in
/// the text, per spec.md §4.3 Pass F's final sweep. `global_*` and
/// `func_*` labels are entry points and are always kept.
fn sweep_unreferenced_labels(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let is_synthetic_def = |line: &str| -> Option<&str> {
        line.trim_start()
            .strip_prefix("label ")
            .filter(|name| name.starts_with("label_"))
    };

    let keep: Vec<bool> = lines
        .iter()
        .enumerate()
        .map(|(i, line)| match is_synthetic_def(line) {
            None => true,
            Some(name) => lines
                .iter()
                .enumerate()
                .any(|(j, other)| j != i && contains_word(other, name)),
        })
        .collect();

    lines
        .into_iter()
        .zip(keep)
        .filter(|(_, keep)| *keep)
        .map(|(line, _)| line)
        .collect::<Vec<_>>()
        .join("\n")
        + "\n"
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    let bytes = haystack.as_bytes();
    let needle_bytes = needle.as_bytes();
    let is_ident = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
    let mut start = 0;
    while let Some(rel) = haystack[start..].find(needle) {
        let idx = start + rel;
        let before_ok = idx == 0 || !is_ident(bytes[idx - 1]);
        let after = idx + needle_bytes.len();
        let after_ok = after >= bytes.len() || !is_ident(bytes[after]);
        if before_ok && after_ok {
            return true;
        }
        start = idx + 1;
    }
    false
}
