//! Kyra source → [`Program`] lowering.
//!
//! Two passes over the parsed [`SourceFile`], the same shape the teacher's
//! `first_pass`/`encoder` split uses: [`resolve_labels`] walks the
//! (normalized) statement list once to assign every label a word offset
//! without emitting anything, then [`encode::emit`] walks it again to
//! produce the final word stream, now that forward references resolve.
//! See spec.md §4.5.

pub mod encode;

use std::collections::HashMap;

use log::{debug, trace};

use crate::error::{Error, ParseError, ParseErrorKind, Result, Span};
use crate::instr;
use crate::parser::ast::{Arg, Call, GlobalEntry, SourceFile, Stmt};
use crate::program::Program;

/// Lower a parsed source file into a program ready for [`Program::to_bytes`].
pub fn lower(file: &SourceFile) -> Result<Program> {
    debug!("lower: {} statements, {} strings", file.statements.len(), file.strings.len());

    if file.strings.len() > 256 {
        return Err(Error::RangeError { value: file.strings.len() as i64, bits: 8, context: "string table size" });
    }

    let stmts = normalize_statements(&file.statements);
    trace!("normalized to {} statements", stmts.len());

    let labels = resolve_labels(&stmts)?;
    trace!("pass 1: {} labels resolved", labels.len());

    let order = resolve_order(file, &stmts, &labels)?;
    trace!("pass 1: order table has {} entries", order.len());

    let string_index: HashMap<&str, u8> =
        file.strings.iter().enumerate().map(|(i, (k, _))| (k.as_str(), i as u8)).collect();

    let words = encode::emit(&stmts, &labels, &string_index)?;
    trace!("pass 2: emitted {} words", words.len());

    let strings = file.strings.iter().map(|(_, v)| v.clone()).collect();
    debug!("lower: done");
    Ok(Program::new(order, strings, words))
}

/// Fold a standalone `leave(N)` immediately followed by a bare `return` into
/// that return's `drop(N)` form — both spellings lower identically, and
/// doing this once up front keeps the rest of the lowerer from caring which
/// one the source used. See spec.md §4.5.
fn normalize_statements(stmts: &[Stmt]) -> Vec<Stmt> {
    let mut out = Vec::with_capacity(stmts.len());
    let mut i = 0;
    while i < stmts.len() {
        if let Stmt::Call(call) = &stmts[i] {
            if call.name == "leave" {
                if let [Arg::Number(n)] = call.args.as_slice() {
                    if let Some(Stmt::Return { expr, drop: None, span }) = stmts.get(i + 1) {
                        out.push(Stmt::Return { expr: expr.clone(), drop: Some(*n), span: *span });
                        i += 2;
                        continue;
                    }
                }
            }
        }
        out.push(stmts[i].clone());
        i += 1;
    }
    out
}

fn resolve_labels(stmts: &[Stmt]) -> Result<HashMap<String, usize>> {
    let mut labels = HashMap::new();
    let mut pc = 0usize;
    for stmt in stmts {
        match stmt {
            Stmt::Label { name, span } => {
                if labels.insert(name.clone(), pc).is_some() {
                    return Err(ParseError {
                        kind: ParseErrorKind::DuplicateLabel,
                        message: format!("duplicate label `{name}`"),
                        span: *span,
                    }
                    .into());
                }
            }
            _ => pc += stmt_word_count(stmt)?,
        }
    }
    Ok(labels)
}

fn resolve_order(file: &SourceFile, stmts: &[Stmt], labels: &HashMap<String, usize>) -> Result<Vec<u16>> {
    if let Some(globals) = &file.globals {
        globals
            .iter()
            .map(|g| match g {
                GlobalEntry::Name(name) => labels.get(name).copied().map(|pc| pc as u16).ok_or_else(|| {
                    ParseError {
                        kind: ParseErrorKind::UnknownLabel,
                        message: format!("unknown label `{name}` in globals"),
                        span: Span::default(),
                    }
                    .into()
                }),
                GlobalEntry::Number(n) => {
                    u16::try_from(*n).map_err(|_| Error::RangeError { value: *n, bits: 16, context: "global entry" })
                }
            })
            .collect()
    } else {
        let mut order: Vec<Option<u16>> = Vec::new();
        for stmt in stmts {
            if let Stmt::Call(call) = stmt {
                if call.name == "entry" {
                    let (i, off) = parse_entry(call, labels)?;
                    if order.len() <= i {
                        order.resize(i + 1, None);
                    }
                    order[i] = Some(off);
                }
            }
        }
        order
            .into_iter()
            .enumerate()
            .map(|(i, o)| o.ok_or_else(|| Error::Internal { reason: format!("missing entry({i}, ...)") }))
            .collect()
    }
}

fn parse_entry(call: &Call, labels: &HashMap<String, usize>) -> Result<(usize, u16)> {
    let [a, b] = call.args.as_slice() else {
        return Err(ParseError {
            kind: ParseErrorKind::WrongArity,
            message: "`entry` takes exactly two arguments".to_string(),
            span: call.span,
        }
        .into());
    };
    let i = match a {
        Arg::Number(n) => *n as usize,
        _ => {
            return Err(ParseError {
                kind: ParseErrorKind::UnexpectedToken,
                message: "expected a numeric entry index".to_string(),
                span: call.span,
            }
            .into())
        }
    };
    let off = match b {
        Arg::Number(n) => {
            u16::try_from(*n).map_err(|_| Error::RangeError { value: *n, bits: 16, context: "entry offset" })?
        }
        Arg::Ident(name) => labels.get(name).copied().map(|pc| pc as u16).ok_or_else(|| ParseError {
            kind: ParseErrorKind::UnknownLabel,
            message: format!("unknown label `{name}` in entry"),
            span: call.span,
        })?,
        Arg::Call(_) => {
            return Err(ParseError {
                kind: ParseErrorKind::UnexpectedToken,
                message: "expected a number or label in entry".to_string(),
                span: call.span,
            }
            .into())
        }
    };
    Ok((i, off))
}

fn parse_suffixed(name: &str, prefix: &str) -> Option<u8> {
    name.strip_prefix(prefix).filter(|rest| !rest.is_empty()).and_then(|rest| rest.parse::<u8>().ok())
}

fn is_native_call_name(name: &str) -> bool {
    instr::call_alias_id(name).is_some() || parse_suffixed(name, "call_").is_some()
}

fn is_func_call_name(name: &str) -> bool {
    name.strip_prefix("func_").is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

fn arg_word_count(arg: &Arg) -> usize {
    match arg {
        Arg::Number(_) | Arg::Ident(_) => 1,
        Arg::Call(call) => call_value_word_count(call),
    }
}

fn call_value_word_count(call: &Call) -> usize {
    match call.name.as_str() {
        "u16" => 2,
        "var" | "arg" | "local" => 1,
        name if instr::unary_id(name).is_some() || parse_suffixed(name, "unary_").is_some() => {
            1 + call.args.first().map(arg_word_count).unwrap_or(0)
        }
        name if instr::binary_id(name).is_some() || parse_suffixed(name, "binary_").is_some() => {
            1 + call.args.iter().map(arg_word_count).sum::<usize>()
        }
        _ => 0,
    }
}

fn stmt_word_count(stmt: &Stmt) -> Result<usize> {
    match stmt {
        Stmt::Label { .. } => Ok(0),
        Stmt::Return { expr, drop, .. } => return_word_count(expr, *drop),
        Stmt::Call(call) => call_stmt_word_count(call),
    }
}

fn call_stmt_word_count(call: &Call) -> Result<usize> {
    let args_words: usize = call.args.iter().map(arg_word_count).sum();
    Ok(match call.name.as_str() {
        "push16" => 2,
        "push" | "jmp" | "leave" | "var" | "arg" | "local" | "call" => 1,
        "ifnot" => 2,
        "entry" => 0,
        name if name.starts_with("instr_") => 1,
        name if is_native_call_name(name) => args_words + 2,
        name if is_func_call_name(name) => args_words + 2 + usize::from(!call.args.is_empty()),
        _ => 0,
    })
}

fn return_word_count(expr: &Arg, drop: Option<i64>) -> Result<usize> {
    Ok(match expr {
        Arg::Ident(name) if name == "acc" => 1 + usize::from(drop.is_some()),
        Arg::Call(call) if is_native_call_name(&call.name) => {
            let args_words: usize = call.args.iter().map(arg_word_count).sum();
            args_words + 3
        }
        Arg::Call(call) if is_func_call_name(&call.name) => {
            let args_words: usize = call.args.iter().map(arg_word_count).sum();
            args_words + 3 + usize::from(!call.args.is_empty())
        }
        _ => arg_word_count(expr) + 2 + usize::from(drop.is_some()),
    })
}
