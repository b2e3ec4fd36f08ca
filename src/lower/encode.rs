//! Second lowering pass: word emission.
//!
//! Mirrors [`super::resolve_labels`]'s statement walk, this time actually
//! pushing words, now that every label has a resolved offset. Sugar forms
//! (`call_ID`, `func_E`, `return ...`) expand to the exact word sequences
//! spec.md §4.5 describes — the same shapes `disasm::fold` folds back down.

use std::collections::HashMap;

use crate::error::{Error, ParseError, ParseErrorKind, Result};
use crate::instr::{self, FLAGS_TWO_WORD, FLAGS_VALUE, OP_ACC, OP_CALL, OP_IFNOT, OP_LEAVE, OP_PUSH, OP_RETURN, OP_VAR};
use crate::parser::ast::{Arg, Call, Stmt};
use crate::word::{encode_long_jump, encode_word};

type Labels = HashMap<String, usize>;
type Strings<'a> = HashMap<&'a str, u8>;

pub(super) fn emit(stmts: &[Stmt], labels: &Labels, strings: &Strings) -> Result<Vec<u16>> {
    let mut words = Vec::new();
    for stmt in stmts {
        match stmt {
            Stmt::Label { .. } => {}
            Stmt::Call(call) if call.name == "entry" => {}
            Stmt::Call(call) => encode_call_stmt(call, labels, strings, &mut words)?,
            Stmt::Return { expr, drop, .. } => encode_return(expr, *drop, labels, strings, &mut words)?,
        }
    }
    Ok(words)
}

fn lower_number_byte(n: i64) -> Result<u8> {
    if (0..=255).contains(&n) {
        Ok(n as u8)
    } else if (-128..0).contains(&n) {
        Ok((n + 256) as u8)
    } else {
        Err(Error::RangeError { value: n, bits: 8, context: "push value" })
    }
}

fn expect_single_number(call: &Call) -> Result<i64> {
    match call.args.as_slice() {
        [Arg::Number(n)] => Ok(*n),
        _ => Err(ParseError {
            kind: ParseErrorKind::WrongArity,
            message: format!("`{}` takes exactly one numeric argument", call.name),
            span: call.span,
        }
        .into()),
    }
}

fn lower_value(arg: &Arg, strings: &Strings, out: &mut Vec<u16>) -> Result<()> {
    match arg {
        Arg::Number(n) => {
            out.push(encode_word(OP_PUSH, FLAGS_VALUE, lower_number_byte(*n)? as u16)?);
            Ok(())
        }
        Arg::Ident(name) if name == "acc" => {
            out.push(encode_word(OP_ACC, FLAGS_VALUE, 0)?);
            Ok(())
        }
        Arg::Ident(name) => match strings.get(name.as_str()) {
            Some(&idx) => {
                out.push(encode_word(OP_PUSH, FLAGS_VALUE, idx as u16)?);
                Ok(())
            }
            None => Err(ParseError {
                kind: ParseErrorKind::UnknownLabel,
                message: format!("`{name}` is not `acc`, a string key, or a known value form"),
                span: Default::default(),
            }
            .into()),
        },
        Arg::Call(call) => lower_value_call(call, strings, out),
    }
}

fn lower_value_call(call: &Call, strings: &Strings, out: &mut Vec<u16>) -> Result<()> {
    match call.name.as_str() {
        "u16" => {
            let n = expect_single_number(call)?;
            let v = u16::try_from(n).map_err(|_| Error::RangeError { value: n, bits: 16, context: "u16 literal" })?;
            out.push(encode_word(OP_PUSH, FLAGS_TWO_WORD, 0)?);
            out.push(v);
            Ok(())
        }
        "var" => lower_slot(call, OP_VAR, out),
        "arg" => lower_slot(call, instr::OP_ARG, out),
        "local" => lower_slot(call, instr::OP_LOCAL, out),
        name => {
            if let Some(id) = instr::unary_id(name).or_else(|| super::parse_suffixed(name, "unary_")) {
                let child = call.args.first().ok_or_else(|| ParseError {
                    kind: ParseErrorKind::WrongArity,
                    message: format!("`{name}` takes exactly one argument"),
                    span: call.span,
                })?;
                lower_value(child, strings, out)?;
                out.push(encode_word(instr::OP_UNARY, FLAGS_VALUE, id as u16)?);
                return Ok(());
            }
            if let Some(id) = instr::binary_id(name).or_else(|| super::parse_suffixed(name, "binary_")) {
                let [lhs, rhs] = call.args.as_slice() else {
                    return Err(ParseError {
                        kind: ParseErrorKind::WrongArity,
                        message: format!("`{name}` takes exactly two arguments"),
                        span: call.span,
                    }
                    .into());
                };
                lower_value(lhs, strings, out)?;
                lower_value(rhs, strings, out)?;
                out.push(encode_word(instr::OP_BINARY, FLAGS_VALUE, id as u16)?);
                return Ok(());
            }
            Err(Error::Internal { reason: format!("`{name}` is not a value expression") })
        }
    }
}

fn lower_slot(call: &Call, opcode: u8, out: &mut Vec<u16>) -> Result<()> {
    let n = expect_single_number(call)?;
    let b = u8::try_from(n).map_err(|_| Error::RangeError { value: n, bits: 8, context: "slot index" })?;
    out.push(encode_word(opcode, FLAGS_VALUE, b as u16)?);
    Ok(())
}

fn lower_native_call(call: &Call, strings: &Strings, out: &mut Vec<u16>) -> Result<()> {
    let id = instr::call_alias_id(&call.name).or_else(|| super::parse_suffixed(&call.name, "call_")).ok_or_else(
        || Error::Internal { reason: format!("`{}` is not a native call id", call.name) },
    )?;
    for a in &call.args {
        lower_value(a, strings, out)?;
    }
    out.push(encode_word(OP_CALL, FLAGS_VALUE, id as u16)?);
    out.push(encode_word(OP_LEAVE, FLAGS_VALUE, call.args.len() as u16)?);
    Ok(())
}

fn lower_func_call(call: &Call, strings: &Strings, out: &mut Vec<u16>) -> Result<()> {
    let target: usize = call
        .name
        .strip_prefix("func_")
        .and_then(|rest| rest.parse().ok())
        .ok_or_else(|| Error::Internal { reason: format!("`{}` is not a scripted function target", call.name) })?;
    for a in &call.args {
        lower_value(a, strings, out)?;
    }
    out.push(encode_word(OP_ACC, FLAGS_VALUE, 1)?);
    out.push(encode_long_jump(target)?);
    if !call.args.is_empty() {
        out.push(encode_word(OP_LEAVE, FLAGS_VALUE, call.args.len() as u16)?);
    }
    Ok(())
}

fn encode_call_stmt(call: &Call, labels: &Labels, strings: &Strings, out: &mut Vec<u16>) -> Result<()> {
    match call.name.as_str() {
        "push16" => {
            let n = expect_single_number(call)?;
            let v = u16::try_from(n).map_err(|_| Error::RangeError { value: n, bits: 16, context: "push16 value" })?;
            out.push(encode_word(OP_PUSH, FLAGS_TWO_WORD, 0)?);
            out.push(v);
            Ok(())
        }
        "push" => {
            let n = expect_single_number(call)?;
            out.push(encode_word(OP_PUSH, FLAGS_VALUE, lower_number_byte(n)? as u16)?);
            Ok(())
        }
        "ifnot" => {
            let target = jump_target(call, labels)?;
            out.push(encode_word(OP_IFNOT, FLAGS_TWO_WORD, 0)?);
            out.push(encode_long_jump(target)?);
            Ok(())
        }
        "jmp" => {
            let target = jump_target(call, labels)?;
            out.push(encode_long_jump(target)?);
            Ok(())
        }
        "leave" => {
            let n = expect_single_number(call)?;
            out.push(encode_word(OP_LEAVE, FLAGS_VALUE, lower_number_byte(n)? as u16)?);
            Ok(())
        }
        "var" => lower_slot(call, OP_VAR, out),
        "arg" => lower_slot(call, instr::OP_ARG, out),
        "local" => lower_slot(call, instr::OP_LOCAL, out),
        "call" => {
            let [Arg::Number(flags), Arg::Number(id)] = call.args.as_slice() else {
                return Err(ParseError {
                    kind: ParseErrorKind::WrongArity,
                    message: "`call` takes two numeric arguments".to_string(),
                    span: call.span,
                }
                .into());
            };
            let flags = u8::try_from(*flags).map_err(|_| Error::RangeError { value: *flags, bits: 3, context: "call flags" })?;
            out.push(encode_word(OP_CALL, flags, *id as u16)?);
            Ok(())
        }
        name if name.starts_with("instr_") => {
            let opcode: u8 = name
                .strip_prefix("instr_")
                .and_then(|rest| rest.parse().ok())
                .ok_or_else(|| Error::Internal { reason: format!("malformed `{name}` escape") })?;
            let [Arg::Number(flags), Arg::Number(arg)] = call.args.as_slice() else {
                return Err(ParseError {
                    kind: ParseErrorKind::WrongArity,
                    message: format!("`{name}` takes two numeric arguments"),
                    span: call.span,
                }
                .into());
            };
            let flags = u8::try_from(*flags).map_err(|_| Error::RangeError { value: *flags, bits: 3, context: "instruction flags" })?;
            out.push(encode_word(opcode, flags, *arg as u16)?);
            Ok(())
        }
        name if super::is_native_call_name(name) => lower_native_call(call, strings, out),
        name if super::is_func_call_name(name) => lower_func_call(call, strings, out),
        name => Err(Error::Internal { reason: format!("unknown statement `{name}`") }),
    }
}

fn jump_target(call: &Call, labels: &Labels) -> Result<usize> {
    let [_, target] = call.args.as_slice() else {
        return Err(ParseError {
            kind: ParseErrorKind::WrongArity,
            message: format!("`{}` takes two arguments", call.name),
            span: call.span,
        }
        .into());
    };
    match target {
        Arg::Ident(name) => labels.get(name).copied().ok_or_else(|| {
            ParseError { kind: ParseErrorKind::UnknownLabel, message: format!("unknown label `{name}`"), span: call.span }.into()
        }),
        Arg::Number(n) => Ok(*n as usize),
        Arg::Call(_) => Err(ParseError {
            kind: ParseErrorKind::UnexpectedToken,
            message: "expected a label or PC number".to_string(),
            span: call.span,
        }
        .into()),
    }
}

fn encode_return(expr: &Arg, drop: Option<i64>, labels: &Labels, strings: &Strings, out: &mut Vec<u16>) -> Result<()> {
    match expr {
        Arg::Ident(name) if name == "acc" => {
            if let Some(n) = drop {
                out.push(encode_word(OP_LEAVE, FLAGS_VALUE, lower_number_byte(n)? as u16)?);
            }
            out.push(encode_word(OP_RETURN, FLAGS_VALUE, 1)?);
            Ok(())
        }
        Arg::Call(call) if super::is_native_call_name(&call.name) => {
            if drop.is_some() {
                return Err(Error::Internal {
                    reason: "`drop(N)` cannot be combined with a native-call return".to_string(),
                });
            }
            lower_native_call(call, strings, out)?;
            out.push(encode_word(OP_RETURN, FLAGS_VALUE, 1)?);
            Ok(())
        }
        Arg::Call(call) if super::is_func_call_name(&call.name) => {
            if drop.is_some() {
                return Err(Error::Internal {
                    reason: "`drop(N)` cannot be combined with a scripted-function return".to_string(),
                });
            }
            lower_func_call(call, strings, out)?;
            out.push(encode_word(OP_RETURN, FLAGS_VALUE, 1)?);
            Ok(())
        }
        _ => {
            lower_value(expr, strings, out)?;
            out.push(encode_word(OP_RETURN, FLAGS_VALUE, 0)?);
            if let Some(n) = drop {
                out.push(encode_word(OP_LEAVE, FLAGS_VALUE, lower_number_byte(n)? as u16)?);
            }
            out.push(encode_word(OP_RETURN, FLAGS_VALUE, 1)?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use crate::word::decode_word;

    fn lower_src(src: &str) -> Vec<u16> {
        let tokens = tokenize(src).tokens;
        let file = parse(&tokens).unwrap();
        super::super::lower(&file).unwrap().data
    }

    #[test]
    fn lowers_plain_native_call_statement() {
        let words = lower_src("strings = {}\n\nglobals = [0]\n\nspeak(0x01, 0x02, acc)\n");
        assert_eq!(words.len(), 5);
        assert_eq!(decode_word(words[3]).opcode, OP_CALL);
        assert_eq!(decode_word(words[4]).opcode, OP_LEAVE);
    }

    #[test]
    fn lowers_return_acc_with_drop() {
        let words = lower_src("strings = {}\n\nglobals = [0]\n\nreturn acc, drop(2)\n");
        assert_eq!(words.len(), 2);
        let leave = decode_word(words[0]);
        assert_eq!((leave.opcode, leave.arg), (OP_LEAVE, 2));
        let end = decode_word(words[1]);
        assert_eq!((end.opcode, end.arg), (OP_RETURN, 1));
    }

    #[test]
    fn lowers_return_native_call_without_extra_pop() {
        let words = lower_src("strings = {\n    s0: 'hi',\n}\n\nglobals = [0]\n\nreturn speak(0x01, 0x02, s0)\n");
        // 3 pushes + call + leave + return-end, no leading return-begin marker.
        assert_eq!(words.len(), 6);
        assert_eq!(decode_word(*words.last().unwrap()).opcode, OP_RETURN);
        assert_eq!(decode_word(*words.last().unwrap()).arg, 1);
    }

    #[test]
    fn lowers_jmp_to_forward_label() {
        let words = lower_src("strings = {}\n\nglobals = [0]\n\njmp(0, target)\nlabel target\nreturn acc\n");
        let w = decode_word(words[0]);
        assert!(w.is_long);
        assert_eq!(w.long_target(), 1);
    }

    #[test]
    fn merges_standalone_leave_before_return() {
        let words = lower_src("strings = {}\n\nglobals = [0]\n\nleave(4)\nreturn acc\n");
        assert_eq!(words.len(), 2);
        assert_eq!(decode_word(words[0]).opcode, OP_LEAVE);
    }
}
