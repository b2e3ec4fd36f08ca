//! Pass E: sugar folding over reconstructed stack expressions.
//! See spec.md §4.3.

use super::labels::{Labels, PassA};
use crate::instr::expr::Expr;
use crate::instr::{
    binary_name, call_alias, unary_name, FLAGS_TWO_WORD, FLAGS_VALUE, OP_ACC, OP_ARG, OP_BINARY,
    OP_CALL, OP_LEAVE, OP_LOCAL, OP_PUSH, OP_RETURN, OP_UNARY, OP_VAR, TEXT_CALL_IDIOMS,
};
use crate::word::decode_word;

/// Scan forward from `start` over a maximal run of value-producing
/// instructions (pushes, loads, unary/binary ops), stopping at the first
/// instruction outside that set or at `limit`.
fn find_run_end(data: &[u16], start: usize, limit: usize, pass_a: &PassA) -> usize {
    let mut pc = start;
    while pc < limit {
        if pass_a.ifnot_operand_pcs.contains(&pc) {
            break;
        }
        let w = decode_word(data[pc]);
        if w.is_long {
            break;
        }
        match (w.opcode, w.flags) {
            (OP_PUSH, FLAGS_TWO_WORD) => pc += 2,
            (OP_PUSH, FLAGS_VALUE)
            | (OP_VAR, FLAGS_VALUE)
            | (OP_ARG, FLAGS_VALUE)
            | (OP_LOCAL, FLAGS_VALUE)
            | (OP_UNARY, FLAGS_VALUE)
            | (OP_BINARY, FLAGS_VALUE) => pc += 1,
            (OP_ACC, FLAGS_VALUE) if w.arg == 0 => pc += 1,
            _ => break,
        }
    }
    pc
}

/// Reconstruct the stack-expression sequence over `[start, end)`. Accepts
/// only the opcode subset spec.md §4.3 names; gives up (returns `None`) on
/// anything else, including an interior `ifnot` operand word.
pub fn reconstruct_stack(data: &[u16], start: usize, end: usize, pass_a: &PassA) -> Option<Vec<Expr>> {
    let mut stack = Vec::new();
    let mut pc = start;
    while pc < end {
        if pass_a.ifnot_operand_pcs.contains(&pc) {
            return None;
        }
        let w = decode_word(data[pc]);
        if w.is_long {
            return None;
        }
        match (w.opcode, w.flags) {
            (OP_PUSH, FLAGS_TWO_WORD) => {
                let val = *data.get(pc + 1)?;
                stack.push(Expr::U16(val));
                pc += 2;
            }
            (OP_PUSH, FLAGS_VALUE) => {
                stack.push(Expr::I8(w.arg as u8 as i8));
                pc += 1;
            }
            (OP_VAR, FLAGS_VALUE) => {
                stack.push(Expr::Var(w.arg as u8));
                pc += 1;
            }
            (OP_ARG, FLAGS_VALUE) => {
                stack.push(Expr::Arg(w.arg as u8));
                pc += 1;
            }
            (OP_LOCAL, FLAGS_VALUE) => {
                stack.push(Expr::Local(w.arg as u8));
                pc += 1;
            }
            (OP_ACC, FLAGS_VALUE) if w.arg == 0 => {
                stack.push(Expr::Acc);
                pc += 1;
            }
            (OP_UNARY, FLAGS_VALUE) => {
                let child = stack.pop()?;
                stack.push(Expr::Unary(w.arg as u8, Box::new(child)));
                pc += 1;
            }
            (OP_BINARY, FLAGS_VALUE) => {
                let rhs = stack.pop()?;
                let lhs = stack.pop()?;
                stack.push(Expr::Binary(w.arg as u8, Box::new(lhs), Box::new(rhs)));
                pc += 1;
            }
            _ => return None,
        }
    }
    Some(stack)
}

/// Render a value expression into Kyra source text, substituting a string
/// key for the last argument of a recognized text-bearing call idiom.
pub fn render_expr(e: &Expr) -> String {
    match e {
        Expr::I8(v) => format!("0x{:02x}", *v as u8),
        Expr::U16(v) => format!("u16(0x{v:04x})"),
        Expr::StringKey(k) => k.clone(),
        Expr::Var(n) => format!("var({n})"),
        Expr::Arg(n) => format!("arg({n})"),
        Expr::Local(n) => format!("local({n})"),
        Expr::Acc => "acc".to_string(),
        Expr::Unary(id, child) => {
            let name = unary_name(*id).map(str::to_string).unwrap_or_else(|| format!("unary_{id}"));
            format!("{name}({})", render_expr(child))
        }
        Expr::Binary(id, lhs, rhs) => {
            let name = binary_name(*id).map(str::to_string).unwrap_or_else(|| format!("binary_{id}"));
            format!("{name}({}, {})", render_expr(lhs), render_expr(rhs))
        }
    }
}

/// Replace the last argument of a text-bearing call idiom's argument list
/// with its inferred string key, if the call matches one of
/// [`TEXT_CALL_IDIOMS`] and a key is available at that index.
fn substitute_text_key(call_id: u8, leave_arg: u8, args: &mut [Expr], text_keys: &[String]) {
    let Some(&(_, expected_leave, _)) = TEXT_CALL_IDIOMS.iter().find(|&&(id, _, _)| id == call_id) else {
        return;
    };
    if expected_leave != leave_arg {
        return;
    }
    if let Some(Expr::I8(v)) = args.last() {
        let idx = *v as u8 as usize;
        if let Some(key) = text_keys.get(idx) {
            let key = key.clone();
            *args.last_mut().unwrap() = Expr::StringKey(key);
        }
    }
}

fn render_call(call_id: u8, args: &[Expr]) -> String {
    let name = call_alias(call_id).map(str::to_string).unwrap_or_else(|| format!("call_{call_id}"));
    let rendered: Vec<String> = args.iter().map(render_expr).collect();
    format!("{name}({})", rendered.join(", "))
}

/// Result of a successful Pass E fold: the printed statement text and the
/// PC immediately after the words it consumed.
pub struct Folded {
    pub text: String,
    pub next_pc: usize,
}

/// Try the native-call-statement sugar (spec.md §4.3 Pass E rule 6): a run
/// of argument expressions, a `call`, and its trailing `leave` count.
pub fn try_native_call(
    data: &[u16],
    pc: usize,
    block_end: usize,
    pass_a: &PassA,
    text_keys: &[String],
) -> Option<Folded> {
    let call_pc = find_run_end(data, pc, block_end, pass_a);
    if call_pc >= block_end {
        return None;
    }
    let call_w = decode_word(data[call_pc]);
    if call_w.is_long || call_w.opcode != OP_CALL || call_w.flags != FLAGS_VALUE {
        return None;
    }
    let leave_pc = call_pc + 1;
    if leave_pc >= block_end {
        return None;
    }
    let leave_w = decode_word(data[leave_pc]);
    if leave_w.is_long || leave_w.opcode != OP_LEAVE || leave_w.flags != FLAGS_VALUE {
        return None;
    }

    let mut args = reconstruct_stack(data, pc, call_pc, pass_a)?;
    if args.len() != leave_w.arg as usize {
        return None;
    }
    let call_id = call_w.arg as u8;
    substitute_text_key(call_id, leave_w.arg as u8, &mut args, text_keys);

    Some(Folded {
        text: render_call(call_id, &args),
        next_pc: leave_pc + 1,
    })
}

/// Try `return <pure-expr>` (rule 1) and `return acc` (rule 4): a
/// side-effect-free expression run followed by the return epilogue
/// `instr_8(2,0) [instr_12(2,N)] instr_8(2,1)`.
pub fn try_return_pure(data: &[u16], pc: usize, block_end: usize, pass_a: &PassA) -> Option<Folded> {
    let begin_pc = find_run_end(data, pc, block_end, pass_a);
    if begin_pc >= block_end || begin_pc == pc {
        return None;
    }
    let begin_w = decode_word(data[begin_pc]);
    if begin_w.is_long || begin_w.opcode != OP_RETURN || begin_w.flags != FLAGS_VALUE || begin_w.arg != 0 {
        return None;
    }

    let stack = reconstruct_stack(data, pc, begin_pc, pass_a)?;
    if stack.len() != 1 {
        return None;
    }
    if matches!(stack[0], Expr::Acc) {
        return None;
    }

    let mut cursor = begin_pc + 1;
    let mut leave = None;
    if cursor < block_end {
        let w = decode_word(data[cursor]);
        if !w.is_long && w.opcode == OP_LEAVE && w.flags == FLAGS_VALUE {
            leave = Some(w.arg as u8);
            cursor += 1;
        }
    }
    if cursor >= block_end {
        return None;
    }
    let end_w = decode_word(data[cursor]);
    if end_w.is_long || end_w.opcode != OP_RETURN || end_w.flags != FLAGS_VALUE || end_w.arg != 1 {
        return None;
    }

    let expr_text = render_expr(&stack[0]);
    let text = match leave {
        Some(n) => format!("return {expr_text}, drop({n})"),
        None => format!("return {expr_text}"),
    };
    Some(Folded { text, next_pc: cursor + 1 })
}

/// Try `return acc` (rule 4): a bare return epilogue, optionally preceded
/// by a `leave N`.
pub fn try_return_acc(data: &[u16], pc: usize, block_end: usize) -> Option<Folded> {
    let mut cursor = pc;
    let mut leave = None;
    let w = decode_word(data[cursor]);
    if !w.is_long && w.opcode == OP_LEAVE && w.flags == FLAGS_VALUE {
        leave = Some(w.arg as u8);
        cursor += 1;
    }
    if cursor >= block_end {
        return None;
    }
    let end_w = decode_word(data[cursor]);
    if end_w.is_long || end_w.opcode != OP_RETURN || end_w.flags != FLAGS_VALUE || end_w.arg != 1 {
        return None;
    }
    let text = match leave {
        Some(n) => format!("return acc, drop({n})"),
        None => "return acc".to_string(),
    };
    Some(Folded { text, next_pc: cursor + 1 })
}

/// Try `return call_ID(args)` / `return speak(args)` / `return tell(args)`
/// (rule 3): a native-call statement immediately followed by the return
/// epilogue's end marker.
pub fn try_return_native_call(
    data: &[u16],
    pc: usize,
    block_end: usize,
    pass_a: &PassA,
    text_keys: &[String],
) -> Option<Folded> {
    let folded = try_native_call(data, pc, block_end, pass_a, text_keys)?;
    if folded.next_pc >= block_end {
        return None;
    }
    let end_w = decode_word(data[folded.next_pc]);
    if end_w.is_long || end_w.opcode != OP_RETURN || end_w.flags != FLAGS_VALUE || end_w.arg != 1 {
        return None;
    }
    Some(Folded {
        text: format!("return {}", folded.text),
        next_pc: folded.next_pc + 1,
    })
}

/// Try the scripted-function call statement (rule 5): a run of argument
/// expressions, the stackctl prologue `instr_2(2,1)`, a long-jump to the
/// callee, and an optional trailing `leave N` recording the argument count.
pub fn try_func_call(
    data: &[u16],
    pc: usize,
    block_end: usize,
    pass_a: &PassA,
    labels: &Labels,
) -> Option<Folded> {
    let prologue_pc = find_run_end(data, pc, block_end, pass_a);
    if prologue_pc >= block_end {
        return None;
    }
    let w = decode_word(data[prologue_pc]);
    if w.is_long || w.opcode != OP_ACC || w.flags != 1 || w.arg != 1 {
        return None;
    }
    let jump_pc = prologue_pc + 1;
    if jump_pc >= block_end {
        return None;
    }
    let jump = decode_word(data[jump_pc]);
    if !jump.is_long {
        return None;
    }
    let target = jump.long_target();
    let name = labels
        .pc_to_names
        .get(&target)
        .and_then(|names| names.iter().find(|n| n.starts_with("func_")))
        .cloned()
        .unwrap_or_else(|| format!("func_{target}"));

    let args = reconstruct_stack(data, pc, prologue_pc, pass_a)?;

    let mut cursor = jump_pc + 1;
    if cursor < block_end && !args.is_empty() {
        let leave_w = decode_word(data[cursor]);
        if !leave_w.is_long
            && leave_w.opcode == OP_LEAVE
            && leave_w.flags == FLAGS_VALUE
            && leave_w.arg as usize == args.len()
        {
            cursor += 1;
        }
    }

    let rendered: Vec<String> = args.iter().map(render_expr).collect();
    Some(Folded {
        text: format!("{name}({})", rendered.join(", ")),
        next_pc: cursor,
    })
}

/// Try `return func_E(args)` (rule 2): the scripted-call statement
/// immediately followed by the return epilogue's end marker.
pub fn try_return_func_call(
    data: &[u16],
    pc: usize,
    block_end: usize,
    pass_a: &PassA,
    labels: &Labels,
) -> Option<Folded> {
    let folded = try_func_call(data, pc, block_end, pass_a, labels)?;
    if folded.next_pc >= block_end {
        return None;
    }
    let end_w = decode_word(data[folded.next_pc]);
    if end_w.is_long || end_w.opcode != OP_RETURN || end_w.flags != FLAGS_VALUE || end_w.arg != 1 {
        return None;
    }
    Some(Folded {
        text: format!("return {}", folded.text),
        next_pc: folded.next_pc + 1,
    })
}
