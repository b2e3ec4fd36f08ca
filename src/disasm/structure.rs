//! Pass C: structural `if`/`if-else` recognition. See spec.md §4.3.

use std::collections::BTreeSet;

use super::labels::PassA;
use crate::instr::{FLAGS_TWO_WORD, OP_IFNOT};
use crate::word::decode_word;

/// One recognized `if`/`if-else` construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IfShape {
    pub marker_pc: usize,
    pub then_range: (usize, usize),
    pub else_range: Option<(usize, usize)>,
    /// PC of the join-jump word hidden by folding an `if-else`, if any.
    pub join_jump_pc: Option<usize>,
    /// PC one past the whole construct.
    pub end: usize,
}

/// Try to recognize an `if`/`if-else` construct starting at `pc`, bounded by
/// `range_end` (exclusive).
pub fn recognize(data: &[u16], pc: usize, range_end: usize, pass_a: &PassA) -> Option<IfShape> {
    if !pass_a.executed_pcs.contains(&pc) || pc + 1 >= data.len() {
        return None;
    }
    let marker = decode_word(data[pc]);
    if marker.is_long || marker.opcode != OP_IFNOT || marker.flags != FLAGS_TWO_WORD {
        return None;
    }
    let operand = decode_word(data[pc + 1]);
    if !operand.is_long {
        return None;
    }
    let else_target = operand.long_target();
    let then_start = pc + 2;
    if else_target <= then_start || else_target > range_end {
        return None;
    }

    if let Some(&last_pc) = pass_a.executed_pcs.range(then_start..else_target).next_back() {
        let last_word = decode_word(data[last_pc]);
        if last_word.is_long {
            let join_target = last_word.long_target();
            if join_target >= else_target && join_target <= range_end {
                return Some(IfShape {
                    marker_pc: pc,
                    then_range: (then_start, last_pc),
                    else_range: Some((else_target, join_target)),
                    join_jump_pc: Some(last_pc),
                    end: join_target,
                });
            }
        }
    }

    Some(IfShape {
        marker_pc: pc,
        then_range: (then_start, else_target),
        else_range: None,
        join_jump_pc: None,
        end: else_target,
    })
}

/// Recursively collect the PCs hidden by structural folding (the join-jump
/// word of every recognized `if-else`), so label emission can later treat
/// them as no-longer-referenced.
pub fn collect_hidden(data: &[u16], range: (usize, usize), pass_a: &PassA, hidden: &mut BTreeSet<usize>) {
    let mut pc = range.0;
    while pc < range.1 {
        if let Some(shape) = recognize(data, pc, range.1, pass_a) {
            if let Some(join_pc) = shape.join_jump_pc {
                hidden.insert(join_pc);
            }
            collect_hidden(data, shape.then_range, pass_a, hidden);
            if let Some(else_range) = shape.else_range {
                collect_hidden(data, else_range, pass_a, hidden);
            }
            pc = shape.end;
            continue;
        }
        pc += 1;
    }
}
