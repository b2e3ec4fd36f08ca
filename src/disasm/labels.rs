//! Pass A (executed-PC discovery) and Pass B (label universe construction).
//! See spec.md §4.3.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::instr::{FLAGS_TWO_WORD, OP_ACC, OP_IFNOT, OP_PUSH};
use crate::program::Program;
use crate::word::decode_word;

/// Output of the sequential code-stream walk: which PCs actually hold an
/// instruction (as opposed to being the trailing operand word of a
/// two-word instruction), which PCs are `ifnot` operand words specifically,
/// and which PCs are named only indirectly through such an operand.
#[derive(Debug, Default)]
pub struct PassA {
    pub executed_pcs: BTreeSet<usize>,
    pub ifnot_operand_pcs: BTreeSet<usize>,
    pub embedded_jmp_targets: BTreeSet<usize>,
}

/// Walk the DATA word array once, classifying every PC as executed or as a
/// two-word operand. See spec.md §4.3 Pass A.
pub fn discover(data: &[u16]) -> PassA {
    let mut pass = PassA::default();
    let mut pc = 0usize;
    while pc < data.len() {
        pass.executed_pcs.insert(pc);
        let w = decode_word(data[pc]);
        if w.is_long {
            pc += 1;
            continue;
        }
        if w.opcode == OP_PUSH && w.flags == FLAGS_TWO_WORD {
            // push16: the next word is a raw 16-bit immediate, not executed.
            pc += 2;
            continue;
        }
        if w.opcode == OP_IFNOT && w.flags == FLAGS_TWO_WORD {
            let operand_pc = pc + 1;
            if operand_pc < data.len() {
                pass.ifnot_operand_pcs.insert(operand_pc);
                let operand = decode_word(data[operand_pc]);
                if operand.is_long {
                    pass.embedded_jmp_targets.insert(operand.long_target());
                }
            }
            pc += 2;
            continue;
        }
        pc += 1;
    }
    pass
}

/// The label universe: every name a PC is known by, and the inverse lookup.
#[derive(Debug, Default)]
pub struct Labels {
    pub pc_to_names: BTreeMap<usize, Vec<String>>,
    pub name_to_pc: HashMap<String, usize>,
}

impl Labels {
    fn add(&mut self, pc: usize, name: String) {
        self.name_to_pc.insert(name.clone(), pc);
        self.pc_to_names.entry(pc).or_default().push(name);
    }
}

/// Build the label universe per spec.md §4.3 Pass B: one `global_i` per
/// `order` entry, `label_N` for every jump target that needs one, and
/// `func_N` (taking precedence over any synthetic `label_N`) for scripted
/// function entry points.
pub fn build(program: &Program, pass_a: &PassA) -> Labels {
    let mut labels = Labels::default();
    let mut valid_targets: BTreeSet<usize> = pass_a.executed_pcs.clone();
    valid_targets.insert(program.data.len());

    for (i, &entry) in program.order.iter().enumerate() {
        labels.add(entry as usize, format!("global_{i}"));
    }

    for &pc in &pass_a.executed_pcs {
        let w = decode_word(program.data[pc]);
        if w.is_long {
            let target = w.long_target();
            if valid_targets.contains(&target) && !labels.pc_to_names.contains_key(&target) {
                labels.add(target, format!("label_{target}"));
            }
        }
    }

    for &target in &pass_a.embedded_jmp_targets {
        if valid_targets.contains(&target) && !labels.pc_to_names.contains_key(&target) {
            labels.add(target, format!("label_{target}"));
        }
    }

    for &pc in &pass_a.executed_pcs {
        let w = decode_word(program.data[pc]);
        if w.is_long || w.opcode != OP_ACC || w.flags != 1 || w.arg != 1 {
            continue;
        }
        let Some(&next_word) = program.data.get(pc + 1) else { continue };
        let next = decode_word(next_word);
        if !next.is_long {
            continue;
        }
        let target = next.long_target();
        let name = format!("func_{target}");
        if let Some(names) = labels.pc_to_names.get_mut(&target) {
            names.retain(|n| !n.starts_with("label_"));
            if !names.iter().any(|n| n == &name) {
                names.insert(0, name.clone());
            }
        } else {
            labels.pc_to_names.insert(target, vec![name.clone()]);
        }
        labels.name_to_pc.insert(name, target);
    }

    labels
}
