//! Turns an allocated instruction list into one that maps one-to-one onto machine
//! instructions.


use std::collections::HashMap;

use log::debug;

use crate::{
    instr, AluOp, BranchTarget, InstrKind, Instruction, Label, LoadImm, SmallImm, Target,
};

/// The number of instructions executed after a branch, before the branch takes effect.
pub const BRANCH_DELAY_SLOTS: usize = 3;

/// Prepares `instrs` for encoding:
///
///  - removes `Skip` instructions
///  - expands 32 bit immediates on targets that can't load them directly
///  - fills the delay slots after each branch with `nop`s
///  - resolves branches to labels into relative branches and removes the labels
///  - makes sure the program ends with `End`
pub fn finalize(instrs: Vec<Instruction>, target: Target) -> Vec<Instruction> {
    let mut instrs: Vec<Instruction> = instrs.into_iter().filter(|i| !i.is_skip()).collect();

    if target == Target::V3d {
        instrs = instrs.into_iter().flat_map(expand_load_imm).collect();
    }

    if !matches!(instrs.last(), Some(Instruction { kind: InstrKind::End, .. })) {
        instrs.push(instr::end());
    }

    let mut with_slots = Vec::with_capacity(instrs.len());
    for instr in instrs {
        let is_branch = instr.is_branch();
        with_slots.push(instr);
        if is_branch {
            with_slots.extend((0..BRANCH_DELAY_SLOTS).map(|_| instr::nop()));
        }
    }

    let resolved = resolve_labels(with_slots);
    debug!("finalized to {} instructions", resolved.len());
    resolved
}

fn resolve_labels(instrs: Vec<Instruction>) -> Vec<Instruction> {
    // Position of each label in the list without labels.
    let mut labels: HashMap<Label, usize> = HashMap::new();
    let mut pos = 0;
    for instr in &instrs {
        match instr.label() {
            Some(label) => {
                labels.insert(label.clone(), pos);
            }
            None => pos += 1,
        }
    }

    let mut result = Vec::with_capacity(pos);
    for mut instr in instrs.into_iter().filter(|i| i.label().is_none()) {
        let index = result.len() as i32;
        if let InstrKind::Branch(branch) = &mut instr.kind {
            if let BranchTarget::Label(label) = &branch.target {
                let target = match labels.get(label) {
                    Some(target) => *target as i32,
                    None => panic!("branch to label {label} which is never placed"),
                };
                branch.target =
                    BranchTarget::Relative(target - (index + 1 + BRANCH_DELAY_SLOTS as i32));
            }
        }
        result.push(instr);
    }
    result
}

/// v3d has no load immediate instruction. Values that are not small immediates are built
/// from 4 bit chunks, shifting the partial value left before adding the next chunk.
fn expand_load_imm(instr: Instruction) -> Vec<Instruction> {
    let InstrKind::LoadImm(LoadImm {
        cond,
        set_cond,
        dest,
        imm,
    }) = instr.kind
    else {
        return vec![instr];
    };

    if let Some(small) = imm.to_small() {
        let mut mov = instr::mov(dest, small).when(cond).set_flags(set_cond);
        mov.comment = instr.comment;
        return vec![mov];
    }

    let bits = imm.bits();
    let chunks: Vec<u32> = (0..8)
        .rev()
        .map(|i| (bits >> (i * 4)) & 0xf)
        .skip_while(|&chunk| chunk == 0)
        .collect();

    let mut expanded = Vec::with_capacity(chunks.len() * 2);
    for (i, &chunk) in chunks.iter().enumerate() {
        let chunk = SmallImm::Int(chunk as i8);
        if i == 0 {
            expanded.push(instr::mov(dest, chunk).when(cond));
        } else {
            expanded.push(instr::shl(dest, dest, SmallImm::Int(4)).when(cond));
            if chunk != SmallImm::Int(0) {
                expanded.push(instr::alu(dest, AluOp::Or, dest, chunk).when(cond));
            }
        }
    }

    if let Some(last) = expanded.pop() {
        expanded.push(last.set_flags(set_cond));
    }
    if let (Some(first), Some(comment)) = (expanded.first_mut(), instr.comment) {
        first.comment = Some(comment);
    }
    expanded
}
