use std::collections::HashMap;

use log::trace;

use super::{AllocError, ConflictGraph};
use crate::{
    dfa::reg_usage::RegUsage, instr, InstrKind, Instruction, Reg, RegOrImm, Special, Target,
    VarId,
};

/// Assigns registers of file A and B. Variables that are read together by an instruction
/// are preferably put in different files, so both can be read in the same cycle.
pub(super) fn assign(
    instrs: &[Instruction],
    graph: &ConflictGraph,
    usage: &RegUsage,
    order: &[VarId],
    width: u8,
) -> Result<Vec<(VarId, Reg)>, Vec<AllocError>> {
    let partners = co_occurrences(instrs);
    let all_regs: u32 = if width >= 32 {
        u32::MAX
    } else {
        (1 << width) - 1
    };
    let mut regs: Vec<Option<Reg>> = vec![None; usage.len()];
    let mut errors = Vec::new();

    for &var in order {
        let mut free_a = all_regs;
        let mut free_b = all_regs;
        for neighbour in graph.neighbours(var) {
            match regs.get(neighbour as usize) {
                Some(Some(Reg::A(n))) => free_a &= !(1u32 << *n),
                Some(Some(Reg::B(n))) => free_b &= !(1u32 << *n),
                _ => {}
            }
        }

        // Positive if the partners of `var` mostly ended up in file A.
        let score: i64 = partners
            .get(&var)
            .into_iter()
            .flatten()
            .map(|&(partner, count)| match regs[partner as usize] {
                Some(Reg::A(_)) => count as i64,
                Some(Reg::B(_)) => -(count as i64),
                _ => 0,
            })
            .sum();

        let files: [(fn(u8) -> Reg, u32); 2] = if score > 0 {
            [(Reg::B, free_b), (Reg::A, free_a)]
        } else {
            [(Reg::A, free_a), (Reg::B, free_b)]
        };
        let reg = files
            .into_iter()
            .find(|&(_, free)| free != 0)
            .map(|(file, free)| file(free.trailing_zeros() as u8));

        match reg {
            Some(reg) => {
                trace!("v{var}: file preference score {score}");
                regs[var as usize] = Some(reg);
            }
            None => errors.push(AllocError::NoFreeRegister {
                var,
                first_usage: usage[var].first_usage().unwrap_or(0),
            }),
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(order
        .iter()
        .filter_map(|&var| Some((var, regs[var as usize]?)))
        .collect())
}

/// For each variable, the variables it is read together with and how often.
fn co_occurrences(instrs: &[Instruction]) -> HashMap<VarId, Vec<(VarId, u32)>> {
    let mut counts: HashMap<(VarId, VarId), u32> = HashMap::new();
    for instr in instrs {
        let srcs = instr.srcs();
        if let [Reg::Var(a), Reg::Var(b)] = srcs.as_slice() {
            *counts.entry((*a.min(b), *a.max(b))).or_default() += 1;
        }
    }

    let mut partners: HashMap<VarId, Vec<(VarId, u32)>> = HashMap::new();
    for ((a, b), count) in counts {
        partners.entry(a).or_default().push((b, count));
        partners.entry(b).or_default().push((a, count));
    }
    partners
}

/// The register file read port an operand needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Port {
    A,
    B,
    /// Can be read through either port.
    Either,
    /// Doesn't need a port.
    None,
}

fn port_of(operand: RegOrImm) -> Port {
    match operand {
        // small immediates are encoded in the read address of file B
        RegOrImm::Imm(_) => Port::B,
        RegOrImm::Reg(reg) => match reg {
            Reg::A(_) => Port::A,
            Reg::B(_) => Port::B,
            Reg::Acc(_) => Port::None,
            Reg::Special(Special::ElemNum | Special::DmaLdWait) => Port::A,
            Reg::Special(Special::QpuNum | Special::DmaStWait) => Port::B,
            Reg::Special(Special::Uniform | Special::VpmRead) => Port::Either,
            Reg::Special(special) => panic!("{special} can not be read"),
            Reg::Var(var) => panic!("v{var} was not allocated"),
        },
    }
}

/// Inserts a move of one operand into `r0` before every instruction whose operands need the
/// same read port. Returns the number of moves inserted.
pub fn satisfy(instrs: &mut Vec<Instruction>) -> usize {
    let scratch = Reg::Acc(Target::SCRATCH_ACC);
    let mut inserted = 0;
    let mut result = Vec::with_capacity(instrs.len());

    for mut instruction in instrs.drain(..) {
        if let InstrKind::Alu(alu) = &mut instruction.kind {
            let conflict = alu.src_a != alu.src_b
                && !alu.op.is_unary()
                && matches!(
                    (port_of(alu.src_a), port_of(alu.src_b)),
                    (Port::A, Port::A) | (Port::B, Port::B)
                );
            if conflict {
                // an immediate has to stay where it is
                let operand = match alu.src_b {
                    RegOrImm::Imm(_) => &mut alu.src_a,
                    RegOrImm::Reg(_) => &mut alu.src_b,
                };
                result.push(
                    instr::mov(scratch, *operand).with_comment("resolve read port conflict"),
                );
                *operand = RegOrImm::Reg(scratch);
                inserted += 1;
            }
        }
        result.push(instruction);
    }

    *instrs = result;
    inserted
}
