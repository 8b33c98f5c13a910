//! Immediate combining
//!
//! Loading a 32 bit immediate takes a full instruction. When the same constant was already
//! loaded into a variable that is never overwritten, and that load is guaranteed to have run,
//! the later load is dropped and its variable replaced by the earlier one.

use std::collections::HashMap;

use log::trace;

use crate::{
    cfg::Cfg, dfa::reg_usage::RegUsage, InstrId, InstrKind, Instruction, Reg, SetCond, VarId,
};

/// Returns the number of loads removed. Removed loads are replaced by `Skip`.
pub fn combine_immediates(instrs: &mut [Instruction], cfg: &Cfg, usage: &RegUsage) -> usize {
    let mut loaded: HashMap<u32, Vec<(VarId, InstrId)>> = HashMap::new();
    let mut count = 0;

    for j in 0..instrs.len() {
        let InstrKind::LoadImm(li) = &instrs[j].kind else {
            continue;
        };
        let Reg::Var(var) = li.dest else {
            continue;
        };
        if !li.cond.is_always() || li.set_cond != SetCond::None {
            continue;
        }
        let Some(item) = usage.get(var) else {
            continue;
        };
        if item.defs.len() != 1 || item.uses.first().map_or(false, |first| first <= j) {
            continue;
        }

        let candidates = loaded.entry(li.imm.bits()).or_default();
        let earlier = candidates
            .iter()
            .find(|(_, i)| cfg.is_parent_block(cfg.block_of(*i), cfg.block_of(j)))
            .map(|(earlier, _)| *earlier);

        match earlier {
            Some(earlier) => {
                trace!("v{var}: same immediate as v{earlier}, load at {j} removed");
                for instr in &mut instrs[j + 1..] {
                    instr.rename_uses(Reg::Var(var), Reg::Var(earlier));
                }
                instrs[j].skip();
                count += 1;
            }
            None => candidates.push((var, j)),
        }
    }

    count
}
