//! Target level optimizations
//!
//! Both passes replace variables: immediate combining by an earlier variable holding the same
//! constant, the peephole passes by accumulators. Every variable that ends up in an accumulator
//! is one less variable competing for the register files.


pub mod combine;
pub mod peephole;

use log::debug;

use crate::{
    cfg::Cfg,
    dfa::{liveness::Liveness, reg_usage::RegUsage},
    CompileData, Instruction, Target,
};

/// Removes all `Skip` instructions, returns how many were removed.
pub fn compact(instrs: &mut Vec<Instruction>) -> usize {
    let before = instrs.len();
    instrs.retain(|instr| !instr.is_skip());
    before - instrs.len()
}

/// Runs rounds of immediate combining and accumulator substitution until a round changes
/// nothing. The analyses are rebuilt after every rewrite, as rewrites shift the instruction
/// indices.
pub fn optimize(
    instrs: &mut Vec<Instruction>,
    target: Target,
    max_range: usize,
    data: &mut CompileData,
) {
    let mut round = 0;
    loop {
        round += 1;

        let cfg = Cfg::build(instrs);
        let liveness = Liveness::compute(instrs, &cfg);
        let usage = RegUsage::new(instrs, &liveness);
        let combined = combine::combine_immediates(instrs, &cfg, &usage);
        compact(instrs);

        let cfg = Cfg::build(instrs);
        let liveness = Liveness::compute(instrs, &cfg);
        let mut usage = RegUsage::new(instrs, &liveness);
        let mut accs = peephole::AccState::scan(instrs);

        let substituted =
            peephole::peephole_0(instrs, target, &mut usage, &mut accs, max_range)
                + peephole::peephole_1(instrs, target, &cfg, &liveness, &usage, &mut accs)
                + peephole::peephole_2(instrs, target, &mut usage, &mut accs);
        let removed = compact(instrs);

        data.num_instrs_combined += combined;
        data.num_accs_introduced += substituted;
        debug!(
            "optimizer round {round}: {combined} immediates combined, \
             {substituted} accumulators introduced, {removed} instructions removed"
        );

        if combined == 0 && substituted == 0 {
            break;
        }
    }
}
