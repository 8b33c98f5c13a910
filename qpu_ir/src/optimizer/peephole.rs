//! Accumulator promotion
//!
//! Short lived variables are moved into the accumulators. An accumulator can be read in the
//! instruction right after it is written and doesn't take a register file slot.
//!
//! A variable only qualifies if its whole life fits in a straight-line window of instructions
//! that starts with an unconditional definition, and the accumulator is not otherwise in use
//! anywhere in that window.

use log::trace;

use crate::{
    cfg::Cfg,
    dfa::{
        liveness::Liveness,
        reg_usage::{RegUsage, RegUsageItem},
        uda::UseDef,
    },
    InstrId, Instruction, Reg, Target, VarId,
};

const NUM_ACCS: usize = 6;

/// Tracks which accumulators are in use where.
#[derive(Debug, Clone, Default)]
pub struct AccState {
    /// Instructions explicitly naming an accumulator.
    refs: [Vec<InstrId>; NUM_ACCS],
    /// From a write of an accumulator up to the last read of that value. Predicated writes
    /// extend the interval they write into.
    intervals: [Vec<(InstrId, InstrId)>; NUM_ACCS],
}

impl AccState {
    pub fn scan(instrs: &[Instruction]) -> Self {
        let mut state = Self::default();
        let mut open: [Option<(InstrId, Option<InstrId>)>; NUM_ACCS] = Default::default();

        for (i, instr) in instrs.iter().enumerate() {
            for src in instr.srcs() {
                if let Reg::Acc(acc) = src {
                    let acc = acc as usize;
                    state.add_ref(acc, i);
                    if let Some((_, last_read)) = &mut open[acc] {
                        *last_read = Some(i);
                    }
                }
            }
            if let Some(Reg::Acc(acc)) = instr.dest() {
                let acc = acc as usize;
                state.add_ref(acc, i);
                if !instr.cond().is_always() {
                    // lanes that aren't written keep the previous value
                    match &mut open[acc] {
                        Some((_, last_read)) => *last_read = Some(i),
                        None => open[acc] = Some((i, Some(i))),
                    }
                    continue;
                }
                if let Some((write, Some(last_read))) = open[acc].take() {
                    state.intervals[acc].push((write, last_read));
                }
                open[acc] = Some((i, None));
            }
        }

        for (acc, open) in open.into_iter().enumerate() {
            if let Some((write, Some(last_read))) = open {
                state.intervals[acc].push((write, last_read));
            }
        }

        state
    }

    fn add_ref(&mut self, acc: usize, instr: InstrId) {
        if self.refs[acc].last() != Some(&instr) {
            self.refs[acc].push(instr);
        }
    }

    /// Returns `true` if the accumulator is neither named nor holding a value anywhere in
    /// `first..=last`.
    pub fn is_free(&self, acc: u8, first: InstrId, last: InstrId) -> bool {
        let acc = acc as usize;
        !self.refs[acc].iter().any(|&r| first <= r && r <= last)
            && !self.intervals[acc]
                .iter()
                .any(|&(write, read)| write <= last && read >= first)
    }

    fn occupy(&mut self, acc: u8, first: InstrId, last: InstrId) {
        let acc = acc as usize;
        self.refs[acc].push(first);
        self.refs[acc].push(last);
        self.intervals[acc].push((first, last));
    }

    /// Picks the first accumulator of the target's pool that is free over the window.
    pub fn pick(&self, target: Target, first: InstrId, last: InstrId) -> Option<u8> {
        target
            .substitution_accs()
            .iter()
            .copied()
            .find(|&acc| self.is_free(acc, first, last))
    }
}

/// Returns `true` if control can only enter the window at `first` and only leave it at `last`.
fn is_straight_line(instrs: &[Instruction], first: InstrId, last: InstrId) -> bool {
    instrs[first..last].iter().all(|instr| !instr.is_branch())
        && instrs[first + 1..=last]
            .iter()
            .all(|instr| instr.label().is_none())
}

/// The window a variable can be moved into an accumulator over, if it qualifies.
fn window(instrs: &[Instruction], item: &RegUsageItem) -> Option<(InstrId, InstrId)> {
    if item.reg.is_some() {
        return None;
    }
    let first = item.first_def()?;
    let last = item.last_usage()?;
    if item.uses.first()? <= first {
        return None;
    }
    if instrs[first].is_predicated()
        || item.defs.iter().any(|&def| instrs[def].is_uniform_load())
    {
        return None;
    }
    if let (Some(live_first), Some(live_last)) = (item.live.first(), item.live.last()) {
        if live_first <= first || live_last > last {
            return None;
        }
    }
    is_straight_line(instrs, first, last).then_some((first, last))
}

/// Replaces `var` by the accumulator in `first..=last`. Moves that become moves of the
/// accumulator into itself are removed.
fn substitute(instrs: &mut [Instruction], var: VarId, acc: u8, first: InstrId, last: InstrId) {
    for instr in &mut instrs[first..=last] {
        instr.rename_dest(Reg::Var(var), Reg::Acc(acc));
        instr.rename_uses(Reg::Var(var), Reg::Acc(acc));
        if instr.is_self_move() {
            instr.skip();
        }
    }
}

/// Moves every variable whose usage spans at most `max_range` instructions into an
/// accumulator. Shorter ranges are handled first.
pub fn peephole_0(
    instrs: &mut [Instruction],
    target: Target,
    usage: &mut RegUsage,
    accs: &mut AccState,
    max_range: usize,
) -> usize {
    let mut count = 0;
    for range in 1..=max_range {
        for (var, item) in usage.iter_mut() {
            if item.use_range() != range {
                continue;
            }
            let Some((first, last)) = window(instrs, item) else {
                continue;
            };
            let Some(acc) = accs.pick(target, first, last) else {
                trace!("v{var}: no accumulator free in {first}..={last}");
                continue;
            };
            trace!("v{var}: replaced by r{acc} in {first}..={last}");
            substitute(instrs, var, acc, first, last);
            accs.occupy(acc, first, last);
            item.reg = Some(Reg::Acc(acc));
            count += 1;
        }
    }
    count
}

/// Moves a value that is produced by an unconditional instruction and consumed for the last
/// time by the next one into an accumulator. Other definitions of the variable are untouched.
pub fn peephole_1(
    instrs: &mut [Instruction],
    target: Target,
    cfg: &Cfg,
    liveness: &Liveness,
    usage: &RegUsage,
    accs: &mut AccState,
) -> usize {
    let mut count = 0;
    for i in 1..instrs.len() {
        let prev = &instrs[i - 1];
        let Some(Reg::Var(var)) = prev.dest() else {
            continue;
        };
        if prev.is_predicated() || prev.is_uniform_load() {
            continue;
        }
        if usage.get(var).map_or(false, |item| item.reg.is_some()) {
            continue;
        }
        let instr = &instrs[i];
        if !UseDef::vars_of(instr, false).uses.contains(&var)
            || instr.dest() == Some(Reg::Var(var))
            || liveness.live_out(i, cfg).contains(var)
        {
            continue;
        }
        let Some(acc) = accs.pick(target, i - 1, i) else {
            continue;
        };

        trace!("v{var}: replaced by r{acc} in {}..={i}", i - 1);
        instrs[i - 1].rename_dest(Reg::Var(var), Reg::Acc(acc));
        instrs[i].rename_uses(Reg::Var(var), Reg::Acc(acc));
        for instr in &mut instrs[i - 1..=i] {
            if instr.is_self_move() {
                instr.skip();
            }
        }
        accs.occupy(acc, i - 1, i);
        count += 1;
    }
    count
}

/// Moves variables that are written but never read into an accumulator. These are typically
/// the results of instructions that are only there to set the flags.
pub fn peephole_2(
    instrs: &mut [Instruction],
    target: Target,
    usage: &mut RegUsage,
    accs: &mut AccState,
) -> usize {
    let mut count = 0;
    for (var, item) in usage.iter_mut() {
        if !item.only_assigned() || item.reg.is_some() {
            continue;
        }
        if item.defs.iter().any(|&def| instrs[def].is_uniform_load()) {
            continue;
        }
        let picks: Option<Vec<u8>> = item
            .defs
            .iter()
            .map(|&def| accs.pick(target, def, def))
            .collect();
        let Some(picks) = picks else {
            continue;
        };

        for (&def, &acc) in item.defs.iter().zip(&picks) {
            instrs[def].rename_dest(Reg::Var(var), Reg::Acc(acc));
            accs.occupy(acc, def, def);
        }
        trace!("v{var}: write only, replaced by accumulators {picks:?}");
        if let Some(&acc) = picks.first() {
            item.reg = Some(Reg::Acc(acc));
        }
        count += 1;
    }
    count
}
