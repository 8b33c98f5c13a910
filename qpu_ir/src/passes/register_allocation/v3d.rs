use log::trace;

use super::{AllocError, ConflictGraph};
use crate::{
    dfa::{liveness::Liveness, reg_usage::RegUsage},
    Reg, VarId,
};

/// Assigns each variable the lowest numbered register not taken by an interfering variable.
pub(super) fn assign(
    graph: &ConflictGraph,
    liveness: &Liveness,
    usage: &RegUsage,
    order: &[VarId],
    width: u8,
) -> Result<Vec<(VarId, Reg)>, Vec<AllocError>> {
    check_feasible(liveness, usage, width)?;

    let all_regs: u64 = if width >= 64 {
        u64::MAX
    } else {
        (1 << width) - 1
    };
    let mut regs: Vec<Option<u8>> = vec![None; usage.len()];
    let mut errors = Vec::new();

    for &var in order {
        let mut possible = all_regs;
        for neighbour in graph.neighbours(var) {
            if let Some(Some(reg)) = regs.get(neighbour as usize) {
                possible &= !(1u64 << *reg);
            }
        }
        if possible == 0 {
            errors.push(AllocError::NoFreeRegister {
                var,
                first_usage: usage[var].first_usage().unwrap_or(0),
            });
            continue;
        }
        regs[var as usize] = Some(possible.trailing_zeros() as u8);
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(order
        .iter()
        .filter_map(|&var| Some((var, Reg::A(regs[var as usize]?))))
        .collect())
}

/// Fails on the first instruction at which more variables are live than there are registers.
fn check_feasible(liveness: &Liveness, usage: &RegUsage, width: u8) -> Result<(), Vec<AllocError>> {
    for i in 0..liveness.len() {
        let live = liveness.live_in(i);
        if live.len() <= width as usize {
            continue;
        }
        // Blame the variable that became live last.
        let var = live
            .iter()
            .max_by_key(|&var| usage.get(var).and_then(|item| item.first_usage()))
            .unwrap_or_default();
        trace!("{} variables live at {i}, only {width} registers", live.len());
        return Err(vec![AllocError::TooManyLive {
            instr: i,
            var,
            live: live.len(),
            capacity: width as usize,
        }]);
    }
    Ok(())
}
