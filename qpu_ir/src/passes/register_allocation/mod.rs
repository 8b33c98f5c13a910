//! Register Allocation
//!
//! Variables are colored greedily in the order of their first usage, using an interference
//! graph derived from liveness. There is no spilling: a kernel that needs more registers than
//! the target has fails to compile.
//!
//! On vc4 each instruction can read only one register of each register file, so after renaming
//! every instruction that reads two registers of the same file gets one of them moved into the
//! scratch accumulator first.

#[cfg(test)]
mod test;

mod interference;
mod v3d;
mod vc4;

pub use interference::ConflictGraph;
pub use vc4::satisfy;

use log::{debug, trace};

use crate::{
    cfg::Cfg,
    dfa::{liveness::Liveness, reg_usage::RegUsage},
    InstrId, Instruction, Reg, Target, VarId,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    /// More variables are live at `instr` than there are registers. `var` is the one that
    /// became live last.
    TooManyLive {
        instr: InstrId,
        var: VarId,
        live: usize,
        capacity: usize,
    },
    /// All registers are taken by variables interfering with `var`.
    NoFreeRegister { var: VarId, first_usage: InstrId },
}

/// Assigns a register to every variable in `instrs` and replaces the variables by their
/// registers. The registers are also recorded in `usage`.
pub fn allocate(
    instrs: &mut Vec<Instruction>,
    target: Target,
    cfg: &Cfg,
    liveness: &Liveness,
    usage: &mut RegUsage,
) -> Result<(), Vec<AllocError>> {
    let graph = ConflictGraph::build(instrs, cfg, liveness, usage.len());

    let mut order: Vec<(InstrId, VarId)> = usage
        .iter()
        .filter(|(_, item)| item.reg.is_none())
        .filter_map(|(var, item)| Some((item.first_usage()?, var)))
        .collect();
    order.sort_unstable();
    let order: Vec<VarId> = order.into_iter().map(|(_, var)| var).collect();

    let assignment = match target {
        Target::V3d => v3d::assign(&graph, liveness, usage, &order, target.regfile_width())?,
        Target::Vc4 => vc4::assign(instrs, &graph, usage, &order, target.regfile_width())?,
    };

    for (var, reg) in assignment {
        trace!("v{var}: allocated {reg}");
        usage[var].reg = Some(reg);
    }

    rename(instrs, usage);
    debug!("allocated {} variables", order.len());

    if target == Target::Vc4 {
        let inserted = satisfy(instrs);
        debug!("inserted {inserted} moves to resolve read port conflicts");
    }

    Ok(())
}

/// Replaces every variable by its register. The mapping is total, so no variable can be
/// confused with a register it was renamed to.
fn rename(instrs: &mut [Instruction], usage: &RegUsage) {
    let to_reg = |reg: &mut Reg| {
        if let Reg::Var(var) = *reg {
            match usage.get(var).and_then(|item| item.reg) {
                Some(allocated) => *reg = allocated,
                None => panic!("v{var} has no register"),
            }
        }
    };
    for instr in instrs {
        instr.map_defs(to_reg);
        instr.map_uses(to_reg);
    }
}
