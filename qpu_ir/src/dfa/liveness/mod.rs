//! Liveness Analysis
//!
//! Classic backward analysis at instruction granularity, iterated to a fixed point:
//!
//! ```text
//! live_out(i) = ∪ live_in(s) for every successor s of i
//! live_in(i)  = (live_out(i) - def(i)) ∪ use(i)
//! ```
//!
//! A predicated write leaves the elements for which its condition fails untouched, so it also
//! uses its destination. The exception is the first definition of a variable in program
//! order: there is no earlier value to keep.
//!
//! Only variables are tracked, physical registers are ignored.


use std::collections::HashMap;

use log::{debug, trace};
use vec1::Vec1;

use crate::{
    cfg::Cfg,
    dfa::{
        reg_usage::RegUsage,
        uda::{UseDef, VarUseDef},
        VarSet,
    },
    AssignCond, InstrId, Instruction, VarId,
};

/// How a predicated definition relates to the earlier definitions of its variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicatedDef {
    /// The first definition of the variable.
    Initial,
    /// An earlier definition has the same condition.
    SameCondition,
    /// An earlier definition is unconditional.
    AfterAlways,
    /// An earlier definition has the negated condition, as in `where`/`else`.
    Complementary,
    /// All earlier definitions test other flags.
    Mismatch,
}

/// Classifies every predicated definition of a variable, `None` for all other instructions.
pub fn classify_predicated_defs(instrs: &[Instruction]) -> Vec<Option<PredicatedDef>> {
    let mut earlier: HashMap<VarId, Vec<AssignCond>> = HashMap::new();

    instrs
        .iter()
        .enumerate()
        .map(|(i, instr)| {
            let var = instr.dest().and_then(|dest| dest.as_var())?;
            let cond = instr.cond();
            let conds = earlier.entry(var).or_default();

            let class = if !instr.is_predicated() {
                None
            } else if conds.is_empty() {
                Some(PredicatedDef::Initial)
            } else if conds.contains(&cond) {
                Some(PredicatedDef::SameCondition)
            } else if conds.contains(&AssignCond::Always) {
                Some(PredicatedDef::AfterAlways)
            } else if conds.contains(&cond.negate()) {
                Some(PredicatedDef::Complementary)
            } else {
                Some(PredicatedDef::Mismatch)
            };

            if let Some(class) = class {
                trace!("v{var}: predicated definition at {i} is {class:?}");
            }
            conds.push(cond);
            class
        })
        .collect()
}

/// The use/def sets of all instructions as seen by liveness: predicated definitions use their
/// destination, except for the first definition of a variable.
pub fn use_defs(instrs: &[Instruction]) -> Vec<VarUseDef> {
    let classes = classify_predicated_defs(instrs);
    instrs
        .iter()
        .zip(classes)
        .map(|(instr, class)| {
            let set_use_where = !matches!(class, Some(PredicatedDef::Initial));
            UseDef::vars_of(instr, set_use_where)
        })
        .collect()
}

/// The live-in sets of every instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Liveness {
    live_in: Vec<VarSet>,
    iterations: usize,
}

impl Liveness {
    pub fn compute(instrs: &[Instruction], cfg: &Cfg) -> Self {
        assert_eq!(instrs.len(), cfg.len(), "control flow graph is out of date");

        let use_defs = use_defs(instrs);
        let mut live_in = vec![VarSet::new(); instrs.len()];
        let mut iterations = 0;

        loop {
            iterations += 1;
            let mut changed = false;

            for i in (0..instrs.len()).rev() {
                let mut set = VarSet::new();
                for &succ in cfg.successors(i) {
                    set.union_with(&live_in[succ]);
                }
                if let Some(def) = use_defs[i].def {
                    set.remove(def);
                }
                for &var in &use_defs[i].uses {
                    set.insert(var);
                }

                if set != live_in[i] {
                    live_in[i] = set;
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }

        debug!(
            "liveness of {} instructions converged after {iterations} iterations",
            instrs.len()
        );

        Self {
            live_in,
            iterations,
        }
    }

    pub fn live_in(&self, instr: InstrId) -> &VarSet {
        &self.live_in[instr]
    }

    pub fn live_out(&self, instr: InstrId, cfg: &Cfg) -> VarSet {
        let mut set = VarSet::new();
        for &succ in cfg.successors(instr) {
            set.union_with(&self.live_in[succ]);
        }
        set
    }

    /// The number of passes over the instructions it took to reach the fixed point, including
    /// the final pass that changed nothing.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn len(&self) -> usize {
        self.live_in.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live_in.is_empty()
    }
}

impl std::fmt::Display for Liveness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, set) in self.live_in.iter().enumerate() {
            writeln!(f, "{i:>4}: {set}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyError {
    /// The variables are live before their first assignment, so they are read on a path on
    /// which they are never assigned.
    LiveBeforeAssign(Vec1<VarId>),
    /// Like `LiveBeforeAssign`, for variables whose first assignment is predicated.
    PredicatedLiveBeforeAssign(Vec1<VarId>),
    /// The variables are read, but never assigned at all.
    NeverAssigned(Vec1<VarId>),
}

/// Cross checks the live ranges against the definitions. Returns one error per kind of
/// problem, each listing all offending variables.
pub fn check_consistency(usage: &RegUsage) -> Vec<ConsistencyError> {
    let mut live_before = Vec::new();
    let mut predicated_live_before = Vec::new();
    let mut never_assigned = Vec::new();

    for (var, item) in usage.iter() {
        if item.never_assigned() {
            never_assigned.push(var);
            continue;
        }
        let (Some(first_def), Some(live_first)) = (item.first_def(), item.live.first()) else {
            continue;
        };
        if live_first < first_def {
            if item.is_predicated_first_def() {
                predicated_live_before.push(var);
            } else {
                live_before.push(var);
            }
        }
    }

    [
        Vec1::try_from_vec(live_before).map(ConsistencyError::LiveBeforeAssign),
        Vec1::try_from_vec(predicated_live_before)
            .map(ConsistencyError::PredicatedLiveBeforeAssign),
        Vec1::try_from_vec(never_assigned).map(ConsistencyError::NeverAssigned),
    ]
    .into_iter()
    .filter_map(Result::ok)
    .collect()
}
