//! Register usage
//!
//! Per variable summary of where it is defined, used and live. All queries are derived from
//! these numbers; the table is rebuilt whenever the instruction list changes.

#[cfg(test)]
mod test;

use crate::{
    dfa::{liveness::Liveness, uda::UseDef},
    InstrId, Instruction, Reg, VarId,
};

/// The first and last of a number of instruction indices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageRange {
    range: Option<(InstrId, InstrId)>,
    count: usize,
}

impl UsageRange {
    /// Records an instruction. Instructions have to be added in ascending order.
    pub fn add(&mut self, instr: InstrId) {
        match &mut self.range {
            Some((_, last)) => *last = instr,
            None => self.range = Some((instr, instr)),
        }
        self.count += 1;
    }

    pub fn first(&self) -> Option<InstrId> {
        self.range.map(|(first, _)| first)
    }

    pub fn last(&self) -> Option<InstrId> {
        self.range.map(|(_, last)| last)
    }

    /// The number of instructions recorded.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegUsageItem {
    /// All instructions that write the variable, in order.
    pub defs: Vec<InstrId>,
    /// The instructions that read the variable.
    pub uses: UsageRange,
    /// The instructions at which the variable is live-in.
    pub live: UsageRange,
    /// The register assigned to the variable by the optimizer or the allocator.
    pub reg: Option<Reg>,
    predicated_first_def: bool,
}

impl RegUsageItem {
    /// Neither defined nor used.
    pub fn unused(&self) -> bool {
        self.defs.is_empty() && self.uses.is_empty()
    }

    /// Defined, but never read.
    pub fn only_assigned(&self) -> bool {
        !self.defs.is_empty() && self.uses.is_empty()
    }

    /// Read, but never defined.
    pub fn never_assigned(&self) -> bool {
        self.defs.is_empty() && !self.uses.is_empty()
    }

    /// Both defined and read.
    pub fn regular_use(&self) -> bool {
        !self.defs.is_empty() && !self.uses.is_empty()
    }

    pub fn first_def(&self) -> Option<InstrId> {
        self.defs.first().copied()
    }

    /// Returns `true` if the first write of the variable is predicated.
    pub fn is_predicated_first_def(&self) -> bool {
        self.predicated_first_def
    }

    /// The first instruction that reads or writes the variable.
    pub fn first_usage(&self) -> Option<InstrId> {
        match (self.first_def(), self.uses.first()) {
            (Some(def), Some(used)) => Some(def.min(used)),
            (def, used) => def.or(used),
        }
    }

    /// The last instruction that reads or writes the variable.
    pub fn last_usage(&self) -> Option<InstrId> {
        match (self.defs.last().copied(), self.uses.last()) {
            (Some(def), Some(used)) => Some(def.max(used)),
            (def, used) => def.or(used),
        }
    }

    /// The distance between the first and the last usage, 0 if the variable is unused.
    pub fn use_range(&self) -> usize {
        match (self.first_usage(), self.last_usage()) {
            (Some(first), Some(last)) => last - first,
            _ => 0,
        }
    }

    /// The distance between the first and the last instruction at which the variable is live.
    pub fn live_range(&self) -> usize {
        match (self.live.first(), self.live.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0,
        }
    }
}

/// The usage of every variable, indexed by variable id.
#[derive(Debug, Clone, Default)]
pub struct RegUsage {
    items: Vec<RegUsageItem>,
}

impl RegUsage {
    pub fn new(instrs: &[Instruction], liveness: &Liveness) -> Self {
        assert_eq!(instrs.len(), liveness.len(), "liveness is out of date");

        let mut usage = Self::default();

        for (i, instr) in instrs.iter().enumerate() {
            let use_def = UseDef::vars_of(instr, false);
            for var in use_def.uses {
                usage.item_mut(var).uses.add(i);
            }
            if let Some(var) = use_def.def {
                let item = usage.item_mut(var);
                if item.defs.is_empty() {
                    item.predicated_first_def = instr.is_predicated();
                }
                item.defs.push(i);
            }
        }

        for i in 0..liveness.len() {
            for var in liveness.live_in(i).iter() {
                usage.item_mut(var).live.add(i);
            }
        }

        usage
    }

    fn item_mut(&mut self, var: VarId) -> &mut RegUsageItem {
        let index = var as usize;
        if index >= self.items.len() {
            self.items.resize_with(index + 1, Default::default);
        }
        &mut self.items[index]
    }

    /// The number of variable ids covered, i.e. one more than the highest id seen.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, var: VarId) -> Option<&RegUsageItem> {
        self.items.get(var as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = (VarId, &RegUsageItem)> {
        self.items
            .iter()
            .enumerate()
            .map(|(var, item)| (var as VarId, item))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (VarId, &mut RegUsageItem)> {
        self.items
            .iter_mut()
            .enumerate()
            .map(|(var, item)| (var as VarId, item))
    }
}

impl std::ops::Index<VarId> for RegUsage {
    type Output = RegUsageItem;

    fn index(&self, index: VarId) -> &Self::Output {
        &self.items[index as usize]
    }
}

impl std::ops::IndexMut<VarId> for RegUsage {
    fn index_mut(&mut self, index: VarId) -> &mut Self::Output {
        &mut self.items[index as usize]
    }
}

fn fmt_opt(f: &mut std::fmt::Formatter<'_>, value: Option<InstrId>) -> std::fmt::Result {
    match value {
        Some(value) => write!(f, "{value:>6}"),
        None => write!(f, "{:>6}", "-"),
    }
}

impl std::fmt::Display for RegUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "   var   defs  first   last  lfrst  llast    reg")?;
        for (var, item) in self.iter().filter(|(_, item)| !item.unused()) {
            write!(f, "{:>6} {:>6}", format!("v{var}"), item.defs.len())?;
            fmt_opt(f, item.first_usage())?;
            write!(f, " ")?;
            fmt_opt(f, item.last_usage())?;
            write!(f, " ")?;
            fmt_opt(f, item.live.first())?;
            write!(f, " ")?;
            fmt_opt(f, item.live.last())?;
            match item.reg {
                Some(reg) => writeln!(f, " {:>6}", reg.to_string())?,
                None => writeln!(f, " {:>6}", "-")?,
            }
        }
        Ok(())
    }
}
