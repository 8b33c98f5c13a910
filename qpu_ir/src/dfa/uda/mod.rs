//! Use-Def Analyzer
//!
//! Extracts the registers an instruction reads and writes. Only explicit operands are
//! reported; the flags and the implicit writes of the hardware (e.g. SFU results in `r4`) are
//! not registers in this sense.

#[cfg(test)]
mod test;

use arrayvec::ArrayVec;

use crate::{InstrKind, Instruction, Reg, VarId};

/// The registers read and written by a single instruction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UseDef {
    pub uses: ArrayVec<Reg, 3>,
    pub def: Option<Reg>,
}

/// Like [`UseDef`], restricted to variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VarUseDef {
    pub uses: ArrayVec<VarId, 3>,
    pub def: Option<VarId>,
}

impl UseDef {
    /// Computes the uses and definition of `instr`.
    ///
    /// With `set_use_where`, the destination of a predicated instruction is also reported as a
    /// use: the elements for which the condition fails keep their old value, so the old value
    /// has to be live.
    pub fn of(instr: &Instruction, set_use_where: bool) -> Self {
        let mut use_def = UseDef {
            uses: instr.srcs().into_iter().collect(),
            def: None,
        };

        use_def.def = match &instr.kind {
            InstrKind::Alu(_) | InstrKind::LoadImm(_) | InstrKind::Recv { .. } => instr.dest(),
            InstrKind::Nop
            | InstrKind::Branch(_)
            | InstrKind::Label(_)
            | InstrKind::SemaInc(_)
            | InstrKind::SemaDec(_)
            | InstrKind::Tmu0ToAcc4
            | InstrKind::End
            | InstrKind::Skip => None,
        };

        if set_use_where && instr.is_predicated() {
            if let Some(def) = use_def.def {
                if !use_def.uses.contains(&def) {
                    use_def.uses.push(def);
                }
            }
        }

        use_def
    }

    /// Computes the variables used and defined by `instr`, see [`UseDef::of`].
    pub fn vars_of(instr: &Instruction, set_use_where: bool) -> VarUseDef {
        let use_def = Self::of(instr, set_use_where);
        VarUseDef {
            uses: use_def.uses.iter().filter_map(Reg::as_var).collect(),
            def: use_def.def.and_then(|def| def.as_var()),
        }
    }
}
