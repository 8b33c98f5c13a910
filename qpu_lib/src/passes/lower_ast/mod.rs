//! Lowering of the kernel tree to target instructions over variables.
//!
//! The lowered code starts by loading the QPU index and the QPU count from the uniform stream
//! and ends with `end` (preceded by a host interrupt on vc4).

use log::debug;
use qpu_ir::{
    instr, Imm, Instruction, LabelGenerator, Reg, RegOrImm, SmallImm, Special, Target,
    VarGenerator, VarId,
};

use crate::{
    ast::Stmt,
    diagnostic::{AggregateResult, Diagnostic, DiagnosticBuilder},
};

mod cond;
mod expr;
mod stmt;

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, PartialEq)]
pub struct Lowered {
    pub instrs: Vec<Instruction>,
    /// The number of variables used by the instructions, kernel variables included.
    pub num_vars: VarId,
}

/// Lowers `stmt`, whose variables are `v0` up to `v{num_vars - 1}`.
///
/// Statements the target can't execute are reported, the rest of the kernel is still lowered so
/// all problems are found at once.
///
/// # Panics
///
/// Panics if the kernel uses a variable with an id of at least `num_vars`.
pub fn lower(stmt: &Stmt, num_vars: VarId, target: Target) -> AggregateResult<Lowered> {
    let (lowered, res) = lower_partial(stmt, num_vars, target);
    res.map(|()| lowered)
}

/// Like [`lower`], but also returns the code when lowering failed. The diagnostics point into
/// that code.
pub fn lower_partial(
    stmt: &Stmt,
    num_vars: VarId,
    target: Target,
) -> (Lowered, AggregateResult<()>) {
    let mut lowerer = Lowerer::new(num_vars, target);
    lowerer.prologue();
    lowerer.stmt(stmt);
    lowerer.epilogue();
    debug!(
        "lowered kernel to {} instructions over {} variables",
        lowerer.instrs.len(),
        lowerer.vars.num_vars()
    );
    lowerer.finish()
}

/// The code lowered so far, with everything needed to extend it.
struct Lowerer {
    target: Target,
    instrs: Vec<Instruction>,
    vars: VarGenerator,
    labels: LabelGenerator,
    num_kernel_vars: VarId,
    qpu_index: Reg,
    num_qpus: Reg,
    res: AggregateResult<()>,
}

impl Lowerer {
    fn new(num_vars: VarId, target: Target) -> Self {
        let mut vars = VarGenerator::new(num_vars);
        let qpu_index = vars.next_var();
        let num_qpus = vars.next_var();
        Self {
            target,
            instrs: Vec::new(),
            vars,
            labels: LabelGenerator::new(),
            num_kernel_vars: num_vars,
            qpu_index,
            num_qpus,
            res: AggregateResult::new_ok(()),
        }
    }

    fn prologue(&mut self) {
        self.emit(instr::mov(self.qpu_index, Special::Uniform).with_comment("QPU index"));
        self.emit(instr::mov(self.num_qpus, Special::Uniform).with_comment("number of QPUs"));
    }

    fn epilogue(&mut self) {
        if self.target.supports(Special::HostInt) {
            self.emit(
                instr::mov(Special::HostInt.into(), SmallImm::Int(1))
                    .with_comment("signal the host"),
            );
        }
        self.emit(instr::end());
    }

    fn finish(self) -> (Lowered, AggregateResult<()>) {
        let lowered = Lowered {
            instrs: self.instrs,
            num_vars: self.vars.num_vars(),
        };
        (lowered, self.res)
    }

    fn emit(&mut self, instr: Instruction) {
        self.instrs.push(instr);
    }

    fn fresh(&mut self) -> Reg {
        self.vars.next_var()
    }

    /// A diagnostic builder pointing at the next instruction.
    fn here(&self) -> DiagnosticBuilder {
        DiagnosticBuilder::new(self.instrs.len())
    }

    fn error(&mut self, diagnostic: Diagnostic) {
        self.res.add_err(diagnostic);
    }

    /// Reports `what` if the target does not support it. Returns whether it is supported.
    fn require(&mut self, supported: bool, what: &str) -> bool {
        if !supported {
            let diagnostic = self.here().build_unsupported_on_target(what, self.target);
            self.error(diagnostic);
        }
        supported
    }

    fn kernel_var(&self, id: VarId) -> Reg {
        assert!(
            id < self.num_kernel_vars,
            "kernel variable v{id} out of range, the kernel has {} variables",
            self.num_kernel_vars
        );
        Reg::Var(id)
    }

    /// Returns the constant as small immediate, or loads it into a new variable.
    fn constant(&mut self, imm: Imm) -> RegOrImm {
        match imm.to_small() {
            Some(small) => small.into(),
            None => {
                let var = self.fresh();
                self.emit(instr::li(var, imm));
                var.into()
            }
        }
    }

    /// Copies the operand into a new variable if it is an immediate.
    fn in_reg(&mut self, operand: RegOrImm) -> Reg {
        match operand {
            RegOrImm::Reg(reg) => reg,
            RegOrImm::Imm(_) => {
                let var = self.fresh();
                self.emit(instr::mov(var, operand));
                var
            }
        }
    }
}
