use qpu_ir::{instr, AluOp, AssignCond, BranchCond, Flag, Label, Reg, SetCond, SmallImm};

use super::Lowerer;
use crate::ast::{BExpr, BaseType, CExpr, CmpKind, CmpOp, Expr};

impl Lowerer {
    /// Sets the flags according to `cond` and returns the flag that holds for the elements
    /// where `cond` is true.
    pub(super) fn flags(&mut self, cond: &BExpr) -> Flag {
        match cond {
            BExpr::Not(inner) => self.flags(inner).negate(),
            BExpr::Cmp(lhs, op, rhs) => self.compare(lhs, *op, rhs),
            BExpr::And(lhs, rhs) => self.combine(AluOp::And, lhs, rhs),
            BExpr::Or(lhs, rhs) => self.combine(AluOp::Or, lhs, rhs),
        }
    }

    /// Branches to `target` unless `cond` holds.
    pub(super) fn branch_unless(&mut self, cond: &CExpr, target: Label) {
        let cond = match cond {
            CExpr::Any(cond) => BranchCond::Any(self.flags(cond)),
            CExpr::All(cond) => BranchCond::All(self.flags(cond)),
        };
        self.emit(instr::branch(cond.negate(), target));
    }

    fn compare(&mut self, lhs: &Expr, op: CmpOp, rhs: &Expr) -> Flag {
        // a comparison is a subtraction whose result only sets the flags
        let (lhs, rhs, flag) = match op.kind {
            CmpKind::Eq => (lhs, rhs, Flag::ZS),
            CmpKind::Neq => (lhs, rhs, Flag::ZC),
            CmpKind::Lt => (lhs, rhs, Flag::NS),
            CmpKind::Ge => (lhs, rhs, Flag::NC),
            CmpKind::Gt => (rhs, lhs, Flag::NS),
            CmpKind::Le => (rhs, lhs, Flag::NC),
        };
        let (sub, set_cond) = match (op.ty, flag) {
            (BaseType::Int, Flag::ZS | Flag::ZC) => (AluOp::Sub, SetCond::Z),
            (BaseType::Int, _) => (AluOp::Sub, SetCond::N),
            (BaseType::Float, Flag::ZS | Flag::ZC) => (AluOp::FSub, SetCond::Z),
            (BaseType::Float, _) => (AluOp::FSub, SetCond::N),
        };
        let a = self.operand(lhs);
        let b = self.operand(rhs);
        let dead = self.fresh();
        let instr = self.alu(dead, sub, a, b);
        self.emit(instr.set_flags(set_cond));
        flag
    }

    fn combine(&mut self, op: AluOp, lhs: &BExpr, rhs: &BExpr) -> Flag {
        let a = self.bool_value(lhs);
        let b = self.bool_value(rhs);
        let dead = self.fresh();
        self.emit(instr::alu(dead, op, a, b).set_flags(SetCond::Z));
        Flag::ZC
    }

    /// Materializes `cond` as a vector of 0 and 1.
    fn bool_value(&mut self, cond: &BExpr) -> Reg {
        self.mask_of(cond).0
    }

    /// Materializes `cond` as a vector of 0 and 1. The flags are left set, the returned flag
    /// holds where `cond` does.
    pub(super) fn mask_of(&mut self, cond: &BExpr) -> (Reg, Flag) {
        let flag = self.flags(cond);
        let var = self.fresh();
        self.emit(instr::mov(var, SmallImm::Int(0)));
        self.emit(instr::mov(var, SmallImm::Int(1)).when(AssignCond::Flag(flag)));
        (var, flag)
    }
}
