use qpu_ir::{
    instr, AluOp, AssignCond, Imm, Instruction, Reg, RegOrImm, SmallImm, Special, Target,
};

use super::Lowerer;
use crate::ast::{BaseType, Expr, Op, OpKind, Var};

fn alu_op(op: Op) -> AluOp {
    let float = op.ty == BaseType::Float;
    match op.kind {
        OpKind::Add if float => AluOp::FAdd,
        OpKind::Add => AluOp::Add,
        OpKind::Sub if float => AluOp::FSub,
        OpKind::Sub => AluOp::Sub,
        OpKind::Mul if float => AluOp::FMul,
        OpKind::Mul => AluOp::Mul24,
        OpKind::Min if float => AluOp::FMin,
        OpKind::Min => AluOp::Min,
        OpKind::Max if float => AluOp::FMax,
        OpKind::Max => AluOp::Max,
        OpKind::Shl => AluOp::Shl,
        OpKind::Shr => AluOp::Asr,
        OpKind::UShr => AluOp::Shr,
        OpKind::Ror => AluOp::Ror,
        OpKind::BitAnd => AluOp::And,
        OpKind::BitOr => AluOp::Or,
        OpKind::BitXor => AluOp::Xor,
        OpKind::BitNot => AluOp::Not,
        OpKind::ItoF => AluOp::ItoF,
        OpKind::FtoI => AluOp::FtoI,
        OpKind::Clz => AluOp::Clz,
        OpKind::Rotate
        | OpKind::Recip
        | OpKind::RecipSqrt
        | OpKind::Exp
        | OpKind::Log => unreachable!("{:?} is not an ALU operation", op.kind),
    }
}

impl Lowerer {
    /// Evaluates `expr` into `dest`. Only the instruction that writes `dest` is predicated by
    /// `cond`, intermediate results are always computed.
    pub(super) fn expr_into(&mut self, dest: Reg, expr: &Expr, cond: AssignCond) {
        match expr {
            Expr::Apply(lhs, op, rhs) => self.apply_into(dest, lhs, *op, rhs, cond),
            Expr::Deref(addr) => {
                let addr = self.operand(addr);
                self.emit(instr::mov(Special::TmuAddr.into(), addr).with_comment("gather"));
                self.receive_into(dest, cond);
            }
            Expr::Int(_) | Expr::Float(_) | Expr::Var(_) => {
                let value = self.operand(expr);
                self.emit(instr::mov(dest, value).when(cond));
            }
        }
    }

    /// Returns the value of `expr` as operand: a small immediate, a variable, or a new variable
    /// holding the result.
    pub(super) fn operand(&mut self, expr: &Expr) -> RegOrImm {
        match expr {
            Expr::Int(i) => self.constant(Imm::Int(*i)),
            Expr::Float(x) => self.constant(Imm::Float(*x)),
            Expr::Var(var) => self.read_var(*var),
            Expr::Apply(..) | Expr::Deref(_) => {
                let var = self.fresh();
                self.expr_into(var, expr, AssignCond::Always);
                var.into()
            }
        }
    }

    /// Builds `dest = op(a, b)`. Two different immediates don't fit in one instruction, the
    /// first one is moved to a variable then.
    pub(super) fn alu(&mut self, dest: Reg, op: AluOp, a: RegOrImm, b: RegOrImm) -> Instruction {
        let a = match (a, b) {
            (RegOrImm::Imm(x), RegOrImm::Imm(y)) if x != y && !op.is_unary() => {
                self.in_reg(a).into()
            }
            _ => a,
        };
        instr::alu(dest, op, a, b)
    }

    /// Moves the next value of the TMU into `dest`.
    pub(super) fn receive_into(&mut self, dest: Reg, cond: AssignCond) {
        match self.target {
            Target::Vc4 => {
                self.emit(instr::tmu0_to_acc4());
                self.emit(instr::mov(dest, Reg::Acc(4)).when(cond));
            }
            Target::V3d if cond.is_always() => self.emit(instr::recv(dest)),
            Target::V3d => {
                let var = self.fresh();
                self.emit(instr::recv(var));
                self.emit(instr::mov(dest, var).when(cond));
            }
        }
    }

    fn read_var(&mut self, var: Var) -> RegOrImm {
        let special = match var {
            Var::Standard(id) => return self.kernel_var(id).into(),
            Var::QpuIndex => return self.qpu_index.into(),
            Var::NumQpus => return self.num_qpus.into(),
            Var::Uniform => Special::Uniform,
            Var::ElemNum => Special::ElemNum,
            Var::QpuNum => Special::QpuNum,
            Var::VpmRead => Special::VpmRead,
            Var::VpmWrite | Var::TmuAddr => {
                let diagnostic = self.here().build_read_of_write_only(&format!("{var:?}"));
                self.error(diagnostic);
                return SmallImm::Int(0).into();
            }
        };
        if !self.require(self.target.supports(special), &special.to_string()) {
            return SmallImm::Int(0).into();
        }
        // every read of a stream takes a value from it, so reads get an instruction of their own
        let var = self.fresh();
        self.emit(instr::mov(var, special));
        var.into()
    }

    fn apply_into(&mut self, dest: Reg, lhs: &Expr, op: Op, rhs: &Expr, cond: AssignCond) {
        match op.kind {
            OpKind::Recip | OpKind::RecipSqrt | OpKind::Exp | OpKind::Log => {
                self.sfu_into(dest, lhs, op.kind, cond)
            }
            OpKind::Rotate => self.rotate_into(dest, lhs, rhs, cond),
            kind if kind.is_unary() => {
                let a = self.operand(lhs);
                let instr = self.alu(dest, alu_op(op), a, a);
                self.emit(instr.when(cond));
            }
            _ => {
                let a = self.operand(lhs);
                let b = self.operand(rhs);
                let instr = self.alu(dest, alu_op(op), a, b);
                self.emit(instr.when(cond));
            }
        }
    }

    fn sfu_into(&mut self, dest: Reg, operand: &Expr, kind: OpKind, cond: AssignCond) {
        let sfu = match kind {
            OpKind::Recip => Special::SfuRecip,
            OpKind::RecipSqrt => Special::SfuRecipSqrt,
            OpKind::Exp => Special::SfuExp,
            OpKind::Log => Special::SfuLog,
            kind => unreachable!("{kind:?} is not an SFU operation"),
        };
        let value = self.operand(operand);
        self.emit(instr::mov(sfu.into(), value));
        // the result arrives in r4 two instructions later
        self.emit(instr::nop());
        self.emit(instr::nop());
        self.emit(instr::mov(dest, Reg::Acc(4)).when(cond));
    }

    fn rotate_into(&mut self, dest: Reg, vector: &Expr, amount: &Expr, cond: AssignCond) {
        let amount = match amount {
            Expr::Int(0) => return self.expr_into(dest, vector, cond),
            Expr::Int(n @ 1..=15) => Ok(SmallImm::rotate(*n as u8)),
            Expr::Int(n) => {
                let diagnostic = self.here().build_invalid_rotate(*n);
                return self.error(diagnostic);
            }
            amount => Err(self.operand(amount)),
        };
        let vector = self.operand(vector);

        let amount = match amount {
            Ok(amount) => amount,
            Err(dynamic) => {
                self.emit(instr::mov(Reg::Acc(5), dynamic).with_comment("rotate amount"));
                SmallImm::rotate(0)
            }
        };
        let scratch = Reg::Acc(Target::SCRATCH_ACC);
        self.emit(instr::mov(scratch, vector));
        // an accumulator can't be rotated right after it was written
        self.emit(instr::nop());
        self.emit(instr::rotate(dest, scratch, amount).when(cond));
    }
}
