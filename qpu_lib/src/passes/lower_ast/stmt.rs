use qpu_ir::{instr, AluOp, AssignCond, Flag, Imm, Reg, SetCond, SmallImm, Special, Target};

use super::Lowerer;
use crate::ast::{BExpr, CExpr, Expr, Stmt, Var};

/// Write setup for a horizontal 32 bit VPM row, or'ed with the row.
const VPM_STORE_SETUP: i32 = 0x1a00;
/// DMA store of a single row of 16 words, or'ed with the VPM row shifted left by 7.
const DMA_STORE_SETUP: u32 = 0x8000_0000 | 1 << 23 | 16 << 16 | 1 << 14;

/// The elements a `where` body applies to.
#[derive(Debug, Clone, Copy)]
enum Mask {
    /// The elements where the flag holds. Only valid while nothing else sets the flags.
    Flags(Flag),
    /// The elements for which testing `var` for zero gives `active`.
    Var { var: Reg, active: Flag },
}

fn has_nested_where(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Where(_, then, otherwise) => !is_skip(then) || !is_skip(otherwise),
        Stmt::Seq(stmts) => stmts.iter().any(has_nested_where),
        _ => false,
    }
}

fn is_skip(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Skip => true,
        Stmt::Seq(stmts) => stmts.iter().all(is_skip),
        _ => false,
    }
}

impl Lowerer {
    pub(super) fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Skip => {}
            Stmt::Assign(lhs, rhs) => self.assign(lhs, rhs, AssignCond::Always),
            Stmt::Seq(stmts) => {
                for stmt in stmts {
                    self.stmt(stmt);
                }
            }
            Stmt::Where(cond, then, otherwise) => self.where_top(cond, then, otherwise),
            Stmt::If(cond, then, otherwise) => self.if_stmt(cond, then, otherwise),
            Stmt::While(cond, body) => self.loop_stmt(cond, body, None),
            Stmt::For(cond, inc, body) => self.loop_stmt(cond, body, Some(inc)),
            Stmt::Gather(addr) => {
                let addr = self.operand(addr);
                self.emit(instr::mov(Special::TmuAddr.into(), addr).with_comment("gather"));
            }
            Stmt::Receive(Expr::Var(Var::Standard(id))) => {
                let dest = self.kernel_var(*id);
                self.receive_into(dest, AssignCond::Always);
            }
            Stmt::Receive(target) => {
                let diagnostic = self.here().build_invalid_assign_target(&describe(target));
                self.error(diagnostic);
            }
            Stmt::Store(value, addr) => self.store(value, addr),
            Stmt::SemaInc(id) | Stmt::SemaDec(id) => {
                if !self.require(self.target.has_semaphores(), "semaphores") {
                    return;
                }
                if *id >= 16 {
                    let diagnostic = self.here().build_invalid_semaphore(*id);
                    return self.error(diagnostic);
                }
                match stmt {
                    Stmt::SemaInc(_) => self.emit(instr::sema_inc(*id)),
                    _ => self.emit(instr::sema_dec(*id)),
                }
            }
            Stmt::SendIrq => {
                if self.require(self.target.supports(Special::HostInt), "host interrupts") {
                    self.emit(instr::mov(Special::HostInt.into(), SmallImm::Int(1)));
                }
            }
            Stmt::VpmSetupRead {
                num,
                stride,
                horizontal,
                addr,
            } => {
                let bits = (*num as u32 & 0xf) << 20
                    | (*stride as u32 & 0x3f) << 12
                    | (*horizontal as u32) << 11
                    | 2 << 8;
                self.setup(Special::RdSetup, bits, addr, 0);
            }
            Stmt::VpmSetupWrite {
                stride,
                horizontal,
                addr,
            } => {
                let bits = (*stride as u32 & 0x3f) << 12 | (*horizontal as u32) << 11 | 2 << 8;
                self.setup(Special::WrSetup, bits, addr, 0);
            }
            Stmt::DmaSetupRead {
                rows,
                row_len,
                vpm_row,
            } => {
                let bits = 0x8000_0000
                    | (*row_len as u32 & 0xf) << 20
                    | (*rows as u32 & 0xf) << 16
                    | 1 << 12;
                self.setup(Special::RdSetup, bits, vpm_row, 4);
            }
            Stmt::DmaSetupWrite {
                rows,
                row_len,
                vpm_row,
            } => {
                let bits = 0x8000_0000
                    | (*rows as u32 & 0x7f) << 23
                    | (*row_len as u32 & 0x7f) << 16
                    | 1 << 14;
                self.setup(Special::WrSetup, bits, vpm_row, 7);
            }
            Stmt::DmaStartRead(addr) => self.write_special(Special::DmaLdAddr, addr),
            Stmt::DmaStartWrite(addr) => self.write_special(Special::DmaStAddr, addr),
            Stmt::DmaReadWait => self.wait(Special::DmaLdWait),
            Stmt::DmaWriteWait => self.wait(Special::DmaStWait),
            Stmt::End => self.emit(instr::end()),
        }
    }

    fn assign(&mut self, lhs: &Expr, rhs: &Expr, cond: AssignCond) {
        match lhs {
            Expr::Var(Var::Standard(id)) => {
                let dest = self.kernel_var(*id);
                self.expr_into(dest, rhs, cond);
            }
            Expr::Var(var @ (Var::VpmWrite | Var::TmuAddr)) => {
                let special = match var {
                    Var::VpmWrite => Special::VpmWrite,
                    _ => Special::TmuAddr,
                };
                if !self.require(self.target.supports(special), &special.to_string()) {
                    return;
                }
                let value = self.operand(rhs);
                self.emit(instr::mov(special.into(), value).when(cond));
            }
            Expr::Deref(addr) if cond.is_always() => self.store(rhs, addr),
            Expr::Deref(_) => {
                let diagnostic = self.here().build_invalid_where_body("store");
                self.error(diagnostic);
            }
            _ => {
                let diagnostic = self.here().build_invalid_assign_target(&describe(lhs));
                self.error(diagnostic);
            }
        }
    }

    fn where_top(&mut self, cond: &BExpr, then: &Stmt, otherwise: &Stmt) {
        if is_skip(then) && is_skip(otherwise) {
            return;
        }
        if !has_nested_where(then) && !has_nested_where(otherwise) {
            // nothing in the bodies sets the flags, they hold the condition throughout
            let flag = self.flags(cond);
            self.where_stmt(Mask::Flags(flag), then, &mut None);
            self.where_stmt(Mask::Flags(flag.negate()), otherwise, &mut None);
            return;
        }

        // The bodies may assign to the variables of the condition, so it is evaluated once.
        let (var, flag) = self.mask_of(cond);
        let mut cached = Some(flag);
        self.where_stmt(Mask::Var { var, active: Flag::ZC }, then, &mut cached);
        let mut negated = cached.map(Flag::negate);
        self.where_stmt(Mask::Var { var, active: Flag::ZS }, otherwise, &mut negated);
    }

    /// Lowers the body of a `where` that applies to the elements in `mask`. `flag` caches the
    /// flag that currently selects those elements, it is cleared when the flags are
    /// overwritten.
    fn where_stmt(&mut self, mask: Mask, body: &Stmt, flag: &mut Option<Flag>) {
        match body {
            Stmt::Skip => {}
            Stmt::Assign(lhs, rhs) => {
                let current = self.select(mask, flag);
                self.assign(lhs, rhs, AssignCond::Flag(current));
            }
            Stmt::Seq(stmts) => {
                for stmt in stmts {
                    self.where_stmt(mask, stmt, flag);
                }
            }
            Stmt::Where(_, then, otherwise) if is_skip(then) && is_skip(otherwise) => {}
            Stmt::Where(inner, then, otherwise) => {
                let outer = self.mask_value(mask);
                let (cond, _) = self.mask_of(inner);
                let then_mask = self.fresh();
                self.emit(instr::and(then_mask, outer, cond));
                let active = Flag::ZC;
                if is_skip(otherwise) {
                    self.where_stmt(Mask::Var { var: then_mask, active }, then, &mut None);
                } else {
                    // outer and not inner, with both 0 or 1
                    let else_mask = self.fresh();
                    self.emit(instr::sub(else_mask, outer, then_mask));
                    self.where_stmt(Mask::Var { var: then_mask, active }, then, &mut None);
                    self.where_stmt(Mask::Var { var: else_mask, active }, otherwise, &mut None);
                }
                *flag = None;
            }
            other => {
                let diagnostic = self.here().build_invalid_where_body(other.name());
                self.error(diagnostic);
            }
        }
    }

    /// Sets the flags to select the elements in `mask` if they don't already, and returns
    /// the selecting flag.
    fn select(&mut self, mask: Mask, flag: &mut Option<Flag>) -> Flag {
        if let Some(current) = *flag {
            return current;
        }
        let current = match mask {
            Mask::Flags(current) => current,
            Mask::Var { var, active } => {
                let dead = self.fresh();
                self.emit(instr::mov(dead, var).set_flags(SetCond::Z));
                active
            }
        };
        *flag = Some(current);
        current
    }

    /// The elements in `mask` as a vector of 0 and 1.
    fn mask_value(&mut self, mask: Mask) -> Reg {
        match mask {
            Mask::Var {
                var,
                active: Flag::ZC,
            } => var,
            Mask::Var { var, .. } => {
                let value = self.fresh();
                let instr = self.alu(value, AluOp::Sub, SmallImm::Int(1).into(), var.into());
                self.emit(instr);
                value
            }
            Mask::Flags(flag) => {
                let value = self.fresh();
                self.emit(instr::mov(value, SmallImm::Int(0)));
                self.emit(instr::mov(value, SmallImm::Int(1)).when(AssignCond::Flag(flag)));
                value
            }
        }
    }

    fn if_stmt(&mut self, cond: &CExpr, then: &Stmt, otherwise: &Stmt) {
        let end = self.labels.next_label();
        if is_skip(otherwise) {
            self.branch_unless(cond, end.clone());
            self.stmt(then);
        } else {
            let else_label = self.labels.next_label();
            self.branch_unless(cond, else_label.clone());
            self.stmt(then);
            self.emit(instr::jump(end.clone()));
            self.emit(instr::label(else_label));
            self.stmt(otherwise);
        }
        self.emit(instr::label(end));
    }

    fn loop_stmt(&mut self, cond: &CExpr, body: &Stmt, inc: Option<&Stmt>) {
        let top = self.labels.next_label();
        let end = self.labels.next_label();
        self.emit(instr::label(top.clone()));
        self.branch_unless(cond, end.clone());
        self.stmt(body);
        if let Some(inc) = inc {
            self.stmt(inc);
        }
        self.emit(instr::jump(top));
        self.emit(instr::label(end));
    }

    /// Stores `value` at `addr` in every element.
    ///
    /// On vc4 the value goes through the VPM row of this QPU and is written out by DMA, v3d
    /// writes through the TMU.
    fn store(&mut self, value: &Expr, addr: &Expr) {
        let value = self.operand(value);
        let addr = self.operand(addr);
        match self.target {
            Target::Vc4 => {
                let setup = self.constant(Imm::Int(VPM_STORE_SETUP));
                let word = self.fresh();
                self.emit(instr::or(word, self.qpu_index, setup));
                self.emit(instr::mov(Special::WrSetup.into(), word).with_comment("VPM setup"));
                self.emit(instr::mov(Special::VpmWrite.into(), value));

                let row = self.fresh();
                self.emit(instr::shl(row, self.qpu_index, SmallImm::Int(7)));
                let setup = self.constant(Imm::Int(DMA_STORE_SETUP as i32));
                let word = self.fresh();
                self.emit(instr::or(word, row, setup));
                self.emit(instr::mov(Special::WrSetup.into(), word).with_comment("DMA setup"));
                self.emit(instr::mov(Special::DmaStAddr.into(), addr));
                self.wait(Special::DmaStWait);
            }
            Target::V3d => {
                self.emit(instr::mov(Special::TmuData.into(), value));
                self.emit(instr::mov(Special::TmuAddr.into(), addr).with_comment("store"));
            }
        }
    }

    /// Writes `bits | (dynamic << shift)` to a VPM or DMA setup register.
    fn setup(&mut self, port: Special, bits: u32, dynamic: &Expr, shift: i8) {
        if !self.require(self.target.supports(port), &port.to_string()) {
            return;
        }
        let mut dynamic = self.operand(dynamic);
        if shift > 0 {
            let shifted = self.fresh();
            let shl = self.alu(shifted, AluOp::Shl, dynamic, SmallImm::Int(shift).into());
            self.emit(shl);
            dynamic = shifted.into();
        }
        let bits = self.constant(Imm::Int(bits as i32));
        let word = self.fresh();
        let or = self.alu(word, AluOp::Or, dynamic, bits);
        self.emit(or);
        self.emit(instr::mov(port.into(), word));
    }

    fn write_special(&mut self, special: Special, value: &Expr) {
        if !self.require(self.target.supports(special), &special.to_string()) {
            return;
        }
        let value = self.operand(value);
        self.emit(instr::mov(special.into(), value));
    }

    /// Blocks until the DMA transfer behind `special` is done.
    fn wait(&mut self, special: Special) {
        if self.require(self.target.supports(special), &special.to_string()) {
            self.emit(instr::mov(Reg::Acc(Target::SCRATCH_ACC), special).with_comment("wait"));
        }
    }
}

fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Int(_) | Expr::Float(_) => "a constant".to_owned(),
        Expr::Var(var) => format!("{var:?}"),
        Expr::Apply(..) => "an expression".to_owned(),
        Expr::Deref(_) => "a dereference".to_owned(),
    }
}
