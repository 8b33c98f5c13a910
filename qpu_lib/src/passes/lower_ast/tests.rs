use std::fmt::Debug;

use qpu_ir::{
    instr, AluOp, AssignCond, BranchCond, Flag, Imm, InstrKind, Instruction, Reg, SetCond,
    SmallImm, Special, Target,
};

use super::{lower, Lowered};
use crate::{
    ast::*,
    diagnostic::{AggregateResult, Code},
};

/// Panics if the AggregateResult does *NOT* have a diagnostic with the specified code. The
/// AggregateResult can have diagnostics with other codes but has to have one with the specified
/// one to not panic
#[track_caller]
fn has_error<T>(res: AggregateResult<T>, code: Code) {
    let found = res.diagnostics().any(|d| d.1.code() == &code);
    if !found {
        let diagnostics: Vec<_> = res.into_diagnostics().collect();

        if diagnostics.is_empty() {
            eprintln!("No diagnostics given");
        } else {
            eprintln!(
                "diagnostics: {}",
                diagnostics
                    .into_iter()
                    .map(|d| format!("{:?}", d.1))
                    .collect::<Vec<_>>()
                    .join("\n")
            );
        }

        panic!("Didn't find diagnostic with code: {:?}", code);
    }
}

/// Panics if the AggregateResult does not have a value, or if the T's don't match, also prints
/// the diagnostics then
#[track_caller]
fn aggr_res_eq<T: PartialEq + Debug>(res: AggregateResult<T>, exp: T) {
    if res.value() != Some(&exp) {
        let diagnostics: Vec<_> = res.diagnostics().collect();

        if diagnostics.is_empty() {
            eprintln!("No diagnostics given");
        } else {
            eprintln!(
                "diagnostics: {}",
                diagnostics
                    .into_iter()
                    .map(|d| format!("{:?}", d.1))
                    .collect::<Vec<_>>()
                    .join("\n")
            );
        }

        assert_eq!(res.value(), Some(&exp))
    }
}

fn kinds(instrs: &[Instruction]) -> Vec<InstrKind> {
    instrs.iter().map(|i| i.kind.clone()).collect()
}

/// Lowers `stmt` and checks the code between the prologue and the epilogue.
#[track_caller]
fn check_body(stmt: Stmt, num_vars: VarId, target: Target, body: Vec<Instruction>) {
    let qpu_index = Reg::Var(num_vars);
    let num_qpus = Reg::Var(num_vars + 1);
    let mut expected = vec![
        instr::mov(qpu_index, Special::Uniform),
        instr::mov(num_qpus, Special::Uniform),
    ];
    expected.extend(body);
    if target == Target::Vc4 {
        expected.push(instr::mov(Special::HostInt.into(), SmallImm::Int(1)));
    }
    expected.push(instr::end());

    let res = lower(&stmt, num_vars, target).map(|lowered| kinds(&lowered.instrs));
    aggr_res_eq(res, kinds(&expected));
}

fn v(n: VarId) -> Reg {
    Reg::Var(n)
}

fn x() -> Expr {
    Expr::var(0)
}

fn int(i: i32) -> Expr {
    Expr::Int(i)
}

fn add(lhs: Expr, rhs: Expr) -> Expr {
    Expr::apply(lhs, Op::int(OpKind::Add), rhs)
}

fn eq(lhs: Expr, rhs: Expr) -> BExpr {
    BExpr::cmp(lhs, CmpKind::Eq, BaseType::Int, rhs)
}

#[test]
fn prologue_and_epilogue() {
    check_body(Stmt::Skip, 0, Target::Vc4, vec![]);
    check_body(Stmt::Skip, 0, Target::V3d, vec![]);
}

#[test]
fn num_vars() {
    let stmt = Stmt::assign(x(), add(int(3), int(4)));
    let res = lower(&stmt, 1, Target::Vc4);
    let lowered: Lowered = res.into_value().unwrap();
    // v1 and v2 for the QPU index and count, v3 holds the first immediate
    assert_eq!(lowered.num_vars, 4);
}

#[test]
fn assign_constants() {
    check_body(
        Stmt::assign(x(), int(3)),
        1,
        Target::Vc4,
        vec![instr::mov(v(0), SmallImm::Int(3))],
    );
    check_body(
        Stmt::assign(x(), int(1000)),
        1,
        Target::Vc4,
        vec![instr::li(v(3), Imm::Int(1000)), instr::mov(v(0), v(3))],
    );
    check_body(
        Stmt::assign(x(), Expr::Float(0.5)),
        1,
        Target::V3d,
        vec![instr::mov(v(0), SmallImm::Float(-1))],
    );
}

#[test]
fn arithmetic() {
    check_body(
        Stmt::assign(x(), add(x(), int(1))),
        1,
        Target::Vc4,
        vec![instr::add(v(0), v(0), SmallImm::Int(1))],
    );
    check_body(
        Stmt::assign(x(), add(int(3), int(4))),
        1,
        Target::Vc4,
        vec![
            instr::mov(v(3), SmallImm::Int(3)),
            instr::add(v(0), v(3), SmallImm::Int(4)),
        ],
    );
    check_body(
        Stmt::assign(
            x(),
            Expr::apply(add(x(), int(1)), Op::float(OpKind::Mul), Expr::var(1)),
        ),
        2,
        Target::Vc4,
        vec![
            instr::add(v(4), v(0), SmallImm::Int(1)),
            instr::alu(v(0), AluOp::FMul, v(4), v(1)),
        ],
    );
    check_body(
        Stmt::assign(x(), Expr::unary(Op::int(OpKind::ItoF), x())),
        1,
        Target::V3d,
        vec![instr::alu(v(0), AluOp::ItoF, v(0), v(0))],
    );
}

#[test]
fn special_reads() {
    check_body(
        Stmt::assign(x(), add(Var::Uniform.into(), Var::ElemNum.into())),
        1,
        Target::Vc4,
        vec![
            instr::mov(v(3), Special::Uniform),
            instr::mov(v(4), Special::ElemNum),
            instr::add(v(0), v(3), v(4)),
        ],
    );
    check_body(
        Stmt::assign(x(), Var::QpuIndex.into()),
        1,
        Target::V3d,
        vec![instr::mov(v(0), v(1))],
    );
}

#[test]
fn special_errors() {
    has_error(
        lower(&Stmt::assign(x(), Var::VpmWrite.into()), 1, Target::Vc4),
        Code::ReadOfWriteOnly,
    );
    has_error(
        lower(&Stmt::assign(x(), Var::VpmRead.into()), 1, Target::V3d),
        Code::UnsupportedOnTarget,
    );
    has_error(
        lower(&Stmt::assign(int(1), x()), 1, Target::Vc4),
        Code::InvalidAssignTarget,
    );
    has_error(
        lower(&Stmt::assign(Var::QpuNum, x()), 1, Target::Vc4),
        Code::InvalidAssignTarget,
    );
    has_error(
        lower(&Stmt::Receive(int(1)), 1, Target::V3d),
        Code::InvalidAssignTarget,
    );
}

#[test]
fn where_assign() {
    let stmt = Stmt::Where(
        BExpr::cmp(x(), CmpKind::Lt, BaseType::Int, int(0)),
        Box::new(Stmt::assign(x(), int(0))),
        Box::new(Stmt::Skip),
    );
    check_body(
        stmt,
        1,
        Target::Vc4,
        vec![
            instr::sub(v(3), v(0), SmallImm::Int(0)).set_flags(SetCond::N),
            instr::mov(v(0), SmallImm::Int(0)).when(AssignCond::Flag(Flag::NS)),
        ],
    );
}

#[test]
fn where_reuses_flags() {
    let stmt = Stmt::Where(
        eq(x(), int(0)),
        Box::new(Stmt::seq([
            Stmt::assign(x(), int(1)),
            Stmt::assign(Expr::var(1), int(1)),
        ])),
        Box::new(Stmt::assign(x(), int(2))),
    );
    let zs = AssignCond::Flag(Flag::ZS);
    check_body(
        stmt,
        2,
        Target::V3d,
        vec![
            instr::sub(v(4), v(0), SmallImm::Int(0)).set_flags(SetCond::Z),
            instr::mov(v(0), SmallImm::Int(1)).when(zs),
            instr::mov(v(1), SmallImm::Int(1)).when(zs),
            instr::mov(v(0), SmallImm::Int(2)).when(zs.negate()),
        ],
    );
}

#[test]
fn where_swapped_comparison() {
    // x > 1 is evaluated as 1 - x < 0
    let stmt = Stmt::Where(
        BExpr::cmp(x(), CmpKind::Gt, BaseType::Float, Expr::Float(1.0)),
        Box::new(Stmt::assign(x(), Expr::Float(1.0))),
        Box::new(Stmt::Skip),
    );
    check_body(
        stmt,
        1,
        Target::Vc4,
        vec![
            instr::alu(v(3), AluOp::FSub, SmallImm::Float(0), v(0)).set_flags(SetCond::N),
            instr::mov(v(0), SmallImm::Float(0)).when(AssignCond::Flag(Flag::NS)),
        ],
    );
}

#[test]
fn where_and() {
    let stmt = Stmt::Where(
        BExpr::and(eq(x(), int(0)), eq(x(), int(1))),
        Box::new(Stmt::assign(x(), int(2))),
        Box::new(Stmt::Skip),
    );
    let zs = AssignCond::Flag(Flag::ZS);
    check_body(
        stmt,
        1,
        Target::Vc4,
        vec![
            instr::sub(v(3), v(0), SmallImm::Int(0)).set_flags(SetCond::Z),
            instr::mov(v(4), SmallImm::Int(0)),
            instr::mov(v(4), SmallImm::Int(1)).when(zs),
            instr::sub(v(5), v(0), SmallImm::Int(1)).set_flags(SetCond::Z),
            instr::mov(v(6), SmallImm::Int(0)),
            instr::mov(v(6), SmallImm::Int(1)).when(zs),
            instr::and(v(7), v(4), v(6)).set_flags(SetCond::Z),
            instr::mov(v(0), SmallImm::Int(2)).when(AssignCond::Flag(Flag::ZC)),
        ],
    );
}

#[test]
fn nested_where() {
    let stmt = Stmt::Where(
        eq(x(), int(0)),
        Box::new(Stmt::Where(
            eq(Expr::var(1), int(0)),
            Box::new(Stmt::assign(x(), int(1))),
            Box::new(Stmt::Skip),
        )),
        Box::new(Stmt::assign(x(), int(2))),
    );
    let zs = AssignCond::Flag(Flag::ZS);
    let zc = AssignCond::Flag(Flag::ZC);
    // the outer condition is kept as a 0/1 mask, the else branch tests the mask again
    check_body(
        stmt,
        2,
        Target::Vc4,
        vec![
            instr::sub(v(4), v(0), SmallImm::Int(0)).set_flags(SetCond::Z),
            instr::mov(v(5), SmallImm::Int(0)),
            instr::mov(v(5), SmallImm::Int(1)).when(zs),
            instr::sub(v(6), v(1), SmallImm::Int(0)).set_flags(SetCond::Z),
            instr::mov(v(7), SmallImm::Int(0)),
            instr::mov(v(7), SmallImm::Int(1)).when(zs),
            instr::and(v(8), v(5), v(7)),
            instr::mov(v(9), v(8)).set_flags(SetCond::Z),
            instr::mov(v(0), SmallImm::Int(1)).when(zc),
            instr::mov(v(10), v(5)).set_flags(SetCond::Z),
            instr::mov(v(0), SmallImm::Int(2)).when(zs),
        ],
    );
}

#[test]
fn nested_where_sees_the_condition_from_before_the_body() {
    // where x == 0 { x = 1; where v1 == 0 { v2 = 3 }; v1 = 4 }
    let stmt = Stmt::Where(
        eq(x(), int(0)),
        Box::new(Stmt::seq([
            Stmt::assign(x(), int(1)),
            Stmt::Where(
                eq(Expr::var(1), int(0)),
                Box::new(Stmt::assign(Expr::var(2), int(3))),
                Box::new(Stmt::Skip),
            ),
            Stmt::assign(Expr::var(1), int(4)),
        ])),
        Box::new(Stmt::Skip),
    );
    let zs = AssignCond::Flag(Flag::ZS);
    let zc = AssignCond::Flag(Flag::ZC);
    check_body(
        stmt.clone(),
        3,
        Target::V3d,
        vec![
            instr::sub(v(5), v(0), SmallImm::Int(0)).set_flags(SetCond::Z),
            instr::mov(v(6), SmallImm::Int(0)),
            instr::mov(v(6), SmallImm::Int(1)).when(zs),
            instr::mov(v(0), SmallImm::Int(1)).when(zs),
            instr::sub(v(7), v(1), SmallImm::Int(0)).set_flags(SetCond::Z),
            instr::mov(v(8), SmallImm::Int(0)),
            instr::mov(v(8), SmallImm::Int(1)).when(zs),
            instr::and(v(9), v(6), v(8)),
            instr::mov(v(10), v(9)).set_flags(SetCond::Z),
            instr::mov(v(2), SmallImm::Int(3)).when(zc),
            instr::mov(v(11), v(6)).set_flags(SetCond::Z),
            instr::mov(v(1), SmallImm::Int(4)).when(zc),
        ],
    );

    let instrs = lower(&stmt, 3, Target::V3d).into_value().unwrap().instrs;
    let reads_of_x = instrs.iter().filter(|i| i.srcs().contains(&v(0))).count();
    assert_eq!(reads_of_x, 1);
}

#[test]
fn nested_where_else_uses_the_outer_mask() {
    let stmt = Stmt::Where(
        eq(x(), int(0)),
        Box::new(Stmt::Where(
            eq(Expr::var(1), int(0)),
            Box::new(Stmt::Skip),
            Box::new(Stmt::assign(x(), int(5))),
        )),
        Box::new(Stmt::Skip),
    );
    let zs = AssignCond::Flag(Flag::ZS);
    check_body(
        stmt,
        2,
        Target::V3d,
        vec![
            instr::sub(v(4), v(0), SmallImm::Int(0)).set_flags(SetCond::Z),
            instr::mov(v(5), SmallImm::Int(0)),
            instr::mov(v(5), SmallImm::Int(1)).when(zs),
            instr::sub(v(6), v(1), SmallImm::Int(0)).set_flags(SetCond::Z),
            instr::mov(v(7), SmallImm::Int(0)),
            instr::mov(v(7), SmallImm::Int(1)).when(zs),
            instr::and(v(8), v(5), v(7)),
            instr::sub(v(9), v(5), v(8)),
            instr::mov(v(10), v(9)).set_flags(SetCond::Z),
            instr::mov(v(0), SmallImm::Int(5)).when(AssignCond::Flag(Flag::ZC)),
        ],
    );
}

#[test]
fn invalid_where_body() {
    let stmt = Stmt::Where(
        eq(x(), int(0)),
        Box::new(Stmt::Gather(x())),
        Box::new(Stmt::Skip),
    );
    has_error(lower(&stmt, 1, Target::Vc4), Code::InvalidWhereBody);

    let stmt = Stmt::Where(
        eq(x(), int(0)),
        Box::new(Stmt::Skip),
        Box::new(Stmt::assign(Expr::deref(x()), int(1))),
    );
    has_error(lower(&stmt, 1, Target::V3d), Code::InvalidWhereBody);
}

#[test]
fn if_without_else() {
    let stmt = Stmt::If(
        CExpr::Any(eq(x(), int(0))),
        Box::new(Stmt::assign(x(), int(1))),
        Box::new(Stmt::Skip),
    );
    check_body(
        stmt,
        1,
        Target::Vc4,
        vec![
            instr::sub(v(3), v(0), SmallImm::Int(0)).set_flags(SetCond::Z),
            instr::branch(BranchCond::All(Flag::ZC), "L0".into()),
            instr::mov(v(0), SmallImm::Int(1)),
            instr::label("L0".into()),
        ],
    );
}

#[test]
fn if_else() {
    let stmt = Stmt::If(
        CExpr::All(eq(x(), int(0))),
        Box::new(Stmt::assign(x(), int(1))),
        Box::new(Stmt::assign(x(), int(2))),
    );
    check_body(
        stmt,
        1,
        Target::V3d,
        vec![
            instr::sub(v(3), v(0), SmallImm::Int(0)).set_flags(SetCond::Z),
            instr::branch(BranchCond::Any(Flag::ZC), "L1".into()),
            instr::mov(v(0), SmallImm::Int(1)),
            instr::jump("L0".into()),
            instr::label("L1".into()),
            instr::mov(v(0), SmallImm::Int(2)),
            instr::label("L0".into()),
        ],
    );
}

#[test]
fn for_loop() {
    let stmt = Stmt::For(
        CExpr::Any(BExpr::cmp(x(), CmpKind::Lt, BaseType::Int, int(10))),
        Box::new(Stmt::assign(x(), add(x(), int(1)))),
        Box::new(Stmt::assign(Expr::var(1), add(Expr::var(1), x()))),
    );
    check_body(
        stmt,
        2,
        Target::Vc4,
        vec![
            instr::label("L0".into()),
            instr::sub(v(4), v(0), SmallImm::Int(10)).set_flags(SetCond::N),
            instr::branch(BranchCond::All(Flag::NC), "L1".into()),
            instr::add(v(1), v(1), v(0)),
            instr::add(v(0), v(0), SmallImm::Int(1)),
            instr::jump("L0".into()),
            instr::label("L1".into()),
        ],
    );
}

#[test]
fn rotate() {
    let rotate = |amount| Stmt::assign(x(), Expr::apply(x(), Op::int(OpKind::Rotate), amount));
    check_body(
        rotate(int(3)),
        1,
        Target::Vc4,
        vec![
            instr::mov(Reg::Acc(0), v(0)),
            instr::nop(),
            instr::rotate(v(0), Reg::Acc(0), SmallImm::rotate(3)),
        ],
    );
    check_body(
        rotate(Expr::var(1)),
        2,
        Target::V3d,
        vec![
            instr::mov(Reg::Acc(5), v(1)),
            instr::mov(Reg::Acc(0), v(0)),
            instr::nop(),
            instr::rotate(v(0), Reg::Acc(0), SmallImm::rotate(0)),
        ],
    );
    check_body(rotate(int(0)), 1, Target::Vc4, vec![instr::mov(v(0), v(0))]);
    has_error(lower(&rotate(int(16)), 1, Target::Vc4), Code::InvalidRotate);
}

#[test]
fn sfu() {
    check_body(
        Stmt::assign(x(), Expr::unary(Op::float(OpKind::Recip), x())),
        1,
        Target::Vc4,
        vec![
            instr::mov(Special::SfuRecip.into(), v(0)),
            instr::nop(),
            instr::nop(),
            instr::mov(v(0), Reg::Acc(4)),
        ],
    );
}

#[test]
fn deref() {
    let stmt = Stmt::assign(x(), Expr::deref(x()));
    check_body(
        stmt.clone(),
        1,
        Target::Vc4,
        vec![
            instr::mov(Special::TmuAddr.into(), v(0)),
            instr::tmu0_to_acc4(),
            instr::mov(v(0), Reg::Acc(4)),
        ],
    );
    check_body(
        stmt,
        1,
        Target::V3d,
        vec![instr::mov(Special::TmuAddr.into(), v(0)), instr::recv(v(0))],
    );
}

#[test]
fn predicated_receive_v3d() {
    let stmt = Stmt::Where(
        eq(x(), int(0)),
        Box::new(Stmt::assign(x(), Expr::deref(x()))),
        Box::new(Stmt::Skip),
    );
    check_body(
        stmt,
        1,
        Target::V3d,
        vec![
            instr::sub(v(3), v(0), SmallImm::Int(0)).set_flags(SetCond::Z),
            instr::mov(Special::TmuAddr.into(), v(0)),
            instr::recv(v(4)),
            instr::mov(v(0), v(4)).when(AssignCond::Flag(Flag::ZS)),
        ],
    );
}

#[test]
fn store() {
    let stmt = Stmt::Store(Expr::var(0), Expr::var(1));
    check_body(
        stmt.clone(),
        2,
        Target::V3d,
        vec![
            instr::mov(Special::TmuData.into(), v(0)),
            instr::mov(Special::TmuAddr.into(), v(1)),
        ],
    );
    check_body(
        stmt,
        2,
        Target::Vc4,
        vec![
            instr::li(v(4), Imm::Int(0x1a00)),
            instr::or(v(5), v(2), v(4)),
            instr::mov(Special::WrSetup.into(), v(5)),
            instr::mov(Special::VpmWrite.into(), v(0)),
            instr::shl(v(6), v(2), SmallImm::Int(7)),
            instr::li(v(7), Imm::Int(0x8090_4000u32 as i32)),
            instr::or(v(8), v(6), v(7)),
            instr::mov(Special::WrSetup.into(), v(8)),
            instr::mov(Special::DmaStAddr.into(), v(1)),
            instr::mov(Reg::Acc(0), Special::DmaStWait),
        ],
    );
}

#[test]
fn vpm_and_dma() {
    let stmt = Stmt::seq([
        Stmt::VpmSetupRead {
            num: 1,
            stride: 1,
            horizontal: true,
            addr: int(0),
        },
        Stmt::DmaStartRead(x()),
        Stmt::DmaReadWait,
    ]);
    check_body(
        stmt.clone(),
        1,
        Target::Vc4,
        vec![
            instr::li(v(3), Imm::Int(0x0010_1a00)),
            instr::or(v(4), SmallImm::Int(0), v(3)),
            instr::mov(Special::RdSetup.into(), v(4)),
            instr::mov(Special::DmaLdAddr.into(), v(0)),
            instr::mov(Reg::Acc(0), Special::DmaLdWait),
        ],
    );
    has_error(lower(&stmt, 1, Target::V3d), Code::UnsupportedOnTarget);
}

#[test]
fn semaphores() {
    check_body(
        Stmt::seq([Stmt::SemaInc(3), Stmt::SemaDec(3)]),
        0,
        Target::Vc4,
        vec![instr::sema_inc(3), instr::sema_dec(3)],
    );
    has_error(
        lower(&Stmt::SemaInc(16), 0, Target::Vc4),
        Code::InvalidSemaphore,
    );
    has_error(
        lower(&Stmt::SemaDec(0), 0, Target::V3d),
        Code::UnsupportedOnTarget,
    );
    has_error(lower(&Stmt::SendIrq, 0, Target::V3d), Code::UnsupportedOnTarget);
}

#[test]
fn errors_are_collected() {
    let stmt = Stmt::seq([Stmt::SemaInc(0), Stmt::SendIrq, Stmt::assign(x(), int(1))]);
    let res = lower(&stmt, 1, Target::V3d);
    assert!(res.is_err());
    assert_eq!(res.diagnostics().count(), 2);
}

#[test]
#[should_panic(expected = "out of range")]
fn kernel_var_out_of_range() {
    let _ = lower(&Stmt::assign(Expr::var(1), int(0)), 1, Target::Vc4);
}
