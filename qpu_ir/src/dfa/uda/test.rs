use super::*;
use crate::{instr, AluOp, AssignCond, Flag, Imm, SmallImm, Special};

#[test]
fn alu_reads_both_operands_and_writes_dest() {
    let instr = instr::add(Reg::Var(2), Reg::Var(0), Reg::Var(1));
    let use_def = UseDef::of(&instr, false);

    assert_eq!(&[Reg::Var(0), Reg::Var(1)], use_def.uses.as_slice());
    assert_eq!(Some(Reg::Var(2)), use_def.def);
}

#[test]
fn identical_operands_are_used_once() {
    let instr = instr::mov(Reg::Var(1), Reg::Var(0));
    let use_def = UseDef::vars_of(&instr, false);

    assert_eq!(&[0], use_def.uses.as_slice());
    assert_eq!(Some(1), use_def.def);
}

#[test]
fn immediates_are_not_uses() {
    let instr = instr::add(Reg::Var(1), Reg::Var(0), SmallImm::Int(3));
    assert_eq!(&[0], UseDef::vars_of(&instr, false).uses.as_slice());

    let instr = instr::li(Reg::Var(1), Imm::Int(1234));
    let use_def = UseDef::vars_of(&instr, false);
    assert!(use_def.uses.is_empty());
    assert_eq!(Some(1), use_def.def);
}

#[test]
fn predicated_dest_is_a_use_with_set_use_where() {
    let instr = instr::add(Reg::Var(2), Reg::Var(0), Reg::Var(1)).when(AssignCond::Flag(Flag::ZS));

    assert_eq!(&[0, 1], UseDef::vars_of(&instr, false).uses.as_slice());
    assert_eq!(&[0, 1, 2], UseDef::vars_of(&instr, true).uses.as_slice());
}

#[test]
fn physical_registers_are_left_out_of_var_sets() {
    let instr = instr::alu(
        Reg::Acc(1),
        AluOp::FMul,
        Reg::Special(Special::Uniform),
        Reg::Var(3),
    );
    let use_def = UseDef::vars_of(&instr, true);
    assert_eq!(&[3], use_def.uses.as_slice());
    assert_eq!(None, use_def.def);
}

#[test]
fn control_instructions_have_no_uses_or_defs() {
    for instr in [
        instr::nop(),
        instr::jump("L0".into()),
        instr::label("L0".into()),
        instr::end(),
        instr::sema_inc(1),
    ] {
        assert_eq!(UseDef::default(), UseDef::of(&instr, true));
    }
}
