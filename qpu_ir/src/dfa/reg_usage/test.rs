use super::*;
use crate::{cfg::Cfg, instr, AssignCond, Flag, SmallImm};

fn usage_of(instrs: &[Instruction]) -> RegUsage {
    let cfg = Cfg::build(instrs);
    let liveness = Liveness::compute(instrs, &cfg);
    RegUsage::new(instrs, &liveness)
}

#[test]
fn records_defs_uses_and_live_range() {
    let instrs = vec![
        instr::mov(Reg::Var(0), SmallImm::Int(5)),
        instr::nop(),
        instr::add(Reg::Var(1), Reg::Var(0), SmallImm::Int(1)),
        instr::add(Reg::Var(2), Reg::Var(0), Reg::Var(1)),
        instr::end(),
    ];
    let usage = usage_of(&instrs);

    let a = &usage[0];
    assert_eq!(vec![0], a.defs);
    assert_eq!(Some(2), a.uses.first());
    assert_eq!(Some(3), a.uses.last());
    assert_eq!(2, a.uses.count());
    assert_eq!(Some(1), a.live.first());
    assert_eq!(Some(3), a.live.last());
    assert_eq!(Some(0), a.first_usage());
    assert_eq!(Some(3), a.last_usage());
    assert_eq!(3, a.use_range());
    assert_eq!(2, a.live_range());
    assert!(a.regular_use());

    let c = &usage[2];
    assert!(c.only_assigned());
    assert_eq!(0, c.use_range());
    assert!(c.live.is_empty());

    assert_eq!(3, usage.len());
}

#[test]
fn classifies_unused_and_never_assigned_variables() {
    let instrs = vec![
        instr::add(Reg::Var(3), Reg::Var(1), SmallImm::Int(1)),
        instr::end(),
    ];
    let usage = usage_of(&instrs);

    assert!(usage[0].unused());
    assert!(usage[1].never_assigned());
    assert!(!usage[1].regular_use());
    assert!(usage[2].unused());
    assert!(usage[3].only_assigned());
    assert_eq!(None, usage.get(4));
}

#[test]
fn remembers_whether_the_first_def_is_predicated() {
    let instrs = vec![
        instr::mov(Reg::Var(0), SmallImm::Int(1)).when(AssignCond::Flag(Flag::NS)),
        instr::mov(Reg::Var(0), SmallImm::Int(2)),
        instr::mov(Reg::Var(1), SmallImm::Int(2)),
        instr::mov(Reg::Var(1), SmallImm::Int(1)).when(AssignCond::Flag(Flag::NS)),
        instr::add(Reg::Var(2), Reg::Var(0), Reg::Var(1)),
        instr::end(),
    ];
    let usage = usage_of(&instrs);

    assert!(usage[0].is_predicated_first_def());
    assert_eq!(vec![0, 1], usage[0].defs);
    assert!(!usage[1].is_predicated_first_def());
    // the predicated write keeps the earlier value live
    assert_eq!(Some(3), usage[1].live.first());
}

#[test]
fn dump_lists_used_variables() {
    let instrs = vec![
        instr::mov(Reg::Var(1), SmallImm::Int(5)),
        instr::end(),
    ];
    let dump = usage_of(&instrs).to_string();

    assert!(dump.contains("v1"));
    assert!(!dump.contains("v0"));
}
