use super::*;
use crate::{
    dfa::uda::UseDef, instr, AluOp, BranchCond, Flag, SetCond, SmallImm, Special,
};

fn run(instrs: &mut Vec<Instruction>, target: Target) -> (RegUsage, Result<(), Vec<AllocError>>) {
    let cfg = Cfg::build(instrs);
    let liveness = Liveness::compute(instrs, &cfg);
    let mut usage = RegUsage::new(instrs, &liveness);
    let result = allocate(instrs, target, &cfg, &liveness, &mut usage);
    (usage, result)
}

fn has_vars(instrs: &[Instruction]) -> bool {
    instrs.iter().any(|instr| {
        let use_def = UseDef::vars_of(instr, false);
        !use_def.uses.is_empty() || use_def.def.is_some()
    })
}

/// `count` variables that are all live at the same time.
fn many_live(count: u32) -> Vec<Instruction> {
    let mut instrs: Vec<_> = (0..count)
        .map(|var| instr::mov(Reg::Var(var), Special::ElemNum))
        .collect();
    let sum = Reg::Var(1000);
    instrs.push(instr::add(sum, Reg::Var(0), Reg::Var(1)));
    for var in 2..count {
        instrs.push(instr::add(sum, sum, Reg::Var(var)));
    }
    instrs.push(instr::mov(Reg::Special(Special::TmuAddr), sum));
    instrs.push(instr::end());
    instrs
}

#[test]
fn interfering_variables_get_different_registers() {
    let mut instrs = vec![
        instr::mov(Reg::Var(0), Special::ElemNum),
        instr::mov(Reg::Var(1), Special::QpuNum),
        instr::add(Reg::Var(2), Reg::Var(0), Reg::Var(1)),
        instr::mov(Reg::Special(Special::TmuAddr), Reg::Var(2)),
        instr::end(),
    ];
    let (usage, result) = run(&mut instrs, Target::V3d);

    assert_eq!(Ok(()), result);
    assert_eq!(Some(Reg::A(0)), usage[0].reg);
    assert_eq!(Some(Reg::A(1)), usage[1].reg);
    assert_eq!(Some(Reg::A(0)), usage[2].reg);
    assert_eq!(vec![Reg::A(0), Reg::A(1)], instrs[2].srcs().to_vec());
    assert!(!has_vars(&instrs));
}

#[test]
fn every_used_variable_gets_a_register() {
    let mut instrs = vec![
        instr::mov(Reg::Var(0), SmallImm::Int(0)),
        instr::mov(Reg::Var(1), Special::Uniform),
        instr::label("L0".into()),
        instr::sub(Reg::Var(2), Reg::Var(0), Reg::Var(1)).set_flags(SetCond::N),
        instr::branch(BranchCond::All(Flag::NC), "L1".into()),
        instr::add(Reg::Var(3), Reg::Var(0), Reg::Var(0)),
        instr::add(Reg::Var(0), Reg::Var(3), SmallImm::Int(1)),
        instr::jump("L0".into()),
        instr::label("L1".into()),
        instr::mov(Reg::Special(Special::TmuAddr), Reg::Var(0)),
        instr::end(),
    ];
    let cfg = Cfg::build(&instrs);
    let liveness = Liveness::compute(&instrs, &cfg);
    let graph = ConflictGraph::build(&instrs, &cfg, &liveness, 4);

    for target in [Target::Vc4, Target::V3d] {
        let mut instrs = instrs.clone();
        let (usage, result) = run(&mut instrs, target);
        assert_eq!(Ok(()), result);

        for (var, item) in usage.iter() {
            if item.regular_use() {
                assert!(item.reg.is_some(), "v{var} has no register on {target}");
            }
            for (other, other_item) in usage.iter() {
                if graph.interferes(var, other) {
                    assert_ne!(item.reg, other_item.reg, "v{var} and v{other} on {target}");
                }
            }
        }
        assert!(!has_vars(&instrs));
    }
}

#[test]
fn too_many_live_variables_on_v3d_names_the_last_one() {
    let mut instrs = many_live(65);
    let (_, result) = run(&mut instrs, Target::V3d);

    assert_eq!(
        Err(vec![AllocError::TooManyLive {
            instr: 65,
            var: 64,
            live: 65,
            capacity: 64
        }]),
        result
    );
}

#[test]
fn sixty_four_live_variables_fit_on_v3d() {
    let mut instrs = many_live(64);
    let (_, result) = run(&mut instrs, Target::V3d);

    assert_eq!(Ok(()), result);
}

#[test]
fn register_files_run_out_on_vc4() {
    let mut instrs = many_live(65);
    let (_, result) = run(&mut instrs, Target::Vc4);

    assert_eq!(
        Err(vec![AllocError::NoFreeRegister {
            var: 64,
            first_usage: 64
        }]),
        result
    );
}

#[test]
fn operands_read_together_go_to_different_files() {
    let mut instrs = vec![
        instr::mov(Reg::Var(0), Special::ElemNum),
        instr::mov(Reg::Var(1), Special::QpuNum),
        instr::add(Reg::Var(2), Reg::Var(0), Reg::Var(1)),
        instr::mov(Reg::Special(Special::TmuAddr), Reg::Var(2)),
        instr::end(),
    ];
    let (usage, result) = run(&mut instrs, Target::Vc4);

    assert_eq!(Ok(()), result);
    assert_eq!(Some(Reg::A(0)), usage[0].reg);
    assert_eq!(Some(Reg::B(0)), usage[1].reg);
    // no moves were needed
    assert_eq!(5, instrs.len());
}

#[test]
fn satisfy_moves_conflicting_operands_into_r0() {
    let mut instrs = vec![
        instr::add(Reg::A(1), Reg::A(2), Reg::A(3)),
        instr::add(Reg::A(1), Reg::B(2), SmallImm::Int(3)),
        instr::add(Reg::A(0), Reg::A(1), Reg::B(1)),
        instr::alu(Reg::A(4), AluOp::Add, Special::QpuNum, Reg::B(5)),
        instr::add(Reg::A(4), Special::Uniform, Reg::A(5)),
    ];

    assert_eq!(3, satisfy(&mut instrs));
    assert_eq!(8, instrs.len());

    assert_eq!(Some(Reg::Acc(0)), instrs[0].dest());
    assert_eq!(vec![Reg::A(3)], instrs[0].srcs().to_vec());
    assert_eq!(vec![Reg::A(2), Reg::Acc(0)], instrs[1].srcs().to_vec());

    assert_eq!(vec![Reg::B(2)], instrs[2].srcs().to_vec());
    assert_eq!(vec![Reg::Acc(0)], instrs[3].srcs().to_vec());

    assert_eq!(vec![Reg::A(1), Reg::B(1)], instrs[4].srcs().to_vec());
    assert_eq!(vec![Reg::B(5)], instrs[5].srcs().to_vec());
}
