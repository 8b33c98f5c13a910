use qpu_ir::{BranchTarget, CompileData, InstrKind, Instruction, Reg, Target};
use qpu_lib::{
    ast::{BExpr, BaseType, CExpr, CmpKind, Expr, KernelBuilder, Op, OpKind, Stmt, Var, VarId},
    compile::{compile, CompileOpts, CompileOptsBuilder, Compiled, DumpFlags},
    diagnostic::{AggregateResult, Code, DiagnosticKind},
    heap::Heap,
    kernel::{Kernel, KernelError, QpuDevice},
};

const TARGETS: [Target; 2] = [Target::Vc4, Target::V3d];

fn opts(target: Target) -> CompileOpts {
    CompileOptsBuilder::new().target(target).build().unwrap()
}

fn print_diagnostics<T>(res: &AggregateResult<T>) {
    for (t, d) in res.diagnostics() {
        match t {
            DiagnosticKind::Rec => println!("Rec: {d:?}"),
            DiagnosticKind::Err => println!("Err: {d:?}"),
        }
    }
}

fn compile_ok(name: &str, (stmt, num_vars): &(Stmt, VarId), target: Target) -> Compiled {
    let res = compile(stmt, *num_vars, &opts(target), &mut CompileData::default());
    if res.is_err() {
        println!("Expected `{name}` to compile for {target} but got the following diagnostics:");
        print_diagnostics(&res);
        println!();
    }
    res.into_value().unwrap()
}

fn diagnostics_test(stmt: &Stmt, num_vars: VarId, opts: &CompileOpts, expected_codes: Vec<Code>) {
    let res = compile(stmt, num_vars, opts, &mut CompileData::default());
    if !res.is_err() {
        panic!("Expected compile to fail, but it didn't!");
    }

    let found_codes: Vec<_> = res.diagnostics().map(|(_, d)| *d.code()).collect();
    if expected_codes != found_codes {
        println!(
            "Expected to find these diagnostic codes: {:?}
                              But found: {:?}",
            expected_codes, found_codes
        );
        print_diagnostics(&res);
        panic!("Not the same diagnostics");
    }
}

/// Panics if `code` still holds anything that isn't a machine instruction.
fn check_machine_code(name: &str, code: &[Instruction]) {
    assert!(
        matches!(code.last(), Some(i) if i.kind == InstrKind::End),
        "`{name}` doesn't end with `end`"
    );
    for (i, instr) in code.iter().enumerate() {
        assert!(
            !matches!(instr.kind, InstrKind::Label(_) | InstrKind::Skip),
            "`{name}`: {i}: `{instr}` left in the finalized code"
        );
        let regs = instr.srcs().into_iter().chain(instr.dest());
        for reg in regs {
            assert!(
                !matches!(reg, Reg::Var(_)),
                "`{name}`: {i}: `{instr}` still uses a variable"
            );
        }

        if let InstrKind::Branch(branch) = &instr.kind {
            let slots = code.get(i + 1..i + 4).unwrap_or_default();
            assert!(
                slots.len() == 3 && slots.iter().all(|s| s.kind == InstrKind::Nop),
                "`{name}`: {i}: branch delay slots aren't filled with nops"
            );
            let BranchTarget::Relative(offset) = branch.target else {
                panic!("`{name}`: {i}: `{instr}` still branches to a label");
            };
            let dest = (i + 4) as i64 + i64::from(offset);
            assert!(
                (0..code.len() as i64).contains(&dest),
                "`{name}`: {i}: `{instr}` branches out of the code"
            );
        }
    }
}

fn element_addr(base: Expr) -> Expr {
    let offset = Expr::apply(Var::ElemNum.into(), Op::int(OpKind::Shl), Expr::Int(2));
    Expr::apply(base, Op::int(OpKind::Add), offset)
}

fn hello() -> (Stmt, VarId) {
    let mut k = KernelBuilder::new();
    let out = k.fresh_var();
    k.assign(out.clone(), Var::Uniform.into());
    k.push(Stmt::Store(Var::ElemNum.into(), out));
    k.finish()
}

fn float_sum() -> (Stmt, VarId) {
    let mut k = KernelBuilder::new();
    let a = k.fresh_var();
    let b = k.fresh_var();
    k.assign(a.clone(), element_addr(Var::Uniform.into()));
    k.assign(b.clone(), element_addr(Var::Uniform.into()));
    let sum = Expr::apply(Expr::deref(a.clone()), Op::float(OpKind::Add), Expr::deref(b));
    k.push(Stmt::Store(sum, a));
    k.finish()
}

fn where_else() -> (Stmt, VarId) {
    let mut k = KernelBuilder::new();
    let out = k.fresh_var();
    let x = k.fresh_var();
    k.assign(out.clone(), Var::Uniform.into());
    k.assign(x.clone(), Var::ElemNum.into());
    k.where_(BExpr::and(
        BExpr::cmp(x.clone(), CmpKind::Ge, BaseType::Int, Expr::Int(4)),
        BExpr::cmp(x.clone(), CmpKind::Lt, BaseType::Int, Expr::Int(12)),
    ));
    k.assign(x.clone(), Expr::apply(x.clone(), Op::int(OpKind::Mul), Expr::Int(3)));
    k.else_();
    k.assign(x.clone(), Expr::Int(-1));
    k.end();
    k.push(Stmt::Store(x, out));
    k.finish()
}

fn counting_loop() -> (Stmt, VarId) {
    let mut k = KernelBuilder::new();
    let out = k.fresh_var();
    let n = k.fresh_var();
    let i = k.fresh_var();
    let total = k.fresh_var();
    k.assign(out.clone(), Var::Uniform.into());
    k.assign(n.clone(), Var::Uniform.into());
    k.assign(i.clone(), Expr::Int(0));
    k.assign(total.clone(), Expr::Int(0));
    k.while_(CExpr::Any(BExpr::cmp(i.clone(), CmpKind::Lt, BaseType::Int, n)));
    k.assign(total.clone(), Expr::apply(total.clone(), Op::int(OpKind::Add), i.clone()));
    k.assign(i.clone(), Expr::apply(i.clone(), Op::int(OpKind::Add), Expr::Int(1)));
    k.end();
    k.push(Stmt::Store(total, out));
    k.finish()
}

fn rotate_and_sfu() -> (Stmt, VarId) {
    let mut k = KernelBuilder::new();
    let out = k.fresh_var();
    let x = k.fresh_var();
    k.assign(out.clone(), Var::Uniform.into());
    k.assign(x.clone(), Expr::unary(Op::int(OpKind::ItoF), Var::ElemNum.into()));
    k.assign(x.clone(), Expr::unary(Op::float(OpKind::Recip), x.clone()));
    k.assign(x.clone(), Expr::apply(x.clone(), Op::int(OpKind::Rotate), Expr::Int(3)));
    k.push(Stmt::Store(x, out));
    k.finish()
}

/// `count` variables that are all live at the same time.
fn many_live(count: usize) -> (Stmt, VarId) {
    let mut k = KernelBuilder::new();
    let out = k.fresh_var();
    k.assign(out.clone(), Var::Uniform.into());
    let vars: Vec<_> = (0..count)
        .map(|i| {
            let var = k.fresh_var();
            k.assign(
                var.clone(),
                Expr::apply(Var::ElemNum.into(), Op::int(OpKind::Add), Expr::Int(i as i32)),
            );
            var
        })
        .collect();
    let total = k.fresh_var();
    k.assign(total.clone(), Expr::Int(0));
    for var in vars {
        k.assign(total.clone(), Expr::apply(total.clone(), Op::int(OpKind::Add), var));
    }
    k.push(Stmt::Store(total, out));
    k.finish()
}

fn kernels() -> Vec<(&'static str, (Stmt, VarId))> {
    vec![
        ("hello", hello()),
        ("float_sum", float_sum()),
        ("where_else", where_else()),
        ("counting_loop", counting_loop()),
        ("rotate_and_sfu", rotate_and_sfu()),
    ]
}

#[test]
fn kernels_compile_to_machine_code() {
    for target in TARGETS {
        for (name, kernel) in kernels() {
            let compiled = compile_ok(name, &kernel, target);
            check_machine_code(name, &compiled.code);
            assert!(!compiled.words.is_empty());
        }
    }
}

#[test]
fn unoptimized_kernels_compile_too() {
    let mut data = CompileData::default();
    for target in TARGETS {
        let opts = CompileOptsBuilder::new()
            .target(target)
            .optimize(false)
            .build()
            .unwrap();
        for (name, (stmt, num_vars)) in kernels() {
            let res = compile(&stmt, num_vars, &opts, &mut data);
            if res.is_err() {
                print_diagnostics(&res);
                panic!("`{name}` failed to compile for {target} without optimizations");
            }
            check_machine_code(name, &res.into_value().unwrap().code);
        }
    }
}

#[test]
fn lowered_listing_of_an_empty_kernel() {
    let mut data = CompileData::default();
    let opts = CompileOptsBuilder::new()
        .dump(DumpFlags {
            code_before_optimization: true,
            ..DumpFlags::default()
        })
        .build()
        .unwrap();
    let res = compile(&Stmt::Skip, 0, &opts, &mut data);
    assert!(!res.is_err());

    pretty_assertions::assert_str_eq!(
        "   0:     v0 = UNIFORM  # QPU index
   1:     v1 = UNIFORM  # number of QPUs
   2:     HOST_INT = 1  # signal the host
   3:     end
",
        data.target_code_before_optimization,
    );
}

#[test]
fn too_many_live_variables() {
    let (stmt, num_vars) = many_live(80);
    diagnostics_test(&stmt, num_vars, &opts(Target::V3d), vec![Code::TooManyLiveVariables]);

    let res = compile(&stmt, num_vars, &opts(Target::Vc4), &mut CompileData::default());
    assert!(res.is_err());
    assert!(res.diagnostics().all(|(_, d)| matches!(
        d.code(),
        Code::TooManyLiveVariables | Code::NoFreeRegister
    )));

    // a handful fits everywhere
    let small = many_live(8);
    for target in TARGETS {
        check_machine_code("many_live", &compile_ok("many_live", &small, target).code);
    }
}

#[test]
fn target_specific_statements() {
    let stmt = Stmt::seq([Stmt::SemaInc(2), Stmt::SemaDec(2), Stmt::SendIrq]);
    let compiled = compile_ok("semaphores", &(stmt.clone(), 0), Target::Vc4);
    check_machine_code("semaphores", &compiled.code);

    diagnostics_test(
        &stmt,
        0,
        &opts(Target::V3d),
        vec![
            Code::UnsupportedOnTarget,
            Code::UnsupportedOnTarget,
            Code::UnsupportedOnTarget,
        ],
    );
}

#[test]
fn reading_unassigned_variables() {
    // v1 is read but never written
    let stmt = Stmt::Store(Expr::var(1), Expr::var(0));
    let res = compile(&stmt, 2, &opts(Target::V3d), &mut CompileData::default());
    assert!(res.is_err());
    assert!(res.diagnostics().any(|(_, d)| *d.code() == Code::NeverAssigned));
}

#[derive(Default)]
struct FakeDevice {
    launches: Vec<Vec<Vec<u32>>>,
}

impl QpuDevice for FakeDevice {
    fn execute(
        &mut self,
        code: &[u64],
        uniforms: &[Vec<u32>],
        heap: &mut Heap,
    ) -> Result<(), KernelError> {
        if code.is_empty() {
            return Err(KernelError::Execution("no code".to_string()));
        }
        // the first parameter of every QPU points into the heap
        for block in uniforms {
            if block[2] < 0x4000 || heap.size() * 4 + 0x4000 <= block[2] as usize {
                return Err(KernelError::Execution("address outside the heap".to_string()));
            }
        }
        self.launches.push(uniforms.to_vec());
        Ok(())
    }
}

#[test]
fn kernels_launch_on_every_qpu() {
    let (stmt, num_vars) = hello();
    let mut heap = Heap::with_base_address(256, 0x4000);
    let out = heap.alloc(16).unwrap();
    let addr = heap.address(out).unwrap();

    for target in TARGETS {
        let mut kernel = Kernel::new(stmt.clone(), num_vars, &opts(target));
        assert!(!kernel.has_errors());
        kernel.set_num_qpus(4).unwrap();

        let mut device = FakeDevice::default();
        kernel.invoke(&mut device, &mut heap, &[addr]).unwrap();
        assert_eq!(
            device.launches,
            vec![(0..4).map(|i| vec![i, 4, 0x4000, 0]).collect::<Vec<_>>()]
        );
    }
}

#[test]
fn failed_kernels_dont_launch() {
    let mut kernel = Kernel::new(Stmt::SemaInc(20), 0, &opts(Target::Vc4));
    assert!(kernel.has_errors());
    assert!(kernel.set_num_qpus(2).is_ok());
    assert_eq!(
        kernel.errors().map(|d| *d.code()).collect::<Vec<_>>(),
        vec![Code::InvalidSemaphore]
    );

    let mut device = FakeDevice::default();
    let mut heap = Heap::new(16);
    assert!(matches!(
        kernel.invoke(&mut device, &mut heap, &[]),
        Err(KernelError::CompileFailed)
    ));
    assert!(device.launches.is_empty());
}
