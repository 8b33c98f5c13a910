//! The compile pipeline, from a kernel tree to encoded instruction words.

use std::collections::HashSet;

use log::{debug, warn};
use qpu_ir::{
    cfg::Cfg,
    dfa::{
        liveness::{self, ConsistencyError, Liveness},
        reg_usage::RegUsage,
    },
    encoder, optimizer,
    passes::{
        finalize::finalize,
        register_allocation::{self, AllocError},
    },
    CompileData, Instruction, ListingConfig, ListingOutputter, SetCond, Target, VarId,
};

use crate::{
    ast::Stmt,
    diagnostic::{AggregateResult, Code, DiagnosticBuilder, DiagnosticKind},
    passes::lower_ast,
};

/// The peephole window used when none is configured.
pub const DEFAULT_PEEPHOLE_RANGE: usize = 12;
/// The largest peephole window. Larger windows rarely find more substitutions.
pub const MAX_PEEPHOLE_RANGE: usize = 15;

/// The intermediate results to record in [`CompileData`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DumpFlags {
    pub code_before_optimization: bool,
    pub liveness: bool,
    pub reg_usage: bool,
    pub allocation: bool,
    pub code_after_optimization: bool,
}

impl DumpFlags {
    pub fn all() -> Self {
        Self {
            code_before_optimization: true,
            liveness: true,
            reg_usage: true,
            allocation: true,
            code_after_optimization: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompileOpts {
    target: Target,
    optimize: bool,
    max_peephole_range: usize,
    dump: DumpFlags,
    upgrade_to_err: HashSet<Code>,
}

impl CompileOpts {
    pub fn target(&self) -> Target {
        self.target
    }

    pub fn optimize(&self) -> bool {
        self.optimize
    }

    pub fn max_peephole_range(&self) -> usize {
        self.max_peephole_range
    }

    pub fn dump(&self) -> DumpFlags {
        self.dump
    }
}

impl Default for CompileOpts {
    fn default() -> Self {
        Self {
            target: Target::default(),
            optimize: true,
            max_peephole_range: DEFAULT_PEEPHOLE_RANGE,
            dump: DumpFlags::default(),
            upgrade_to_err: HashSet::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompileOptsBuilder {
    target: Target,
    optimize: bool,
    max_peephole_range: usize,
    dump: DumpFlags,
    upgrade_to_err: HashSet<Code>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOptsErr {
    /// Only warnings can be upgraded to errors.
    NotAWarning(Code),
}

impl std::fmt::Display for CompileOptsErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileOptsErr::NotAWarning(code) => {
                write!(f, "Diagnostic {code} is always an error, it can't be upgraded.")
            }
        }
    }
}

impl std::error::Error for CompileOptsErr {}

impl Default for CompileOptsBuilder {
    fn default() -> Self {
        Self {
            target: Target::default(),
            optimize: true,
            max_peephole_range: DEFAULT_PEEPHOLE_RANGE,
            dump: DumpFlags::default(),
            upgrade_to_err: HashSet::default(),
        }
    }
}

impl CompileOptsBuilder {
    /// Optimized vc4 code, without dumps and not upgrading any diagnostics.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    /// Set whether immediate combining and accumulator substitution run.
    pub fn optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    /// The largest distance between a definition and its last use for which the variable can
    /// still be moved to an accumulator. Clamped to `1..=MAX_PEEPHOLE_RANGE`.
    pub fn max_peephole_range(mut self, range: usize) -> Self {
        self.max_peephole_range = range.clamp(1, MAX_PEEPHOLE_RANGE);
        self
    }

    pub fn dump(mut self, dump: DumpFlags) -> Self {
        self.dump = dump;
        self
    }

    pub fn with_code_to_upgrade(mut self, code: Code) -> Self {
        self.upgrade_to_err.insert(code);
        self
    }

    pub fn build(self) -> Result<CompileOpts, CompileOptsErr> {
        if let Some(code) = self.upgrade_to_err.iter().find(|c| !c.is_warning()) {
            return Err(CompileOptsErr::NotAWarning(*code));
        }
        Ok(CompileOpts {
            target: self.target,
            optimize: self.optimize,
            max_peephole_range: self.max_peephole_range,
            dump: self.dump,
            upgrade_to_err: self.upgrade_to_err,
        })
    }
}

/// A compiled kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct Compiled {
    pub target: Target,
    /// The finalized instructions, one per machine instruction.
    pub code: Vec<Instruction>,
    /// The encoded instructions.
    pub words: Vec<u64>,
    /// The number of variables before register allocation.
    pub num_vars: VarId,
}

/// Compiles `stmt`, whose variables are `v0` up to `v{num_vars - 1}`.
///
/// `data` is cleared first. Afterwards it holds the code the diagnostics point into and the
/// dumps asked for in `opts`.
pub fn compile(
    stmt: &Stmt,
    num_vars: VarId,
    opts: &CompileOpts,
    data: &mut CompileData,
) -> AggregateResult<Compiled> {
    data.clear();
    let mut res = run_compile(stmt, num_vars, opts, data);
    res.upgrade_diagnostics(|d| opts.upgrade_to_err.contains(d.code()));
    for (_, diagnostic) in res
        .diagnostics()
        .filter(|(kind, _)| *kind == DiagnosticKind::Rec)
    {
        warn!("{diagnostic}");
    }
    res
}

fn run_compile(
    stmt: &Stmt,
    num_vars: VarId,
    opts: &CompileOpts,
    data: &mut CompileData,
) -> AggregateResult<Compiled> {
    let (lowered, res) = lower_ast::lower_partial(stmt, num_vars, opts.target);
    if opts.dump.code_before_optimization {
        data.target_code_before_optimization = listing(&lowered.instrs);
    }
    data.diagnostic_code = lowered.instrs;
    res.and_then(|()| back_end(opts, data))
}

/// Optimizes, allocates and encodes the lowered code in `data.diagnostic_code`.
fn back_end(opts: &CompileOpts, data: &mut CompileData) -> AggregateResult<Compiled> {
    let target = opts.target;
    let mut code = std::mem::take(&mut data.diagnostic_code);
    if opts.optimize {
        optimizer::optimize(&mut code, target, opts.max_peephole_range, data);
    }
    data.diagnostic_code = code.clone();
    if opts.dump.code_after_optimization {
        data.target_code_after_optimization = listing(&code);
    }

    let cfg = Cfg::build(&code);
    let liveness = Liveness::compute(&code, &cfg);
    data.num_liveness_iterations = liveness.iterations();
    let mut usage = RegUsage::new(&code, &liveness);
    if opts.dump.liveness {
        data.liveness_dump = liveness.to_string();
    }
    if opts.dump.reg_usage {
        data.reg_usage_dump = usage.to_string();
    }

    check_usage(&code, &usage).and_then(|()| {
        let mut res = AggregateResult::new_ok(());
        let allocated =
            register_allocation::allocate(&mut code, target, &cfg, &liveness, &mut usage);
        for error in allocated.err().into_iter().flatten() {
            let diagnostic = match error {
                AllocError::TooManyLive {
                    instr,
                    var,
                    live,
                    capacity,
                } => DiagnosticBuilder::new(instr).build_too_many_live(var, live, capacity),
                AllocError::NoFreeRegister { var, first_usage } => {
                    DiagnosticBuilder::new(first_usage).build_no_free_register(var)
                }
            };
            res.add_err(diagnostic);
        }

        res.map(|()| {
            if opts.dump.allocation {
                data.allocated_registers_dump = usage.to_string();
            }
            let code = finalize(code, target);
            let words = encoder::encode(target, &code);
            debug!(
                "compiled kernel for {target}: {} instructions, {} variables",
                code.len(),
                usage.len()
            );
            Compiled {
                target,
                code,
                words,
                num_vars: usage.len() as VarId,
            }
        })
    })
}

/// Reports variables that are read before they are written, and dead writes.
fn check_usage(code: &[Instruction], usage: &RegUsage) -> AggregateResult<()> {
    let mut res = AggregateResult::new_ok(());
    // the span of a multi variable diagnostic is the first instruction where one is live
    let span = |vars: &[VarId]| {
        vars.iter()
            .filter_map(|var| usage.get(*var))
            .filter_map(|item| item.live.first().or(item.uses.first()))
            .min()
            .unwrap_or(0)
    };
    for error in liveness::check_consistency(usage) {
        let diagnostic = match &error {
            ConsistencyError::LiveBeforeAssign(vars) => {
                DiagnosticBuilder::new(span(vars)).build_live_before_assign(vars)
            }
            ConsistencyError::PredicatedLiveBeforeAssign(vars) => {
                DiagnosticBuilder::new(span(vars)).build_predicated_live_before_assign(vars)
            }
            ConsistencyError::NeverAssigned(vars) => {
                DiagnosticBuilder::new(span(vars)).build_never_assigned(vars)
            }
        };
        res.add_err(diagnostic);
    }

    // flag updates and uniform loads are written for their side effect
    for (var, item) in usage.iter().filter(|(_, item)| item.only_assigned()) {
        let side_effect = item.defs.iter().any(|&def| {
            let instr = &code[def];
            instr.set_cond() != SetCond::None || instr.is_uniform_load()
        });
        if !side_effect {
            let first_def = item.first_def().unwrap_or(0);
            res.add_rec_diagnostic(DiagnosticBuilder::new(first_def).build_only_assigned(var));
        }
    }
    res
}

/// The listing used for dumps, with instruction indices.
pub fn listing(instrs: &[Instruction]) -> String {
    let mut out = String::new();
    let config = ListingConfig {
        show_comments: true,
        show_indices: true,
    };
    // writing to a string can't fail
    let _ = ListingOutputter::new(&mut out)
        .with_config(config)
        .write_listing(instrs);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BExpr, BaseType, CmpKind, Expr, Op, OpKind, Var};

    fn compile_with(stmt: &Stmt, num_vars: VarId, opts: &CompileOpts) -> AggregateResult<Compiled> {
        compile(stmt, num_vars, opts, &mut CompileData::default())
    }

    fn opts(target: Target) -> CompileOpts {
        CompileOptsBuilder::new().target(target).build().unwrap()
    }

    fn hello() -> Stmt {
        // x = uniform + elem_num; *x = x
        Stmt::seq([
            Stmt::assign(
                Expr::var(0),
                Expr::apply(
                    Var::Uniform.into(),
                    Op::int(OpKind::Add),
                    Var::ElemNum.into(),
                ),
            ),
            Stmt::Store(Expr::var(0), Expr::var(0)),
        ])
    }

    #[test]
    fn opts_builder() {
        let opts = CompileOptsBuilder::new()
            .target(Target::V3d)
            .optimize(false)
            .max_peephole_range(40)
            .build()
            .unwrap();
        assert_eq!(opts.target(), Target::V3d);
        assert!(!opts.optimize());
        assert_eq!(opts.max_peephole_range(), MAX_PEEPHOLE_RANGE);

        let opts = CompileOptsBuilder::new().max_peephole_range(0).build().unwrap();
        assert_eq!(opts.max_peephole_range(), 1);

        let err = CompileOptsBuilder::new()
            .with_code_to_upgrade(Code::InvalidRotate)
            .build()
            .unwrap_err();
        assert_eq!(err, CompileOptsErr::NotAWarning(Code::InvalidRotate));
    }

    #[test]
    fn compiles_for_both_targets() {
        for target in [Target::Vc4, Target::V3d] {
            let res = compile_with(&hello(), 1, &opts(target));
            let compiled = res.into_value().unwrap();
            assert_eq!(compiled.target, target);
            assert_eq!(compiled.words.len(), compiled.code.len() + 2);
            assert!(compiled.code.iter().all(|i| i.srcs().iter().all(|r| !r.is_var())));
        }
    }

    #[test]
    fn lowering_errors_keep_the_code() {
        let mut data = CompileData::default();
        let res = compile(&Stmt::SemaInc(1), 0, &opts(Target::V3d), &mut data);
        assert!(res.is_err());
        // prologue and end
        assert_eq!(data.diagnostic_code.len(), 3);
    }

    #[test]
    fn never_assigned() {
        let stmt = Stmt::assign(Expr::var(0), Expr::var(1));
        let res = compile_with(&stmt, 2, &opts(Target::Vc4));
        assert!(res.is_err());
        assert!(res
            .diagnostics()
            .any(|(_, d)| *d.code() == Code::NeverAssigned));
    }

    #[test]
    fn live_before_assign() {
        // v0 is only assigned in the if, but read after it
        let cond = BExpr::cmp(Var::ElemNum.into(), CmpKind::Eq, BaseType::Int, Expr::Int(0));
        let stmt = Stmt::seq([
            Stmt::If(
                crate::ast::CExpr::Any(cond),
                Box::new(Stmt::assign(Expr::var(0), Expr::Int(1))),
                Box::new(Stmt::Skip),
            ),
            Stmt::Store(Expr::var(0), Expr::Int(0)),
        ]);
        let res = compile_with(&stmt, 1, &opts(Target::V3d));
        assert!(res
            .diagnostics()
            .any(|(_, d)| *d.code() == Code::LiveBeforeAssign));
    }

    #[test]
    fn dead_write_warns_and_upgrades() {
        let stmt = Stmt::assign(Expr::var(0), Var::ElemNum.into());
        let opts_warn = CompileOptsBuilder::new().optimize(false).build().unwrap();
        let res = compile_with(&stmt, 1, &opts_warn);
        assert!(res.is_rec());
        assert!(res.diagnostics().all(|(_, d)| *d.code() == Code::OnlyAssigned));

        let opts_err = CompileOptsBuilder::new()
            .optimize(false)
            .with_code_to_upgrade(Code::OnlyAssigned)
            .build()
            .unwrap();
        assert!(compile_with(&stmt, 1, &opts_err).is_err());
    }

    #[test]
    fn dumps() {
        let mut data = CompileData::default();
        let opts = CompileOptsBuilder::new().dump(DumpFlags::all()).build().unwrap();
        let res = compile(&hello(), 1, &opts, &mut data);
        assert!(res.value().is_some());
        assert!(data.target_code_before_optimization.contains("UNIFORM"));
        assert!(!data.liveness_dump.is_empty());
        assert!(!data.reg_usage_dump.is_empty());
        assert!(!data.allocated_registers_dump.is_empty());
        assert!(data.num_liveness_iterations > 0);
    }
}
