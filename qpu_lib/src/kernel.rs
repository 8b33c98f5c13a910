//! Compiled kernels and the ways to run them.
//!
//! A [`Kernel`] compiles its statement tree when it is created. Running it hands the encoded
//! code, or the instruction list, to one of the collaborators below together with one uniform
//! block per QPU. A kernel that failed to compile refuses to run.

use log::{debug, error};
use qpu_ir::{CompileData, Instruction, Target, VarId};
use thiserror::Error;

use crate::{
    ast::Stmt,
    compile::{compile, CompileOpts, Compiled},
    diagnostic::{AggregateResult, Diagnostic, DiagnosticKind},
    heap::{Heap, HeapError},
};

#[derive(Error, Debug)]
pub enum KernelError {
    #[error("the kernel failed to compile")]
    CompileFailed,
    #[error("can't run on {requested} QPUs, {target} has {available}")]
    InvalidQpuCount {
        requested: usize,
        available: usize,
        target: Target,
    },
    #[error(transparent)]
    Heap(#[from] HeapError),
    #[error("execution failed: {0}")]
    Execution(String),
}

/// The hardware, e.g. through the mailbox interface.
pub trait QpuDevice {
    /// Runs `code` once per uniform block, each on its own QPU.
    fn execute(
        &mut self,
        code: &[u64],
        uniforms: &[Vec<u32>],
        heap: &mut Heap,
    ) -> Result<(), KernelError>;
}

/// Runs finalized instruction lists on the host.
pub trait Emulator {
    fn emulate(
        &mut self,
        target: Target,
        code: &[Instruction],
        uniforms: &[Vec<u32>],
        heap: &mut Heap,
    ) -> Result<(), KernelError>;
}

/// Runs the statement tree itself on the host.
pub trait Interpreter {
    fn interpret(
        &mut self,
        kernel: &Stmt,
        num_vars: VarId,
        uniforms: &[Vec<u32>],
        heap: &mut Heap,
    ) -> Result<(), KernelError>;
}

/// The number of QPUs a kernel can be started on.
pub fn max_qpus(target: Target) -> usize {
    match target {
        Target::Vc4 => 12,
        Target::V3d => 8,
    }
}

#[derive(Debug)]
pub struct Kernel {
    stmt: Stmt,
    num_vars: VarId,
    target: Target,
    num_qpus: usize,
    compiled: AggregateResult<Compiled>,
    data: CompileData,
}

impl Kernel {
    /// Compiles `stmt` for the target in `opts`. The kernel runs on a single QPU until
    /// [`set_num_qpus`](Self::set_num_qpus) is called.
    pub fn new(stmt: Stmt, num_vars: VarId, opts: &CompileOpts) -> Self {
        let mut data = CompileData::default();
        let compiled = compile(&stmt, num_vars, opts, &mut data);
        debug!(
            "kernel compiled for {} with {} diagnostics",
            opts.target(),
            compiled.diagnostics().count()
        );
        Self {
            stmt,
            num_vars,
            target: opts.target(),
            num_qpus: 1,
            compiled,
            data,
        }
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn has_errors(&self) -> bool {
        self.compiled.is_err()
    }

    /// The diagnostics that made the compile fail.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.compiled
            .diagnostics()
            .filter(|(kind, _)| *kind == DiagnosticKind::Err)
            .map(|(_, d)| d)
    }

    /// All diagnostics, warnings included.
    pub fn diagnostics(&self) -> impl Iterator<Item = (DiagnosticKind, &Diagnostic)> {
        self.compiled.diagnostics()
    }

    pub fn compile_data(&self) -> &CompileData {
        &self.data
    }

    /// The finalized instructions, `None` if the compile failed.
    pub fn code(&self) -> Option<&[Instruction]> {
        self.compiled.value().map(|c| c.code.as_slice())
    }

    /// The encoded instructions, `None` if the compile failed.
    pub fn encode(&self) -> Option<&[u64]> {
        self.compiled.value().map(|c| c.words.as_slice())
    }

    pub fn num_qpus(&self) -> usize {
        self.num_qpus
    }

    pub fn set_num_qpus(&mut self, num_qpus: usize) -> Result<(), KernelError> {
        let available = max_qpus(self.target);
        if num_qpus == 0 || num_qpus > available {
            return Err(KernelError::InvalidQpuCount {
                requested: num_qpus,
                available,
                target: self.target,
            });
        }
        self.num_qpus = num_qpus;
        Ok(())
    }

    /// The uniform block of every QPU: its index, the number of QPUs, the parameters and a
    /// trailing dummy word.
    pub fn uniforms(&self, params: &[u32]) -> Vec<Vec<u32>> {
        (0..self.num_qpus)
            .map(|index| {
                let mut block = Vec::with_capacity(params.len() + 3);
                block.push(index as u32);
                block.push(self.num_qpus as u32);
                block.extend_from_slice(params);
                block.push(0);
                block
            })
            .collect()
    }

    pub fn invoke(
        &self,
        device: &mut dyn QpuDevice,
        heap: &mut Heap,
        params: &[u32],
    ) -> Result<(), KernelError> {
        let compiled = self.runnable()?;
        device.execute(&compiled.words, &self.uniforms(params), heap)
    }

    pub fn emu(
        &self,
        emulator: &mut dyn Emulator,
        heap: &mut Heap,
        params: &[u32],
    ) -> Result<(), KernelError> {
        let compiled = self.runnable()?;
        emulator.emulate(self.target, &compiled.code, &self.uniforms(params), heap)
    }

    pub fn interpret(
        &self,
        interpreter: &mut dyn Interpreter,
        heap: &mut Heap,
        params: &[u32],
    ) -> Result<(), KernelError> {
        self.runnable()?;
        interpreter.interpret(&self.stmt, self.num_vars, &self.uniforms(params), heap)
    }

    fn runnable(&self) -> Result<&Compiled, KernelError> {
        match self.compiled.value() {
            Some(compiled) => Ok(compiled),
            None => {
                for diagnostic in self.errors() {
                    error!("{diagnostic}");
                }
                Err(KernelError::CompileFailed)
            }
        }
    }
}
