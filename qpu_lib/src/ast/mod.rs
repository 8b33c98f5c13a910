//! The kernel source tree.
//!
//! Kernels are not parsed: the host program builds them, usually through a
//! [`KernelBuilder`]. Every expression is evaluated per element of the 16 wide vectors.

mod builder;

pub use builder::KernelBuilder;
pub use qpu_ir::VarId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    Int,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Add,
    Sub,
    Mul,
    Min,
    Max,
    Shl,
    /// Arithmetic shift right.
    Shr,
    /// Logical shift right.
    UShr,
    Ror,
    BitAnd,
    BitOr,
    BitXor,
    /// Rotates the vector over a number of elements.
    Rotate,
    // unary
    BitNot,
    ItoF,
    FtoI,
    Clz,
    Recip,
    RecipSqrt,
    Exp,
    Log,
}

impl OpKind {
    /// Returns `true` for operations that only use their left operand.
    pub fn is_unary(self) -> bool {
        matches!(
            self,
            Self::BitNot
                | Self::ItoF
                | Self::FtoI
                | Self::Clz
                | Self::Recip
                | Self::RecipSqrt
                | Self::Exp
                | Self::Log
        )
    }

    /// Returns `true` for the operations computed by the special function unit.
    pub fn is_sfu(self) -> bool {
        matches!(self, Self::Recip | Self::RecipSqrt | Self::Exp | Self::Log)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Op {
    pub kind: OpKind,
    pub ty: BaseType,
}

impl Op {
    pub fn int(kind: OpKind) -> Self {
        Self {
            kind,
            ty: BaseType::Int,
        }
    }

    pub fn float(kind: OpKind) -> Self {
        Self {
            kind,
            ty: BaseType::Float,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Var {
    /// A kernel variable, ids are below the variable count passed to the compiler.
    Standard(VarId),
    /// The next value of the uniform stream.
    Uniform,
    /// Index of the element within the vector, 0 up to 15.
    ElemNum,
    /// Hardware number of the QPU.
    QpuNum,
    /// Index of the QPU among the QPUs running the kernel, from the uniforms.
    QpuIndex,
    /// Number of QPUs running the kernel, from the uniforms.
    NumQpus,
    VpmRead,
    VpmWrite,
    TmuAddr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i32),
    Float(f32),
    Var(Var),
    /// Unary operations ignore the right operand.
    Apply(Box<Expr>, Op, Box<Expr>),
    /// Loads the value at the address of each element from memory.
    Deref(Box<Expr>),
}

impl Expr {
    pub fn var(id: VarId) -> Self {
        Self::Var(Var::Standard(id))
    }

    pub fn apply(lhs: Expr, op: Op, rhs: Expr) -> Self {
        Self::Apply(Box::new(lhs), op, Box::new(rhs))
    }

    pub fn unary(op: Op, operand: Expr) -> Self {
        debug_assert!(op.kind.is_unary(), "{:?} is not a unary op", op.kind);
        Self::Apply(Box::new(operand), op, Box::new(Expr::Int(0)))
    }

    pub fn deref(addr: Expr) -> Self {
        Self::Deref(Box::new(addr))
    }
}

impl From<Var> for Expr {
    fn from(value: Var) -> Self {
        Self::Var(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpKind {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CmpOp {
    pub kind: CmpKind,
    pub ty: BaseType,
}

/// A per element boolean.
#[derive(Debug, Clone, PartialEq)]
pub enum BExpr {
    Not(Box<BExpr>),
    And(Box<BExpr>, Box<BExpr>),
    Or(Box<BExpr>, Box<BExpr>),
    Cmp(Expr, CmpOp, Expr),
}

impl BExpr {
    pub fn cmp(lhs: Expr, kind: CmpKind, ty: BaseType, rhs: Expr) -> Self {
        Self::Cmp(lhs, CmpOp { kind, ty }, rhs)
    }

    pub fn and(lhs: BExpr, rhs: BExpr) -> Self {
        Self::And(Box::new(lhs), Box::new(rhs))
    }

    pub fn or(lhs: BExpr, rhs: BExpr) -> Self {
        Self::Or(Box::new(lhs), Box::new(rhs))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: BExpr) -> Self {
        Self::Not(Box::new(inner))
    }
}

/// A condition over all elements, used for control flow.
#[derive(Debug, Clone, PartialEq)]
pub enum CExpr {
    /// True if the condition holds for any element.
    Any(BExpr),
    /// True if the condition holds for all elements.
    All(BExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Skip,
    Assign(Expr, Expr),
    Seq(Vec<Stmt>),
    /// Per element conditional assignment. Only assignments and nested `Where`s are allowed in
    /// the bodies.
    Where(BExpr, Box<Stmt>, Box<Stmt>),
    If(CExpr, Box<Stmt>, Box<Stmt>),
    While(CExpr, Box<Stmt>),
    /// Condition, increment and body.
    For(CExpr, Box<Stmt>, Box<Stmt>),
    /// Requests the value at the given address, it is later picked up with `Receive`.
    Gather(Expr),
    /// Stores the next gathered value in the variable.
    Receive(Expr),
    /// Stores the value (first) at the address (second).
    Store(Expr, Expr),
    SemaInc(u8),
    SemaDec(u8),
    /// Raises the host interrupt.
    SendIrq,
    VpmSetupRead {
        num: u8,
        stride: u8,
        horizontal: bool,
        addr: Expr,
    },
    VpmSetupWrite {
        stride: u8,
        horizontal: bool,
        addr: Expr,
    },
    DmaSetupRead {
        rows: u8,
        row_len: u8,
        vpm_row: Expr,
    },
    DmaSetupWrite {
        rows: u8,
        row_len: u8,
        vpm_row: Expr,
    },
    DmaStartRead(Expr),
    DmaStartWrite(Expr),
    DmaReadWait,
    DmaWriteWait,
    End,
}

impl Stmt {
    pub fn seq(stmts: impl IntoIterator<Item = Stmt>) -> Self {
        Self::Seq(stmts.into_iter().collect())
    }

    pub fn assign(lhs: impl Into<Expr>, rhs: Expr) -> Self {
        Self::Assign(lhs.into(), rhs)
    }

    /// A short description of the statement, for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Assign(..) => "assignment",
            Self::Seq(_) => "sequence",
            Self::Where(..) => "where",
            Self::If(..) => "if",
            Self::While(..) => "while",
            Self::For(..) => "for",
            Self::Gather(_) => "gather",
            Self::Receive(_) => "receive",
            Self::Store(..) => "store",
            Self::SemaInc(_) => "semaphore increment",
            Self::SemaDec(_) => "semaphore decrement",
            Self::SendIrq => "host interrupt",
            Self::VpmSetupRead { .. } => "VPM read setup",
            Self::VpmSetupWrite { .. } => "VPM write setup",
            Self::DmaSetupRead { .. } => "DMA read setup",
            Self::DmaSetupWrite { .. } => "DMA write setup",
            Self::DmaStartRead(_) => "DMA read",
            Self::DmaStartWrite(_) => "DMA write",
            Self::DmaReadWait => "DMA read wait",
            Self::DmaWriteWait => "DMA write wait",
            Self::End => "end",
        }
    }
}
