use super::{BExpr, CExpr, Expr, Stmt, Var, VarId};

/// The statement a block opened on the builder turns into once it is closed.
#[derive(Debug)]
enum Open {
    Kernel,
    If {
        cond: CExpr,
        then: Option<Vec<Stmt>>,
    },
    Where {
        cond: BExpr,
        then: Option<Vec<Stmt>>,
    },
    While(CExpr),
    For(CExpr, Stmt),
}

#[derive(Debug)]
struct Frame {
    open: Open,
    stmts: Vec<Stmt>,
}

/// Builds the statement tree of one kernel.
///
/// The builder keeps a stack of open blocks, statements are added to the innermost one. Blocks
/// are opened by [`if_`](Self::if_), [`where_`](Self::where_), [`while_`](Self::while_) and
/// [`for_`](Self::for_) and closed by [`end`](Self::end).
///
/// ```
/// # use qpu_lib::ast::*;
/// let mut kernel = KernelBuilder::new();
/// let x = kernel.fresh_var();
/// kernel.assign(x.clone(), Expr::Var(Var::ElemNum));
/// kernel.where_(BExpr::cmp(x.clone(), CmpKind::Lt, BaseType::Int, Expr::Int(8)));
/// kernel.assign(x.clone(), Expr::Int(0));
/// kernel.end();
/// let (stmt, num_vars) = kernel.finish();
///
/// assert_eq!(1, num_vars);
/// assert!(matches!(stmt, Stmt::Seq(stmts) if stmts.len() == 2));
/// ```
#[derive(Debug)]
pub struct KernelBuilder {
    num_vars: VarId,
    stack: Vec<Frame>,
}

impl Default for KernelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelBuilder {
    pub fn new() -> Self {
        Self {
            num_vars: 0,
            stack: vec![Frame {
                open: Open::Kernel,
                stmts: Vec::new(),
            }],
        }
    }

    /// Returns a new kernel variable.
    pub fn fresh_var(&mut self) -> Expr {
        let id = self.num_vars;
        self.num_vars += 1;
        Expr::Var(Var::Standard(id))
    }

    pub fn push(&mut self, stmt: Stmt) {
        self.current().stmts.push(stmt);
    }

    pub fn assign(&mut self, lhs: Expr, rhs: Expr) {
        self.push(Stmt::Assign(lhs, rhs));
    }

    pub fn if_(&mut self, cond: CExpr) {
        self.open(Open::If { cond, then: None });
    }

    pub fn where_(&mut self, cond: BExpr) {
        self.open(Open::Where { cond, then: None });
    }

    pub fn while_(&mut self, cond: CExpr) {
        self.open(Open::While(cond));
    }

    /// Opens a loop that runs `inc` after every iteration of its body.
    pub fn for_(&mut self, cond: CExpr, inc: Stmt) {
        self.open(Open::For(cond, inc));
    }

    /// Switches the innermost `if` or `where` block to its else branch.
    ///
    /// # Panics
    ///
    /// Panics if the innermost block is no `if` or `where`, or is already in its else branch.
    pub fn else_(&mut self) {
        let frame = self.current();
        let then = match &mut frame.open {
            Open::If { then, .. } | Open::Where { then, .. } => then,
            open => panic!("else outside of an if or where block, in {open:?}"),
        };
        assert!(then.is_none(), "second else in the same block");
        *then = Some(std::mem::take(&mut frame.stmts));
    }

    /// Closes the innermost block.
    ///
    /// # Panics
    ///
    /// Panics if there is no open block.
    pub fn end(&mut self) {
        assert!(self.stack.len() > 1, "end without an open block");
        let Some(Frame { open, stmts }) = self.stack.pop() else {
            unreachable!("the kernel frame is never popped");
        };
        let body = Stmt::Seq(stmts);
        let stmt = match open {
            Open::If { cond, then } => match then {
                Some(then) => Stmt::If(cond, Box::new(Stmt::Seq(then)), Box::new(body)),
                None => Stmt::If(cond, Box::new(body), Box::new(Stmt::Skip)),
            },
            Open::Where { cond, then } => match then {
                Some(then) => Stmt::Where(cond, Box::new(Stmt::Seq(then)), Box::new(body)),
                None => Stmt::Where(cond, Box::new(body), Box::new(Stmt::Skip)),
            },
            Open::While(cond) => Stmt::While(cond, Box::new(body)),
            Open::For(cond, inc) => Stmt::For(cond, Box::new(inc), Box::new(body)),
            Open::Kernel => unreachable!("the kernel frame is never popped"),
        };
        self.push(stmt);
    }

    /// Returns the kernel and its number of variables.
    ///
    /// # Panics
    ///
    /// Panics if a block is still open.
    pub fn finish(mut self) -> (Stmt, VarId) {
        assert!(
            self.stack.len() == 1,
            "{} blocks are still open",
            self.stack.len() - 1
        );
        let stmts = std::mem::take(&mut self.current().stmts);
        (Stmt::Seq(stmts), self.num_vars)
    }

    fn open(&mut self, open: Open) {
        self.stack.push(Frame {
            open,
            stmts: Vec::new(),
        });
    }

    fn current(&mut self) -> &mut Frame {
        // the kernel frame is always on the stack
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }
}
