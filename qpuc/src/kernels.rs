//! The kernels `qpuc` can compile.

use clap::ValueEnum;
use qpu_lib::ast::{
    BExpr, BaseType, CExpr, CmpKind, Expr, KernelBuilder, Op, OpKind, Stmt, Var, VarId,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum DemoKernel {
    /// Stores the element numbers at the address in the first parameter.
    Hello,
    /// Adds two float vectors.
    Sum,
    /// Doubles the lower half of the elements and clears the rest.
    Where,
    /// Sums 0 up to the second parameter.
    Loop,
    /// Fetches two words per element and stores their sum.
    Gather,
}

impl DemoKernel {
    pub fn name(self) -> &'static str {
        match self {
            DemoKernel::Hello => "hello",
            DemoKernel::Sum => "sum",
            DemoKernel::Where => "where",
            DemoKernel::Loop => "loop",
            DemoKernel::Gather => "gather",
        }
    }

    pub fn build(self) -> (Stmt, VarId) {
        let mut k = KernelBuilder::new();
        match self {
            DemoKernel::Hello => {
                let out = k.fresh_var();
                k.assign(out.clone(), Var::Uniform.into());
                k.assign(Expr::deref(out), Var::ElemNum.into());
            }
            DemoKernel::Sum => {
                let a = k.fresh_var();
                let b = k.fresh_var();
                let out = k.fresh_var();
                k.assign(a.clone(), element_addr(Var::Uniform.into()));
                k.assign(b.clone(), element_addr(Var::Uniform.into()));
                k.assign(out.clone(), element_addr(Var::Uniform.into()));
                let sum = Expr::apply(
                    Expr::deref(a),
                    Op::float(OpKind::Add),
                    Expr::deref(b),
                );
                k.push(Stmt::Store(sum, out));
            }
            DemoKernel::Where => {
                let out = k.fresh_var();
                let x = k.fresh_var();
                k.assign(out.clone(), Var::Uniform.into());
                k.assign(x.clone(), Var::ElemNum.into());
                k.where_(BExpr::cmp(x.clone(), CmpKind::Lt, BaseType::Int, Expr::Int(8)));
                k.assign(
                    x.clone(),
                    Expr::apply(x.clone(), Op::int(OpKind::Shl), Expr::Int(1)),
                );
                k.else_();
                k.assign(x.clone(), Expr::Int(0));
                k.end();
                k.push(Stmt::Store(x, out));
            }
            DemoKernel::Loop => {
                let out = k.fresh_var();
                let n = k.fresh_var();
                let i = k.fresh_var();
                let total = k.fresh_var();
                k.assign(out.clone(), Var::Uniform.into());
                k.assign(n.clone(), Var::Uniform.into());
                k.assign(i.clone(), Expr::Int(0));
                k.assign(total.clone(), Expr::Int(0));
                let cond = CExpr::Any(BExpr::cmp(i.clone(), CmpKind::Lt, BaseType::Int, n));
                let inc = Stmt::assign(
                    i.clone(),
                    Expr::apply(i.clone(), Op::int(OpKind::Add), Expr::Int(1)),
                );
                k.for_(cond, inc);
                k.assign(
                    total.clone(),
                    Expr::apply(total.clone(), Op::int(OpKind::Add), i),
                );
                k.end();
                k.push(Stmt::Store(total, out));
            }
            DemoKernel::Gather => {
                let src = k.fresh_var();
                let out = k.fresh_var();
                let x = k.fresh_var();
                let y = k.fresh_var();
                k.assign(src.clone(), element_addr(Var::Uniform.into()));
                k.assign(out.clone(), Var::Uniform.into());
                k.push(Stmt::Gather(src.clone()));
                k.push(Stmt::Gather(Expr::apply(
                    src,
                    Op::int(OpKind::Add),
                    Expr::Int(64),
                )));
                k.push(Stmt::Receive(x.clone()));
                k.push(Stmt::Receive(y.clone()));
                k.push(Stmt::Store(
                    Expr::apply(x, Op::int(OpKind::Add), y),
                    out,
                ));
            }
        }
        k.finish()
    }
}

/// `base + 4 * elem_num`, the address of this element's word in a vector at `base`.
fn element_addr(base: Expr) -> Expr {
    let offset = Expr::apply(Var::ElemNum.into(), Op::int(OpKind::Shl), Expr::Int(2));
    Expr::apply(base, Op::int(OpKind::Add), offset)
}
