use crate::{Label, Reg, VarId};

/// Generates new variables.
#[derive(Debug, Clone)]
pub struct VarGenerator {
    next_var: VarId,
}

impl VarGenerator {
    /// Creates a generator whose first variable is `v{first}`. Ids below `first` are taken by
    /// the variables of the source program.
    pub fn new(first: VarId) -> Self {
        Self { next_var: first }
    }

    pub fn next_var(&mut self) -> Reg {
        let n = self.next_var;
        self.next_var += 1;
        Reg::Var(n)
    }

    /// The number of variables handed out so far, including the reserved ones.
    pub fn num_vars(&self) -> VarId {
        self.next_var
    }
}

/// Generates new unique labels.
#[derive(Debug, Clone, Default)]
pub struct LabelGenerator {
    next_label: u32,
}

impl LabelGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_label(&mut self) -> Label {
        let n = self.next_label;
        self.next_label += 1;
        Label::from(format!("L{n}"))
    }
}
