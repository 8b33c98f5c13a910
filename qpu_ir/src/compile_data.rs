use crate::Instruction;

/// Data collected while compiling a kernel, for diagnosis.
///
/// The dumps are only filled in when asked for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompileData {
    /// The code compile diagnostics point into: the lowered code if lowering failed, otherwise
    /// the optimized code before register allocation.
    pub diagnostic_code: Vec<Instruction>,
    pub target_code_before_optimization: String,
    pub target_code_after_optimization: String,
    pub liveness_dump: String,
    pub reg_usage_dump: String,
    pub allocated_registers_dump: String,
    pub num_accs_introduced: usize,
    pub num_instrs_combined: usize,
    pub num_liveness_iterations: usize,
}

impl CompileData {
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl std::fmt::Display for CompileData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dumps = [
            ("Target code before optimization", &self.target_code_before_optimization),
            ("Liveness", &self.liveness_dump),
            ("Register usage", &self.reg_usage_dump),
            ("Allocated registers", &self.allocated_registers_dump),
            ("Target code after optimization", &self.target_code_after_optimization),
        ];
        for (title, dump) in dumps {
            if !dump.is_empty() {
                writeln!(f, "# {title}")?;
                writeln!(f, "{dump}")?;
            }
        }
        writeln!(f, "Accumulators introduced: {}", self.num_accs_introduced)?;
        writeln!(f, "Instructions combined: {}", self.num_instrs_combined)?;
        writeln!(f, "Liveness iterations: {}", self.num_liveness_iterations)
    }
}
