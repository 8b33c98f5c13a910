
use std::{
    fmt::{Result, Write},
    ops::Range,
};

use crate::{
    Alu, AssignCond, BranchCond, BranchTarget, Flag, Imm, InstrKind, Instruction, LoadImm,
    SetCond,
};

#[derive(Debug, Clone, Default)]
pub struct ListingConfig {
    /// If `true`, instruction comments are appended to their line.
    pub show_comments: bool,
    /// If `true`, every line starts with the index of its instruction.
    pub show_indices: bool,
}

/// Formats instruction lists as human readable listings.
///
/// A mutable reference to the writer---an implementor of [`std::fmt::Write`]---must be passed to
/// [`new`](Self::new). Then instruction lists can be formatted using
/// [`write_listing`](Self::write_listing), which also returns where each instruction ended up in
/// the output, so diagnostics can point at instructions.
///
/// Every instruction takes exactly one line. Labels are not indented:
///
/// ```text
///     v0 = UNIFORM
/// L0:
///     v1 = add(v0, 1) where ZC; setf Z
///     if any(ZC) goto L0
/// ```
pub struct ListingOutputter<'w, W: std::fmt::Write> {
    writer: &'w mut W,
    config: ListingConfig,
    /// Number of bytes written so far.
    written: usize,
}

impl<'w, W: std::fmt::Write> ListingOutputter<'w, W> {
    pub fn new(writer: &'w mut W) -> Self {
        Self {
            writer,
            config: Default::default(),
            written: 0,
        }
    }

    pub fn with_config(self, config: ListingConfig) -> Self {
        Self { config, ..self }
    }

    /// Writes one line per instruction. Returns, per instruction, the byte range of its line
    /// (without the newline) relative to where the outputter started writing.
    pub fn write_listing(
        &mut self,
        instrs: &[Instruction],
    ) -> std::result::Result<Vec<Range<usize>>, std::fmt::Error> {
        let mut spans = Vec::with_capacity(instrs.len());
        for (i, instr) in instrs.iter().enumerate() {
            if self.config.show_indices {
                write!(self, "{i:>4}: ")?;
            }
            let start = self.written;
            if instr.label().is_none() {
                self.write_str("    ")?;
            }
            self.write_instruction(instr)?;
            if self.config.show_comments {
                if let Some(comment) = &instr.comment {
                    write!(self, "  # {comment}")?;
                }
            }
            spans.push(start..self.written);
            self.write_char('\n')?;
        }
        Ok(spans)
    }

    pub fn write_instruction(&mut self, value: &Instruction) -> Result {
        match &value.kind {
            InstrKind::Nop => self.write_str("nop"),
            InstrKind::Alu(alu) => self.write_alu(alu),
            InstrKind::LoadImm(li) => self.write_load_imm(li),
            InstrKind::Branch(branch) => {
                if branch.cond != BranchCond::Always {
                    write!(self, "if {} ", branch.cond)?;
                }
                match &branch.target {
                    BranchTarget::Label(label) => write!(self, "goto {label}"),
                    BranchTarget::Relative(offset) => write!(self, "goto {offset:+}"),
                }
            }
            InstrKind::Label(label) => write!(self, "{label:#}"),
            InstrKind::Recv { dest } => write!(self, "recv({dest})"),
            InstrKind::SemaInc(sema) => write!(self, "sema_inc({sema})"),
            InstrKind::SemaDec(sema) => write!(self, "sema_dec({sema})"),
            InstrKind::Tmu0ToAcc4 => self.write_str("tmu0_to_acc4"),
            InstrKind::End => self.write_str("end"),
            InstrKind::Skip => self.write_str("skip"),
        }
    }

    fn write_alu(&mut self, alu: &Alu) -> Result {
        if alu.op == crate::AluOp::Or && alu.src_a == alu.src_b {
            write!(self, "{} = {}", alu.dest, alu.src_a)?;
        } else if alu.op.is_unary() {
            write!(self, "{} = {}({})", alu.dest, alu.op.name(), alu.src_a)?;
        } else {
            write!(
                self,
                "{} = {}({}, {})",
                alu.dest,
                alu.op.name(),
                alu.src_a,
                alu.src_b
            )?;
        }
        self.write_conds(alu.cond, alu.set_cond)
    }

    fn write_load_imm(&mut self, li: &LoadImm) -> Result {
        write!(self, "{} = li {}", li.dest, li.imm)?;
        self.write_conds(li.cond, li.set_cond)
    }

    fn write_conds(&mut self, cond: AssignCond, set_cond: SetCond) -> Result {
        if !cond.is_always() {
            write!(self, " where {cond}")?;
        }
        if set_cond != SetCond::None {
            write!(self, "; setf {set_cond}")?;
        }
        Ok(())
    }
}

impl<W: std::fmt::Write> std::fmt::Write for ListingOutputter<'_, W> {
    fn write_str(&mut self, s: &str) -> Result {
        self.written += s.len();
        self.writer.write_str(s)
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result {
        ListingOutputter::new(f).write_instruction(self)
    }
}

impl std::fmt::Display for Flag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result {
        f.write_str(match self {
            Self::ZS => "ZS",
            Self::ZC => "ZC",
            Self::NS => "NS",
            Self::NC => "NC",
        })
    }
}

impl std::fmt::Display for AssignCond {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result {
        match self {
            Self::Always => f.write_str("always"),
            Self::Never => f.write_str("never"),
            Self::Flag(flag) => flag.fmt(f),
        }
    }
}

impl std::fmt::Display for SetCond {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Z => "Z",
            Self::N => "N",
            Self::C => "C",
        })
    }
}

impl std::fmt::Display for BranchCond {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result {
        match self {
            Self::Always => f.write_str("always"),
            Self::All(flag) => write!(f, "all({flag})"),
            Self::Any(flag) => write!(f, "any({flag})"),
        }
    }
}

impl std::fmt::Display for Imm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x:?}"),
        }
    }
}
