use std::rc::Rc;

use arrayvec::ArrayVec;

use crate::{Label, Reg, Special};

/// Index of an instruction in an instruction list.
pub type InstrId = usize;

/// Constructors for instructions.
///
/// All of them assert that the registers they get are legal for the way they are used.
pub mod instr {
    use super::*;

    pub fn nop() -> Instruction {
        Instruction::new(InstrKind::Nop)
    }

    /// Applies `op` to `src_a` and `src_b` and stores the result in `dest`.
    pub fn alu(
        dest: Reg,
        op: AluOp,
        src_a: impl Into<RegOrImm>,
        src_b: impl Into<RegOrImm>,
    ) -> Instruction {
        let src_a = src_a.into();
        let src_b = src_b.into();
        assert!(dest.can_write(), "{dest} can not be written");
        for src in [src_a, src_b] {
            if let RegOrImm::Reg(reg) = src {
                assert!(reg.can_read(), "{reg} can not be read");
            }
        }
        Instruction::new(InstrKind::Alu(Alu {
            cond: AssignCond::Always,
            set_cond: SetCond::None,
            dest,
            op,
            src_a,
            src_b,
        }))
    }

    /// Copies `src` into `dest`. A move is a bitwise or of the source with itself.
    pub fn mov(dest: Reg, src: impl Into<RegOrImm>) -> Instruction {
        let src = src.into();
        alu(dest, AluOp::Or, src, src)
    }

    pub fn add(dest: Reg, a: impl Into<RegOrImm>, b: impl Into<RegOrImm>) -> Instruction {
        alu(dest, AluOp::Add, a, b)
    }

    pub fn sub(dest: Reg, a: impl Into<RegOrImm>, b: impl Into<RegOrImm>) -> Instruction {
        alu(dest, AluOp::Sub, a, b)
    }

    pub fn shl(dest: Reg, a: impl Into<RegOrImm>, b: impl Into<RegOrImm>) -> Instruction {
        alu(dest, AluOp::Shl, a, b)
    }

    pub fn and(dest: Reg, a: impl Into<RegOrImm>, b: impl Into<RegOrImm>) -> Instruction {
        alu(dest, AluOp::And, a, b)
    }

    pub fn or(dest: Reg, a: impl Into<RegOrImm>, b: impl Into<RegOrImm>) -> Instruction {
        alu(dest, AluOp::Or, a, b)
    }

    /// Rotates the vector in `src` over `amount` elements. The source has to be an
    /// accumulator, an amount of `SmallImm::Rotate(0)` rotates by the value in `r5`.
    pub fn rotate(dest: Reg, src: Reg, amount: SmallImm) -> Instruction {
        assert!(src.is_acc(), "rotate source {src} is not an accumulator");
        assert!(
            matches!(amount, SmallImm::Rotate(_)),
            "{amount} is not a rotate amount"
        );
        alu(dest, AluOp::Rotate, src, amount)
    }

    /// Loads a 32 bit immediate into `dest`.
    pub fn li(dest: Reg, imm: Imm) -> Instruction {
        assert!(dest.can_write(), "{dest} can not be written");
        Instruction::new(InstrKind::LoadImm(LoadImm {
            cond: AssignCond::Always,
            set_cond: SetCond::None,
            dest,
            imm,
        }))
    }

    pub fn branch(cond: BranchCond, label: Label) -> Instruction {
        Instruction::new(InstrKind::Branch(Branch {
            cond,
            target: BranchTarget::Label(label),
        }))
    }

    /// Unconditional branch.
    pub fn jump(label: Label) -> Instruction {
        branch(BranchCond::Always, label)
    }

    pub fn label(label: Label) -> Instruction {
        Instruction::new(InstrKind::Label(label))
    }

    /// Takes the next value of the TMU fifo and stores it in `dest`.
    pub fn recv(dest: Reg) -> Instruction {
        assert!(dest.can_write(), "{dest} can not be written");
        Instruction::new(InstrKind::Recv { dest })
    }

    pub fn sema_inc(sema: u8) -> Instruction {
        assert!(sema < 16, "semaphore {sema} does not exist");
        Instruction::new(InstrKind::SemaInc(sema))
    }

    pub fn sema_dec(sema: u8) -> Instruction {
        assert!(sema < 16, "semaphore {sema} does not exist");
        Instruction::new(InstrKind::SemaDec(sema))
    }

    pub fn tmu0_to_acc4() -> Instruction {
        Instruction::new(InstrKind::Tmu0ToAcc4)
    }

    pub fn end() -> Instruction {
        Instruction::new(InstrKind::End)
    }
}

/// A condition flag, as set by an earlier instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Zero set
    ZS,
    /// Zero clear
    ZC,
    /// Negative set
    NS,
    /// Negative clear
    NC,
}

impl Flag {
    pub fn negate(self) -> Self {
        match self {
            Self::ZS => Self::ZC,
            Self::ZC => Self::ZS,
            Self::NS => Self::NC,
            Self::NC => Self::NS,
        }
    }

    /// Returns `true` if the flag tests the set state of its bit.
    pub fn is_set(self) -> bool {
        matches!(self, Self::ZS | Self::NS)
    }
}

/// The per element condition under which an instruction writes its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignCond {
    Always,
    Never,
    Flag(Flag),
}

impl AssignCond {
    pub fn negate(self) -> Self {
        match self {
            Self::Always => Self::Never,
            Self::Never => Self::Always,
            Self::Flag(flag) => Self::Flag(flag.negate()),
        }
    }

    pub fn is_always(self) -> bool {
        self == Self::Always
    }
}

/// Which flags an instruction updates from its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetCond {
    None,
    Z,
    N,
    C,
}

/// The condition of a branch, combining the flags of all vector elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchCond {
    Always,
    /// Taken if the flag holds for every element.
    All(Flag),
    /// Taken if the flag holds for at least one element.
    Any(Flag),
}

impl BranchCond {
    /// Returns the condition under which the branch is not taken.
    ///
    /// Panics for `Always`, as there is no branch condition that is never taken.
    pub fn negate(self) -> Self {
        match self {
            Self::Always => panic!("an unconditional branch can not be negated"),
            Self::All(flag) => Self::Any(flag.negate()),
            Self::Any(flag) => Self::All(flag.negate()),
        }
    }
}

/// A full 32 bit immediate, as used by `LoadImm`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Imm {
    Int(i32),
    Float(f32),
}

impl Imm {
    /// The bit pattern of the immediate.
    pub fn bits(self) -> u32 {
        match self {
            Self::Int(i) => i as u32,
            Self::Float(f) => f.to_bits(),
        }
    }

    /// Returns the small immediate with the same value, if there is one.
    pub fn to_small(self) -> Option<SmallImm> {
        match self {
            Self::Int(i) => SmallImm::int(i),
            Self::Float(f) => SmallImm::float(f),
        }
    }
}

/// An immediate that fits in the read address of register file B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SmallImm {
    /// -16 up to 15
    Int(i8),
    /// Powers of two `2^e` with `e` in -8 up to 7.
    Float(i8),
    /// Vector rotation amount, 0 rotates by the amount in `r5`.
    Rotate(u8),
}

impl SmallImm {
    pub fn int(value: i32) -> Option<Self> {
        (-16..=15).contains(&value).then_some(Self::Int(value as i8))
    }

    pub fn float(value: f32) -> Option<Self> {
        let bits = value.to_bits();
        // positive, normal, and no mantissa bits
        if bits >> 31 != 0 || bits & 0x007f_ffff != 0 {
            return None;
        }
        let exp = ((bits >> 23) & 0xff) as i32 - 127;
        (-8..=7).contains(&exp).then_some(Self::Float(exp as i8))
    }

    pub fn rotate(amount: u8) -> Self {
        assert!(amount < 16, "can not rotate over {amount} elements");
        Self::Rotate(amount)
    }

    /// The 6 bit code of the immediate, shared by vc4 and v3d.
    pub fn encode(self) -> u8 {
        match self {
            Self::Int(i) if i >= 0 => i as u8,
            Self::Int(i) => (32 + i as i32) as u8,
            Self::Float(e) if e >= 0 => 32 + e as u8,
            Self::Float(e) => (48 + e as i32) as u8,
            Self::Rotate(n) => 48 + n,
        }
    }
}

impl std::fmt::Display for SmallImm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(e) => write!(f, "{:?}", 2f32.powi(*e as i32)),
            Self::Rotate(0) => write!(f, "r5"),
            Self::Rotate(n) => write!(f, "{n}"),
        }
    }
}

/// An ALU operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegOrImm {
    Reg(Reg),
    Imm(SmallImm),
}

impl RegOrImm {
    pub fn as_reg(&self) -> Option<Reg> {
        match self {
            Self::Reg(reg) => Some(*reg),
            Self::Imm(_) => None,
        }
    }
}

impl From<Reg> for RegOrImm {
    fn from(value: Reg) -> Self {
        Self::Reg(value)
    }
}

impl From<Special> for RegOrImm {
    fn from(value: Special) -> Self {
        Self::Reg(Reg::Special(value))
    }
}

impl From<SmallImm> for RegOrImm {
    fn from(value: SmallImm) -> Self {
        Self::Imm(value)
    }
}

impl std::fmt::Display for RegOrImm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reg(reg) => reg.fmt(f),
            Self::Imm(imm) => imm.fmt(f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluOp {
    // add pipe
    FAdd,
    FSub,
    FMin,
    FMax,
    FMinAbs,
    FMaxAbs,
    FtoI,
    ItoF,
    Add,
    Sub,
    Shr,
    Asr,
    Ror,
    Shl,
    Min,
    Max,
    And,
    Or,
    Xor,
    Not,
    Clz,
    // mul pipe
    FMul,
    Mul24,
    V8Min,
    V8Max,
    Rotate,
}

impl AluOp {
    /// Returns `true` if the operation executes on the multiply pipeline.
    pub fn is_mul(self) -> bool {
        matches!(
            self,
            Self::FMul | Self::Mul24 | Self::V8Min | Self::V8Max | Self::Rotate
        )
    }

    /// Returns `true` if the operation only reads its first operand.
    pub fn is_unary(self) -> bool {
        matches!(self, Self::FtoI | Self::ItoF | Self::Not | Self::Clz)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::FAdd => "fadd",
            Self::FSub => "fsub",
            Self::FMin => "fmin",
            Self::FMax => "fmax",
            Self::FMinAbs => "fminabs",
            Self::FMaxAbs => "fmaxabs",
            Self::FtoI => "ftoi",
            Self::ItoF => "itof",
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Shr => "shr",
            Self::Asr => "asr",
            Self::Ror => "ror",
            Self::Shl => "shl",
            Self::Min => "min",
            Self::Max => "max",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Not => "not",
            Self::Clz => "clz",
            Self::FMul => "fmul",
            Self::Mul24 => "mul24",
            Self::V8Min => "v8min",
            Self::V8Max => "v8max",
            Self::Rotate => "rotate",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alu {
    pub cond: AssignCond,
    pub set_cond: SetCond,
    pub dest: Reg,
    pub op: AluOp,
    pub src_a: RegOrImm,
    pub src_b: RegOrImm,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadImm {
    pub cond: AssignCond,
    pub set_cond: SetCond,
    pub dest: Reg,
    pub imm: Imm,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchTarget {
    Label(Label),
    /// Offset in instructions, counted from the instruction after the delay slots.
    Relative(i32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub cond: BranchCond,
    pub target: BranchTarget,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstrKind {
    Nop,
    Alu(Alu),
    LoadImm(LoadImm),
    Branch(Branch),
    Label(Label),
    Recv { dest: Reg },
    SemaInc(u8),
    SemaDec(u8),
    Tmu0ToAcc4,
    End,
    /// An instruction that was removed. Skips are dropped when the list is compacted.
    Skip,
}

/// A single QPU instruction, together with an optional comment that is shown in listings.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub kind: InstrKind,
    pub comment: Option<Rc<str>>,
}

impl Instruction {
    pub fn new(kind: InstrKind) -> Self {
        Self {
            kind,
            comment: None,
        }
    }

    /// Makes the write of the destination conditional. Panics if the instruction has no
    /// destination that can be predicated.
    pub fn when(mut self, cond: AssignCond) -> Self {
        match &mut self.kind {
            InstrKind::Alu(Alu { cond: c, .. }) | InstrKind::LoadImm(LoadImm { cond: c, .. }) => {
                *c = cond
            }
            kind => panic!("{kind:?} can not be predicated"),
        }
        self
    }

    /// Makes the instruction update the flags. Panics if the instruction can't set flags.
    pub fn set_flags(mut self, set_cond: SetCond) -> Self {
        match &mut self.kind {
            InstrKind::Alu(Alu { set_cond: s, .. })
            | InstrKind::LoadImm(LoadImm { set_cond: s, .. }) => *s = set_cond,
            kind => panic!("{kind:?} can not set flags"),
        }
        self
    }

    pub fn with_comment(mut self, comment: impl Into<Rc<str>>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// The register written by this instruction, if any.
    pub fn dest(&self) -> Option<Reg> {
        match &self.kind {
            InstrKind::Alu(alu) => Some(alu.dest),
            InstrKind::LoadImm(li) => Some(li.dest),
            InstrKind::Recv { dest } => Some(*dest),
            _ => None,
        }
    }

    /// The condition under which the destination is written. Instructions that don't have
    /// a condition always write their destination.
    pub fn cond(&self) -> AssignCond {
        match &self.kind {
            InstrKind::Alu(alu) => alu.cond,
            InstrKind::LoadImm(li) => li.cond,
            _ => AssignCond::Always,
        }
    }

    pub fn set_cond(&self) -> SetCond {
        match &self.kind {
            InstrKind::Alu(alu) => alu.set_cond,
            InstrKind::LoadImm(li) => li.set_cond,
            _ => SetCond::None,
        }
    }

    /// Returns `true` if the destination is only written for some vector elements.
    pub fn is_predicated(&self) -> bool {
        self.dest().is_some() && !self.cond().is_always()
    }

    /// Returns `true` for a move from the uniform stream. Every such read consumes a uniform,
    /// so the instruction can never be removed or moved.
    pub fn is_uniform_load(&self) -> bool {
        match &self.kind {
            InstrKind::Alu(alu) => {
                alu.src_a == RegOrImm::Reg(Reg::Special(Special::Uniform))
                    || alu.src_b == RegOrImm::Reg(Reg::Special(Special::Uniform))
            }
            _ => false,
        }
    }

    pub fn is_mov(&self) -> bool {
        matches!(&self.kind, InstrKind::Alu(alu) if alu.op == AluOp::Or && alu.src_a == alu.src_b)
    }

    /// Returns `true` for an unconditional move of a register into itself that doesn't set
    /// flags, which has no effect at all.
    pub fn is_self_move(&self) -> bool {
        match &self.kind {
            InstrKind::Alu(alu) => {
                self.is_mov()
                    && alu.src_a == RegOrImm::Reg(alu.dest)
                    && alu.cond.is_always()
                    && alu.set_cond == SetCond::None
            }
            _ => false,
        }
    }

    pub fn is_branch(&self) -> bool {
        matches!(self.kind, InstrKind::Branch(_))
    }

    pub fn is_uncond_branch(&self) -> bool {
        matches!(
            self.kind,
            InstrKind::Branch(Branch {
                cond: BranchCond::Always,
                ..
            })
        )
    }

    /// The label a branch jumps to.
    pub fn branch_label(&self) -> Option<&Label> {
        match &self.kind {
            InstrKind::Branch(Branch {
                target: BranchTarget::Label(label),
                ..
            }) => Some(label),
            _ => None,
        }
    }

    /// The label defined by a label pseudo instruction.
    pub fn label(&self) -> Option<&Label> {
        match &self.kind {
            InstrKind::Label(label) => Some(label),
            _ => None,
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self.kind, InstrKind::Skip)
    }

    /// Replaces the instruction by a tombstone.
    pub fn skip(&mut self) {
        self.kind = InstrKind::Skip;
        self.comment = None;
    }

    /// The registers explicitly read by the instruction.
    pub fn srcs(&self) -> ArrayVec<Reg, 2> {
        let mut srcs = ArrayVec::new();
        if let InstrKind::Alu(alu) = &self.kind {
            if let RegOrImm::Reg(reg) = alu.src_a {
                srcs.push(reg);
            }
            if let RegOrImm::Reg(reg) = alu.src_b {
                if !alu.op.is_unary() && !srcs.contains(&reg) {
                    srcs.push(reg);
                }
            }
        }
        srcs
    }

    /// Calls `f` on the destination register.
    pub fn map_defs(&mut self, mut f: impl FnMut(&mut Reg)) {
        match &mut self.kind {
            InstrKind::Alu(Alu { dest, .. })
            | InstrKind::LoadImm(LoadImm { dest, .. })
            | InstrKind::Recv { dest } => f(dest),
            _ => {}
        }
    }

    /// Calls `f` on every register operand.
    pub fn map_uses(&mut self, mut f: impl FnMut(&mut Reg)) {
        if let InstrKind::Alu(alu) = &mut self.kind {
            if let RegOrImm::Reg(reg) = &mut alu.src_a {
                f(reg);
            }
            if let RegOrImm::Reg(reg) = &mut alu.src_b {
                f(reg);
            }
        }
    }

    /// Replaces the destination `from` by `to`. Returns `true` if something was replaced.
    pub fn rename_dest(&mut self, from: Reg, to: Reg) -> bool {
        let mut renamed = false;
        self.map_defs(|reg| {
            if *reg == from {
                *reg = to;
                renamed = true;
            }
        });
        renamed
    }

    /// Replaces every operand `from` by `to`. Returns `true` if something was replaced.
    pub fn rename_uses(&mut self, from: Reg, to: Reg) -> bool {
        let mut renamed = false;
        self.map_uses(|reg| {
            if *reg == from {
                *reg = to;
                renamed = true;
            }
        });
        renamed
    }
}

impl From<InstrKind> for Instruction {
    fn from(value: InstrKind) -> Self {
        Self::new(value)
    }
}
