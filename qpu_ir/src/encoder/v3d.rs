//! VideoCore VI (v3d 4.x) instruction encoding.
//!
//! ALU instruction layout:
//!
//! | bits  | field   | bits  | field   |
//! | ----- | ------- | ----- | ------- |
//! | 63:58 | op_mul  | 31:24 | op_add  |
//! | 57:53 | signal  | 23:21 | mul_b   |
//! | 52:46 | cond    | 20:18 | mul_a   |
//! | 45    | mm      | 17:15 | add_b   |
//! | 44    | ma      | 14:12 | add_a   |
//! | 43:38 | waddr_m | 11:6  | raddr_a |
//! | 37:32 | waddr_a | 5:0   | raddr_b |
//!
//! There is a single register file, both read addresses index it. `ma`/`mm` select the magic
//! write addresses (accumulators and peripherals) instead of the register file.
//!
//! The opcode values below follow the v3d 4.1 tables for the ops this compiler emits.

use super::field;
use crate::{
    Alu, AluOp, AssignCond, Branch, BranchCond, BranchTarget, Flag, InstrKind, Instruction,
    Reg, RegOrImm, SetCond, Special,
};

mod sig {
    pub const NONE: u64 = 0;
    pub const THRSW: u64 = 1;
    pub const LDTMU: u64 = 4;
    pub const LDUNIFRF: u64 = 12;
    pub const SMALL_IMM: u64 = 15;
    pub const BRANCH: u64 = 16;
    pub const ROTATE: u64 = 23;
}

mod magic {
    pub const NOP: u64 = 6;
    pub const TMUD: u64 = 11;
    pub const TMUA: u64 = 12;
    pub const RECIP: u64 = 19;
    pub const RSQRT: u64 = 20;
    pub const EXP: u64 = 21;
    pub const LOG: u64 = 22;
}

const ADD_NOP: u64 = 187;
const MUL_NOP: u64 = 15;
/// `mux_b` value that turns the mul nop opcode into a nop.
const MUL_NOP_MUX: u64 = 4;
/// `mux_b` value that turns the mul nop opcode into a move.
const MUL_MOV_MUX: u64 = 7;

/// A write address together with its magic bit.
#[derive(Debug, Clone, Copy)]
struct WriteAddr {
    addr: u64,
    magic: bool,
}

impl WriteAddr {
    const NOP: Self = Self {
        addr: magic::NOP,
        magic: true,
    };

    /// The 7 bit form used in the condition field by signals that write a register.
    fn sig_form(self) -> u64 {
        (self.magic as u64) << 6 | self.addr
    }
}

struct AluWord {
    op_mul: u64,
    sig: u64,
    cond: u64,
    waddr_m: WriteAddr,
    waddr_a: WriteAddr,
    op_add: u64,
    mul_b: u64,
    mul_a: u64,
    add_b: u64,
    add_a: u64,
    raddr_a: u64,
    raddr_b: u64,
}

impl AluWord {
    fn nop(sig: u64) -> Self {
        Self {
            op_mul: MUL_NOP,
            sig,
            cond: 0,
            waddr_m: WriteAddr::NOP,
            waddr_a: WriteAddr::NOP,
            op_add: ADD_NOP,
            mul_b: MUL_NOP_MUX,
            mul_a: 0,
            add_b: 0,
            add_a: 0,
            raddr_a: 0,
            raddr_b: 0,
        }
    }

    fn pack(&self) -> u64 {
        field(self.op_mul, 58, 6)
            | field(self.sig, 53, 5)
            | field(self.cond, 46, 7)
            | field(self.waddr_m.magic as u64, 45, 1)
            | field(self.waddr_a.magic as u64, 44, 1)
            | field(self.waddr_m.addr, 38, 6)
            | field(self.waddr_a.addr, 32, 6)
            | field(self.op_add, 24, 8)
            | field(self.mul_b, 21, 3)
            | field(self.mul_a, 18, 3)
            | field(self.add_b, 15, 3)
            | field(self.add_a, 12, 3)
            | field(self.raddr_a, 6, 6)
            | field(self.raddr_b, 0, 6)
    }
}

/// Appends the words of `instr` to `words`. `End` takes three words: a thread switch with two
/// delay slots.
pub fn encode_instr(instr: &Instruction, words: &mut Vec<u64>) {
    match &instr.kind {
        InstrKind::Nop => words.push(AluWord::nop(sig::NONE).pack()),
        InstrKind::Alu(alu) => words.push(encode_alu(alu)),
        InstrKind::Recv { dest } => {
            let mut word = AluWord::nop(sig::LDTMU);
            word.cond = write_addr(*dest).sig_form();
            words.push(word.pack());
        }
        InstrKind::Branch(branch) => words.push(encode_branch(branch)),
        InstrKind::End => {
            words.push(AluWord::nop(sig::THRSW).pack());
            words.push(AluWord::nop(sig::NONE).pack());
            words.push(AluWord::nop(sig::NONE).pack());
        }
        InstrKind::LoadImm(li) => panic!("load of {:?} into {} was not expanded", li.imm, li.dest),
        InstrKind::SemaInc(_) | InstrKind::SemaDec(_) => {
            panic!("semaphores have no v3d encoding")
        }
        InstrKind::Tmu0ToAcc4 => panic!("tmu0_to_acc4 has no v3d encoding, use recv"),
        InstrKind::Label(label) => panic!("label {label} was not removed"),
        InstrKind::Skip => panic!("skip was not removed"),
    }
}

fn write_addr(reg: Reg) -> WriteAddr {
    let (addr, magic) = match reg {
        Reg::A(n) if n < 64 => (n as u64, false),
        Reg::Acc(n) if n <= 5 => (n as u64, true),
        Reg::Special(special) => match special {
            Special::TmuData => (magic::TMUD, true),
            Special::TmuAddr => (magic::TMUA, true),
            Special::SfuRecip => (magic::RECIP, true),
            Special::SfuRecipSqrt => (magic::RSQRT, true),
            Special::SfuExp => (magic::EXP, true),
            Special::SfuLog => (magic::LOG, true),
            special => panic!("{special} can not be written on v3d"),
        },
        Reg::Var(var) => panic!("v{var} was not allocated"),
        reg => panic!("{reg} can not be written on v3d"),
    };
    WriteAddr { addr, magic }
}

/// Returns the opcode and, for ops that encode a sub-op in `mux_b`, the fixed `mux_b` value.
fn add_op(op: AluOp) -> (u64, Option<u64>) {
    match op {
        AluOp::FAdd => (0, None),
        AluOp::Add => (56, None),
        AluOp::Sub => (60, None),
        AluOp::FSub => (64, None),
        AluOp::Min => (120, None),
        AluOp::Max => (121, None),
        AluOp::Shl => (124, None),
        AluOp::Shr => (125, None),
        AluOp::Asr => (126, None),
        AluOp::Ror => (127, None),
        AluOp::FMin => (128, None),
        AluOp::FMax => (129, None),
        AluOp::And => (181, None),
        AluOp::Or => (182, None),
        AluOp::Xor => (183, None),
        AluOp::Not => (186, Some(0)),
        AluOp::Clz => (186, Some(3)),
        AluOp::FtoI => (245, Some(3)),
        AluOp::ItoF => (252, Some(4)),
        AluOp::FMinAbs | AluOp::FMaxAbs => panic!("{} is not available on v3d", op.name()),
        op => unreachable!("{} is a mul op", op.name()),
    }
}

fn mul_op(op: AluOp) -> (u64, Option<u64>) {
    match op {
        AluOp::FMul => (16, None),
        AluOp::Mul24 => (3, None),
        AluOp::Rotate => (MUL_NOP, Some(MUL_MOV_MUX)),
        AluOp::V8Min | AluOp::V8Max => panic!("{} is not available on v3d", op.name()),
        op => unreachable!("{} is an add op", op.name()),
    }
}

fn set_flags(set_cond: SetCond) -> u64 {
    match set_cond {
        SetCond::None => 0,
        SetCond::Z => 1,
        SetCond::N => 2,
        SetCond::C => 3,
    }
}

/// Packs the condition and flag push of an add (`mul == false`) or mul instruction into the
/// 7 bit condition field. The field can not hold both a condition and a flag push.
fn cond_field(cond: AssignCond, set_cond: SetCond, mul: bool) -> u64 {
    let push = set_flags(set_cond);
    let flag = match cond {
        AssignCond::Always => None,
        AssignCond::Flag(flag) => Some(flag),
        AssignCond::Never => panic!("v3d has no never condition"),
    };
    match flag {
        None if mul && push != 0 => 1 << 4 | push,
        None => push,
        Some(flag) => {
            assert!(push == 0, "a v3d instruction can't both be conditional and set flags");
            // ifa for the set flags, ifna for the cleared ones
            let ifa = if flag.is_set() { 0 } else { 2 };
            if mul {
                0b11 << 4 | ifa << 2
            } else {
                1 << 5 | ifa << 2
            }
        }
    }
}

#[derive(Default)]
struct Reads {
    raddr_a: Option<u64>,
    raddr_b: Option<u64>,
    small_imm: bool,
}

impl Reads {
    fn mux(&mut self, operand: RegOrImm) -> u64 {
        match operand {
            RegOrImm::Imm(imm) => {
                self.small_imm = true;
                self.claim_b(imm.encode() as u64)
            }
            RegOrImm::Reg(Reg::Acc(n)) if n <= 5 => n as u64,
            RegOrImm::Reg(Reg::A(n)) if n < 64 => {
                let addr = n as u64;
                if self.raddr_a.map_or(true, |taken| taken == addr) {
                    self.raddr_a = Some(addr);
                    6
                } else {
                    self.claim_b(addr)
                }
            }
            RegOrImm::Reg(Reg::Var(var)) => panic!("v{var} was not allocated"),
            RegOrImm::Reg(reg) => panic!("{reg} can not be an operand on v3d"),
        }
    }

    fn claim_b(&mut self, addr: u64) -> u64 {
        match self.raddr_b {
            Some(taken) if taken != addr => {
                panic!("read address b is needed for both {taken} and {addr}")
            }
            _ => self.raddr_b = Some(addr),
        }
        7
    }
}

fn encode_alu(alu: &Alu) -> u64 {
    let dest = write_addr(alu.dest);

    // moves out of special registers use dedicated signals or ops
    if alu.op == AluOp::Or && alu.src_a == alu.src_b {
        if let RegOrImm::Reg(Reg::Special(special)) = alu.src_a {
            return encode_special_read(alu, special, dest);
        }
    }

    let mut reads = Reads::default();
    let mux_a = reads.mux(alu.src_a);
    let mux_b = if alu.op.is_unary() {
        0
    } else {
        reads.mux(alu.src_b)
    };

    let mut word = AluWord::nop(if reads.small_imm {
        sig::SMALL_IMM
    } else {
        sig::NONE
    });
    word.cond = cond_field(alu.cond, alu.set_cond, alu.op.is_mul());

    if alu.op == AluOp::Rotate {
        // the rotate amount takes the place of the small immediate
        let amount = match alu.src_b {
            RegOrImm::Imm(crate::SmallImm::Rotate(n)) => n as u64,
            operand => panic!("invalid rotate amount {operand}"),
        };
        word.sig = sig::ROTATE;
        word.raddr_b = amount;
        word.raddr_a = reads.raddr_a.unwrap_or(0);
        word.op_mul = MUL_NOP;
        word.mul_a = mux_a;
        word.mul_b = MUL_MOV_MUX;
        word.waddr_m = dest;
        return word.pack();
    }

    word.raddr_a = reads.raddr_a.unwrap_or(0);
    word.raddr_b = reads.raddr_b.unwrap_or(0);
    if alu.op.is_mul() {
        let (op, fixed_mux) = mul_op(alu.op);
        word.op_mul = op;
        word.mul_a = mux_a;
        word.mul_b = fixed_mux.unwrap_or(mux_b);
        word.waddr_m = dest;
    } else {
        let (op, fixed_mux) = add_op(alu.op);
        word.op_add = op;
        word.add_a = mux_a;
        word.add_b = fixed_mux.unwrap_or(mux_b);
        word.waddr_a = dest;
    }
    word.pack()
}

fn encode_special_read(alu: &Alu, special: Special, dest: WriteAddr) -> u64 {
    match special {
        Special::Uniform => {
            assert!(
                alu.cond.is_always() && alu.set_cond == SetCond::None,
                "uniform loads can't be conditional or set flags"
            );
            let mut word = AluWord::nop(sig::LDUNIFRF);
            word.cond = dest.sig_form();
            word.pack()
        }
        Special::ElemNum | Special::QpuNum => {
            let mut word = AluWord::nop(sig::NONE);
            word.cond = cond_field(alu.cond, alu.set_cond, false);
            word.op_add = ADD_NOP;
            word.add_b = 2;
            word.add_a = if special == Special::ElemNum { 1 } else { 0 };
            word.waddr_a = dest;
            word.pack()
        }
        special => panic!("{special} can not be read on v3d"),
    }
}

fn branch_cond(cond: BranchCond) -> u64 {
    let all_set = |flag: Flag| if flag.is_set() { 4 } else { 7 };
    let any_set = |flag: Flag| if flag.is_set() { 6 } else { 5 };
    match cond {
        BranchCond::Always => 0,
        BranchCond::All(flag) => all_set(flag),
        BranchCond::Any(flag) => any_set(flag),
    }
}

fn encode_branch(branch: &Branch) -> u64 {
    let offset = match &branch.target {
        BranchTarget::Relative(offset) => *offset,
        BranchTarget::Label(label) => panic!("branch to {label} was not resolved"),
    };
    let bytes = (offset * 8) as u32 as u64;
    field(sig::BRANCH, 53, 5)
        | field((bytes & 0xff_ffff) >> 3, 35, 21)
        | field(branch_cond(branch.cond), 32, 3)
        | field(bytes >> 24, 24, 8)
        // branch destination relative to the current instruction
        | field(1, 12, 2)
}
