//! VideoCore IV instruction encoding.
//!
//! ALU instruction layout:
//!
//! | bits  | field     | bits  | field     |
//! | ----- | --------- | ----- | --------- |
//! | 63:60 | signal    | 31:29 | op_mul    |
//! | 59:57 | unpack    | 28:24 | op_add    |
//! | 56    | pm        | 23:18 | raddr_a   |
//! | 55:52 | pack      | 17:12 | raddr_b   |
//! | 51:49 | cond_add  | 11:9  | add_a     |
//! | 48:46 | cond_mul  | 8:6   | add_b     |
//! | 45    | sf        | 5:3   | mul_a     |
//! | 44    | ws        | 2:0   | mul_b     |
//! | 43:38 | waddr_add |       |           |
//! | 37:32 | waddr_mul |       |           |

use super::field;
use crate::{
    Alu, AluOp, AssignCond, Branch, BranchCond, BranchTarget, Flag, InstrKind, Instruction,
    LoadImm, Reg, RegOrImm, SetCond, Special,
};

mod sig {
    pub const NONE: u64 = 1;
    pub const PROG_END: u64 = 3;
    pub const LOAD_TMU0: u64 = 10;
    pub const SMALL_IMM: u64 = 13;
    pub const LOAD_IMM: u64 = 14;
    pub const BRANCH: u64 = 15;
}

/// Read and write address 39 is a no-op.
const NOP_ADDR: u64 = 39;

/// The register file a write address is in. `ws` swaps the files of the add and mul pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum File {
    A,
    B,
    Either,
}

struct AluWord {
    sig: u64,
    cond_add: u64,
    cond_mul: u64,
    sf: bool,
    ws: bool,
    waddr_add: u64,
    waddr_mul: u64,
    op_mul: u64,
    op_add: u64,
    raddr_a: u64,
    raddr_b: u64,
    add_a: u64,
    add_b: u64,
    mul_a: u64,
    mul_b: u64,
}

impl AluWord {
    fn nop(sig: u64) -> Self {
        Self {
            sig,
            cond_add: 0,
            cond_mul: 0,
            sf: false,
            ws: false,
            waddr_add: NOP_ADDR,
            waddr_mul: NOP_ADDR,
            op_mul: 0,
            op_add: 0,
            raddr_a: NOP_ADDR,
            raddr_b: NOP_ADDR,
            add_a: 0,
            add_b: 0,
            mul_a: 0,
            mul_b: 0,
        }
    }

    fn pack(&self) -> u64 {
        field(self.sig, 60, 4)
            | field(self.cond_add, 49, 3)
            | field(self.cond_mul, 46, 3)
            | field(self.sf as u64, 45, 1)
            | field(self.ws as u64, 44, 1)
            | field(self.waddr_add, 38, 6)
            | field(self.waddr_mul, 32, 6)
            | field(self.op_mul, 29, 3)
            | field(self.op_add, 24, 5)
            | field(self.raddr_a, 18, 6)
            | field(self.raddr_b, 12, 6)
            | field(self.add_a, 9, 3)
            | field(self.add_b, 6, 3)
            | field(self.mul_a, 3, 3)
            | field(self.mul_b, 0, 3)
    }
}

/// Appends the words of `instr` to `words`. `End` takes three words: the program end signal
/// has two delay slots.
pub fn encode_instr(instr: &Instruction, words: &mut Vec<u64>) {
    match &instr.kind {
        InstrKind::Nop => words.push(AluWord::nop(sig::NONE).pack()),
        InstrKind::Alu(alu) => words.push(encode_alu(alu)),
        InstrKind::LoadImm(li) => words.push(encode_load_imm(li)),
        InstrKind::Branch(branch) => words.push(encode_branch(branch)),
        InstrKind::SemaInc(sema) => words.push(encode_semaphore(false, *sema)),
        InstrKind::SemaDec(sema) => words.push(encode_semaphore(true, *sema)),
        InstrKind::Tmu0ToAcc4 => words.push(AluWord::nop(sig::LOAD_TMU0).pack()),
        InstrKind::End => {
            words.push(AluWord::nop(sig::PROG_END).pack());
            words.push(AluWord::nop(sig::NONE).pack());
            words.push(AluWord::nop(sig::NONE).pack());
        }
        InstrKind::Recv { dest } => {
            panic!("receive into {dest} has no vc4 encoding, use tmu0_to_acc4")
        }
        InstrKind::Label(label) => panic!("label {label} was not removed"),
        InstrKind::Skip => panic!("skip was not removed"),
    }
}

fn write_addr(reg: Reg) -> (u64, File) {
    match reg {
        Reg::A(n) if n < 32 => (n as u64, File::A),
        Reg::B(n) if n < 32 => (n as u64, File::B),
        Reg::Acc(n) if n < 4 => (32 + n as u64, File::Either),
        Reg::Acc(5) => (37, File::Either),
        Reg::Special(special) => match special {
            Special::HostInt => (38, File::Either),
            Special::VpmWrite => (48, File::Either),
            Special::RdSetup => (49, File::A),
            Special::WrSetup => (49, File::B),
            Special::DmaLdAddr => (50, File::A),
            Special::DmaStAddr => (50, File::B),
            Special::SfuRecip => (52, File::Either),
            Special::SfuRecipSqrt => (53, File::Either),
            Special::SfuExp => (54, File::Either),
            Special::SfuLog => (55, File::Either),
            Special::TmuAddr => (56, File::Either),
            special => panic!("{special} can not be written on vc4"),
        },
        Reg::Var(var) => panic!("v{var} was not allocated"),
        reg => panic!("{reg} can not be written on vc4"),
    }
}

fn cond_code(cond: AssignCond) -> u64 {
    match cond {
        AssignCond::Never => 0,
        AssignCond::Always => 1,
        AssignCond::Flag(Flag::ZS) => 2,
        AssignCond::Flag(Flag::ZC) => 3,
        AssignCond::Flag(Flag::NS) => 4,
        AssignCond::Flag(Flag::NC) => 5,
    }
}

fn add_op(op: AluOp) -> u64 {
    match op {
        AluOp::FAdd => 1,
        AluOp::FSub => 2,
        AluOp::FMin => 3,
        AluOp::FMax => 4,
        AluOp::FMinAbs => 5,
        AluOp::FMaxAbs => 6,
        AluOp::FtoI => 7,
        AluOp::ItoF => 8,
        AluOp::Add => 12,
        AluOp::Sub => 13,
        AluOp::Shr => 14,
        AluOp::Asr => 15,
        AluOp::Ror => 16,
        AluOp::Shl => 17,
        AluOp::Min => 18,
        AluOp::Max => 19,
        AluOp::And => 20,
        AluOp::Or => 21,
        AluOp::Xor => 22,
        AluOp::Not => 23,
        AluOp::Clz => 24,
        op => unreachable!("{} is a mul op", op.name()),
    }
}

fn mul_op(op: AluOp) -> u64 {
    match op {
        AluOp::FMul => 1,
        AluOp::Mul24 => 2,
        // a rotate is a v8min of the source with itself, rotated by the small immediate
        AluOp::V8Min | AluOp::Rotate => 4,
        AluOp::V8Max => 5,
        op => unreachable!("{} is an add op", op.name()),
    }
}

/// Read port assignment of the operands of one instruction.
#[derive(Default)]
struct Reads {
    raddr_a: Option<u64>,
    raddr_b: Option<u64>,
    small_imm: bool,
}

impl Reads {
    fn claim(slot: &mut Option<u64>, addr: u64, port: &str) {
        match slot {
            Some(taken) if *taken != addr => {
                panic!("read port {port} is needed for both {taken} and {addr}")
            }
            _ => *slot = Some(addr),
        }
    }

    /// Returns the mux value of an operand that has a fixed port, or `None` for an operand
    /// that can be read through either port.
    fn fixed(&mut self, operand: RegOrImm) -> Option<u64> {
        let (addr, file) = match operand {
            RegOrImm::Imm(imm) => {
                self.small_imm = true;
                (imm.encode() as u64, File::B)
            }
            RegOrImm::Reg(reg) => match reg {
                Reg::Acc(n) if n <= 5 => return Some(n as u64),
                Reg::A(n) if n < 32 => (n as u64, File::A),
                Reg::B(n) if n < 32 => (n as u64, File::B),
                Reg::Special(Special::ElemNum) => (38, File::A),
                Reg::Special(Special::QpuNum) => (38, File::B),
                Reg::Special(Special::DmaLdWait) => (50, File::A),
                Reg::Special(Special::DmaStWait) => (50, File::B),
                Reg::Special(Special::Uniform | Special::VpmRead) => return None,
                Reg::Var(var) => panic!("v{var} was not allocated"),
                reg => panic!("{reg} can not be read on vc4"),
            },
        };
        match file {
            File::A => {
                Self::claim(&mut self.raddr_a, addr, "A");
                Some(6)
            }
            _ => {
                Self::claim(&mut self.raddr_b, addr, "B");
                Some(7)
            }
        }
    }

    fn either(&mut self, operand: RegOrImm) -> u64 {
        let addr = match operand {
            RegOrImm::Reg(Reg::Special(Special::Uniform)) => 32,
            RegOrImm::Reg(Reg::Special(Special::VpmRead)) => 48,
            operand => unreachable!("{operand} has a fixed read port"),
        };
        if self.raddr_a.map_or(true, |taken| taken == addr) {
            self.raddr_a = Some(addr);
            6
        } else {
            Self::claim(&mut self.raddr_b, addr, "B");
            7
        }
    }

    fn muxes(&mut self, a: RegOrImm, b: RegOrImm) -> (u64, u64) {
        let (mux_a, mux_b) = (self.fixed(a), self.fixed(b));
        let mux_a = mux_a.unwrap_or_else(|| self.either(a));
        let mux_b = mux_b.unwrap_or_else(|| self.either(b));
        (mux_a, mux_b)
    }
}

fn encode_alu(alu: &Alu) -> u64 {
    let (waddr, file) = write_addr(alu.dest);
    let mut reads = Reads::default();
    let (mux_a, mux_b) = reads.muxes(alu.src_a, alu.src_b);

    let mut word = AluWord::nop(if reads.small_imm {
        sig::SMALL_IMM
    } else {
        sig::NONE
    });
    word.raddr_a = reads.raddr_a.unwrap_or(NOP_ADDR);
    word.raddr_b = reads.raddr_b.unwrap_or(NOP_ADDR);
    word.sf = alu.set_cond != SetCond::None;

    if alu.op.is_mul() {
        word.op_mul = mul_op(alu.op);
        word.waddr_mul = waddr;
        word.cond_mul = cond_code(alu.cond);
        word.ws = file == File::A;
        word.mul_a = mux_a;
        word.mul_b = if alu.op == AluOp::Rotate { mux_a } else { mux_b };
    } else {
        word.op_add = add_op(alu.op);
        word.waddr_add = waddr;
        word.cond_add = cond_code(alu.cond);
        word.ws = file == File::B;
        word.add_a = mux_a;
        word.add_b = mux_b;
    }

    word.pack()
}

fn encode_load_imm(li: &LoadImm) -> u64 {
    let (waddr, file) = write_addr(li.dest);
    field(sig::LOAD_IMM, 60, 4)
        | field(cond_code(li.cond), 49, 3)
        | field((li.set_cond != SetCond::None) as u64, 45, 1)
        | field((file == File::B) as u64, 44, 1)
        | field(waddr, 38, 6)
        | field(NOP_ADDR, 32, 6)
        | li.imm.bits() as u64
}

fn branch_cond(cond: BranchCond) -> u64 {
    match cond {
        BranchCond::All(Flag::ZS) => 0,
        BranchCond::All(Flag::ZC) => 1,
        BranchCond::Any(Flag::ZS) => 2,
        BranchCond::Any(Flag::ZC) => 3,
        BranchCond::All(Flag::NS) => 4,
        BranchCond::All(Flag::NC) => 5,
        BranchCond::Any(Flag::NS) => 6,
        BranchCond::Any(Flag::NC) => 7,
        BranchCond::Always => 15,
    }
}

fn encode_branch(branch: &Branch) -> u64 {
    let offset = match &branch.target {
        BranchTarget::Relative(offset) => *offset,
        BranchTarget::Label(label) => panic!("branch to {label} was not resolved"),
    };
    // relative to the instruction after the delay slots, in bytes
    let bytes = (offset * 8) as u32;
    field(sig::BRANCH, 60, 4)
        | field(branch_cond(branch.cond), 52, 4)
        | field(1, 51, 1)
        | field(NOP_ADDR, 38, 6)
        | field(NOP_ADDR, 32, 6)
        | bytes as u64
}

fn encode_semaphore(decrement: bool, sema: u8) -> u64 {
    field(sig::LOAD_IMM, 60, 4)
        | field(0b100, 57, 3)
        | field(NOP_ADDR, 38, 6)
        | field(NOP_ADDR, 32, 6)
        | field(decrement as u64, 4, 1)
        | field(sema as u64, 0, 4)
}
