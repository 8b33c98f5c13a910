mod compile_data;
mod instruction;
mod label;
mod outputter;
mod reg;
mod target;

pub mod cfg;
pub mod dfa;
pub mod encoder;
pub mod optimizer;
pub mod passes;

pub use compile_data::CompileData;
pub use instruction::{
    instr, Alu, AluOp, AssignCond, Branch, BranchCond, BranchTarget, Flag, Imm, InstrId,
    InstrKind, Instruction, LoadImm, RegOrImm, SetCond, SmallImm,
};
pub use label::Label;
pub use outputter::*;
pub use reg::{LabelGenerator, Reg, Special, VarGenerator, VarId};
pub use target::Target;
