//! Encoding of finalized instruction lists into 64 bit instruction words.
//!
//! The encoders expect the output of [`finalize`](crate::passes::finalize::finalize): no
//! variables, labels or skips, and branches resolved to relative offsets. Anything else is a
//! bug in an earlier pass and panics.


pub mod v3d;
pub mod vc4;

use log::debug;

use crate::{Instruction, Target};

pub fn encode(target: Target, instrs: &[Instruction]) -> Vec<u64> {
    let mut words = Vec::with_capacity(instrs.len() + 2);
    for instr in instrs {
        match target {
            Target::Vc4 => vc4::encode_instr(instr, &mut words),
            Target::V3d => v3d::encode_instr(instr, &mut words),
        }
    }
    debug!("encoded {} instructions into {} words", instrs.len(), words.len());
    words
}

/// Places `value` at bit `shift`, checking it fits in `width` bits.
fn field(value: u64, shift: u32, width: u32) -> u64 {
    assert!(value < 1 << width, "{value} does not fit in {width} bits");
    value << shift
}
