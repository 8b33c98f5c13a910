//! Control-Flow Graph
//!
//! The graph is kept at instruction granularity: every instruction has at most two
//! successors. Blocks are only used to relate instructions to the structured control flow
//! they are part of.


use std::collections::HashMap;

use arrayvec::ArrayVec;

use crate::{BranchTarget, InstrId, InstrKind, Instruction, Label};

pub type BlockId = usize;

pub type Successors = ArrayVec<InstrId, 2>;

#[derive(Debug, Clone)]
pub struct Cfg {
    succs: Vec<Successors>,
    blocks: Vec<BlockId>,
    block_ranges: Vec<Option<(InstrId, InstrId)>>,
}

impl Cfg {
    /// Builds the graph of an instruction list in which all branches still target labels.
    ///
    /// Panics if a branch targets a label that is never placed, if a label is placed twice,
    /// or if a branch was already resolved to a relative offset.
    pub fn build(instrs: &[Instruction]) -> Self {
        let mut succs = vec![Successors::new(); instrs.len()];
        let mut labels: HashMap<&Label, InstrId> = HashMap::new();

        // Fall through edges and label positions.
        for (i, instr) in instrs.iter().enumerate() {
            if let Some(label) = instr.label() {
                let prev = labels.insert(label, i);
                assert!(prev.is_none(), "label {label} placed more than once");
            }
            if !instr.is_uncond_branch() && i + 1 < instrs.len() {
                succs[i].push(i + 1);
            }
        }

        // Branch edges.
        for (i, instr) in instrs.iter().enumerate() {
            if let InstrKind::Branch(branch) = &instr.kind {
                let target = match &branch.target {
                    BranchTarget::Label(label) => match labels.get(label) {
                        Some(target) => *target,
                        None => panic!("branch to label {label} which is never placed"),
                    },
                    BranchTarget::Relative(offset) => {
                        panic!("branch at {i} is already resolved to offset {offset}")
                    }
                };
                if !succs[i].contains(&target) {
                    succs[i].push(target);
                }
            }
        }

        // Every forward jump opens a new block spanning the instructions it jumps over.
        // Backward edges don't open blocks.
        let mut blocks = vec![0; instrs.len()];
        let mut num_blocks = 1;
        for i in 0..instrs.len() {
            for &succ in &succs[i] {
                if succ > i + 1 {
                    for block in &mut blocks[i + 1..succ] {
                        *block = num_blocks;
                    }
                    num_blocks += 1;
                }
            }
        }

        let mut block_ranges: Vec<Option<(InstrId, InstrId)>> = vec![None; num_blocks];
        for (i, &block) in blocks.iter().enumerate() {
            let range = block_ranges[block].get_or_insert((i, i));
            range.0 = range.0.min(i);
            range.1 = range.1.max(i);
        }
        block_ranges[0] = Some((0, instrs.len().saturating_sub(1)));

        Self {
            succs,
            blocks,
            block_ranges,
        }
    }

    /// The number of instructions in the graph.
    pub fn len(&self) -> usize {
        self.succs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.succs.is_empty()
    }

    pub fn successors(&self, instr: InstrId) -> &[InstrId] {
        &self.succs[instr]
    }

    pub fn block_of(&self, instr: InstrId) -> BlockId {
        self.blocks[instr]
    }

    pub fn num_blocks(&self) -> usize {
        self.block_ranges.len()
    }

    /// The first and last instruction of a block, or `None` if all instructions of the block
    /// were taken over by nested blocks.
    pub fn block_range(&self, block: BlockId) -> Option<(InstrId, InstrId)> {
        self.block_ranges[block]
    }

    /// Returns `true` if the range of `child` lies within the range of `parent`. A block is its
    /// own parent.
    pub fn is_parent_block(&self, parent: BlockId, child: BlockId) -> bool {
        match (self.block_ranges[parent], self.block_ranges[child]) {
            (Some((p_first, p_last)), Some((c_first, c_last))) => {
                p_first <= c_first && c_last <= p_last
            }
            _ => false,
        }
    }
}

impl std::fmt::Display for Cfg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, succs) in self.succs.iter().enumerate() {
            write!(f, "{i}: block {} ->", self.blocks[i])?;
            for succ in succs {
                write!(f, " {succ}")?;
            }
            writeln!(f)?;
        }
        for (block, range) in self.block_ranges.iter().enumerate() {
            match range {
                Some((first, last)) => writeln!(f, "block {block}: {first}..={last}")?,
                None => writeln!(f, "block {block}: empty")?,
            }
        }
        Ok(())
    }
}
