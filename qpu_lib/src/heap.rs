//! Buffer objects in the memory shared with the QPUs.
//!
//! Buffers are allocated first fit from a fixed size block of words. Freed ranges are merged
//! with their free neighbours, so the free list never holds two adjacent ranges.

use std::ops::Range;

use generational_arena::{Arena, Index as ArenaIndex};
use log::trace;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeapError {
    #[error("out of memory: {requested} words requested, the largest free range has {largest}")]
    OutOfMemory { requested: usize, largest: usize },
    #[error("buffer does not exist, it may have been freed")]
    InvalidHandle,
    #[error("buffers can't be empty")]
    EmptyBuffer,
    #[error("buffer at word {word} lies beyond the 32 bit bus address space")]
    AddressOverflow { word: usize },
}

/// A handle to a buffer. Handles of freed buffers stay invalid, even when their memory is
/// reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(ArenaIndex);

#[derive(Debug)]
pub struct Heap {
    memory: Vec<u32>,
    /// Bus address of the first word.
    base_address: u32,
    buffers: Arena<Range<usize>>,
    /// Sorted on start.
    free: Vec<Range<usize>>,
}

impl Heap {
    /// A heap of `size` words, at bus address 0.
    pub fn new(size: usize) -> Self {
        Self::with_base_address(size, 0)
    }

    pub fn with_base_address(size: usize, base_address: u32) -> Self {
        let free = if size == 0 { Vec::new() } else { vec![0..size] };
        Self {
            memory: vec![0; size],
            base_address,
            buffers: Arena::new(),
            free,
        }
    }

    /// The size of the heap in words.
    pub fn size(&self) -> usize {
        self.memory.len()
    }

    /// The number of words not taken by a buffer.
    pub fn free_words(&self) -> usize {
        self.free.iter().map(|range| range.len()).sum()
    }

    /// Allocates a zeroed buffer of `words` words, in the first free range it fits in.
    pub fn alloc(&mut self, words: usize) -> Result<BufferId, HeapError> {
        if words == 0 {
            return Err(HeapError::EmptyBuffer);
        }
        let Some(pos) = self.free.iter().position(|range| range.len() >= words) else {
            let largest = self.free.iter().map(|range| range.len()).max().unwrap_or(0);
            return Err(HeapError::OutOfMemory {
                requested: words,
                largest,
            });
        };

        let start = self.free[pos].start;
        if self.free[pos].len() == words {
            self.free.remove(pos);
        } else {
            self.free[pos].start += words;
        }
        let range = start..start + words;
        self.memory[range.clone()].fill(0);
        trace!("allocated words {range:?}");
        Ok(BufferId(self.buffers.insert(range)))
    }

    pub fn free(&mut self, id: BufferId) -> Result<(), HeapError> {
        let range = self.buffers.remove(id.0).ok_or(HeapError::InvalidHandle)?;
        trace!("freed words {range:?}");

        let pos = self.free.partition_point(|free| free.start < range.start);
        self.free.insert(pos, range);
        if pos + 1 < self.free.len() && self.free[pos].end == self.free[pos + 1].start {
            let next = self.free.remove(pos + 1);
            self.free[pos].end = next.end;
        }
        if pos > 0 && self.free[pos - 1].end == self.free[pos].start {
            let merged = self.free.remove(pos);
            self.free[pos - 1].end = merged.end;
        }
        Ok(())
    }

    /// The bus address of the first word of the buffer, as passed to kernels.
    pub fn address(&self, id: BufferId) -> Result<u32, HeapError> {
        let range = self.range(id)?;
        let overflow = HeapError::AddressOverflow { word: range.start };
        range
            .start
            .checked_mul(4)
            .and_then(|offset| u32::try_from(offset).ok())
            .and_then(|offset| self.base_address.checked_add(offset))
            .ok_or(overflow)
    }

    pub fn slice(&self, id: BufferId) -> Result<&[u32], HeapError> {
        let range = self.range(id)?;
        Ok(&self.memory[range])
    }

    pub fn slice_mut(&mut self, id: BufferId) -> Result<&mut [u32], HeapError> {
        let range = self.range(id)?;
        Ok(&mut self.memory[range])
    }

    fn range(&self, id: BufferId) -> Result<Range<usize>, HeapError> {
        self.buffers
            .get(id.0)
            .cloned()
            .ok_or(HeapError::InvalidHandle)
    }
}
