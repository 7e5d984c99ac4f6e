use crate::source::GrowError;

/// Failure returned by the allocation entry points.
///
/// Every variant is raised before the heap is touched, or after a failed
/// growth that leaves the heap as it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
  #[error("cannot allocate a zero-sized block")]
  InvalidSize,
  #[error("request of {requested} bytes overflows the block size")]
  Overflow { requested: usize },
  #[error("out of memory while growing the heap by {requested} bytes")]
  OutOfMemory {
    requested: usize,
    #[source]
    source: GrowError,
  },
}

/// An invariant of the heap that [`Allocator::check`](crate::Allocator::check)
/// found broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HeapError {
  #[error("prologue sentinel overwritten")]
  Prologue,
  #[error("epilogue sentinel at offset {offset} overwritten")]
  Epilogue { offset: usize },
  #[error("block at offset {offset}: header {header:#x} differs from boundary tag {boundary:#x}")]
  TagMismatch {
    offset: usize,
    header: usize,
    boundary: usize,
  },
  #[error("block at offset {offset} has unaligned payload size {size}")]
  Misaligned { offset: usize, size: usize },
  #[error("block at offset {offset} has payload size {size}, below the minimum")]
  Undersized { offset: usize, size: usize },
  #[error("block at offset {offset} with size {size} runs past the epilogue")]
  Overrun { offset: usize, size: usize },
  #[error("free blocks at offsets {first} and {second} were not coalesced")]
  AdjacentFree { first: usize, second: usize },
  #[error("free list entry at offset {offset} is not a free block")]
  ListedAllocated { offset: usize },
  #[error("free list entry at offset {offset} has a broken link")]
  BrokenLink { offset: usize },
  #[error("free list holds {listed} blocks but the heap has {free} free blocks")]
  ListCount { listed: usize, free: usize },
  #[error("blocks cover {covered} bytes but the arena obtained {obtained}")]
  Conservation { covered: usize, obtained: usize },
}
