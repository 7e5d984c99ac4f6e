use std::fmt;

use crate::header::{BOUNDARY_SIZE, HEADER_SIZE, OVERHEAD};

/// A block, identified by the arena offset of its payload.
///
/// ```text
///   ┌──────────┬──────────────────────────┬──────────────┐
///   │  header  │         payload          │ boundary tag │
///   └──────────┴──────────────────────────┴──────────────┘
///              ▲                          ▲
///              offset                     offset + size
/// ```
///
/// The size lives in the arena, so every method that needs it takes it as an
/// argument.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Block(usize);

impl Block {
  pub(crate) const fn at(offset: usize) -> Self {
    Self(offset)
  }

  /// Offset of the payload from the arena base.
  pub const fn offset(self) -> usize {
    self.0
  }

  pub(crate) const fn header_offset(self) -> usize {
    self.0 - HEADER_SIZE
  }

  pub(crate) const fn boundary_offset(
    self,
    size: usize,
  ) -> usize {
    self.0 + size
  }

  /// Boundary tag of the physically preceding block.
  pub(crate) const fn prev_boundary_offset(self) -> usize {
    self.0 - HEADER_SIZE - BOUNDARY_SIZE
  }

  /// The physically following block, given this block's payload size.
  pub(crate) const fn following(
    self,
    size: usize,
  ) -> Block {
    Block(self.0 + size + OVERHEAD)
  }

  /// The physically preceding block, given that block's payload size.
  pub(crate) const fn preceding(
    self,
    prev_size: usize,
  ) -> Block {
    Block(self.0 - OVERHEAD - prev_size)
  }
}

impl fmt::Debug for Block {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "Block(@{})", self.0)
  }
}

/// A snapshot of one block, as reported by the heap walkers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Payload offset from the arena base.
  pub offset: usize,
  /// Payload size in bytes.
  pub size: usize,
  pub allocated: bool,
}

impl BlockInfo {
  /// Bytes covered by the block including header and boundary tag.
  pub const fn total_size(&self) -> usize {
    self.size + OVERHEAD
  }
}
