//! The single growable region all blocks live in.
//!
//! ```text
//!   offset   contents
//!   ┌──────┬──────────────────────────────┐
//!   │    0 │ padding (32-bit targets only)│
//!   │      │ prologue header    (0, a)    │
//!   │      │ prologue tag       (0, a)    │
//!   │      │ ...                          │
//!   │      │ zero or more blocks          │
//!   │      │ ...                          │
//!   │  n-w │ epilogue header    (0, a)    │
//!   └──────┴──────────────────────────────┘
//! ```
//!
//! Blocks are addressed by byte offset from the base, never by pointer. Raw
//! memory is only touched through `Arena::span`, one bounds-checked range at
//! a time, so no reference ever covers a payload the caller owns.

use std::ptr::{self, NonNull};

use crate::{
  block::Block,
  error::AllocError,
  header::{ALIGNMENT, BOUNDARY_SIZE, HEADER_SIZE, Header, OVERHEAD, WORD_SIZE},
  source::{GrowError, HeapSource},
};

/// Padding in front of the prologue that keeps every payload offset aligned.
pub const PROLOGUE_OFFSET: usize = (ALIGNMENT - (3 * WORD_SIZE) % ALIGNMENT) % ALIGNMENT;

/// Bytes taken by the padding, the prologue and the epilogue.
pub const SENTINEL_SIZE: usize = PROLOGUE_OFFSET + HEADER_SIZE + BOUNDARY_SIZE + HEADER_SIZE;

const _: () = assert!(SENTINEL_SIZE % ALIGNMENT == 0);
const _: () = assert!(OVERHEAD % ALIGNMENT == 0);

pub struct Arena<S: HeapSource> {
  source: S,
  base: NonNull<u8>,
  len: usize,
  /// Bytes skipped in front of `base` to align it.
  padding: usize,
}

// The arena owns its region; nothing else holds the base pointer.
unsafe impl<S: HeapSource + Send> Send for Arena<S> {}

impl<S: HeapSource> Arena<S> {
  /// Reserves the sentinels. The arena holds no blocks until [`Arena::extend`]
  /// is called.
  pub fn new(mut source: S) -> Result<Self, GrowError> {
    let end = source.grow(0)?;
    let misalignment = end.as_ptr() as usize % ALIGNMENT;
    let padding = if misalignment == 0 {
      0
    } else {
      ALIGNMENT - misalignment
    };

    let start = source.grow(padding + SENTINEL_SIZE)?;

    if start != end {
      return Err(GrowError::Discontiguous);
    }

    let mut arena = Self {
      source,
      base: unsafe { start.add(padding) },
      len: SENTINEL_SIZE,
      padding,
    };

    if PROLOGUE_OFFSET > 0 {
      let padding = arena.span(0, PROLOGUE_OFFSET);
      unsafe { ptr::write_bytes(padding, 0, PROLOGUE_OFFSET) };
    }
    arena.set_word(PROLOGUE_OFFSET, Header::SENTINEL.to_bits());
    arena.set_word(PROLOGUE_OFFSET + HEADER_SIZE, Header::SENTINEL.to_bits());
    arena.set_word(arena.epilogue_offset(), Header::SENTINEL.to_bits());

    Ok(arena)
  }

  /// Grows the arena by a free block of `size` payload bytes, written over the
  /// old epilogue, and moves the epilogue to the new end.
  ///
  /// `size` must already be aligned. On failure the arena is left as it was.
  /// The returned block is not on any free list yet.
  pub fn extend(
    &mut self,
    size: usize,
  ) -> Result<Block, AllocError> {
    debug_assert_eq!(size % ALIGNMENT, 0);

    let increment = size
      .checked_add(OVERHEAD)
      .ok_or(AllocError::Overflow { requested: size })?;

    let previous = self
      .source
      .grow(increment)
      .map_err(|source| AllocError::OutOfMemory {
        requested: increment,
        source,
      })?;

    if previous.as_ptr() as usize != self.base.as_ptr() as usize + self.len {
      return Err(AllocError::OutOfMemory {
        requested: increment,
        source: GrowError::Discontiguous,
      });
    }

    // The old epilogue slot becomes the new block's header.
    let block = Block::at(self.len);
    self.len += increment;

    self.set_block(block, size, false);
    self.set_word(self.epilogue_offset(), Header::SENTINEL.to_bits());

    Ok(block)
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn padding(&self) -> usize {
    self.padding
  }

  /// Total bytes taken from the heap source, padding included.
  pub fn obtained(&self) -> usize {
    self.padding + self.len
  }

  pub fn source(&self) -> &S {
    &self.source
  }

  pub(crate) fn prologue_offset(&self) -> usize {
    PROLOGUE_OFFSET
  }

  pub(crate) fn epilogue_offset(&self) -> usize {
    self.len - HEADER_SIZE
  }

  /// The lowest block in the arena; the epilogue when the arena is empty.
  pub(crate) fn first_block(&self) -> Block {
    Block::at(SENTINEL_SIZE)
  }

  pub(crate) fn is_epilogue(
    &self,
    block: Block,
  ) -> bool {
    block.header_offset() == self.epilogue_offset()
  }

  /// Whether `offset` could be a payload offset inside this arena.
  pub(crate) fn contains(
    &self,
    offset: usize,
  ) -> bool {
    offset >= SENTINEL_SIZE && offset < self.epilogue_offset() && offset % ALIGNMENT == 0
  }

  /// Start of the `len` bytes at `offset`. Panics if any of them lies
  /// outside the arena.
  fn span(
    &self,
    offset: usize,
    len: usize,
  ) -> *mut u8 {
    assert!(
      offset.checked_add(len).is_some_and(|end| end <= self.len),
      "{len} bytes at offset {offset} run past the arena ({} bytes)",
      self.len
    );
    unsafe { self.base.as_ptr().add(offset) }
  }

  pub(crate) fn word(
    &self,
    offset: usize,
  ) -> usize {
    let word = self.span(offset, WORD_SIZE);
    unsafe { ptr::read_unaligned(word.cast::<usize>()) }
  }

  pub(crate) fn set_word(
    &mut self,
    offset: usize,
    value: usize,
  ) {
    let word = self.span(offset, WORD_SIZE);
    unsafe { ptr::write_unaligned(word.cast::<usize>(), value) };
  }

  pub(crate) fn header(
    &self,
    block: Block,
  ) -> Header {
    Header::from_bits(self.word(block.header_offset()))
  }

  pub(crate) fn boundary(
    &self,
    block: Block,
  ) -> Header {
    let size = self.header(block).size();
    Header::from_bits(self.word(block.boundary_offset(size)))
  }

  /// Rewrites both the header and the boundary tag of `block`.
  pub(crate) fn set_block(
    &mut self,
    block: Block,
    size: usize,
    allocated: bool,
  ) {
    let header = Header::new(size, allocated).to_bits();
    self.set_word(block.header_offset(), header);
    self.set_word(block.boundary_offset(size), header);
  }

  /// The physically following block. For the last block this is the
  /// epilogue, whose header reads as a zero-size allocated block.
  pub(crate) fn next(
    &self,
    block: Block,
  ) -> Block {
    block.following(self.header(block).size())
  }

  /// Boundary tag of the block immediately before `block`; the prologue tag
  /// for the first block.
  pub(crate) fn prev_boundary(
    &self,
    block: Block,
  ) -> Header {
    Header::from_bits(self.word(block.prev_boundary_offset()))
  }

  pub(crate) fn prev(
    &self,
    block: Block,
  ) -> Block {
    block.preceding(self.prev_boundary(block).size())
  }

  /// Copies `len` payload bytes from one block to another. The two payload
  /// ranges must not overlap.
  pub(crate) fn copy_payload(
    &mut self,
    from: Block,
    to: Block,
    len: usize,
  ) {
    debug_assert!(
      from.offset() + len <= to.header_offset() || to.offset() + len <= from.header_offset(),
      "payloads of {from:?} and {to:?} overlap"
    );

    let source = self.span(from.offset(), len);
    let target = self.span(to.offset(), len);
    unsafe { ptr::copy_nonoverlapping(source, target, len) };
  }

  pub(crate) fn pointer(
    &self,
    block: Block,
  ) -> NonNull<u8> {
    unsafe { self.base.add(block.offset()) }
  }

  /// Maps a payload pointer handed out earlier back to its block.
  pub(crate) fn block_of(
    &self,
    ptr: NonNull<u8>,
  ) -> Block {
    let offset = (ptr.as_ptr() as usize).wrapping_sub(self.base.as_ptr() as usize);
    debug_assert!(self.contains(offset), "pointer {ptr:p} is not a payload of this heap");
    Block::at(offset)
  }
}
