//! Explicit free list threaded through the payload of free blocks.
//!
//! ```text
//!   head ──► ┌────────────┐      ┌────────────┐      ┌────────────┐
//!            │ next ──────┼────► │ next ──────┼────► │ next: nil  │
//!            │ prev: nil  │ ◄────┼─ prev      │ ◄────┼─ prev      │
//!            └────────────┘      └────────────┘      └────────────┘
//! ```
//!
//! Links are arena offsets stored in the first two payload words. Offset 0
//! is the prologue area and never a payload, so it doubles as nil.

use crate::{
  arena::Arena,
  block::Block,
  header::WORD_SIZE,
  source::HeapSource,
};

const NIL: usize = 0;

fn decode(word: usize) -> Option<Block> {
  if word == NIL { None } else { Some(Block::at(word)) }
}

fn encode(block: Option<Block>) -> usize {
  block.map_or(NIL, Block::offset)
}

pub(crate) fn next_of<S: HeapSource>(
  arena: &Arena<S>,
  block: Block,
) -> Option<Block> {
  decode(arena.word(block.offset()))
}

pub(crate) fn prev_of<S: HeapSource>(
  arena: &Arena<S>,
  block: Block,
) -> Option<Block> {
  decode(arena.word(block.offset() + WORD_SIZE))
}

fn set_next<S: HeapSource>(
  arena: &mut Arena<S>,
  block: Block,
  next: Option<Block>,
) {
  arena.set_word(block.offset(), encode(next));
}

fn set_prev<S: HeapSource>(
  arena: &mut Arena<S>,
  block: Block,
  prev: Option<Block>,
) {
  arena.set_word(block.offset() + WORD_SIZE, encode(prev));
}

/// LIFO list of free blocks; only the head is tracked.
#[derive(Debug, Default)]
pub struct FreeList {
  head: Option<Block>,
  len: usize,
}

impl FreeList {
  pub const fn new() -> Self {
    Self { head: None, len: 0 }
  }

  pub fn head(&self) -> Option<Block> {
    self.head
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.head.is_none()
  }

  /// Links `block` in as the new head.
  pub fn push<S: HeapSource>(
    &mut self,
    arena: &mut Arena<S>,
    block: Block,
  ) {
    set_next(arena, block, self.head);
    set_prev(arena, block, None);

    if let Some(head) = self.head {
      set_prev(arena, head, Some(block));
    }

    self.head = Some(block);
    self.len += 1;
  }

  /// Unlinks `block`, which must be on this list.
  pub fn remove<S: HeapSource>(
    &mut self,
    arena: &mut Arena<S>,
    block: Block,
  ) {
    let next = next_of(arena, block);
    let prev = prev_of(arena, block);

    match prev {
      Some(prev) => set_next(arena, prev, next),
      None => {
        debug_assert_eq!(self.head, Some(block), "unlinked block has no predecessor");
        self.head = next;
      }
    }

    if let Some(next) = next {
      set_prev(arena, next, prev);
    }

    self.len -= 1;
  }

  /// First block, scanning from the head, whose payload holds `size` bytes.
  pub fn first_fit<S: HeapSource>(
    &self,
    arena: &Arena<S>,
    size: usize,
  ) -> Option<Block> {
    self
      .iter(arena)
      .find(|&block| arena.header(block).size() >= size)
  }

  pub fn iter<'a, S: HeapSource>(
    &self,
    arena: &'a Arena<S>,
  ) -> Iter<'a, S> {
    Iter {
      arena,
      next: self.head,
    }
  }
}

pub struct Iter<'a, S: HeapSource> {
  arena: &'a Arena<S>,
  next: Option<Block>,
}

impl<S: HeapSource> Iterator for Iter<'_, S> {
  type Item = Block;

  fn next(&mut self) -> Option<Block> {
    let block = self.next?;
    self.next = next_of(self.arena, block);
    Some(block)
  }
}
