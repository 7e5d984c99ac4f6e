use std::ptr::NonNull;

use crate::{
  allocator::Allocator,
  block::Block,
  header::OVERHEAD,
  source::HeapSource,
  trace::{Direction, Event},
};

impl<S: HeapSource> Allocator<S> {
  /// Returns a block to the heap.
  ///
  /// # Safety
  ///
  /// `ptr` must have been returned by [`Allocator::allocate`] or
  /// [`Allocator::reallocate`] on this allocator and not freed since. Passing
  /// anything else corrupts the heap.
  pub unsafe fn deallocate(
    &mut self,
    ptr: NonNull<u8>,
  ) {
    let block = self.arena.block_of(ptr);
    self.debug_assert_live(block);

    self.trace(Event::Freed {
      offset: block.offset(),
      size: self.arena.header(block).size(),
    });

    self.release(block);
  }

  /// Marks `block` free, merges it with free physical neighbours and pushes
  /// the result onto the free list. Returns the merged block, which may start
  /// before `block`.
  pub(crate) fn release(
    &mut self,
    block: Block,
  ) -> Block {
    let mut block = block;
    let mut size = self.arena.header(block).size();
    self.arena.set_block(block, size, false);

    if self.arena.prev_boundary(block).is_free() {
      let prev = self.arena.prev(block);
      self.free_list.remove(&mut self.arena, prev);

      size += self.arena.header(prev).size() + OVERHEAD;
      block = prev;
      self.arena.set_block(block, size, false);

      self.trace(Event::Coalesced {
        offset: block.offset(),
        size,
        direction: Direction::Backward,
      });
    }

    let next = self.arena.next(block);

    if self.arena.header(next).is_free() {
      self.free_list.remove(&mut self.arena, next);

      size += self.arena.header(next).size() + OVERHEAD;
      self.arena.set_block(block, size, false);

      self.trace(Event::Coalesced {
        offset: block.offset(),
        size,
        direction: Direction::Forward,
      });
    }

    self.free_list.push(&mut self.arena, block);
    block
  }
}
