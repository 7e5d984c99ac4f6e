use std::ptr::NonNull;

use crate::{
  allocator::Allocator,
  error::AllocError,
  header::{MIN_BLOCK_SIZE, OVERHEAD},
  source::HeapSource,
  trace::{Event, ResizeStrategy},
};

impl<S: HeapSource> Allocator<S> {
  /// Resizes an allocation, in place when the physical neighbourhood allows.
  ///
  /// - `ptr == None` behaves exactly like [`Allocator::allocate`].
  /// - `size == 0` frees `ptr` and returns `Ok(None)`.
  /// - Otherwise returns the (possibly moved) allocation. The first
  ///   `min(old, new)` payload bytes are preserved. If the block has to move
  ///   and the new allocation fails, the old block is left untouched.
  ///
  /// # Safety
  ///
  /// A `Some` pointer must have been returned by this allocator and not freed
  /// since.
  pub unsafe fn reallocate(
    &mut self,
    ptr: Option<NonNull<u8>>,
    size: usize,
  ) -> Result<Option<NonNull<u8>>, AllocError> {
    let Some(ptr) = ptr else {
      return self.allocate(size).map(Some);
    };

    if size == 0 {
      unsafe { self.deallocate(ptr) };
      return Ok(None);
    }

    let size = Self::adjust_size(size)?;
    let block = self.arena.block_of(ptr);
    self.debug_assert_live(block);

    let current = self.arena.header(block).size();

    if size <= current {
      let leftover = current - size;

      let strategy = if leftover < MIN_BLOCK_SIZE {
        ResizeStrategy::Unchanged
      } else {
        self.arena.set_block(block, size, true);
        self.split_off(block, leftover);
        ResizeStrategy::Shrunk
      };

      self.trace(Event::Resized {
        offset: block.offset(),
        from: current,
        to: self.arena.header(block).size(),
        strategy,
      });

      return Ok(Some(ptr));
    }

    let needed = size - current;
    let next = self.arena.next(block);
    let neighbour = self.arena.header(next);
    let gained = neighbour.size() + OVERHEAD;

    if neighbour.is_allocated() || gained < needed {
      let moved = self.allocate(size)?;
      let target = self.arena.block_of(moved);

      self.arena.copy_payload(block, target, current);
      self.release(block);

      self.trace(Event::Resized {
        offset: target.offset(),
        from: current,
        to: self.arena.header(target).size(),
        strategy: ResizeStrategy::Moved,
      });

      return Ok(Some(moved));
    }

    self.free_list.remove(&mut self.arena, next);
    let leftover = gained - needed;

    if leftover < MIN_BLOCK_SIZE {
      self.arena.set_block(block, current + gained, true);
    } else {
      self.arena.set_block(block, size, true);
      self.split_off(block, leftover);
    }

    self.trace(Event::Resized {
      offset: block.offset(),
      from: current,
      to: self.arena.header(block).size(),
      strategy: ResizeStrategy::Absorbed,
    });

    Ok(Some(ptr))
  }
}

#[cfg(test)]
mod tests {
  use std::{ptr::NonNull, slice};

  use crate::{
    AllocError, Allocator, Config,
    header::{MIN_BLOCK_SIZE, OVERHEAD},
    source::FixedHeap,
  };

  fn allocator(capacity: usize) -> Allocator<FixedHeap> {
    Allocator::init(FixedHeap::new(capacity).unwrap(), Config::default()).unwrap()
  }

  fn fill(
    ptr: NonNull<u8>,
    len: usize,
  ) {
    for i in 0..len {
      unsafe { ptr.as_ptr().add(i).write(i as u8) };
    }
  }

  fn assert_filled(
    ptr: NonNull<u8>,
    len: usize,
  ) {
    let bytes = unsafe { slice::from_raw_parts(ptr.as_ptr(), len) };
    for (i, &byte) in bytes.iter().enumerate() {
      assert_eq!(byte, i as u8, "byte {i} changed");
    }
  }

  #[test]
  fn test_null_behaves_like_allocate() {
    let mut first = allocator(1 << 16);
    let mut second = allocator(1 << 16);

    let reallocated = unsafe { first.reallocate(None, 40) }.unwrap().unwrap();
    let allocated = second.allocate(40).unwrap();

    assert_eq!(
      unsafe { first.usable_size(reallocated) },
      unsafe { second.usable_size(allocated) }
    );
    assert_eq!(first.check().unwrap(), second.check().unwrap());
  }

  #[test]
  fn test_null_with_zero_size_fails() {
    let mut allocator = allocator(1 << 16);

    assert_eq!(unsafe { allocator.reallocate(None, 0) }, Err(AllocError::InvalidSize));
  }

  #[test]
  fn test_zero_size_frees() {
    let mut allocator = allocator(1 << 16);

    let ptr = allocator.allocate(64).unwrap();
    assert_eq!(unsafe { allocator.reallocate(Some(ptr), 0) }, Ok(None));

    let stats = allocator.check().unwrap();
    assert_eq!(stats.allocated_blocks, 0);
    assert_eq!(stats.free_blocks, 1);
  }

  #[test]
  fn test_same_size_is_noop() {
    let mut allocator = allocator(1 << 16);

    let ptr = allocator.allocate(64).unwrap();
    fill(ptr, 64);
    let before = allocator.check().unwrap();

    let same = unsafe { allocator.reallocate(Some(ptr), 64) }.unwrap();
    assert_eq!(same, Some(ptr));
    assert_filled(ptr, 64);
    assert_eq!(allocator.check().unwrap(), before);
  }

  #[test]
  fn test_shrink_small_leftover_keeps_block() {
    let mut allocator = allocator(1 << 16);

    let ptr = allocator.allocate(64).unwrap();
    let result = unsafe { allocator.reallocate(Some(ptr), 48) }.unwrap();

    assert_eq!(result, Some(ptr));
    assert_eq!(unsafe { allocator.usable_size(ptr) }, 64);
    allocator.check().unwrap();
  }

  #[test]
  fn test_shrink_splits_and_coalesces_forward() {
    let mut allocator = allocator(1 << 16);

    let ptr = allocator.allocate(256).unwrap();
    fill(ptr, 64);
    let tail = allocator.free_blocks().next().unwrap().size;

    let result = unsafe { allocator.reallocate(Some(ptr), 64) }.unwrap();

    assert_eq!(result, Some(ptr));
    assert_eq!(unsafe { allocator.usable_size(ptr) }, 64);
    assert_filled(ptr, 64);

    // The split-off tail merged with the free remainder of the chunk.
    let free: Vec<_> = allocator.free_blocks().collect();
    assert_eq!(free.len(), 1);
    assert_eq!(free[0].size, tail + 256 - 64);
    allocator.check().unwrap();
  }

  #[test]
  fn test_grow_absorbs_free_neighbour_with_split() {
    let mut allocator = allocator(1 << 16);

    let ptr = allocator.allocate(32).unwrap();
    fill(ptr, 32);

    let result = unsafe { allocator.reallocate(Some(ptr), 128) }.unwrap();

    assert_eq!(result, Some(ptr));
    assert_eq!(unsafe { allocator.usable_size(ptr) }, 128);
    assert_filled(ptr, 32);
    assert_eq!(allocator.check().unwrap().free_blocks, 1);
  }

  #[test]
  fn test_grow_absorbs_neighbour_exactly() {
    let mut allocator = allocator(1 << 16);

    let a = allocator.allocate(32).unwrap();
    let b = allocator.allocate(48).unwrap();
    let _c = allocator.allocate(32).unwrap();
    unsafe { allocator.deallocate(b) };

    let grown = unsafe { allocator.reallocate(Some(a), 32 + 48 + OVERHEAD) }.unwrap();

    assert_eq!(grown, Some(a));
    assert_eq!(unsafe { allocator.usable_size(a) }, 32 + 48 + OVERHEAD);
    assert_eq!(allocator.check().unwrap().free_blocks, 1);
  }

  #[test]
  fn test_grow_absorbs_whole_neighbour_when_leftover_is_small() {
    let mut allocator = allocator(1 << 16);

    let a = allocator.allocate(32).unwrap();
    let b = allocator.allocate(48).unwrap();
    let _c = allocator.allocate(32).unwrap();
    unsafe { allocator.deallocate(b) };

    // Needs 48 of the 64 bytes the neighbour brings; 16 left is too small.
    let grown = unsafe { allocator.reallocate(Some(a), 80) }.unwrap();

    assert_eq!(grown, Some(a));
    assert_eq!(unsafe { allocator.usable_size(a) }, 32 + 48 + OVERHEAD);
    assert!(32 + 48 + OVERHEAD - 80 < MIN_BLOCK_SIZE);
    allocator.check().unwrap();
  }

  #[test]
  fn test_grow_moves_when_neighbour_is_allocated() {
    let mut allocator = allocator(1 << 16);

    let a = allocator.allocate(16).unwrap();
    let _b = allocator.allocate(16).unwrap();
    fill(a, 16);

    let moved = unsafe { allocator.reallocate(Some(a), 64) }.unwrap().unwrap();

    assert_ne!(moved, a);
    assert_filled(moved, 16);
    assert!(unsafe { allocator.usable_size(moved) } >= 64);

    let stats = allocator.check().unwrap();
    assert_eq!(stats.allocated_blocks, 2);
  }

  #[test]
  fn test_grow_moves_when_neighbour_is_too_small() {
    let mut allocator = allocator(1 << 16);

    let a = allocator.allocate(32).unwrap();
    let b = allocator.allocate(16).unwrap();
    let _c = allocator.allocate(32).unwrap();
    unsafe { allocator.deallocate(b) };
    fill(a, 32);

    let moved = unsafe { allocator.reallocate(Some(a), 256) }.unwrap().unwrap();

    assert_ne!(moved, a);
    assert_filled(moved, 32);
    allocator.check().unwrap();
  }

  #[test]
  fn test_failed_move_keeps_original() {
    let mut allocator = allocator(8192);

    let a = allocator.allocate(16).unwrap();
    let _b = allocator.allocate(16).unwrap();
    fill(a, 16);

    let err = unsafe { allocator.reallocate(Some(a), 1 << 16) }.unwrap_err();

    assert!(matches!(err, AllocError::OutOfMemory { .. }));
    assert_filled(a, 16);
    assert_eq!(unsafe { allocator.usable_size(a) }, 16);
    allocator.check().unwrap();
  }
}
