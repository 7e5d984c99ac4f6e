use std::ptr::NonNull;

use crate::{
  align::align_up,
  arena::Arena,
  block::Block,
  config::Config,
  error::AllocError,
  free_list::FreeList,
  header::{MIN_BLOCK_SIZE, MIN_PAYLOAD_SIZE, OVERHEAD},
  source::HeapSource,
  trace::Event,
};

/// A boundary-tag allocator over one growable arena.
///
/// Each instance owns its arena and free list; independent instances never
/// share memory. The engine is single-threaded, see
/// [`LockedHeap`](crate::LockedHeap) for a shareable wrapper.
pub struct Allocator<S: HeapSource> {
  pub(crate) arena: Arena<S>,
  pub(crate) free_list: FreeList,
  pub(crate) config: Config,
}

impl<S: HeapSource> Allocator<S> {
  /// Writes the sentinels into `source` and grows the heap by one chunk.
  ///
  /// Fails with [`AllocError::Overflow`] if the configured chunk size cannot
  /// be aligned, before the source is touched.
  pub fn init(
    source: S,
    config: Config,
  ) -> Result<Self, AllocError> {
    let chunk_size = config.effective_chunk_size()?;

    let arena = Arena::new(source).map_err(|source| AllocError::OutOfMemory {
      requested: crate::arena::SENTINEL_SIZE,
      source,
    })?;

    let mut allocator = Self {
      arena,
      free_list: FreeList::new(),
      config: Config {
        chunk_size,
        ..config
      },
    };

    allocator.grow(chunk_size)?;

    allocator.trace(Event::Initialized {
      arena_len: allocator.arena.len(),
      chunk_size,
    });

    Ok(allocator)
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn source(&self) -> &S {
    self.arena.source()
  }

  /// Returns at least `size` usable bytes, aligned to 8.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let size = Self::adjust_size(size)?;

    if let Some(block) = self.free_list.first_fit(&self.arena, size) {
      self.place(block, size);
      return Ok(self.arena.pointer(block));
    }

    // Nothing fits; the grown block comes back coalesced with any free tail.
    let block = self.grow(size.max(self.config.chunk_size))?;
    self.place(block, size);
    Ok(self.arena.pointer(block))
  }

  /// Payload bytes reserved for a live allocation.
  ///
  /// # Safety
  ///
  /// `ptr` must have been returned by this allocator and not freed since.
  pub unsafe fn usable_size(
    &self,
    ptr: NonNull<u8>,
  ) -> usize {
    let block = self.arena.block_of(ptr);
    self.debug_assert_live(block);
    self.arena.header(block).size()
  }

  /// Aligns a request to the quantum and floors it to the minimum payload.
  pub(crate) fn adjust_size(size: usize) -> Result<usize, AllocError> {
    if size == 0 {
      return Err(AllocError::InvalidSize);
    }

    let aligned = align_up(size)
      .filter(|aligned| aligned.checked_add(OVERHEAD).is_some())
      .ok_or(AllocError::Overflow { requested: size })?;

    Ok(aligned.max(MIN_PAYLOAD_SIZE))
  }

  /// Extends the arena by `size` payload bytes and frees the new block.
  pub(crate) fn grow(
    &mut self,
    size: usize,
  ) -> Result<Block, AllocError> {
    let block = self.arena.extend(size).inspect_err(|err| {
      if let AllocError::OutOfMemory { requested, source } = *err {
        self.trace(Event::GrowthFailed {
          requested,
          error: source,
        });
      }
    })?;

    self.trace(Event::Grown {
      offset: block.offset(),
      size,
    });

    Ok(self.release(block))
  }

  /// Allocates `size` bytes out of the free `block`, splitting off the rest
  /// when it is large enough to stand on its own.
  pub(crate) fn place(
    &mut self,
    block: Block,
    size: usize,
  ) {
    self.free_list.remove(&mut self.arena, block);

    let available = self.arena.header(block).size();
    let difference = available - size;

    if difference < MIN_BLOCK_SIZE {
      self.arena.set_block(block, available, true);
    } else {
      self.arena.set_block(block, size, true);
      self.split_off(block, difference);
    }

    self.trace(Event::Placed {
      offset: block.offset(),
      size: self.arena.header(block).size(),
    });
  }

  /// Turns the `leftover` bytes right after `block` into a free block.
  ///
  /// `block` must already carry its final size.
  pub(crate) fn split_off(
    &mut self,
    block: Block,
    leftover: usize,
  ) {
    debug_assert!(leftover >= MIN_BLOCK_SIZE);

    let remainder = self.arena.next(block);
    self.arena.set_block(remainder, leftover - OVERHEAD, false);

    self.trace(Event::Split {
      offset: remainder.offset(),
      remainder: leftover - OVERHEAD,
    });

    self.release(remainder);
  }

  pub(crate) fn trace(
    &self,
    event: Event,
  ) {
    if let Some(tracer) = self.config.tracer {
      tracer.record(&event);
    }
  }

  /// Header and boundary tag agree and mark the block allocated.
  pub(crate) fn debug_assert_live(
    &self,
    block: Block,
  ) {
    debug_assert!(self.arena.contains(block.offset()), "{block:?} is outside the heap");
    debug_assert!(self.arena.header(block).is_allocated(), "{block:?} is not allocated");
    debug_assert_eq!(
      self.arena.header(block),
      self.arena.boundary(block),
      "{block:?} header and boundary tag differ"
    );
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    header::{ALIGNMENT, DEFAULT_CHUNK_SIZE},
    source::{FixedHeap, GrowError},
  };

  fn allocator(capacity: usize) -> Allocator<FixedHeap> {
    Allocator::init(FixedHeap::new(capacity).unwrap(), Config::default()).unwrap()
  }

  #[test]
  fn test_init_creates_one_free_chunk() {
    let allocator = allocator(1 << 16);

    let blocks: Vec<_> = allocator.blocks().collect();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].size, DEFAULT_CHUNK_SIZE);
    assert!(!blocks[0].allocated);
    assert_eq!(allocator.free_list.len(), 1);
    allocator.check().unwrap();
  }

  #[test]
  fn test_init_fails_without_memory() {
    let result = Allocator::init(FixedHeap::new(64).unwrap(), Config::default());

    assert!(matches!(
      result,
      Err(AllocError::OutOfMemory {
        source: GrowError::Exhausted { .. },
        ..
      })
    ));
  }

  #[test]
  fn test_allocate_alignment_and_size() {
    let mut allocator = allocator(1 << 16);

    let ptr = allocator.allocate(24).unwrap();
    assert_eq!(ptr.as_ptr() as usize % ALIGNMENT, 0);
    assert!(unsafe { allocator.usable_size(ptr) } >= 24);

    unsafe {
      std::ptr::write_bytes(ptr.as_ptr(), 0x5A, 24);
    }
    allocator.check().unwrap();
  }

  #[test]
  fn test_allocate_zero() {
    let mut allocator = allocator(1 << 16);

    assert_eq!(allocator.allocate(0), Err(AllocError::InvalidSize));
    allocator.check().unwrap();
  }

  #[test]
  fn test_allocate_overflow() {
    let mut allocator = allocator(1 << 16);

    assert_eq!(
      allocator.allocate(usize::MAX),
      Err(AllocError::Overflow {
        requested: usize::MAX
      })
    );
    assert!(matches!(
      allocator.allocate(usize::MAX - 8),
      Err(AllocError::Overflow { .. })
    ));
    assert!(matches!(
      allocator.allocate(usize::MAX - 64),
      Err(AllocError::OutOfMemory { .. })
    ));
    allocator.check().unwrap();
  }

  #[test]
  fn test_adjust_size_floors_to_minimum() {
    assert_eq!(Allocator::<FixedHeap>::adjust_size(1), Ok(MIN_PAYLOAD_SIZE));
    assert_eq!(Allocator::<FixedHeap>::adjust_size(10), Ok(16));
    assert_eq!(Allocator::<FixedHeap>::adjust_size(17), Ok(24));
  }

  #[test]
  fn test_place_splits_large_block() {
    let mut allocator = allocator(1 << 16);

    let ptr = allocator.allocate(100).unwrap();
    assert_eq!(unsafe { allocator.usable_size(ptr) }, 104);

    let blocks: Vec<_> = allocator.blocks().collect();
    assert_eq!(blocks.len(), 2);
    assert!(blocks[0].allocated);
    assert!(!blocks[1].allocated);
    assert_eq!(blocks[1].size, DEFAULT_CHUNK_SIZE - 104 - OVERHEAD);
    allocator.check().unwrap();
  }

  #[test]
  fn test_place_consumes_small_leftover() {
    let mut allocator = allocator(1 << 16);

    // Leave a leftover of one word less than a minimum block.
    let size = DEFAULT_CHUNK_SIZE - (MIN_BLOCK_SIZE - ALIGNMENT);
    let ptr = allocator.allocate(size).unwrap();

    assert_eq!(unsafe { allocator.usable_size(ptr) }, DEFAULT_CHUNK_SIZE);
    assert!(allocator.free_list.is_empty());
    allocator.check().unwrap();
  }

  #[test]
  fn test_place_exact_fit() {
    let mut allocator = allocator(1 << 16);

    let ptr = allocator.allocate(DEFAULT_CHUNK_SIZE).unwrap();

    assert_eq!(unsafe { allocator.usable_size(ptr) }, DEFAULT_CHUNK_SIZE);
    assert_eq!(allocator.blocks().count(), 1);
    allocator.check().unwrap();
  }

  #[test]
  fn test_first_fit_reuses_recent_free() {
    let mut allocator = allocator(1 << 16);

    let a = allocator.allocate(64).unwrap();
    let _b = allocator.allocate(64).unwrap();

    unsafe { allocator.deallocate(a) };

    let c = allocator.allocate(48).unwrap();
    assert_eq!(c, a);
    allocator.check().unwrap();
  }

  #[test]
  fn test_grow_on_miss() {
    let mut allocator = allocator(1 << 16);

    let ptr = allocator.allocate(5000).unwrap();
    assert!(unsafe { allocator.usable_size(ptr) } >= 5000);

    // The initial chunk was the free tail, so growth merged into it.
    assert_eq!(ptr, allocator.arena.pointer(allocator.arena.first_block()));
    allocator.check().unwrap();
  }

  #[test]
  fn test_growth_failure_leaves_heap_intact() {
    let mut allocator = allocator(8192);
    let before = allocator.check().unwrap();

    let err = allocator.allocate(16384).unwrap_err();
    assert!(matches!(err, AllocError::OutOfMemory { .. }));

    assert_eq!(allocator.check().unwrap(), before);
    assert!(allocator.allocate(64).is_ok());
  }

  #[test]
  fn test_custom_chunk_size() {
    let mut allocator = Allocator::init(
      FixedHeap::new(1 << 16).unwrap(),
      Config::new().with_chunk_size(250),
    )
    .unwrap();

    assert_eq!(allocator.config().chunk_size, 256);
    assert_eq!(allocator.blocks().next().unwrap().size, 256);

    allocator.allocate(200).unwrap();
    allocator.allocate(200).unwrap();

    let stats = allocator.check().unwrap();
    assert_eq!(stats.allocated_blocks, 2);
  }

  #[test]
  fn test_init_rejects_unalignable_chunk_size() {
    let result = Allocator::init(
      FixedHeap::new(1 << 16).unwrap(),
      Config::new().with_chunk_size(usize::MAX - 3),
    );

    assert!(matches!(
      result,
      Err(AllocError::Overflow {
        requested
      }) if requested == usize::MAX - 3
    ));
  }

  #[test]
  fn test_payload_reference_survives_heap_calls() {
    let mut allocator = allocator(1 << 16);

    let ptr = allocator.allocate(24).unwrap();
    let payload = unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), 24) };
    payload[0] = 1;

    let other = allocator.allocate(24).unwrap();
    payload[1] = 2;

    unsafe { allocator.deallocate(other) };
    payload[2] = 3;

    let big = allocator.allocate(5000).unwrap();
    payload[3] = 4;

    unsafe { allocator.deallocate(big) };
    payload[23] = 5;

    assert_eq!(&payload[..4], &[1, 2, 3, 4]);
    assert_eq!(payload[23], 5);
    allocator.check().unwrap();
  }

  /// Something else bumps the break before every growth after the first
  /// `calls` ones.
  struct Interloper {
    inner: FixedHeap,
    calls: usize,
  }

  impl HeapSource for Interloper {
    fn grow(
      &mut self,
      increment: usize,
    ) -> Result<NonNull<u8>, GrowError> {
      if self.calls == 0 {
        self.inner.grow(64)?;
      } else {
        self.calls -= 1;
      }
      self.inner.grow(increment)
    }
  }

  #[test]
  fn test_discontiguous_growth_is_out_of_memory() {
    // `grow(0)`, the sentinels and the first chunk are left alone.
    let source = Interloper {
      inner: FixedHeap::new(1 << 16).unwrap(),
      calls: 3,
    };
    let mut allocator = Allocator::init(source, Config::default()).unwrap();
    let before = allocator.check().unwrap();

    assert_eq!(
      allocator.allocate(2 * DEFAULT_CHUNK_SIZE),
      Err(AllocError::OutOfMemory {
        requested: 2 * DEFAULT_CHUNK_SIZE + OVERHEAD,
        source: GrowError::Discontiguous,
      })
    );
    assert_eq!(allocator.check().unwrap(), before);

    allocator.allocate(64).unwrap();
    allocator.check().unwrap();
  }
}
