//! Heap walking and consistency checks.

use crate::{
  allocator::Allocator,
  arena::{Arena, SENTINEL_SIZE},
  block::{Block, BlockInfo},
  error::HeapError,
  free_list::{self, FreeList},
  header::{ALIGNMENT, HEADER_SIZE, Header, MIN_PAYLOAD_SIZE, OVERHEAD},
  source::HeapSource,
};

/// Summary of a consistent heap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
  /// Bytes spanned by the arena, sentinels included.
  pub arena_bytes: usize,
  /// Bytes skipped in front of the arena to align it.
  pub padding: usize,
  pub allocated_blocks: usize,
  pub allocated_bytes: usize,
  pub free_blocks: usize,
  pub free_bytes: usize,
  pub largest_free: usize,
}

impl HeapStats {
  pub fn blocks(&self) -> usize {
    self.allocated_blocks + self.free_blocks
  }
}

impl<S: HeapSource> Allocator<S> {
  /// Every block between the sentinels, in address order.
  pub fn blocks(&self) -> Blocks<'_, S> {
    Blocks {
      arena: &self.arena,
      next: Some(self.arena.first_block()),
    }
  }

  /// The free list, from the head.
  pub fn free_blocks(&self) -> FreeBlocks<'_, S> {
    FreeBlocks {
      arena: &self.arena,
      inner: self.free_list.iter(&self.arena),
      remaining: self.free_list.len(),
    }
  }

  /// Walks the whole heap and the free list and verifies every structural
  /// invariant:
  ///
  /// - sentinels are intact and blocks tile the arena exactly,
  /// - header and boundary tag of every block agree,
  /// - payload sizes are aligned and at least the minimum,
  /// - no two physically adjacent blocks are free,
  /// - the free list holds exactly the free blocks, with consistent links.
  pub fn check(&self) -> Result<HeapStats, HeapError> {
    let stats = walk_blocks(&self.arena)?;
    walk_free_list(&self.arena, &self.free_list, stats.free_blocks)?;
    Ok(stats)
  }
}

fn walk_blocks<S: HeapSource>(arena: &Arena<S>) -> Result<HeapStats, HeapError> {
  let prologue = arena.prologue_offset();

  if arena.word(prologue) != Header::SENTINEL.to_bits()
    || arena.word(prologue + HEADER_SIZE) != Header::SENTINEL.to_bits()
  {
    return Err(HeapError::Prologue);
  }

  let mut stats = HeapStats {
    arena_bytes: arena.len(),
    padding: arena.padding(),
    ..HeapStats::default()
  };
  let mut covered = SENTINEL_SIZE;
  let mut block = arena.first_block();
  let mut prev_free: Option<Block> = None;

  while !arena.is_epilogue(block) {
    let offset = block.offset();
    let header = arena.header(block);
    let size = header.size();

    if header.is_allocated() && size == 0 {
      return Err(HeapError::Epilogue {
        offset: arena.epilogue_offset(),
      });
    }

    if header.to_bits() & (ALIGNMENT - 1) & !1 != 0 {
      return Err(HeapError::Misaligned { offset, size });
    }

    if size < MIN_PAYLOAD_SIZE {
      return Err(HeapError::Undersized { offset, size });
    }

    if offset + size + OVERHEAD > arena.len() {
      return Err(HeapError::Overrun { offset, size });
    }

    let boundary = arena.boundary(block);
    if boundary != header {
      return Err(HeapError::TagMismatch {
        offset,
        header: header.to_bits(),
        boundary: boundary.to_bits(),
      });
    }

    if header.is_free() {
      if let Some(prev) = prev_free {
        return Err(HeapError::AdjacentFree {
          first: prev.offset(),
          second: offset,
        });
      }

      stats.free_blocks += 1;
      stats.free_bytes += size;
      stats.largest_free = stats.largest_free.max(size);
      prev_free = Some(block);
    } else {
      stats.allocated_blocks += 1;
      stats.allocated_bytes += size;
      prev_free = None;
    }

    covered += size + OVERHEAD;
    block = block.following(size);
  }

  if arena.header(block) != Header::SENTINEL {
    return Err(HeapError::Epilogue {
      offset: arena.epilogue_offset(),
    });
  }

  if covered + arena.padding() != arena.obtained() {
    return Err(HeapError::Conservation {
      covered,
      obtained: arena.obtained(),
    });
  }

  Ok(stats)
}

fn walk_free_list<S: HeapSource>(
  arena: &Arena<S>,
  list: &FreeList,
  free_blocks: usize,
) -> Result<(), HeapError> {
  let mut prev: Option<Block> = None;
  let mut listed = 0;
  let mut next = list.head();

  while let Some(block) = next {
    // A cycle or a stray link shows up as more entries than free blocks.
    if listed == free_blocks {
      return Err(HeapError::ListCount {
        listed: listed + 1,
        free: free_blocks,
      });
    }

    let offset = block.offset();

    if !arena.contains(offset) {
      return Err(HeapError::BrokenLink { offset });
    }

    if arena.header(block).is_allocated() {
      return Err(HeapError::ListedAllocated { offset });
    }

    if free_list::prev_of(arena, block) != prev {
      return Err(HeapError::BrokenLink { offset });
    }

    listed += 1;
    prev = Some(block);
    next = free_list::next_of(arena, block);
  }

  if listed != free_blocks || listed != list.len() {
    return Err(HeapError::ListCount {
      listed,
      free: free_blocks,
    });
  }

  Ok(())
}

pub struct Blocks<'a, S: HeapSource> {
  arena: &'a Arena<S>,
  next: Option<Block>,
}

impl<S: HeapSource> Iterator for Blocks<'_, S> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<BlockInfo> {
    let block = self.next.take()?;

    if self.arena.is_epilogue(block) {
      return None;
    }

    let header = self.arena.header(block);

    // Stop rather than run off the end of a corrupted heap.
    if header.size() == 0 || block.offset() + header.size() + OVERHEAD > self.arena.len() {
      return None;
    }

    self.next = Some(block.following(header.size()));

    Some(BlockInfo {
      offset: block.offset(),
      size: header.size(),
      allocated: header.is_allocated(),
    })
  }
}

pub struct FreeBlocks<'a, S: HeapSource> {
  arena: &'a Arena<S>,
  inner: free_list::Iter<'a, S>,
  remaining: usize,
}

impl<S: HeapSource> Iterator for FreeBlocks<'_, S> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<BlockInfo> {
    if self.remaining == 0 {
      return None;
    }
    self.remaining -= 1;

    let block = self.inner.next()?;
    let header = self.arena.header(block);

    Some(BlockInfo {
      offset: block.offset(),
      size: header.size(),
      allocated: header.is_allocated(),
    })
  }
}
