//! Structured heap events and the hook that receives them.
//!
//! The allocator never formats anything itself. Install a [`Tracer`] through
//! [`Config::with_tracer`](crate::Config::with_tracer) to observe it;
//! [`LogTracer`] forwards everything to the `log` facade.
//!
//! A tracer runs inside the allocator. If the allocator is also the global
//! allocator, the tracer must not allocate.

use log::{Level, log};

use crate::source::GrowError;

/// Which neighbour a freed block merged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
  Backward,
  Forward,
}

/// How a reallocation was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeStrategy {
  /// The block already had the requested size, or shrinking would leave a
  /// remainder too small to be a block.
  Unchanged,
  /// The tail was split off and freed.
  Shrunk,
  /// The following free block was absorbed.
  Absorbed,
  /// A new block was allocated and the payload copied over.
  Moved,
}

/// All offsets are payload offsets from the arena base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
  Initialized { arena_len: usize, chunk_size: usize },
  Grown { offset: usize, size: usize },
  GrowthFailed { requested: usize, error: GrowError },
  Placed { offset: usize, size: usize },
  Split { offset: usize, remainder: usize },
  Freed { offset: usize, size: usize },
  Coalesced {
    offset: usize,
    size: usize,
    direction: Direction,
  },
  Resized {
    offset: usize,
    from: usize,
    to: usize,
    strategy: ResizeStrategy,
  },
}

impl Event {
  /// Log level [`LogTracer`] uses for this event.
  pub fn level(&self) -> Level {
    match self {
      Event::GrowthFailed { .. } => Level::Warn,
      Event::Initialized { .. } | Event::Grown { .. } => Level::Debug,
      _ => Level::Trace,
    }
  }
}

pub trait Tracer: Sync {
  fn record(&self, event: &Event);
}

impl<F: Fn(&Event) + Sync> Tracer for F {
  fn record(&self, event: &Event) {
    self(event)
  }
}

/// Forwards events to the `log` crate under the `tagalloc` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTracer;

impl Tracer for LogTracer {
  fn record(&self, event: &Event) {
    let level = event.level();

    match *event {
      Event::Initialized {
        arena_len,
        chunk_size,
      } => log!(target: "tagalloc", level, "initialized heap: {arena_len} bytes, chunk size {chunk_size}"),
      Event::Grown { offset, size } => {
        log!(target: "tagalloc", level, "grew heap by {size} bytes at offset {offset}")
      }
      Event::GrowthFailed { requested, error } => {
        log!(target: "tagalloc", level, "failed to grow heap by {requested} bytes: {error}")
      }
      Event::Placed { offset, size } => {
        log!(target: "tagalloc", level, "placed {size} bytes at offset {offset}")
      }
      Event::Split { offset, remainder } => {
        log!(target: "tagalloc", level, "split off free block of {remainder} bytes at offset {offset}")
      }
      Event::Freed { offset, size } => {
        log!(target: "tagalloc", level, "freed {size} bytes at offset {offset}")
      }
      Event::Coalesced {
        offset,
        size,
        direction,
      } => log!(target: "tagalloc", level, "coalesced {direction:?} into {size} bytes at offset {offset}"),
      Event::Resized {
        offset,
        from,
        to,
        strategy,
      } => log!(target: "tagalloc", level, "resized block at offset {offset} from {from} to {to} bytes ({strategy:?})"),
    }
  }
}
