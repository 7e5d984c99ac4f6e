//! `GlobalAlloc` front end.
//!
//! ```rust,ignore
//! use tagalloc::{LockedHeap, MappedRegion};
//!
//! #[global_allocator]
//! static HEAP: LockedHeap<MappedRegion> = LockedHeap::new(MappedRegion::new(1 << 30));
//! ```

use std::{
  alloc::{GlobalAlloc, Layout},
  mem,
  ptr::{self, NonNull},
};

use spin::Mutex;

use crate::{
  allocator::Allocator,
  check::HeapStats,
  config::Config,
  error::HeapError,
  header::ALIGNMENT,
  source::HeapSource,
};

enum Slot<S: HeapSource> {
  Pending(S, Config),
  Ready(Allocator<S>),
  /// Initialisation failed; every allocation returns null.
  Failed,
}

/// One [`Allocator`] behind a spin lock, initialised on first use.
///
/// Supports alignments up to 8 bytes; stricter layouts get null.
pub struct LockedHeap<S: HeapSource> {
  slot: Mutex<Slot<S>>,
}

impl<S: HeapSource> LockedHeap<S> {
  pub const fn new(source: S) -> Self {
    Self::with_config(source, Config::new())
  }

  pub const fn with_config(
    source: S,
    config: Config,
  ) -> Self {
    Self {
      slot: Mutex::new(Slot::Pending(source, config)),
    }
  }

  /// Runs `f` on the engine, initialising it first if needed.
  fn with_allocator<R>(
    &self,
    f: impl FnOnce(&mut Allocator<S>) -> Option<R>,
  ) -> Option<R> {
    let mut slot = self.slot.lock();

    if matches!(*slot, Slot::Pending(..)) {
      if let Slot::Pending(source, config) = mem::replace(&mut *slot, Slot::Failed) {
        if let Ok(allocator) = Allocator::init(source, config) {
          *slot = Slot::Ready(allocator);
        }
      }
    }

    match &mut *slot {
      Slot::Ready(allocator) => f(allocator),
      _ => None,
    }
  }

  /// Consistency check of the underlying heap; `None` before first use or if
  /// initialisation failed.
  pub fn check(&self) -> Option<Result<HeapStats, HeapError>> {
    match &*self.slot.lock() {
      Slot::Ready(allocator) => Some(allocator.check()),
      _ => None,
    }
  }

  fn supports(layout: Layout) -> bool {
    layout.align() <= ALIGNMENT && layout.size() != 0
  }
}

unsafe impl<S: HeapSource + Send> GlobalAlloc for LockedHeap<S> {
  unsafe fn alloc(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    if !Self::supports(layout) {
      return ptr::null_mut();
    }

    self
      .with_allocator(|allocator| allocator.allocate(layout.size()).ok())
      .map_or(ptr::null_mut(), NonNull::as_ptr)
  }

  unsafe fn dealloc(
    &self,
    ptr: *mut u8,
    _layout: Layout,
  ) {
    let Some(ptr) = NonNull::new(ptr) else {
      return;
    };

    self.with_allocator(|allocator| {
      unsafe { allocator.deallocate(ptr) };
      Some(())
    });
  }

  unsafe fn realloc(
    &self,
    ptr: *mut u8,
    layout: Layout,
    new_size: usize,
  ) -> *mut u8 {
    if layout.align() > ALIGNMENT || new_size == 0 {
      return ptr::null_mut();
    }

    self
      .with_allocator(|allocator| unsafe { allocator.reallocate(NonNull::new(ptr), new_size) }.ok().flatten())
      .map_or(ptr::null_mut(), NonNull::as_ptr)
  }
}
