//! Growth primitives backing the arena.
//!
//! A [`HeapSource`] behaves like `sbrk(2)`: every call extends one contiguous
//! region and returns the address of the previous end. The arena never gives
//! memory back.

use std::{
  alloc::{self, Layout},
  ptr::{self, NonNull},
};

use libc::{c_void, intptr_t};

use crate::header::ALIGNMENT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GrowError {
  #[error("heap source exhausted: requested {requested} bytes, {available} available")]
  Exhausted { requested: usize, available: usize },
  #[error("heap source returned memory that does not follow the previous region")]
  Discontiguous,
  #[error("the operating system refused to extend the heap")]
  Unavailable,
}

/// Contract: regions returned by successive calls are contiguous and
/// monotonic, and a failed call leaves the region unchanged. `grow(0)`
/// returns the current end without extending.
pub trait HeapSource {
  fn grow(
    &mut self,
    increment: usize,
  ) -> Result<NonNull<u8>, GrowError>;
}

impl<S: HeapSource + ?Sized> HeapSource for &mut S {
  fn grow(
    &mut self,
    increment: usize,
  ) -> Result<NonNull<u8>, GrowError> {
    (**self).grow(increment)
  }
}

/// The process data segment, extended with `sbrk(2)`.
///
/// Anything else in the process that moves the program break (the platform
/// `malloc` does) breaks contiguity; the arena detects that and reports
/// [`GrowError::Discontiguous`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ProgramBreak;

impl HeapSource for ProgramBreak {
  fn grow(
    &mut self,
    increment: usize,
  ) -> Result<NonNull<u8>, GrowError> {
    let increment = intptr_t::try_from(increment).map_err(|_| GrowError::Unavailable)?;

    let previous = unsafe { libc::sbrk(increment) };

    if previous == usize::MAX as *mut c_void {
      return Err(GrowError::Unavailable);
    }

    NonNull::new(previous.cast::<u8>()).ok_or(GrowError::Unavailable)
  }
}

/// A private anonymous mapping reserved on first use, with a break that moves
/// inside it.
///
/// Pages are mapped with `MAP_NORESERVE`, so a large capacity only costs
/// address space until the bytes are touched.
#[derive(Debug)]
pub struct MappedRegion {
  base: Option<NonNull<u8>>,
  capacity: usize,
  brk: usize,
}

// The mapping is owned exclusively by this value.
unsafe impl Send for MappedRegion {}

impl MappedRegion {
  pub const fn new(capacity: usize) -> Self {
    Self {
      base: None,
      capacity,
      brk: 0,
    }
  }

  pub const fn capacity(&self) -> usize {
    self.capacity
  }

  /// Maps the region on first use. `increment` is only reported back if
  /// there is nothing to map.
  fn map(
    &mut self,
    increment: usize,
  ) -> Result<NonNull<u8>, GrowError> {
    if let Some(base) = self.base {
      return Ok(base);
    }

    if self.capacity == 0 {
      return Err(GrowError::Exhausted {
        requested: increment,
        available: 0,
      });
    }

    let address = unsafe {
      libc::mmap(
        ptr::null_mut(),
        self.capacity,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
        -1,
        0,
      )
    };

    if address == libc::MAP_FAILED {
      return Err(GrowError::Unavailable);
    }

    let base = NonNull::new(address.cast::<u8>()).ok_or(GrowError::Unavailable)?;
    self.base = Some(base);
    Ok(base)
  }
}

impl HeapSource for MappedRegion {
  fn grow(
    &mut self,
    increment: usize,
  ) -> Result<NonNull<u8>, GrowError> {
    let base = self.map(increment)?;
    let available = self.capacity - self.brk;

    if increment > available {
      return Err(GrowError::Exhausted {
        requested: increment,
        available,
      });
    }

    let previous = unsafe { base.add(self.brk) };
    self.brk += increment;
    Ok(previous)
  }
}

impl Drop for MappedRegion {
  fn drop(&mut self) {
    if let Some(base) = self.base.take() {
      unsafe {
        libc::munmap(base.as_ptr().cast::<c_void>(), self.capacity);
      }
    }
  }
}

/// A fixed-capacity region taken from the system allocator up front.
///
/// Handy for tests: exhaustion is deterministic and every instance is
/// independent of the process break.
#[derive(Debug)]
pub struct FixedHeap {
  base: NonNull<u8>,
  layout: Layout,
  brk: usize,
}

// The buffer is owned exclusively by this value.
unsafe impl Send for FixedHeap {}

impl FixedHeap {
  pub fn new(capacity: usize) -> Result<Self, GrowError> {
    let layout = Layout::from_size_align(capacity.max(ALIGNMENT), ALIGNMENT).map_err(|_| {
      GrowError::Exhausted {
        requested: capacity,
        available: 0,
      }
    })?;

    let base = NonNull::new(unsafe { alloc::alloc_zeroed(layout) }).ok_or(GrowError::Unavailable)?;

    Ok(Self {
      base,
      layout,
      brk: 0,
    })
  }

  pub fn capacity(&self) -> usize {
    self.layout.size()
  }

  /// Bytes handed out so far.
  pub fn used(&self) -> usize {
    self.brk
  }
}

impl HeapSource for FixedHeap {
  fn grow(
    &mut self,
    increment: usize,
  ) -> Result<NonNull<u8>, GrowError> {
    let available = self.capacity() - self.brk;

    if increment > available {
      return Err(GrowError::Exhausted {
        requested: increment,
        available,
      });
    }

    let previous = unsafe { self.base.add(self.brk) };
    self.brk += increment;
    Ok(previous)
  }
}

impl Drop for FixedHeap {
  fn drop(&mut self) {
    unsafe { alloc::dealloc(self.base.as_ptr(), self.layout) };
  }
}
