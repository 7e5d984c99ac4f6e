use std::fmt;

use crate::{
  align::align_up,
  error::AllocError,
  header::{DEFAULT_CHUNK_SIZE, MIN_PAYLOAD_SIZE},
  trace::Tracer,
};

/// Construction-time settings for an [`Allocator`](crate::Allocator).
#[derive(Clone, Copy)]
pub struct Config {
  /// Payload bytes requested from the heap source whenever the free list
  /// cannot satisfy an allocation (larger requests grow by exactly their
  /// size).
  pub chunk_size: usize,
  /// Receives an [`Event`](crate::Event) for every heap mutation.
  pub tracer: Option<&'static dyn Tracer>,
}

impl Config {
  pub const fn new() -> Self {
    Self {
      chunk_size: DEFAULT_CHUNK_SIZE,
      tracer: None,
    }
  }

  pub const fn with_chunk_size(
    mut self,
    chunk_size: usize,
  ) -> Self {
    self.chunk_size = chunk_size;
    self
  }

  pub const fn with_tracer(
    mut self,
    tracer: &'static dyn Tracer,
  ) -> Self {
    self.tracer = Some(tracer);
    self
  }

  /// Chunk size rounded to the alignment quantum and floored to the minimum
  /// payload. Fails if rounding overflows.
  pub(crate) fn effective_chunk_size(&self) -> Result<usize, AllocError> {
    let aligned = align_up(self.chunk_size).ok_or(AllocError::Overflow {
      requested: self.chunk_size,
    })?;

    Ok(aligned.max(MIN_PAYLOAD_SIZE))
  }
}

impl Default for Config {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for Config {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Config")
      .field("chunk_size", &self.chunk_size)
      .field("tracer", &self.tracer.is_some())
      .finish()
  }
}
