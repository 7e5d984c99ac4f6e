//! Header / boundary tag encoding.
//!
//! ```text
//!     63 62 61  .  .  .  3  2  1  0
//!   +-------------------------------+
//!   |  s  s  s  .  .  .  s  0  0  a |
//!   +-------------------------------+
//! ```
//!
//! `s` is the payload size in bytes (always a multiple of [`ALIGNMENT`], so
//! the low three bits are implicitly zero) and `a` is set when the block is
//! allocated. The same word is stored before the payload (header) and right
//! after it (boundary tag).

use std::{fmt, mem};

/// Size of one machine word in bytes.
pub const WORD_SIZE: usize = mem::size_of::<usize>();

/// Alignment quantum for payload sizes and payload addresses.
pub const ALIGNMENT: usize = 8;

/// Bytes occupied by a block header.
pub const HEADER_SIZE: usize = WORD_SIZE;

/// Bytes occupied by a block boundary tag.
pub const BOUNDARY_SIZE: usize = WORD_SIZE;

/// Header plus boundary tag.
pub const OVERHEAD: usize = HEADER_SIZE + BOUNDARY_SIZE;

/// Smallest payload a block may carry: room for the two free-list links.
pub const MIN_PAYLOAD_SIZE: usize = 2 * WORD_SIZE;

/// Smallest total block (header, two link words, boundary tag).
pub const MIN_BLOCK_SIZE: usize = MIN_PAYLOAD_SIZE + OVERHEAD;

/// Default amount of payload requested from the heap source per growth.
pub const DEFAULT_CHUNK_SIZE: usize = 1 << 12;

const ALLOCATED_BIT: usize = 0x1;
const SIZE_MASK: usize = !(ALIGNMENT - 1);

const _: () = assert!(ALIGNMENT.is_power_of_two());
const _: () = assert!(WORD_SIZE <= ALIGNMENT);

/// A packed `(payload size, allocated)` pair.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Header(usize);

impl Header {
  /// Header for the zero-size allocated prologue and epilogue sentinels.
  pub const SENTINEL: Header = Header::new(0, true);

  pub const fn new(
    size: usize,
    allocated: bool,
  ) -> Self {
    debug_assert!(size & !SIZE_MASK == 0, "payload size is not aligned");
    Self(size | allocated as usize)
  }

  pub const fn from_bits(bits: usize) -> Self {
    Self(bits)
  }

  pub const fn to_bits(self) -> usize {
    self.0
  }

  /// Payload size in bytes, with the flag bits masked off.
  pub const fn size(self) -> usize {
    self.0 & SIZE_MASK
  }

  pub const fn is_allocated(self) -> bool {
    self.0 & ALLOCATED_BIT != 0
  }

  pub const fn is_free(self) -> bool {
    !self.is_allocated()
  }
}

impl fmt::Debug for Header {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Header")
      .field("size", &self.size())
      .field("allocated", &self.is_allocated())
      .finish()
  }
}
