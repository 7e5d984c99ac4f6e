//! # tagalloc - A Boundary-Tag Memory Allocator
//!
//! This crate provides an explicit free-list allocator with boundary tags,
//! immediate coalescing and LIFO insertion, carving variably-sized blocks out
//! of one contiguous region that only ever grows.
//!
//! ## Overview
//!
//! ```text
//!   Heap Layout:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                              ARENA                                   │
//!   │                                                                      │
//!   │  ┌────┬────┬───────────┬──────────────┬───────────┬──────────┬────┐ │
//!   │  │ PH │ PT │ A1 (used) │  F1 (free)   │ A2 (used) │ F2 (free)│ EH │ │
//!   │  └────┴────┴───────────┴──────────────┴───────────┴──────────┴────┘ │
//!   │    ▲    ▲                                                       ▲    │
//!   │    └────┴── prologue (size 0, allocated)          epilogue ─────┘    │
//!   │                                                                      │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   Free blocks are linked through their payload, newest first:
//!
//!     head ──► F2 ──► F1 ──► nil
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   tagalloc
//!   ├── align      - Alignment macro (align!) and checked align_up
//!   ├── header     - Header / boundary tag codec and block geometry
//!   ├── block      - Block handle (payload offset) and BlockInfo
//!   ├── source     - Growth primitives: ProgramBreak, MappedRegion, FixedHeap
//!   ├── arena      - Sentinels, growth, word access by offset
//!   ├── free_list  - Explicit doubly linked LIFO free list
//!   ├── allocator  - Allocator context and placement (allocate)
//!   ├── reclaim    - Deallocation and coalescing
//!   ├── resize     - Reallocation
//!   ├── check      - Heap walkers and the consistency checker
//!   ├── trace      - Structured events and the Tracer hook
//!   └── global     - LockedHeap, a GlobalAlloc front end
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use tagalloc::{Allocator, Config, FixedHeap};
//!
//! let source = FixedHeap::new(1 << 16).unwrap();
//! let mut allocator = Allocator::init(source, Config::default()).unwrap();
//!
//! let ptr = allocator.allocate(24).unwrap();
//! unsafe {
//!     ptr.as_ptr().write_bytes(0xAB, 24);
//!
//!     let ptr = allocator.reallocate(Some(ptr), 64).unwrap().unwrap();
//!     assert_eq!(*ptr.as_ptr().add(23), 0xAB);
//!
//!     allocator.deallocate(ptr);
//! }
//!
//! allocator.check().unwrap();
//! ```
//!
//! ## How It Works
//!
//! Every block carries its payload size and an allocated bit twice, once in
//! front of the payload and once right after it:
//!
//! ```text
//!   Single Block:
//!   ┌──────────────┬─────────────────────────────────┬──────────────┐
//!   │    header    │             payload             │ boundary tag │
//!   │  size | a    │  free: next, prev, ...          │  size | a    │
//!   │   1 word     │  used: N bytes for the caller   │   1 word     │
//!   └──────────────┴─────────────────────────────────┴──────────────┘
//!                  ▲
//!                  └── Pointer returned to user (8-byte aligned)
//! ```
//!
//! The header of the next block sits right after the boundary tag, and the
//! boundary tag of the previous block right before the header, so both
//! physical neighbours are found in constant time. That is what makes
//! immediate coalescing on free cheap.
//!
//! - **allocate**: first fit from the free-list head; split when the rest can
//!   stand as a block of its own, otherwise hand out the whole block. On a
//!   miss the arena grows by `max(request, chunk_size)`.
//! - **deallocate**: merge with a free predecessor, then with a free
//!   successor, and push the result onto the free list.
//! - **reallocate**: shrink in place, grow into a free successor, or move.
//!
//! ## Limitations
//!
//! - **Single-threaded engine**: [`Allocator`] takes `&mut self`; use
//!   [`LockedHeap`] to share one between threads
//! - **Memory is never returned** to the heap source
//! - **Alignment** is fixed at 8 bytes
//!
//! ## Safety
//!
//! Block metadata is only ever read and written through bounds-checked
//! offsets into the arena. Handing [`Allocator::deallocate`] or
//! [`Allocator::reallocate`] a pointer that is not a live allocation of the
//! same allocator is undefined behaviour, which is why both are `unsafe`.

pub mod align;
mod allocator;
mod arena;
mod block;
mod check;
mod config;
mod error;
mod free_list;
mod global;
pub mod header;
mod reclaim;
mod resize;
mod source;
mod trace;

pub use allocator::Allocator;
pub use arena::SENTINEL_SIZE;
pub use block::BlockInfo;
pub use check::{Blocks, FreeBlocks, HeapStats};
pub use config::Config;
pub use error::{AllocError, HeapError};
pub use global::LockedHeap;
pub use header::{ALIGNMENT, DEFAULT_CHUNK_SIZE, MIN_BLOCK_SIZE, MIN_PAYLOAD_SIZE, OVERHEAD};
pub use source::{FixedHeap, GrowError, HeapSource, MappedRegion, ProgramBreak};
pub use trace::{Direction, Event, LogTracer, ResizeStrategy, Tracer};
