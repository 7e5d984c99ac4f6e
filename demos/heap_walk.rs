use std::{io::Read, ptr::NonNull};

use tagalloc::{Allocator, Config, MappedRegion};

/// Waits until the user presses ENTER when started with `--step`.
/// Useful to inspect the mapping with `pmap` or `gdb` between steps.
fn pause(step: bool) {
  if step {
    println!("\n>>> Press ENTER to continue...");
    let _ = std::io::stdin().bytes().next();
  }
}

/// Prints every block between the sentinels, in address order.
fn print_heap(
  label: &str,
  allocator: &Allocator<MappedRegion>,
) {
  println!("[{label}]");
  for block in allocator.blocks() {
    println!(
      "  @{:<6} {:>6} bytes  {}",
      block.offset,
      block.size,
      if block.allocated { "used" } else { "free" }
    );
  }

  match allocator.check() {
    Ok(stats) => println!(
      "  arena = {} bytes, {} used / {} free blocks, largest free = {}",
      stats.arena_bytes, stats.allocated_blocks, stats.free_blocks, stats.largest_free
    ),
    Err(err) => println!("  heap is inconsistent: {err}"),
  }
}

fn print_alloc(
  label: &str,
  requested: usize,
  ptr: NonNull<u8>,
  allocator: &Allocator<MappedRegion>,
) {
  println!(
    "\n{label}: requested {requested} bytes -> {:?} (usable {}, addr % 8 = {})",
    ptr,
    unsafe { allocator.usable_size(ptr) },
    ptr.as_ptr() as usize % 8
  );
}

fn main() {
  let step = std::env::args().any(|arg| arg == "--step");

  let mut allocator = match Allocator::init(MappedRegion::new(1 << 24), Config::default()) {
    Ok(allocator) => allocator,
    Err(err) => {
      eprintln!("failed to initialise the heap: {err}");
      return;
    }
  };

  print_heap("start", &allocator);
  pause(step);

  // 1) A u32 worth of bytes still takes the minimum payload.
  let first = allocator.allocate(4).unwrap();
  print_alloc("[1] Allocate 4", 4, first, &allocator);
  unsafe { first.cast::<u32>().write(0xDEADBEEF) };
  print_heap("after 1", &allocator);
  pause(step);

  // 2) Odd sizes are rounded up to the alignment quantum.
  let second = allocator.allocate(12).unwrap();
  print_alloc("[2] Allocate 12", 12, second, &allocator);
  unsafe { second.as_ptr().write_bytes(0xAB, 12) };
  print_heap("after 2", &allocator);
  pause(step);

  // 3) A neighbour that keeps the first two from merging with the tail.
  let third = allocator.allocate(32).unwrap();
  print_alloc("[3] Allocate 32", 32, third, &allocator);
  print_heap("after 3", &allocator);
  pause(step);

  // 4) Freeing two neighbours leaves one coalesced block.
  unsafe {
    allocator.deallocate(first);
    allocator.deallocate(second);
  }
  println!("\n[4] Freed the first two blocks");
  print_heap("after 4", &allocator);
  pause(step);

  // 5) The coalesced block is at the head of the free list and gets reused.
  let fifth = allocator.allocate(2).unwrap();
  print_alloc("[5] Allocate 2", 2, fifth, &allocator);
  println!(
    "[5] reused the freed block? {}",
    if fifth == first { "yes" } else { "no" }
  );
  print_heap("after 5", &allocator);
  pause(step);

  // 6) Growing the last used block spills into the free tail.
  let grown = unsafe { allocator.reallocate(Some(third), 512) }.unwrap().unwrap();
  print_alloc("[6] Reallocate third to 512", 512, grown, &allocator);
  println!("[6] stayed in place? {}", grown == third);
  print_heap("after 6", &allocator);
  pause(step);

  // 7) A request larger than the free space grows the arena.
  let big = allocator.allocate(64 * 1024).unwrap();
  print_alloc("[7] Allocate 64 KiB", 64 * 1024, big, &allocator);
  print_heap("after 7", &allocator);
  pause(step);

  // 8) Release everything; the heap collapses to one free block.
  unsafe {
    allocator.deallocate(fifth);
    allocator.deallocate(grown);
    allocator.deallocate(big);
  }
  print_heap("end", &allocator);
}
