use crate::header::ALIGNMENT;

/// Rounds the given size up to the allocator's alignment quantum.
///
/// Every payload size handed to the block layer goes through this, so the low
/// three bits of a header word are always free for flags.
///
/// # Examples
///
/// ```rust
/// use tagalloc::align;
///
/// assert_eq!(align!(13), 16);
/// assert_eq!(align!(16), 16);
/// assert_eq!(align!(1), 8);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + $crate::ALIGNMENT - 1) & !($crate::ALIGNMENT - 1)
  };
}

/// Checked variant of [`align!`] for sizes coming straight from callers.
///
/// Returns `None` if rounding up would overflow `usize`.
pub const fn align_up(value: usize) -> Option<usize> {
  match value.checked_add(ALIGNMENT - 1) {
    Some(padded) => Some(padded & !(ALIGNMENT - 1)),
    None => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_align() {
    let mut alignments = Vec::new();

    for i in 0..10 {
      let sizes = (ALIGNMENT * i + 1)..=(ALIGNMENT * (i + 1));

      let expected_alignment = ALIGNMENT * (i + 1);

      alignments.push((sizes, expected_alignment));
    }

    for (sizes, expected) in alignments {
      for size in sizes {
        assert_eq!(expected, align!(size));
        assert_eq!(Some(expected), align_up(size));
      }
    }
  }

  #[test]
  fn test_align_up_zero_and_overflow() {
    assert_eq!(Some(0), align_up(0));
    assert_eq!(None, align_up(usize::MAX));
    assert_eq!(None, align_up(usize::MAX - 3));
    assert_eq!(Some(usize::MAX - 7), align_up(usize::MAX - 7));
  }
}
