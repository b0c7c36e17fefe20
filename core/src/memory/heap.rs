//! Bump-pointer byte arena backing all page data.
//!
//! The heap hands out byte ranges as offsets from its base. Freeing only
//! lowers the logical `used` counter; the write cursor never moves backward,
//! so interior space is never reissued until the whole heap is flushed.
//! Growing the heap relocates it, which is why callers keep offsets rather
//! than addresses.
//!
//! The base is always placed on a [`MAX_ALIGNMENT`] boundary. Page alignment
//! shifts are computed from base-relative offsets, so they stay valid when a
//! resize moves the heap to a different address.

use std::ptr::NonNull;

use super::error::MemoryError;
use super::raw::{assert_valid_alignment, RawBlock, MAX_ALIGNMENT};

/// Monotonic byte arena with relocating growth.
#[derive(Debug)]
pub struct PageHeap {
    block: RawBlock,
    /// Minimum base alignment requested at creation.
    alignment: u64,
    /// Next free byte (the physical high-water mark).
    cursor: u64,
    /// Bytes logically in use (lowered by [`PageHeap::free`]).
    used: u64,
    allocation_count: u64,
}

impl PageHeap {
    /// Create a heap of `capacity` bytes whose base is aligned to at least
    /// `alignment`.
    ///
    /// # Panics
    ///
    /// Panics if `alignment` is not a power of two or exceeds [`MAX_ALIGNMENT`].
    pub fn new(capacity: u64, alignment: u64) -> Result<Self, MemoryError> {
        assert_valid_alignment(alignment);
        let block = RawBlock::allocate_by_bytes(capacity, MAX_ALIGNMENT)?;
        Ok(Self {
            block,
            alignment,
            cursor: 0,
            used: 0,
            allocation_count: 0,
        })
    }

    /// Bump-allocate room for `count` values of `T`.
    ///
    /// Returns the byte offset of the range from the heap base. The request
    /// fails unless it fits strictly below capacity.
    pub fn malloc<T>(&mut self, count: u64) -> Result<u64, MemoryError> {
        let requested = (std::mem::size_of::<T>() as u64)
            .checked_mul(count)
            .ok_or_else(|| MemoryError::InvalidArgument(format!("{count} elements overflow")))?;

        let fits = matches!(self.cursor.checked_add(requested), Some(end) if end < self.capacity());
        if !fits {
            return Err(MemoryError::OutOfCapacity {
                resource: "page heap",
                requested,
                capacity: self.capacity(),
            });
        }

        let offset = self.cursor;
        self.cursor += requested;
        self.used += requested;
        self.allocation_count += 1;
        Ok(offset)
    }

    /// Grow to `new_size` bytes, copying the written prefix into the new block.
    ///
    /// Every address previously derived from [`PageHeap::base`] is invalid
    /// afterwards; offsets remain valid and keep their alignment.
    pub fn resize_and_flush_by_bytes(&mut self, new_size: u64) -> Result<NonNull<u8>, MemoryError> {
        assert!(
            new_size > self.capacity(),
            "page heap can only grow: {} -> {} bytes",
            self.capacity(),
            new_size
        );

        let mut block = RawBlock::allocate_by_bytes(new_size, MAX_ALIGNMENT)?;
        block.copy_prefix_from(&self.block, self.cursor as usize);

        log::debug!(
            "PageHeap: relocated {} live bytes into {} byte block",
            self.cursor,
            new_size
        );

        // Dropping the old block un-shifts and releases it.
        self.block = block;
        Ok(self.block.as_ptr())
    }

    /// Lower the logical used counter by `size` bytes.
    ///
    /// The write cursor is untouched, so the bytes are not reissued.
    pub fn free(&mut self, size: u64) {
        assert!(
            size <= self.used,
            "freeing {size} bytes from a heap using only {} bytes",
            self.used
        );
        self.used -= size;
    }

    /// Reset the cursor and counters without releasing the block.
    pub fn flush(&mut self) {
        self.cursor = 0;
        self.used = 0;
        self.allocation_count = 0;
    }

    /// Aligned base address of the heap.
    pub fn base(&self) -> NonNull<u8> {
        self.block.as_ptr()
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> u64 {
        self.block.len() as u64
    }

    /// Bytes logically in use.
    pub fn used(&self) -> u64 {
        self.used
    }

    /// Physical write position.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Number of successful `malloc` calls since creation or the last flush.
    pub fn allocation_count(&self) -> u64 {
        self.allocation_count
    }

    /// Minimum alignment of the heap base.
    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    /// Bytes skipped to align the current block.
    pub fn alignment_shift(&self) -> usize {
        self.block.shift()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malloc_bumps_cursor() {
        let mut heap = PageHeap::new(1024, 16).unwrap();
        assert_eq!(heap.malloc::<u8>(100).unwrap(), 0);
        assert_eq!(heap.malloc::<u32>(10).unwrap(), 100);
        assert_eq!(heap.cursor(), 140);
        assert_eq!(heap.used(), 140);
        assert_eq!(heap.allocation_count(), 2);
    }

    #[test]
    fn test_capacity_is_never_reached() {
        let mut heap = PageHeap::new(64, 16).unwrap();
        assert!(heap.malloc::<u8>(64).is_err());
        assert!(heap.malloc::<u8>(63).is_ok());
        let err = heap.malloc::<u8>(1).unwrap_err();
        assert_eq!(
            err,
            MemoryError::OutOfCapacity {
                resource: "page heap",
                requested: 1,
                capacity: 64,
            }
        );
    }

    #[test]
    fn test_free_does_not_rewind_cursor() {
        let mut heap = PageHeap::new(256, 16).unwrap();
        heap.malloc::<u8>(100).unwrap();
        heap.free(100);
        assert_eq!(heap.used(), 0);
        assert_eq!(heap.cursor(), 100);
        assert_eq!(heap.malloc::<u8>(10).unwrap(), 100);
    }

    #[test]
    fn test_resize_preserves_written_prefix() {
        let mut heap = PageHeap::new(64, 64).unwrap();
        let offset = heap.malloc::<u8>(8).unwrap();
        unsafe {
            let ptr = heap.base().as_ptr().add(offset as usize);
            for i in 0..8 {
                ptr.add(i).write(i as u8 + 1);
            }
        }

        heap.resize_and_flush_by_bytes(128).unwrap();

        assert_eq!(heap.capacity(), 128);
        assert_eq!(heap.base().as_ptr() as usize % 64, 0);
        let bytes = unsafe { std::slice::from_raw_parts(heap.base().as_ptr(), 8) };
        assert_eq!(bytes, &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    #[should_panic(expected = "can only grow")]
    fn test_resize_to_smaller_panics() {
        let mut heap = PageHeap::new(128, 16).unwrap();
        let _ = heap.resize_and_flush_by_bytes(64);
    }

    #[test]
    fn test_base_is_max_aligned_for_small_alignment() {
        let mut heap = PageHeap::new(64, 16).unwrap();
        assert_eq!(heap.alignment(), 16);
        assert_eq!(heap.base().as_ptr() as usize % MAX_ALIGNMENT as usize, 0);

        for size in [128, 256, 1024] {
            heap.resize_and_flush_by_bytes(size).unwrap();
            assert_eq!(heap.base().as_ptr() as usize % MAX_ALIGNMENT as usize, 0);
        }
    }

    #[test]
    fn test_flush_resets_cursor() {
        let mut heap = PageHeap::new(128, 16).unwrap();
        heap.malloc::<u8>(50).unwrap();
        heap.flush();
        assert_eq!(heap.cursor(), 0);
        assert_eq!(heap.used(), 0);
        assert_eq!(heap.allocation_count(), 0);
    }
}
