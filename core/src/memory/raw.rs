//! Raw, self-aligning byte blocks obtained from the system allocator.
//!
//! A [`RawBlock`] over-allocates `size + alignment` bytes with byte alignment
//! and shifts the returned pointer forward until it is aligned. The shift is
//! written into the byte immediately preceding the aligned pointer, which is
//! why the shift is always at least one byte: when the system pointer is
//! already aligned, a full `alignment` step is taken instead.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use super::error::MemoryError;

/// Largest alignment a [`RawBlock`] (and therefore any page) can satisfy.
///
/// The shift is stored in a single byte, with `0` encoding a shift of 256.
pub const MAX_ALIGNMENT: u64 = 256;

/// Panics unless `alignment` is a power of two no larger than [`MAX_ALIGNMENT`].
pub(crate) fn assert_valid_alignment(alignment: u64) {
    assert!(
        alignment.is_power_of_two() && alignment <= MAX_ALIGNMENT,
        "alignment must be a power of two no larger than {MAX_ALIGNMENT}, got {alignment}"
    );
}

/// Number of bytes to advance `address` so it becomes a multiple of `alignment`.
pub(crate) fn align_shift(address: usize, alignment: usize) -> usize {
    let misalignment = address & (alignment - 1);
    if misalignment == 0 {
        0
    } else {
        alignment - misalignment
    }
}

/// An owned, zero-initialised, aligned block of bytes.
pub(crate) struct RawBlock {
    /// Aligned pointer handed out to users of the block.
    ptr: NonNull<u8>,
    /// Usable bytes starting at `ptr`.
    len: usize,
    /// Layout of the underlying system allocation.
    layout: Layout,
    /// Bytes skipped to reach `ptr` from the system allocation.
    shift: usize,
}

impl RawBlock {
    /// Reserve `size` usable bytes aligned to `alignment`.
    ///
    /// # Panics
    ///
    /// Panics if `alignment` is not a power of two or exceeds [`MAX_ALIGNMENT`].
    pub(crate) fn allocate_by_bytes(size: u64, alignment: u64) -> Result<Self, MemoryError> {
        assert_valid_alignment(alignment);

        let len = usize::try_from(size).map_err(|_| MemoryError::SystemAllocationFailed {
            bytes: size,
        })?;
        let alignment = alignment as usize;
        let total = len
            .checked_add(alignment)
            .ok_or(MemoryError::SystemAllocationFailed { bytes: size })?;
        let layout = Layout::from_size_align(total, 1)
            .map_err(|_| MemoryError::SystemAllocationFailed { bytes: size })?;

        // SAFETY: `layout` has a non-zero size because `alignment >= 1`.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let raw = NonNull::new(raw).ok_or(MemoryError::SystemAllocationFailed { bytes: size })?;

        let mut shift = align_shift(raw.as_ptr() as usize, alignment);
        if shift == 0 {
            shift = alignment;
        }
        debug_assert!((1..=MAX_ALIGNMENT as usize).contains(&shift));

        // SAFETY: `shift <= alignment`, so `raw + shift` stays inside the
        // `len + alignment` byte allocation, and `shift >= 1` leaves room for
        // the shift byte at `raw + shift - 1`.
        let ptr = unsafe {
            let aligned = raw.as_ptr().add(shift);
            aligned.sub(1).write(shift as u8);
            NonNull::new_unchecked(aligned)
        };

        log::trace!(
            "RawBlock: reserved {} bytes aligned to {} (shift {})",
            len,
            alignment,
            shift
        );

        Ok(Self {
            ptr,
            len,
            layout,
            shift,
        })
    }

    /// Aligned base pointer.
    pub(crate) fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Usable length in bytes.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Bytes skipped from the system allocation to reach the aligned base.
    pub(crate) fn shift(&self) -> usize {
        self.shift
    }

    /// Shift recovered from the byte preceding the aligned base.
    pub(crate) fn stored_shift(&self) -> usize {
        // SAFETY: the byte before `ptr` was written in `allocate_by_bytes` and
        // belongs to this block's system allocation.
        let byte = unsafe { self.ptr.as_ptr().sub(1).read() };
        if byte == 0 {
            MAX_ALIGNMENT as usize
        } else {
            byte as usize
        }
    }

    /// Copy the first `len` bytes of `other` into the start of this block.
    pub(crate) fn copy_prefix_from(&mut self, other: &RawBlock, len: usize) {
        assert!(len <= self.len && len <= other.len, "copy exceeds block length");
        // SAFETY: both ranges are in bounds of their blocks, and two distinct
        // blocks never overlap.
        unsafe {
            std::ptr::copy_nonoverlapping(other.ptr.as_ptr(), self.ptr.as_ptr(), len);
        }
    }
}

// SAFETY: the block exclusively owns its allocation, like `Box<[u8]>`.
unsafe impl Send for RawBlock {}
// SAFETY: shared access only hands out the base pointer; writes go through
// `&mut` owners.
unsafe impl Sync for RawBlock {}

impl Drop for RawBlock {
    fn drop(&mut self) {
        let shift = self.stored_shift();
        debug_assert_eq!(shift, self.shift, "shift byte was overwritten");
        // SAFETY: un-shifting recovers the pointer returned by `alloc_zeroed`
        // for exactly this layout.
        unsafe {
            let origin = self.ptr.as_ptr().sub(self.shift);
            alloc::dealloc(origin, self.layout);
        }
    }
}

impl std::fmt::Debug for RawBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawBlock")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .field("shift", &self.shift)
            .finish()
    }
}
