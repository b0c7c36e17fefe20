//! The memory manager: one page heap plus one page table.

use std::ptr::NonNull;

use bytemuck::Pod;

use super::config::{MemoryConfig, MIB};
use super::error::MemoryError;
use super::heap::PageHeap;
use super::page::{Page, PageHandle, PageTable, PAGE_RECORD_BYTES};
use super::raw::{align_shift, assert_valid_alignment, MAX_ALIGNMENT};

/// An allocator whose own backing store is carved out of a [`MemoryManager`].
///
/// Created through [`MemoryManager::malloc_allocator`]: the manager
/// constructs the value, reserves a header page for it and then calls
/// [`PageAllocator::init`] so the allocator can request its own storage.
pub trait PageAllocator: Sized {
    /// Arguments forwarded to [`PageAllocator::construct`].
    type Args;

    /// Build the allocator object without any backing storage.
    fn construct(args: Self::Args) -> Self;

    /// Acquire backing storage of `size_in_bytes` aligned to `alignment`.
    ///
    /// `header` is the page reserved for the allocator object itself; the
    /// allocator owns it from now on.
    fn init(
        &mut self,
        memory: &mut MemoryManager,
        header: PageHandle<u8>,
        size_in_bytes: u64,
        alignment: u64,
    ) -> Result<(), MemoryError>;
}

/// Snapshot of memory manager usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryStats {
    /// Page heap capacity in bytes.
    pub heap_capacity: u64,
    /// Page heap bytes logically in use.
    pub heap_used: u64,
    /// Page heap write position.
    pub heap_cursor: u64,
    /// Successful heap allocations since start-up or the last flush.
    pub allocation_count: u64,
    /// Pages currently live.
    pub live_pages: usize,
    /// Page record bytes logically in use.
    pub page_table_used: u64,
}

#[derive(Debug)]
struct Arena {
    heap: PageHeap,
    table: PageTable,
}

/// Page-tracked, alignment-aware allocator over a single pre-allocated heap.
///
/// Every allocation is one [`Page`]; callers receive a [`PageHandle`] and
/// resolve it through the manager, which keeps handles valid when
/// [`MemoryManager::resize`] relocates the heap.
///
/// The manager is a plain value: construct one per shared arena and pass it
/// (by reference) to the subsystems that allocate from it.
///
/// # Example
///
/// ```
/// use ember_core::memory::{MemoryConfig, MemoryManager};
///
/// let mut memory = MemoryManager::new(MemoryConfig::default().with_heap_size_mib(1));
/// memory.start_up().unwrap();
///
/// let handle = memory.malloc_construct_aligned(16, 16, 42u64).unwrap();
/// memory.resize(2).unwrap();
/// assert_eq!(*memory.get(handle).unwrap(), 42);
///
/// memory.shutdown();
/// ```
#[derive(Debug)]
pub struct MemoryManager {
    config: MemoryConfig,
    arena: Option<Arena>,
    /// First page generation of the next session, so handles from an
    /// earlier session stay stale after a restart.
    next_generation: u32,
}

impl MemoryManager {
    /// Create an inactive manager; call [`MemoryManager::start_up`] before use.
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config,
            arena: None,
            next_generation: 0,
        }
    }

    /// Create and start a manager in one step.
    pub fn started(config: MemoryConfig) -> Result<Self, MemoryError> {
        let mut memory = Self::new(config);
        memory.start_up()?;
        Ok(memory)
    }

    /// Allocate the default-sized page heap and page table.
    pub fn start_up(&mut self) -> Result<(), MemoryError> {
        if self.arena.is_some() {
            return Err(MemoryError::AlreadyActive);
        }
        self.config.validate()?;

        let heap = PageHeap::new(self.config.heap_size_bytes(), self.config.heap_alignment)?;
        let table = PageTable::new(self.config.page_table_capacity, self.next_generation);
        log::info!(
            "MemoryManager: started with {} MiB heap and {} page records",
            self.config.heap_size_mib,
            self.config.page_table_capacity
        );
        self.arena = Some(Arena { heap, table });
        Ok(())
    }

    /// Release the heap and the page table. Every handle becomes unusable.
    pub fn shutdown(&mut self) {
        if let Some(arena) = self.arena.take() {
            self.next_generation = arena.table.next_generation();
            log::info!(
                "MemoryManager: shutdown with {} live pages, {} of {} heap bytes used",
                arena.table.live_count(),
                arena.heap.used(),
                arena.heap.capacity()
            );
        }
    }

    /// Whether [`MemoryManager::start_up`] has run and shutdown has not.
    pub fn is_active(&self) -> bool {
        self.arena.is_some()
    }

    /// Configuration the manager was created with.
    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    fn arena(&self) -> Result<&Arena, MemoryError> {
        self.arena.as_ref().ok_or(MemoryError::Inactive)
    }

    fn arena_mut(&mut self) -> Result<&mut Arena, MemoryError> {
        self.arena.as_mut().ok_or(MemoryError::Inactive)
    }

    /// Grow the heap to `new_size_mib` and repatch every live page.
    ///
    /// This copies the whole written heap; no allocation may run concurrently.
    ///
    /// # Panics
    ///
    /// Panics if the new size is not strictly larger than the current one.
    pub fn resize(&mut self, new_size_mib: u64) -> Result<(), MemoryError> {
        let arena = self.arena_mut()?;
        let new_bytes = new_size_mib
            .checked_mul(MIB)
            .ok_or_else(|| MemoryError::InvalidArgument(format!("{new_size_mib} MiB overflows")))?;
        assert!(
            new_bytes > arena.heap.capacity(),
            "memory manager can only grow: {} -> {} bytes",
            arena.heap.capacity(),
            new_bytes
        );

        let base = arena.heap.resize_and_flush_by_bytes(new_bytes)?;
        arena.table.repatch(base);

        log::info!(
            "MemoryManager: resized heap to {} MiB, repatched {} pages",
            new_size_mib,
            arena.table.live_count()
        );
        Ok(())
    }

    /// Allocate `size_in_bytes` bytes aligned to `alignment`.
    ///
    /// The page reserves `size_in_bytes + alignment` heap bytes so the data
    /// can be shifted onto the requested alignment.
    ///
    /// # Panics
    ///
    /// Panics if `alignment` is not a power of two or exceeds 256.
    pub fn malloc_aligned<T>(
        &mut self,
        size_in_bytes: u64,
        alignment: u64,
    ) -> Result<PageHandle<T>, MemoryError> {
        assert_valid_alignment(alignment);
        let arena = self.arena_mut()?;
        arena.table.ensure_room()?;

        let requested = size_in_bytes.checked_add(alignment).ok_or_else(|| {
            MemoryError::InvalidArgument(format!("{size_in_bytes} bytes overflow"))
        })?;
        let start = arena.heap.malloc::<u8>(requested)?;

        let base = arena.heap.base();
        let shift = align_shift(base.as_ptr() as usize + start as usize, alignment as usize);
        let offset = start + shift as u64;
        // SAFETY: `offset + size_in_bytes <= start + requested <= capacity`.
        let data = unsafe { NonNull::new_unchecked(base.as_ptr().add(offset as usize)) };

        let (index, generation) = arena.table.allocate(size_in_bytes, offset, data)?;
        log::trace!(
            "MemoryManager: page {} ({} bytes, align {}) at heap offset {}",
            index,
            size_in_bytes,
            alignment,
            offset
        );
        Ok(PageHandle::new(index, generation))
    }

    /// Allocate a page and write `value` at its start.
    ///
    /// The page is at least `size_of::<T>()` bytes and at least
    /// `align_of::<T>()` aligned.
    pub fn malloc_construct_aligned<T: Pod>(
        &mut self,
        size_in_bytes: u64,
        alignment: u64,
        value: T,
    ) -> Result<PageHandle<T>, MemoryError> {
        let size = size_in_bytes.max(std::mem::size_of::<T>() as u64);
        let alignment = alignment.max(std::mem::align_of::<T>() as u64);
        let handle = self.malloc_aligned::<T>(size, alignment)?;
        let bytes = self.bytes_mut(handle)?;
        bytes[..std::mem::size_of::<T>()].copy_from_slice(bytemuck::bytes_of(&value));
        Ok(handle)
    }

    /// Construct an allocator and let it acquire its own backing page.
    ///
    /// A header page sized for two `A`-widths is reserved first and handed
    /// to [`PageAllocator::init`]; the allocator keeps its bookkeeping there.
    /// The allocator's storage is a second, independent page.
    pub fn malloc_allocator<A: PageAllocator>(
        &mut self,
        allocator_bytes: u64,
        allocator_alignment: u64,
        args: A::Args,
    ) -> Result<A, MemoryError> {
        let mut allocator = A::construct(args);
        let header_bytes = 2 * std::mem::size_of::<A>() as u64;
        let header_alignment = (std::mem::align_of::<A>() as u64).min(MAX_ALIGNMENT);
        let header = self.malloc_aligned::<u8>(header_bytes, header_alignment)?;

        if let Err(err) = allocator.init(self, header, allocator_bytes, allocator_alignment) {
            self.free(header)?;
            return Err(err);
        }
        Ok(allocator)
    }

    /// Retire a page.
    ///
    /// Only the page table's used counter shrinks; the heap bytes behind the
    /// page are not reclaimed until [`MemoryManager::flush_no_delete`].
    pub fn free<T>(&mut self, handle: PageHandle<T>) -> Result<(), MemoryError> {
        let arena = self.arena_mut()?;
        arena.table.free(handle)?;
        log::trace!("MemoryManager: freed page {}", handle.index());
        Ok(())
    }

    /// Drop every allocation while keeping the heap and table storage.
    pub fn flush_no_delete(&mut self) -> Result<(), MemoryError> {
        let arena = self.arena_mut()?;
        log::debug!(
            "MemoryManager: flushing {} pages without releasing storage",
            arena.table.live_count()
        );
        arena.table.flush();
        arena.heap.flush();
        Ok(())
    }

    /// Page record behind a handle.
    pub fn page<T>(&self, handle: PageHandle<T>) -> Result<&Page, MemoryError> {
        self.arena()?.table.get(handle)
    }

    /// Bytes of a page.
    pub fn bytes<T>(&self, handle: PageHandle<T>) -> Result<&[u8], MemoryError> {
        let page = self.page(handle)?;
        // SAFETY: the page lies inside the zero-initialised heap owned by
        // `self`, and the heap is only replaced through `&mut self`.
        Ok(unsafe { std::slice::from_raw_parts(page.data().as_ptr(), page.size() as usize) })
    }

    /// Mutable bytes of a page.
    pub fn bytes_mut<T>(&mut self, handle: PageHandle<T>) -> Result<&mut [u8], MemoryError> {
        let page = *self.page(handle)?;
        // SAFETY: as in `bytes`; live pages never overlap, and `&mut self`
        // prevents any other view of the heap while this one exists.
        Ok(unsafe { std::slice::from_raw_parts_mut(page.data().as_ptr(), page.size() as usize) })
    }

    /// The value at the start of a page.
    pub fn get<T: Pod>(&self, handle: PageHandle<T>) -> Result<&T, MemoryError> {
        let bytes = self.bytes(handle)?;
        let size = bytes.len() as u64;
        bytes
            .get(..std::mem::size_of::<T>())
            .and_then(|prefix| bytemuck::try_from_bytes(prefix).ok())
            .ok_or(MemoryError::Layout {
                size,
                type_name: std::any::type_name::<T>(),
            })
    }

    /// Mutable value at the start of a page.
    pub fn get_mut<T: Pod>(&mut self, handle: PageHandle<T>) -> Result<&mut T, MemoryError> {
        let bytes = self.bytes_mut(handle)?;
        let size = bytes.len() as u64;
        bytes
            .get_mut(..std::mem::size_of::<T>())
            .and_then(|prefix| bytemuck::try_from_bytes_mut(prefix).ok())
            .ok_or(MemoryError::Layout {
                size,
                type_name: std::any::type_name::<T>(),
            })
    }

    /// The page viewed as a slice of as many `T` as fit.
    pub fn slice<T: Pod>(&self, handle: PageHandle<T>) -> Result<&[T], MemoryError> {
        let bytes = self.bytes(handle)?;
        let len = whole_elements::<T>(bytes.len())?;
        bytemuck::try_cast_slice(&bytes[..len]).map_err(|_| MemoryError::Layout {
            size: bytes.len() as u64,
            type_name: std::any::type_name::<T>(),
        })
    }

    /// Mutable slice view of a page.
    pub fn slice_mut<T: Pod>(&mut self, handle: PageHandle<T>) -> Result<&mut [T], MemoryError> {
        let bytes = self.bytes_mut(handle)?;
        let size = bytes.len() as u64;
        let len = whole_elements::<T>(bytes.len())?;
        bytemuck::try_cast_slice_mut(&mut bytes[..len]).map_err(|_| MemoryError::Layout {
            size,
            type_name: std::any::type_name::<T>(),
        })
    }

    /// Current usage counters. All zero when inactive.
    pub fn stats(&self) -> MemoryStats {
        match &self.arena {
            Some(arena) => MemoryStats {
                heap_capacity: arena.heap.capacity(),
                heap_used: arena.heap.used(),
                heap_cursor: arena.heap.cursor(),
                allocation_count: arena.heap.allocation_count(),
                live_pages: arena.table.live_count(),
                page_table_used: arena.table.used_bytes(),
            },
            None => MemoryStats::default(),
        }
    }

    /// Size in bytes of one page record.
    pub fn page_record_bytes() -> u64 {
        PAGE_RECORD_BYTES
    }
}

fn whole_elements<T>(byte_len: usize) -> Result<usize, MemoryError> {
    let element = std::mem::size_of::<T>();
    if element == 0 {
        return Err(MemoryError::Layout {
            size: byte_len as u64,
            type_name: std::any::type_name::<T>(),
        });
    }
    Ok(byte_len / element * element)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_manager() -> MemoryManager {
        MemoryManager::started(
            MemoryConfig::default()
                .with_heap_size_mib(1)
                .with_page_table_capacity(64),
        )
        .unwrap()
    }

    #[test]
    fn test_inactive_manager_rejects_allocation() {
        let mut memory = MemoryManager::new(MemoryConfig::default());
        assert!(!memory.is_active());
        assert_eq!(
            memory.malloc_aligned::<u8>(16, 16).unwrap_err(),
            MemoryError::Inactive
        );
    }

    #[test]
    fn test_start_up_twice_fails() {
        let mut memory = small_manager();
        assert_eq!(memory.start_up().unwrap_err(), MemoryError::AlreadyActive);
    }

    #[test]
    fn test_shutdown_deactivates() {
        let mut memory = small_manager();
        let handle = memory.malloc_aligned::<u8>(8, 8).unwrap();
        memory.shutdown();
        assert!(!memory.is_active());
        assert_eq!(memory.bytes(handle).unwrap_err(), MemoryError::Inactive);
    }

    #[test]
    fn test_restart_keeps_old_handles_stale() {
        let mut memory = small_manager();
        let old = memory.malloc_construct_aligned(0, 8, 1u64).unwrap();
        memory.shutdown();

        memory.start_up().unwrap();
        let fresh = memory.malloc_construct_aligned(0, 8, 2u64).unwrap();

        assert_eq!(fresh.index(), old.index());
        assert_ne!(fresh, old);
        assert!(matches!(
            memory.get(old),
            Err(MemoryError::StaleHandle { .. })
        ));
        assert_eq!(*memory.get(fresh).unwrap(), 2);
    }

    #[test]
    fn test_malloc_aligned_respects_alignment() {
        let mut memory = small_manager();
        for alignment in [1u64, 2, 4, 8, 16, 32, 64, 128, 256] {
            let handle = memory.malloc_aligned::<u8>(3, alignment).unwrap();
            let page = memory.page(handle).unwrap();
            assert_eq!(page.data().as_ptr() as usize % alignment as usize, 0);
            assert_eq!(page.size(), 3);
        }
    }

    #[test]
    fn test_offset_matches_data_pointer() {
        let mut memory = small_manager();
        memory.malloc_aligned::<u8>(5, 1).unwrap();
        let handle = memory.malloc_aligned::<u8>(16, 64).unwrap();
        let page = *memory.page(handle).unwrap();
        let stats = memory.stats();
        assert_eq!(stats.heap_cursor, 5 + 1 + 16 + 64);
        assert!(page.offset_from_heap_start() >= 6);
        assert!(page.offset_from_heap_start() + 16 <= stats.heap_cursor);
    }

    #[test]
    fn test_construct_writes_value() {
        let mut memory = small_manager();
        let handle = memory
            .malloc_construct_aligned(0, 1, [1.0f32, 2.0, 3.0, 4.0])
            .unwrap();
        assert_eq!(memory.page(handle).unwrap().size(), 16);
        assert_eq!(*memory.get(handle).unwrap(), [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_get_mut_and_slice() {
        let mut memory = small_manager();
        let handle = memory.malloc_aligned::<u32>(16, 4).unwrap();
        memory.slice_mut(handle).unwrap().copy_from_slice(&[1, 2, 3, 4]);
        *memory.get_mut(handle).unwrap() = 10;
        assert_eq!(memory.slice(handle).unwrap(), &[10, 2, 3, 4]);
    }

    #[test]
    fn test_too_small_page_for_type() {
        let mut memory = small_manager();
        let handle = memory.malloc_aligned::<u64>(4, 8).unwrap();
        assert!(matches!(
            memory.get(handle),
            Err(MemoryError::Layout { size: 4, .. })
        ));
    }

    #[test]
    fn test_resize_keeps_handles_valid() {
        let mut memory = small_manager();
        let a = memory.malloc_construct_aligned(0, 8, 0xdead_beef_u64).unwrap();
        let b = memory.malloc_aligned::<u8>(4, 4).unwrap();
        memory.bytes_mut(b).unwrap().copy_from_slice(b"page");

        memory.resize(4).unwrap();

        assert_eq!(*memory.get(a).unwrap(), 0xdead_beef);
        assert_eq!(memory.bytes(b).unwrap(), b"page");
        assert_eq!(memory.stats().heap_capacity, 4 * MIB);
        let page = memory.page(a).unwrap();
        assert_eq!(page.data().as_ptr() as usize % 8, 0);
    }

    #[test]
    fn test_resize_keeps_alignment_above_heap_alignment() {
        let mut memory = MemoryManager::started(
            MemoryConfig::default()
                .with_heap_size_mib(1)
                .with_page_table_capacity(64)
                .with_heap_alignment(16),
        )
        .unwrap();
        memory.malloc_aligned::<u8>(5, 1).unwrap();
        let page = memory.malloc_aligned::<u8>(64, 256).unwrap();
        let wide = memory.malloc_construct_aligned(0, 128, [7u64; 4]).unwrap();
        memory.bytes_mut(page).unwrap().fill(0xab);

        memory.resize(2).unwrap();

        let data = memory.page(page).unwrap().data().as_ptr() as usize;
        assert_eq!(data % 256, 0);
        assert!(memory.bytes(page).unwrap().iter().all(|&b| b == 0xab));
        assert_eq!(memory.page(wide).unwrap().data().as_ptr() as usize % 128, 0);
        assert_eq!(*memory.get(wide).unwrap(), [7; 4]);
    }

    #[test]
    #[should_panic(expected = "can only grow")]
    fn test_resize_to_same_size_panics() {
        let mut memory = small_manager();
        let _ = memory.resize(1);
    }

    #[test]
    fn test_free_only_touches_page_table() {
        let mut memory = small_manager();
        let handle = memory.malloc_aligned::<u8>(100, 4).unwrap();
        let before = memory.stats();

        memory.free(handle).unwrap();

        let after = memory.stats();
        assert_eq!(after.heap_used, before.heap_used);
        assert_eq!(after.heap_cursor, before.heap_cursor);
        assert_eq!(
            after.page_table_used,
            before.page_table_used - MemoryManager::page_record_bytes()
        );
        assert!(matches!(
            memory.bytes(handle),
            Err(MemoryError::StaleHandle { .. })
        ));
    }

    #[test]
    fn test_double_free_is_reported() {
        let mut memory = small_manager();
        let handle = memory.malloc_aligned::<u8>(8, 8).unwrap();
        memory.free(handle).unwrap();
        assert!(matches!(
            memory.free(handle),
            Err(MemoryError::StaleHandle { .. })
        ));
    }

    #[test]
    fn test_heap_exhaustion_is_typed() {
        let mut memory = small_manager();
        let err = memory.malloc_aligned::<u8>(MIB, 1).unwrap_err();
        assert!(matches!(
            err,
            MemoryError::OutOfCapacity {
                resource: "page heap",
                ..
            }
        ));
        assert_eq!(memory.stats().live_pages, 0);
        assert!(memory.malloc_aligned::<u8>(64, 1).is_ok());
    }

    #[test]
    fn test_page_table_exhaustion_is_typed() {
        let mut memory = MemoryManager::started(
            MemoryConfig::default()
                .with_heap_size_mib(1)
                .with_page_table_capacity(3),
        )
        .unwrap();
        memory.malloc_aligned::<u8>(1, 1).unwrap();
        memory.malloc_aligned::<u8>(1, 1).unwrap();
        let cursor = memory.stats().heap_cursor;
        assert!(matches!(
            memory.malloc_aligned::<u8>(1, 1),
            Err(MemoryError::OutOfCapacity {
                resource: "page table",
                ..
            })
        ));
        assert_eq!(memory.stats().heap_cursor, cursor);
    }

    #[test]
    fn test_flush_no_delete_invalidates_handles() {
        let mut memory = small_manager();
        let handle = memory.malloc_aligned::<u8>(32, 16).unwrap();
        let capacity = memory.stats().heap_capacity;

        memory.flush_no_delete().unwrap();

        assert!(memory.bytes(handle).is_err());
        let stats = memory.stats();
        assert_eq!(stats.heap_capacity, capacity);
        assert_eq!(stats.heap_cursor, 0);
        assert_eq!(stats.live_pages, 0);
        let fresh = memory.malloc_aligned::<u8>(32, 16).unwrap();
        assert_eq!(fresh.index(), handle.index());
        assert_ne!(fresh, handle);
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn test_malformed_alignment_panics() {
        let mut memory = small_manager();
        let _ = memory.malloc_aligned::<u8>(8, 3);
    }

    struct Scratch {
        header: Option<PageHandle<u8>>,
        storage: Option<PageHandle<u8>>,
        tag: u32,
    }

    impl PageAllocator for Scratch {
        type Args = u32;

        fn construct(tag: u32) -> Self {
            Self {
                header: None,
                storage: None,
                tag,
            }
        }

        fn init(
            &mut self,
            memory: &mut MemoryManager,
            header: PageHandle<u8>,
            size_in_bytes: u64,
            alignment: u64,
        ) -> Result<(), MemoryError> {
            self.header = Some(header);
            self.storage = Some(memory.malloc_aligned(size_in_bytes, alignment)?);
            Ok(())
        }
    }

    #[test]
    fn test_malloc_allocator_uses_two_pages() {
        let mut memory = small_manager();
        let scratch: Scratch = memory.malloc_allocator(256, 16, 7).unwrap();

        assert_eq!(scratch.tag, 7);
        let header = memory.page(scratch.header.unwrap()).unwrap();
        assert_eq!(header.size(), 2 * std::mem::size_of::<Scratch>() as u64);
        let storage = memory.page(scratch.storage.unwrap()).unwrap();
        assert_eq!(storage.size(), 256);
        assert_eq!(memory.stats().live_pages, 2);
    }

    #[test]
    fn test_failed_allocator_init_releases_header() {
        let mut memory = small_manager();
        let result: Result<Scratch, _> = memory.malloc_allocator(2 * MIB, 16, 0);
        assert!(result.is_err());
        assert_eq!(memory.stats().live_pages, 0);
    }
}
