//! Page records and the page table that owns them.
//!
//! Every memory manager allocation is described by one [`Page`]. The page
//! stores its offset from the heap base alongside the current data pointer,
//! so the pointer can be rewritten whenever the heap relocates. Callers never
//! hold the pointer itself: they hold a [`PageHandle`], which indexes the
//! page table and carries the generation the page had when it was issued.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ptr::NonNull;

use super::error::MemoryError;

/// Size of one page record, the unit in which page table capacity is counted.
pub const PAGE_RECORD_BYTES: u64 = std::mem::size_of::<Page>() as u64;

/// Most page records a table can address; handle indices are `u32`.
pub const MAX_PAGE_TABLE_CAPACITY: u64 = u32::MAX as u64;

/// Records reserved up front; the table grows on demand past this.
const INITIAL_RESERVE: u64 = 1024;

/// Bookkeeping record for one logical allocation.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    /// Usable size in bytes.
    size: u64,
    /// Offset of the aligned data from the heap base.
    offset_from_heap_start: u64,
    /// Current address of the data; rewritten on heap relocation.
    data: NonNull<u8>,
    /// Bumped every time the page dies, invalidating outstanding handles.
    generation: u32,
    live: bool,
}

// SAFETY: `data` points into the heap owned by the same memory manager and is
// only dereferenced through it.
unsafe impl Send for Page {}
// SAFETY: see `Send`.
unsafe impl Sync for Page {}

impl Page {
    /// Usable size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Offset of the data from the heap base.
    pub fn offset_from_heap_start(&self) -> u64 {
        self.offset_from_heap_start
    }

    /// Current address of the data.
    pub fn data(&self) -> NonNull<u8> {
        self.data
    }

    /// Generation of the page.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Whether the page is currently allocated.
    pub fn is_live(&self) -> bool {
        self.live
    }
}

/// Typed, generation-checked handle to a page.
///
/// The handle stays valid across heap resizes because it refers to the page
/// record, never to the data address.
pub struct PageHandle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> PageHandle<T> {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// Index of the page record.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation the page had when this handle was issued.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Reinterpret the handle as referring to a different element type.
    pub fn cast<U>(self) -> PageHandle<U> {
        PageHandle::new(self.index, self.generation)
    }
}

impl<T> Clone for PageHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for PageHandle<T> {}

impl<T> PartialEq for PageHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for PageHandle<T> {}

impl<T> Hash for PageHandle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for PageHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageHandle(idx={}, gen={})", self.index, self.generation)
    }
}

/// Bump-allocated array of [`Page`] records.
///
/// Like the heap, freeing only lowers the used-byte counter; slots are
/// reissued only after [`PageTable::flush`].
#[derive(Debug)]
pub struct PageTable {
    pages: Vec<Page>,
    /// Next slot to hand out.
    cursor: usize,
    capacity_bytes: u64,
    used_bytes: u64,
    /// Generation given to slots the table has never used.
    first_generation: u32,
}

impl PageTable {
    /// Create a table with room for `entries` page records.
    ///
    /// Fresh slots start at `first_generation`, which lets a new table reject
    /// handles issued by an earlier one (see [`PageTable::next_generation`]).
    pub fn new(entries: u64, first_generation: u32) -> Self {
        let entries = entries.clamp(1, MAX_PAGE_TABLE_CAPACITY);
        Self {
            pages: Vec::with_capacity(entries.min(INITIAL_RESERVE) as usize),
            cursor: 0,
            capacity_bytes: entries * PAGE_RECORD_BYTES,
            used_bytes: 0,
            first_generation,
        }
    }

    /// Record a new live page and return its index and generation.
    pub(crate) fn allocate(
        &mut self,
        size: u64,
        offset_from_heap_start: u64,
        data: NonNull<u8>,
    ) -> Result<(u32, u32), MemoryError> {
        self.ensure_room()?;

        let index = self.cursor;
        let generation = self
            .pages
            .get(index)
            .map_or(self.first_generation, |page| page.generation);
        let page = Page {
            size,
            offset_from_heap_start,
            data,
            generation,
            live: true,
        };
        if index < self.pages.len() {
            self.pages[index] = page;
        } else {
            self.pages.push(page);
        }

        self.cursor += 1;
        self.used_bytes += PAGE_RECORD_BYTES;
        Ok((index as u32, generation))
    }

    /// Look up a live page.
    pub fn get<T>(&self, handle: PageHandle<T>) -> Result<&Page, MemoryError> {
        self.pages
            .get(handle.index as usize)
            .filter(|page| page.live && page.generation == handle.generation)
            .ok_or(MemoryError::StaleHandle {
                index: handle.index,
                generation: handle.generation,
            })
    }

    /// Kill a live page; only the used-byte counter shrinks.
    pub(crate) fn free<T>(&mut self, handle: PageHandle<T>) -> Result<Page, MemoryError> {
        self.get(handle)?;
        let page = &mut self.pages[handle.index as usize];
        page.live = false;
        page.generation = page.generation.wrapping_add(1);
        self.used_bytes -= PAGE_RECORD_BYTES;
        Ok(*page)
    }

    /// Fail unless another page record fits strictly below capacity.
    pub(crate) fn ensure_room(&self) -> Result<(), MemoryError> {
        let end = (self.cursor as u64 + 1) * PAGE_RECORD_BYTES;
        if end >= self.capacity_bytes {
            return Err(MemoryError::OutOfCapacity {
                resource: "page table",
                requested: PAGE_RECORD_BYTES,
                capacity: self.capacity_bytes,
            });
        }
        Ok(())
    }

    /// Rewrite every live page's data pointer against a new heap base.
    pub(crate) fn repatch(&mut self, heap_base: NonNull<u8>) {
        for page in self.pages[..self.cursor].iter_mut().filter(|p| p.live) {
            // SAFETY: the offset was valid in the old heap and the new heap
            // holds a copy of at least the old written prefix.
            page.data = unsafe {
                NonNull::new_unchecked(heap_base.as_ptr().add(page.offset_from_heap_start as usize))
            };
        }
    }

    /// Kill every page and rewind to the first slot.
    pub(crate) fn flush(&mut self) {
        for page in self.pages[..self.cursor].iter_mut().filter(|p| p.live) {
            page.live = false;
            page.generation = page.generation.wrapping_add(1);
        }
        self.cursor = 0;
        self.used_bytes = 0;
    }

    /// A generation newer than any handle this table has issued.
    ///
    /// Passing it to the next table keeps old handles stale.
    pub fn next_generation(&self) -> u32 {
        self.pages
            .iter()
            .map(|page| page.generation)
            .max()
            .map_or(self.first_generation, |newest| newest.wrapping_add(1))
    }

    /// Iterate over live pages.
    pub fn live_pages(&self) -> impl Iterator<Item = &Page> {
        self.pages[..self.cursor].iter().filter(|p| p.live)
    }

    /// Number of live pages.
    pub fn live_count(&self) -> usize {
        self.live_pages().count()
    }

    /// Bytes of page records logically in use.
    pub fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    /// Capacity in bytes of page records.
    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dangling() -> NonNull<u8> {
        NonNull::dangling()
    }

    #[test]
    fn test_allocate_and_get() {
        let mut table = PageTable::new(8, 0);
        let (index, generation) = table.allocate(64, 128, dangling()).unwrap();
        let handle = PageHandle::<u8>::new(index, generation);

        let page = table.get(handle).unwrap();
        assert_eq!(page.size(), 64);
        assert_eq!(page.offset_from_heap_start(), 128);
        assert!(page.is_live());
        assert_eq!(table.used_bytes(), PAGE_RECORD_BYTES);
    }

    #[test]
    fn test_free_makes_handle_stale() {
        let mut table = PageTable::new(8, 0);
        let (index, generation) = table.allocate(16, 0, dangling()).unwrap();
        let handle = PageHandle::<u8>::new(index, generation);

        table.free(handle).unwrap();
        assert_eq!(table.used_bytes(), 0);
        assert!(matches!(
            table.get(handle),
            Err(MemoryError::StaleHandle { .. })
        ));
        assert!(table.free(handle).is_err());
    }

    #[test]
    fn test_free_does_not_recycle_slot() {
        let mut table = PageTable::new(8, 0);
        let (first, generation) = table.allocate(16, 0, dangling()).unwrap();
        table.free(PageHandle::<u8>::new(first, generation)).unwrap();
        let (second, _) = table.allocate(16, 16, dangling()).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_capacity_is_strict() {
        let mut table = PageTable::new(3, 0);
        assert!(table.allocate(1, 0, dangling()).is_ok());
        assert!(table.allocate(1, 1, dangling()).is_ok());
        assert!(matches!(
            table.allocate(1, 2, dangling()),
            Err(MemoryError::OutOfCapacity { resource: "page table", .. })
        ));
    }

    #[test]
    fn test_flush_reuses_slots_with_new_generation() {
        let mut table = PageTable::new(8, 0);
        let (index, generation) = table.allocate(16, 0, dangling()).unwrap();
        let old = PageHandle::<u8>::new(index, generation);

        table.flush();
        let (new_index, new_generation) = table.allocate(16, 0, dangling()).unwrap();

        assert_eq!(new_index, index);
        assert_ne!(new_generation, generation);
        assert!(table.get(old).is_err());
        assert_eq!(table.live_count(), 1);
    }

    #[test]
    fn test_next_generation_outlives_issued_handles() {
        let mut table = PageTable::new(8, 0);
        let (a, a_gen) = table.allocate(16, 0, dangling()).unwrap();
        table.allocate(16, 16, dangling()).unwrap();
        table.free(PageHandle::<u8>::new(a, a_gen)).unwrap();

        let next = table.next_generation();
        assert_eq!(next, 2);

        let mut successor = PageTable::new(8, next);
        let (index, generation) = successor.allocate(16, 0, dangling()).unwrap();
        assert_eq!(index, a);
        assert_eq!(generation, next);
        assert!(successor.get(PageHandle::<u8>::new(a, a_gen)).is_err());
        assert!(successor.get(PageHandle::<u8>::new(1, 0)).is_err());
    }

    #[test]
    fn test_huge_capacity_reserves_lazily() {
        let table = PageTable::new(MAX_PAGE_TABLE_CAPACITY, 0);
        assert_eq!(
            table.capacity_bytes(),
            MAX_PAGE_TABLE_CAPACITY * PAGE_RECORD_BYTES
        );
        assert!(table.pages.capacity() <= INITIAL_RESERVE as usize * 2);
    }
}
