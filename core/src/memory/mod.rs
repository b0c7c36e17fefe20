//! Page-tracked memory management.
//!
//! A [`MemoryManager`] owns one pre-allocated [`PageHeap`] and one
//! [`PageTable`]. Each allocation is a [`Page`] whose data lives in the heap
//! at a recorded offset, so the heap can be grown and relocated while every
//! [`PageHandle`] stays valid.
//!
//! The heap is a bump arena: freeing a page never makes its bytes available
//! again. Space is reclaimed only by [`MemoryManager::flush_no_delete`] or by
//! shutting the manager down. Subsystems that need recycling (such as
//! [`ResourcePool`](crate::pool::ResourcePool)) carve one large page and
//! manage it themselves.
//!
//! # Example
//!
//! ```
//! use ember_core::memory::{MemoryConfig, MemoryManager};
//!
//! let mut memory = MemoryManager::started(MemoryConfig::default().with_heap_size_mib(1)).unwrap();
//! let page = memory.malloc_aligned::<u8>(64, 64).unwrap();
//! assert_eq!(memory.page(page).unwrap().data().as_ptr() as usize % 64, 0);
//! memory.free(page).unwrap();
//! ```

mod config;
mod error;
mod heap;
mod manager;
mod page;
mod raw;

pub use config::{MemoryConfig, MIB};
pub use error::MemoryError;
pub use heap::PageHeap;
pub use manager::{MemoryManager, MemoryStats, PageAllocator};
pub use page::{Page, PageHandle, PageTable, MAX_PAGE_TABLE_CAPACITY, PAGE_RECORD_BYTES};
pub use raw::MAX_ALIGNMENT;

static_assertions::assert_impl_all!(MemoryManager: Send, Sync);
static_assertions::assert_impl_all!(PageHandle<u8>: Send, Sync, Copy);
static_assertions::const_assert!(PAGE_RECORD_BYTES > 0);
