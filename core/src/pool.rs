//! Fixed-capacity slot pools carved out of a [`MemoryManager`].
//!
//! A [`ResourcePool`] reserves a single page holding `pool_size` slots of
//! `resource_size` bytes followed by a `u32` free-index array. Handles are
//! plain slot indices, which makes them cheap to store inside other records.
//!
//! The free-index array is seeded in ascending order and used as a stack:
//! a fresh pool hands out `0, 1, 2, ...`, and once handles come back the most
//! recently freed one is handed out first. Callers can rely on both orders.
//!
//! # Example
//!
//! ```
//! use ember_core::memory::{MemoryConfig, MemoryManager};
//! use ember_core::pool::ResourcePool;
//!
//! let mut memory = MemoryManager::started(MemoryConfig::default().with_heap_size_mib(1)).unwrap();
//! let mut pool = ResourcePool::create(&mut memory, 4, 16).unwrap();
//!
//! let a = pool.allocate(&mut memory).unwrap();
//! let b = pool.allocate(&mut memory).unwrap();
//! assert_eq!((a, b), (0, 1));
//!
//! pool.free(&mut memory, b).unwrap();
//! assert_eq!(pool.allocate(&mut memory).unwrap(), b);
//!
//! pool.release(&mut memory).unwrap();
//! ```

use bytemuck::{Pod, Zeroable};

use crate::memory::{MemoryError, MemoryManager, PageAllocator, PageHandle};

/// Sentinel handle that never refers to a slot.
pub const INVALID_INDEX: u32 = u32::MAX;

/// Alignment of the pool block when created through [`ResourcePool::init`].
pub const DEFAULT_POOL_ALIGNMENT: u64 = 16;

const INDEX_BYTES: usize = std::mem::size_of::<u32>();

/// Pool bookkeeping as stored in the header page of a pool created through
/// [`MemoryManager::malloc_allocator`].
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct PoolHeader {
    /// Number of slots.
    pub pool_size: u32,
    /// Size of one slot in bytes.
    pub resource_size: u32,
    /// Position of the next free index on the stack.
    pub free_indices_head: u32,
    /// Slots currently handed out.
    pub used_indices: u32,
}

static_assertions::const_assert!(
    std::mem::size_of::<PoolHeader>() <= 2 * std::mem::size_of::<ResourcePool>()
);

/// Slot allocator with stack-ordered index recycling.
///
/// The pool does not own the [`MemoryManager`]; every operation that touches
/// slot memory takes it explicitly. Freeing a handle twice, or freeing one
/// that was never allocated, breaks the pool's bookkeeping; only the
/// underflow case is detected.
#[derive(Debug, Default)]
pub struct ResourcePool {
    block: Option<PageHandle<u8>>,
    /// Header page reserved when created via [`MemoryManager::malloc_allocator`].
    header: Option<PageHandle<u8>>,
    pool_size: u32,
    resource_size: u32,
    free_indices_head: u32,
    used_indices: u32,
}

impl ResourcePool {
    /// An empty pool with no backing storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and initialise a pool in one step.
    pub fn create(
        memory: &mut MemoryManager,
        pool_size: u32,
        resource_size: u32,
    ) -> Result<Self, MemoryError> {
        let mut pool = Self::new();
        pool.init(memory, pool_size, resource_size)?;
        Ok(pool)
    }

    /// Bytes needed for `pool_size` slots of `resource_size` plus the free-index array.
    pub fn required_bytes(pool_size: u32, resource_size: u32) -> Option<u64> {
        (resource_size as u64)
            .checked_add(INDEX_BYTES as u64)?
            .checked_mul(pool_size as u64)
    }

    /// Reserve the pool block and seed the free-index array in ascending order.
    pub fn init(
        &mut self,
        memory: &mut MemoryManager,
        pool_size: u32,
        resource_size: u32,
    ) -> Result<(), MemoryError> {
        self.pool_size = pool_size;
        self.resource_size = resource_size;
        let bytes = Self::required_bytes(pool_size, resource_size).ok_or_else(|| {
            MemoryError::InvalidArgument(format!(
                "pool of {pool_size} x {resource_size} bytes overflows"
            ))
        })?;
        self.reserve_block(memory, bytes, DEFAULT_POOL_ALIGNMENT)
    }

    fn reserve_block(
        &mut self,
        memory: &mut MemoryManager,
        size_in_bytes: u64,
        alignment: u64,
    ) -> Result<(), MemoryError> {
        if self.pool_size == 0 || self.pool_size == INVALID_INDEX {
            return Err(MemoryError::InvalidArgument(format!(
                "pool size {} is out of range",
                self.pool_size
            )));
        }
        let required = Self::required_bytes(self.pool_size, self.resource_size).unwrap_or(u64::MAX);
        if size_in_bytes < required {
            return Err(MemoryError::InvalidArgument(format!(
                "{size_in_bytes} bytes cannot hold {} slots of {} bytes",
                self.pool_size, self.resource_size
            )));
        }
        if self.block.is_some() {
            return Err(MemoryError::InvalidArgument(
                "resource pool is already initialised".into(),
            ));
        }

        self.block = Some(memory.malloc_aligned(size_in_bytes, alignment)?);
        self.free_all(memory)?;
        log::debug!(
            "ResourcePool: {} slots of {} bytes",
            self.pool_size,
            self.resource_size
        );
        Ok(())
    }

    fn block(&self) -> Result<PageHandle<u8>, MemoryError> {
        self.block.ok_or_else(|| {
            MemoryError::InvalidArgument("resource pool is not initialised".into())
        })
    }

    fn free_index_offset(&self, position: u32) -> usize {
        self.pool_size as usize * self.resource_size as usize + position as usize * INDEX_BYTES
    }

    fn read_free_index(&self, bytes: &[u8], position: u32) -> u32 {
        let at = self.free_index_offset(position);
        let mut raw = [0u8; INDEX_BYTES];
        raw.copy_from_slice(&bytes[at..at + INDEX_BYTES]);
        u32::from_ne_bytes(raw)
    }

    fn write_free_index(&self, bytes: &mut [u8], position: u32, index: u32) {
        let at = self.free_index_offset(position);
        bytes[at..at + INDEX_BYTES].copy_from_slice(&index.to_ne_bytes());
    }

    /// Hand out the slot at the top of the free stack.
    pub fn allocate(&mut self, memory: &mut MemoryManager) -> Result<u32, MemoryError> {
        if self.free_indices_head >= self.pool_size {
            return Err(MemoryError::OutOfCapacity {
                resource: "resource pool",
                requested: 1,
                capacity: self.pool_size as u64,
            });
        }
        let bytes = memory.bytes(self.block()?)?;
        let index = self.read_free_index(bytes, self.free_indices_head);
        self.free_indices_head += 1;
        self.used_indices += 1;
        self.store_header(memory)?;
        Ok(index)
    }

    /// Return a slot; it becomes the next one [`ResourcePool::allocate`] hands out.
    ///
    /// # Panics
    ///
    /// Panics if more handles are freed than were allocated.
    pub fn free(&mut self, memory: &mut MemoryManager, handle: u32) -> Result<(), MemoryError> {
        assert!(
            self.free_indices_head > 0,
            "resource pool free underflow: handle {handle} freed with no slot allocated"
        );
        let block = self.block()?;
        self.free_indices_head -= 1;
        self.used_indices -= 1;
        let position = self.free_indices_head;
        let bytes = memory.bytes_mut(block)?;
        self.write_free_index(bytes, position, handle);
        self.store_header(memory)
    }

    /// Make every slot free again, re-seeding ascending order.
    pub fn free_all(&mut self, memory: &mut MemoryManager) -> Result<(), MemoryError> {
        let block = self.block()?;
        let pool_size = self.pool_size;
        let bytes = memory.bytes_mut(block)?;
        for position in 0..pool_size {
            self.write_free_index(bytes, position, position);
        }
        self.free_indices_head = 0;
        self.used_indices = 0;
        self.store_header(memory)
    }

    fn bookkeeping(&self) -> PoolHeader {
        PoolHeader {
            pool_size: self.pool_size,
            resource_size: self.resource_size,
            free_indices_head: self.free_indices_head,
            used_indices: self.used_indices,
        }
    }

    /// Mirror the counters into the header page, if the pool has one.
    fn store_header(&self, memory: &mut MemoryManager) -> Result<(), MemoryError> {
        if let Some(header) = self.header {
            *memory.get_mut(header.cast::<PoolHeader>())? = self.bookkeeping();
        }
        Ok(())
    }

    /// Bookkeeping read back from the header page.
    ///
    /// `None` for pools made with [`ResourcePool::create`], which have no
    /// header page, and for released pools.
    pub fn header(&self, memory: &MemoryManager) -> Option<PoolHeader> {
        memory.get(self.header?.cast::<PoolHeader>()).ok().copied()
    }

    fn slot_range(&self, handle: u32) -> Option<std::ops::Range<usize>> {
        if handle == INVALID_INDEX || handle >= self.pool_size {
            return None;
        }
        let start = handle as usize * self.resource_size as usize;
        Some(start..start + self.resource_size as usize)
    }

    /// Bytes of a slot, or `None` for [`INVALID_INDEX`] and out-of-range handles.
    pub fn get<'m>(&self, memory: &'m MemoryManager, handle: u32) -> Option<&'m [u8]> {
        let range = self.slot_range(handle)?;
        let bytes = memory.bytes(self.block?).ok()?;
        bytes.get(range)
    }

    /// Mutable bytes of a slot.
    pub fn get_mut<'m>(&self, memory: &'m mut MemoryManager, handle: u32) -> Option<&'m mut [u8]> {
        let range = self.slot_range(handle)?;
        let bytes = memory.bytes_mut(self.block?).ok()?;
        bytes.get_mut(range)
    }

    /// Slot viewed as a `T`. `None` when the slot is too small or misaligned.
    pub fn get_as<'m, T: Pod>(&self, memory: &'m MemoryManager, handle: u32) -> Option<&'m T> {
        let slot = self.get(memory, handle)?;
        bytemuck::try_from_bytes(slot.get(..std::mem::size_of::<T>())?).ok()
    }

    /// Mutable slot viewed as a `T`.
    pub fn get_as_mut<'m, T: Pod>(
        &self,
        memory: &'m mut MemoryManager,
        handle: u32,
    ) -> Option<&'m mut T> {
        let slot = self.get_mut(memory, handle)?;
        bytemuck::try_from_bytes_mut(slot.get_mut(..std::mem::size_of::<T>())?).ok()
    }

    /// Give the pool's pages back to the manager and reset to empty.
    pub fn release(&mut self, memory: &mut MemoryManager) -> Result<(), MemoryError> {
        if let Some(block) = self.block.take() {
            memory.free(block)?;
        }
        if let Some(header) = self.header.take() {
            memory.free(header)?;
        }
        self.free_indices_head = 0;
        self.used_indices = 0;
        Ok(())
    }

    /// Number of slots.
    pub fn capacity(&self) -> u32 {
        self.pool_size
    }

    /// Size of one slot in bytes.
    pub fn resource_size(&self) -> u32 {
        self.resource_size
    }

    /// Slots currently handed out.
    pub fn used_indices(&self) -> u32 {
        self.used_indices
    }

    /// Whether every slot is handed out.
    pub fn is_full(&self) -> bool {
        self.free_indices_head >= self.pool_size
    }
}

impl PageAllocator for ResourcePool {
    /// `(pool_size, resource_size)`.
    type Args = (u32, u32);

    fn construct((pool_size, resource_size): Self::Args) -> Self {
        Self {
            pool_size,
            resource_size,
            ..Self::default()
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
        if let Err(err) = self.reserve_block(memory, size_in_bytes, alignment) {
            self.header = None;
            return Err(err);
        }
        Ok(())
    }
}
