//! Dummy render backend for testing and development.
//!
//! This backend doesn't perform GPU operations. Each created object is
//! recorded as a plain record in a [`ResourcePool`] carved out of the
//! backend's own [`MemoryManager`], and the pool slot index is the handle.
//! That keeps handle reuse behaviour identical to what the pools guarantee:
//! a destroyed object's handle is the next one handed out.

use bytemuck::{Pod, Zeroable};
use ember_core::memory::{MemoryConfig, MemoryManager};
use ember_core::pool::ResourcePool;

use crate::graph::{FrameBufferDescriptor, RenderPassDescriptor};
use crate::types::TextureDescriptor;

use super::{
    BackendError, FrameBufferHandle, RenderBackend, RenderPassHandle, TextureHandle,
};

/// Texture as recorded by the dummy backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct TextureRecord {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Depth in pixels.
    pub depth: u32,
    /// [`TextureFormat::code`](crate::types::TextureFormat::code).
    pub format: u32,
    /// [`TextureUsage`](crate::types::TextureUsage) bits.
    pub usage: u32,
    /// Mip level count.
    pub mip_level_count: u32,
    /// Sample count.
    pub sample_count: u32,
    /// Non-zero while the texture exists.
    pub live: u32,
}

/// Render pass as recorded by the dummy backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct RenderPassRecord {
    /// Number of color attachments.
    pub color_attachment_count: u32,
    /// Non-zero when a depth/stencil slot exists.
    pub has_depth_stencil: u32,
    /// Number of color attachments that load their previous contents.
    pub load_count: u32,
    /// Non-zero while the render pass exists.
    pub live: u32,
}

/// Frame buffer as recorded by the dummy backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct FrameBufferRecord {
    /// Render pass the frame buffer was created for.
    pub render_pass: u32,
    /// Width of every attachment.
    pub width: u32,
    /// Height of every attachment.
    pub height: u32,
    /// Number of attachments, depth included.
    pub attachment_count: u32,
    /// Non-zero while the frame buffer exists.
    pub live: u32,
}

/// Capacity of the dummy backend's object pools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DummyBackendConfig {
    /// Maximum number of live textures.
    pub max_textures: u32,
    /// Maximum number of live render passes.
    pub max_render_passes: u32,
    /// Maximum number of live frame buffers.
    pub max_frame_buffers: u32,
    /// Memory manager backing the pools.
    pub memory: MemoryConfig,
}

impl Default for DummyBackendConfig {
    fn default() -> Self {
        Self {
            max_textures: 256,
            max_render_passes: 128,
            max_frame_buffers: 128,
            memory: MemoryConfig::default().with_heap_size_mib(1),
        }
    }
}

impl DummyBackendConfig {
    /// Set the maximum number of live textures.
    pub fn with_max_textures(mut self, max_textures: u32) -> Self {
        self.max_textures = max_textures;
        self
    }

    /// Set the maximum number of live render passes.
    pub fn with_max_render_passes(mut self, max_render_passes: u32) -> Self {
        self.max_render_passes = max_render_passes;
        self
    }

    /// Set the maximum number of live frame buffers.
    pub fn with_max_frame_buffers(mut self, max_frame_buffers: u32) -> Self {
        self.max_frame_buffers = max_frame_buffers;
        self
    }
}

fn record_size<T>() -> u32 {
    std::mem::size_of::<T>() as u32
}

/// Dummy render backend.
#[derive(Debug)]
pub struct DummyBackend {
    memory: MemoryManager,
    textures: ResourcePool,
    render_passes: ResourcePool,
    frame_buffers: ResourcePool,
    created_textures: u64,
}

impl DummyBackend {
    /// Create a dummy backend with its own memory manager.
    pub fn new(config: DummyBackendConfig) -> Result<Self, BackendError> {
        let mut memory = MemoryManager::started(config.memory)?;
        let textures =
            ResourcePool::create(&mut memory, config.max_textures, record_size::<TextureRecord>())?;
        let render_passes = ResourcePool::create(
            &mut memory,
            config.max_render_passes,
            record_size::<RenderPassRecord>(),
        )?;
        let frame_buffers = ResourcePool::create(
            &mut memory,
            config.max_frame_buffers,
            record_size::<FrameBufferRecord>(),
        )?;
        Ok(Self {
            memory,
            textures,
            render_passes,
            frame_buffers,
            created_textures: 0,
        })
    }

    /// Number of live textures.
    pub fn live_textures(&self) -> u32 {
        self.textures.used_indices()
    }

    /// Number of live render passes.
    pub fn live_render_passes(&self) -> u32 {
        self.render_passes.used_indices()
    }

    /// Number of live frame buffers.
    pub fn live_frame_buffers(&self) -> u32 {
        self.frame_buffers.used_indices()
    }

    /// Textures created over the backend's lifetime.
    pub fn created_textures(&self) -> u64 {
        self.created_textures
    }

    /// Record of a live texture.
    pub fn texture(&self, texture: TextureHandle) -> Option<TextureRecord> {
        live_record::<TextureRecord>(&self.textures, &self.memory, texture.index())
            .filter(|record| record.live != 0)
    }

    /// Record of a live render pass.
    pub fn render_pass(&self, render_pass: RenderPassHandle) -> Option<RenderPassRecord> {
        live_record::<RenderPassRecord>(&self.render_passes, &self.memory, render_pass.index())
            .filter(|record| record.live != 0)
    }

    /// Record of a live frame buffer.
    pub fn frame_buffer(&self, frame_buffer: FrameBufferHandle) -> Option<FrameBufferRecord> {
        live_record::<FrameBufferRecord>(&self.frame_buffers, &self.memory, frame_buffer.index())
            .filter(|record| record.live != 0)
    }

    /// Memory manager backing the pools.
    pub fn memory(&self) -> &MemoryManager {
        &self.memory
    }
}

fn live_record<T: Pod>(pool: &ResourcePool, memory: &MemoryManager, index: u32) -> Option<T> {
    pool.get_as::<T>(memory, index).copied()
}

fn store<T: Pod>(
    pool: &mut ResourcePool,
    memory: &mut MemoryManager,
    record: T,
) -> Result<u32, BackendError> {
    let index = pool.allocate(memory)?;
    match pool.get_as_mut::<T>(memory, index) {
        Some(slot) => {
            *slot = record;
            Ok(index)
        }
        None => {
            pool.free(memory, index)?;
            Err(BackendError::ResourceCreationFailed(format!(
                "slot {index} cannot hold a {}",
                std::any::type_name::<T>()
            )))
        }
    }
}

fn retire(
    pool: &mut ResourcePool,
    memory: &mut MemoryManager,
    kind: &'static str,
    index: u32,
) -> Result<(), BackendError> {
    // Every record type ends with its `live` word.
    let slot = pool
        .get_mut(memory, index)
        .ok_or(BackendError::InvalidHandle { kind, index })?;
    let live_at = slot.len() - 4;
    let live = &mut slot[live_at..];
    if live.iter().all(|&b| b == 0) {
        return Err(BackendError::InvalidHandle { kind, index });
    }
    live.fill(0);
    pool.free(memory, index)?;
    Ok(())
}

impl RenderBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn create_texture(
        &mut self,
        descriptor: &TextureDescriptor,
    ) -> Result<TextureHandle, BackendError> {
        let record = TextureRecord {
            width: descriptor.size.width,
            height: descriptor.size.height,
            depth: descriptor.size.depth,
            format: descriptor.format.code(),
            usage: descriptor.usage.bits(),
            mip_level_count: descriptor.mip_level_count,
            sample_count: descriptor.sample_count,
            live: 1,
        };
        let index = store(&mut self.textures, &mut self.memory, record)?;
        self.created_textures += 1;
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{}x{}) -> {}",
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height,
            descriptor.size.depth,
            index
        );
        Ok(TextureHandle::new(index))
    }

    fn destroy_texture(&mut self, texture: TextureHandle) -> Result<(), BackendError> {
        log::trace!("DummyBackend: destroying texture {}", texture.index());
        retire(&mut self.textures, &mut self.memory, "texture", texture.index())
    }

    fn create_render_pass(
        &mut self,
        descriptor: &RenderPassDescriptor,
    ) -> Result<RenderPassHandle, BackendError> {
        let record = RenderPassRecord {
            color_attachment_count: descriptor.color_attachments.len() as u32,
            has_depth_stencil: u32::from(descriptor.depth_stencil_attachment.is_some()),
            load_count: descriptor
                .color_attachments
                .iter()
                .filter(|a| a.load_op == crate::graph::LoadOp::Load)
                .count() as u32,
            live: 1,
        };
        let index = store(&mut self.render_passes, &mut self.memory, record)?;
        log::trace!(
            "DummyBackend: creating render pass {:?} ({} attachments) -> {}",
            descriptor.label,
            descriptor.attachment_count(),
            index
        );
        Ok(RenderPassHandle::new(index))
    }

    fn destroy_render_pass(&mut self, render_pass: RenderPassHandle) -> Result<(), BackendError> {
        log::trace!("DummyBackend: destroying render pass {}", render_pass.index());
        retire(
            &mut self.render_passes,
            &mut self.memory,
            "render pass",
            render_pass.index(),
        )
    }

    fn create_frame_buffer(
        &mut self,
        descriptor: &FrameBufferDescriptor,
    ) -> Result<FrameBufferHandle, BackendError> {
        if self.render_pass(descriptor.render_pass).is_none() {
            return Err(BackendError::InvalidHandle {
                kind: "render pass",
                index: descriptor.render_pass.index(),
            });
        }
        let attachments = descriptor
            .color_attachments
            .iter()
            .chain(descriptor.depth_stencil_attachment.iter());
        for texture in attachments {
            if self.texture(*texture).is_none() {
                return Err(BackendError::InvalidHandle {
                    kind: "texture",
                    index: texture.index(),
                });
            }
        }

        let record = FrameBufferRecord {
            render_pass: descriptor.render_pass.index(),
            width: descriptor.width,
            height: descriptor.height,
            attachment_count: descriptor.color_attachments.len() as u32
                + u32::from(descriptor.depth_stencil_attachment.is_some()),
            live: 1,
        };
        let index = store(&mut self.frame_buffers, &mut self.memory, record)?;
        log::trace!(
            "DummyBackend: creating frame buffer {:?} ({}x{}) -> {}",
            descriptor.label,
            descriptor.width,
            descriptor.height,
            index
        );
        Ok(FrameBufferHandle::new(index))
    }

    fn destroy_frame_buffer(
        &mut self,
        frame_buffer: FrameBufferHandle,
    ) -> Result<(), BackendError> {
        log::trace!("DummyBackend: destroying frame buffer {}", frame_buffer.index());
        retire(
            &mut self.frame_buffers,
            &mut self.memory,
            "frame buffer",
            frame_buffer.index(),
        )
    }
}

impl Drop for DummyBackend {
    fn drop(&mut self) {
        if self.live_textures() + self.live_render_passes() + self.live_frame_buffers() > 0 {
            log::debug!(
                "DummyBackend: dropped with {} textures, {} render passes, {} frame buffers alive",
                self.live_textures(),
                self.live_render_passes(),
                self.live_frame_buffers()
            );
        }
        self.memory.shutdown();
    }
}
