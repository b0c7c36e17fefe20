//! Frame graph compilation.
//!
//! This module turns the node and resource records of a
//! [`FrameGraphBuilder`] into an execution plan ([`CompiledFrameGraph`])
//! backed by physical objects from a [`RenderBackend`].
//!
//! # Phases
//!
//! 1. **Edges** - every non-external input is matched with the output of the
//!    same name; the producer gains an edge to the consumer.
//! 2. **Sort** - iterative depth-first search over enabled nodes, reversed
//!    post-order. Cycles are reported.
//! 3. **Lifetimes** - outputs get a texture when their producer runs and give
//!    it back once their last consumer has run. Returned textures go on a
//!    free list and the next compatible output reuses the most recently
//!    returned one. This is greedy, not best fit.
//! 4. **Physical objects** - render passes and frame buffers for every
//!    enabled node that lacks them.
//!
//! Recompiling first retires every assigned texture into the free list and
//! destroys the frame buffers. Render passes are kept. Retired textures that
//! no output picks up again are destroyed at the end.
//!
//! A failed compile leaves the graph partially compiled; compile again or
//! shut it down.

use crate::backend::{RenderBackend, RenderPassHandle, TextureHandle};
use crate::graph::{
    AttachmentDescriptor, CompileError, FrameBufferDescriptor, FrameGraphBuilder,
    FrameGraphResource, LoadOp, NodeHandle, RenderPassDescriptor, ResourceHandle, ResourceType,
};
use crate::types::{TextureDescriptor, TextureUsage};

/// Counters describing one compile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileReport {
    /// Node names in execution order.
    pub pass_order: Vec<String>,
    /// Textures requested from the backend.
    pub textures_created: usize,
    /// Outputs that reused a texture from the free list.
    pub textures_reused: usize,
    /// Retired textures nobody picked up again.
    pub textures_destroyed: usize,
    /// Resources whose last consumer ran.
    pub deallocations: usize,
    /// Render passes requested from the backend.
    pub render_passes_created: usize,
    /// Frame buffers requested from the backend.
    pub frame_buffers_created: usize,
}

/// Result of compilation kept by the frame graph between compiles.
#[derive(Debug, Default)]
pub struct CompiledFrameGraph {
    /// Enabled nodes in execution order.
    pass_order: Vec<NodeHandle>,
    /// Textures available for aliasing, most recently returned last.
    free_textures: Vec<(TextureDescriptor, TextureHandle)>,
}

impl CompiledFrameGraph {
    /// Enabled nodes in execution order.
    pub fn pass_order(&self) -> &[NodeHandle] {
        &self.pass_order
    }

    /// Textures currently on the aliasing free list.
    pub fn free_textures(&self) -> impl Iterator<Item = TextureHandle> + '_ {
        self.free_textures.iter().map(|(_, texture)| *texture)
    }

    pub(crate) fn clear(&mut self) {
        self.pass_order.clear();
        self.free_textures.clear();
    }

    /// Take the most recently returned texture compatible with `descriptor`.
    fn acquire(&mut self, descriptor: &TextureDescriptor) -> Option<TextureHandle> {
        let position = self
            .free_textures
            .iter()
            .rposition(|(free, _)| free.is_compatible(descriptor))?;
        Some(self.free_textures.remove(position).1)
    }

    fn release(&mut self, descriptor: TextureDescriptor, texture: TextureHandle) {
        self.free_textures.push((descriptor, texture));
    }
}

/// Texture configuration for a texture-backed resource.
pub(crate) fn texture_descriptor(resource: &FrameGraphResource) -> Option<TextureDescriptor> {
    let info = resource.texture_info()?;
    let usage = match resource.ty {
        ResourceType::Attachment if info.format.is_depth_stencil() => {
            TextureUsage::DEPTH_STENCIL_ATTACHMENT | TextureUsage::TEXTURE_BINDING
        }
        ResourceType::Attachment => {
            TextureUsage::COLOR_ATTACHMENT | TextureUsage::TEXTURE_BINDING
        }
        ResourceType::Texture => TextureUsage::TEXTURE_BINDING | TextureUsage::STORAGE_BINDING,
        ResourceType::Buffer | ResourceType::Reference => return None,
    };
    Some(
        TextureDescriptor::new_2d(info.width, info.height, info.format, usage)
            .with_label(resource.name.clone()),
    )
}

/// Run every phase.
pub fn compile(
    builder: &mut FrameGraphBuilder,
    compiled: &mut CompiledFrameGraph,
    backend: &mut dyn RenderBackend,
) -> Result<CompileReport, CompileError> {
    let mut report = CompileReport::default();

    let retired = retire(builder, compiled, backend)?;
    compute_edges(builder)?;
    compiled.pass_order = sort_nodes(builder)?;
    compute_lifetimes(builder, compiled, backend, &mut report)?;
    report.textures_destroyed = destroy_unclaimed(builder, compiled, backend, &retired)?;
    create_physical_objects(builder, compiled.pass_order(), backend, &mut report)?;

    report.pass_order = compiled
        .pass_order
        .iter()
        .map(|&node| builder.node(node).name.clone())
        .collect();
    log::debug!(
        "FrameGraph compiled: {} passes, {} textures created, {} reused",
        report.pass_order.len(),
        report.textures_created,
        report.textures_reused
    );
    Ok(report)
}

fn output_records(builder: &FrameGraphBuilder) -> impl Iterator<Item = ResourceHandle> + '_ {
    (0..builder.resource_count())
        .map(ResourceHandle::new)
        .filter(move |&handle| builder.resource(handle).output == Some(handle))
}

/// Move every assigned texture to the free list and destroy frame buffers.
fn retire(
    builder: &mut FrameGraphBuilder,
    compiled: &mut CompiledFrameGraph,
    backend: &mut dyn RenderBackend,
) -> Result<Vec<TextureHandle>, CompileError> {
    // The free list survives a failed compile; its textures are retired too.
    compiled.pass_order.clear();
    let mut retired: Vec<TextureHandle> = compiled.free_textures().collect();

    let outputs: Vec<ResourceHandle> = output_records(builder).collect();
    for handle in outputs {
        let resource = builder.resource(handle);
        let (Some(texture), Some(descriptor)) = (resource.texture(), texture_descriptor(resource))
        else {
            continue;
        };
        if !retired.contains(&texture) {
            retired.push(texture);
            compiled.release(descriptor, texture);
        }
    }
    for index in 0..builder.resource_count() {
        if let Some(info) = builder
            .resource_mut(ResourceHandle::new(index))
            .texture_info_mut()
        {
            info.texture = None;
        }
    }

    let nodes: Vec<NodeHandle> = builder.node_handles().collect();
    for node in nodes {
        if let Some(frame_buffer) = builder.node_mut(node).frame_buffer.take() {
            backend.destroy_frame_buffer(frame_buffer)?;
        }
    }

    if !retired.is_empty() {
        log::debug!("FrameGraph: retired {} textures for reuse", retired.len());
    }
    Ok(retired)
}

/// Phase 1: resolve inputs and build producer-to-consumer edges.
pub(crate) fn compute_edges(builder: &mut FrameGraphBuilder) -> Result<(), CompileError> {
    let nodes: Vec<NodeHandle> = builder.node_handles().collect();
    for &node in &nodes {
        builder.node_mut(node).edges.clear();
    }

    for &node in &nodes {
        if !builder.node(node).enabled {
            continue;
        }
        let inputs = builder.node(node).inputs.clone();
        for input in inputs {
            if builder.resource(input).external {
                continue;
            }
            let name = &builder.resource(input).name;
            let Some(output) = builder.get_resource(name) else {
                return Err(CompileError::UnresolvedInput {
                    node: builder.node(node).name.clone(),
                    resource: name.clone(),
                });
            };

            let (producer, info) = {
                let output_record = builder.resource(output);
                (output_record.producer, output_record.info)
            };
            let Some(producer) = producer else {
                return Err(CompileError::UnresolvedInput {
                    node: builder.node(node).name.clone(),
                    resource: name.clone(),
                });
            };
            if !builder.node(producer).enabled {
                return Err(CompileError::DisabledProducer {
                    node: builder.node(node).name.clone(),
                    resource: name.clone(),
                    producer: builder.node(producer).name.clone(),
                });
            }

            let record = builder.resource_mut(input);
            record.producer = Some(producer);
            record.info = info;
            record.output = Some(output);

            let edges = &mut builder.node_mut(producer).edges;
            if !edges.contains(&node) {
                edges.push(node);
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Unvisited,
    InProgress,
    Done,
}

/// Phase 2: topological order of the enabled nodes.
pub(crate) fn sort_nodes(builder: &FrameGraphBuilder) -> Result<Vec<NodeHandle>, CompileError> {
    let enabled: Vec<NodeHandle> = builder
        .node_handles()
        .filter(|&node| builder.node(node).enabled)
        .collect();

    let mut state = vec![VisitState::Unvisited; builder.node_count()];
    let mut sorted = Vec::with_capacity(enabled.len());
    let mut stack = Vec::new();

    for &root in &enabled {
        if state[root.index()] != VisitState::Unvisited {
            continue;
        }
        stack.push(root);

        while let Some(&top) = stack.last() {
            match state[top.index()] {
                VisitState::Done => {
                    stack.pop();
                }
                VisitState::InProgress => {
                    state[top.index()] = VisitState::Done;
                    sorted.push(top);
                    stack.pop();
                }
                VisitState::Unvisited => {
                    state[top.index()] = VisitState::InProgress;
                    for &child in &builder.node(top).edges {
                        match state[child.index()] {
                            VisitState::Unvisited => stack.push(child),
                            VisitState::InProgress => {
                                return Err(CompileError::CyclicDependency(
                                    builder.node(child).name.clone(),
                                ));
                            }
                            VisitState::Done => {}
                        }
                    }
                }
            }
        }
    }

    sorted.reverse();
    assert_eq!(
        sorted.len(),
        enabled.len(),
        "sorted {} of {} enabled nodes",
        sorted.len(),
        enabled.len()
    );
    Ok(sorted)
}

/// Phase 3: reference counting and greedy texture aliasing.
pub(crate) fn compute_lifetimes(
    builder: &mut FrameGraphBuilder,
    compiled: &mut CompiledFrameGraph,
    backend: &mut dyn RenderBackend,
    report: &mut CompileReport,
) -> Result<(), CompileError> {
    for index in 0..builder.resource_count() {
        builder.resource_mut(ResourceHandle::new(index)).reference_count = 0;
    }
    let order = compiled.pass_order.clone();

    for &node in &order {
        for &input in &builder.node(node).inputs.clone() {
            if let Some(output) = consumed_output(builder, input) {
                builder.resource_mut(output).reference_count += 1;
            }
        }
    }

    let mut released = vec![false; builder.resource_count()];
    for &node in &order {
        let (inputs, outputs) = {
            let record = builder.node(node);
            (record.inputs.clone(), record.outputs.clone())
        };

        for output in outputs {
            let resource = builder.resource(output);
            if resource.external {
                continue;
            }
            let Some(descriptor) = texture_descriptor(resource) else {
                if resource.ty == ResourceType::Buffer {
                    log::warn!("FrameGraph: buffer '{}' is not allocated", resource.name);
                }
                continue;
            };
            assert!(
                resource.texture().is_none(),
                "resource '{}' allocated twice",
                resource.name
            );

            let texture = match compiled.acquire(&descriptor) {
                Some(texture) => {
                    log::debug!(
                        "FrameGraph: '{}' aliases texture {}",
                        resource.name,
                        texture.index()
                    );
                    report.textures_reused += 1;
                    texture
                }
                None => {
                    report.textures_created += 1;
                    backend.create_texture(&descriptor)?
                }
            };
            if let Some(info) = builder.resource_mut(output).texture_info_mut() {
                info.texture = Some(texture);
            }
        }

        for input in inputs {
            let Some(output) = consumed_output(builder, input) else {
                continue;
            };
            let resource = builder.resource_mut(output);
            resource.reference_count -= 1;
            if resource.reference_count != 0 {
                continue;
            }

            assert!(
                !released[output.index()],
                "resource '{}' deallocated twice",
                resource.name
            );
            released[output.index()] = true;
            report.deallocations += 1;

            let resource = builder.resource(output);
            if let Some(descriptor) = texture_descriptor(resource) {
                let texture = resource.texture();
                assert!(
                    texture.is_some(),
                    "resource '{}' deallocated before allocation",
                    resource.name
                );
                if let Some(texture) = texture {
                    compiled.release(descriptor, texture);
                }
            }
        }
    }
    Ok(())
}

/// Output record an input reads, or `None` for external inputs.
fn consumed_output(builder: &FrameGraphBuilder, input: ResourceHandle) -> Option<ResourceHandle> {
    let record = builder.resource(input);
    if record.external {
        None
    } else {
        record.output
    }
}

/// Destroy retired textures that no output holds anymore.
fn destroy_unclaimed(
    builder: &FrameGraphBuilder,
    compiled: &mut CompiledFrameGraph,
    backend: &mut dyn RenderBackend,
    retired: &[TextureHandle],
) -> Result<usize, CompileError> {
    let in_use: Vec<TextureHandle> = output_records(builder)
        .filter_map(|handle| builder.resource(handle).texture())
        .collect();

    let mut destroyed = 0;
    for &texture in retired {
        if in_use.contains(&texture) {
            continue;
        }
        compiled.free_textures.retain(|(_, free)| *free != texture);
        backend.destroy_texture(texture)?;
        destroyed += 1;
    }
    Ok(destroyed)
}

/// Attachment inputs that end up in a node's render pass and frame buffer.
fn attachment_inputs(
    builder: &FrameGraphBuilder,
    node: NodeHandle,
) -> impl Iterator<Item = (ResourceHandle, ResourceHandle)> + '_ {
    builder.node(node).inputs.iter().filter_map(move |&input| {
        let record = builder.resource(input);
        if record.ty != ResourceType::Attachment {
            return None;
        }
        consumed_output(builder, input).map(|output| (input, output))
    })
}

fn texture_outputs(
    builder: &FrameGraphBuilder,
    node: NodeHandle,
) -> impl Iterator<Item = ResourceHandle> + '_ {
    builder
        .node(node)
        .outputs
        .iter()
        .copied()
        .filter(move |&output| {
            let record = builder.resource(output);
            record.ty.is_texture_backed() && record.texture_info().is_some()
        })
}

/// Phase 4: render passes and frame buffers.
pub(crate) fn create_physical_objects(
    builder: &mut FrameGraphBuilder,
    order: &[NodeHandle],
    backend: &mut dyn RenderBackend,
    report: &mut CompileReport,
) -> Result<(), CompileError> {
    for &node in order {
        let render_pass = match builder.node(node).render_pass {
            Some(render_pass) => render_pass,
            None => {
                let descriptor = render_pass_descriptor(builder, node);
                let render_pass = backend.create_render_pass(&descriptor)?;
                report.render_passes_created += 1;
                builder.node_mut(node).render_pass = Some(render_pass);
                render_pass
            }
        };

        if builder.node(node).frame_buffer.is_none() {
            let descriptor = frame_buffer_descriptor(builder, node, render_pass)?;
            let frame_buffer = backend.create_frame_buffer(&descriptor)?;
            report.frame_buffers_created += 1;
            builder.node_mut(node).frame_buffer = Some(frame_buffer);
        }
    }
    Ok(())
}

fn render_pass_descriptor(builder: &FrameGraphBuilder, node: NodeHandle) -> RenderPassDescriptor {
    let record = builder.node(node);
    let mut descriptor = RenderPassDescriptor::new().with_label(record.name.clone());

    // Depth outputs always clear; inputs keep what their producer wrote.
    let outputs = texture_outputs(builder, node)
        .filter_map(|output| builder.resource(output).texture_info())
        .map(|info| match info.format.is_depth_stencil() {
            true => (info.format, LoadOp::Clear),
            false => (info.format, info.load_op),
        });
    let inputs = attachment_inputs(builder, node)
        .filter_map(|(_, output)| builder.resource(output).texture_info())
        .map(|info| (info.format, LoadOp::Load));

    for (format, load_op) in outputs.chain(inputs) {
        let attachment = AttachmentDescriptor::new(format, load_op);
        if !format.is_depth_stencil() {
            descriptor.color_attachments.push(attachment);
        } else if descriptor.depth_stencil_attachment.is_none() {
            descriptor.depth_stencil_attachment = Some(attachment);
        } else {
            log::warn!(
                "FrameGraph: node '{}' has more than one depth attachment, keeping the first",
                record.name
            );
        }
    }
    descriptor
}

fn frame_buffer_descriptor(
    builder: &FrameGraphBuilder,
    node: NodeHandle,
    render_pass: RenderPassHandle,
) -> Result<FrameBufferDescriptor, CompileError> {
    let record = builder.node(node);

    let mut descriptor =
        FrameBufferDescriptor::new(render_pass, 0, 0).with_label(record.name.clone());
    let mut extent: Option<(u32, u32)> = None;

    let attachments = texture_outputs(builder, node)
        .chain(attachment_inputs(builder, node).map(|(_, output)| output));
    for output in attachments {
        let resource = builder.resource(output);
        let Some(info) = resource.texture_info() else {
            continue;
        };
        let Some(texture) = info.texture else {
            panic!("resource '{}' has no texture after allocation", resource.name);
        };

        match extent {
            None => extent = Some((info.width, info.height)),
            Some((width, height)) if (width, height) != (info.width, info.height) => {
                return Err(CompileError::ResolutionMismatch {
                    node: record.name.clone(),
                    resource: resource.name.clone(),
                    expected_width: width,
                    expected_height: height,
                    actual_width: info.width,
                    actual_height: info.height,
                });
            }
            Some(_) => {}
        }

        if info.format.is_depth_stencil() {
            if descriptor.depth_stencil_attachment.is_none() {
                descriptor.depth_stencil_attachment = Some(texture);
            }
        } else {
            descriptor.color_attachments.push(texture);
        }
    }

    if let Some((width, height)) = extent {
        descriptor.width = width;
        descriptor.height = height;
    }
    Ok(descriptor)
}
