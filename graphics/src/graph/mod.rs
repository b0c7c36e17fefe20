//! Frame graph infrastructure.
//!
//! A frame graph is a declarative description of the passes that render a
//! frame and the resources flowing between them. The graph takes care of:
//!
//! - Pass ordering via topological sort
//! - Resource lifetime analysis
//! - Texture aliasing between resources whose lifetimes do not overlap
//! - Render pass and frame buffer creation
//!
//! # Architecture
//!
//! | Layer | Type | Purpose |
//! |-------|------|---------|
//! | Description | [`FrameGraphDescription`] | JSON document listing the passes |
//! | **Graph** | [`FrameGraph`] | Parse, compile and render (this module) |
//! | Registry | [`FrameGraphBuilder`] | Node and resource records by name |
//! | Compiler | [`compiler`](crate::compiler) | The four compile phases |
//! | Backend | [`RenderBackend`] | Creates textures, render passes, frame buffers |
//!
//! # Example
//!
//! ```
//! use ember_graphics::{DummyBackend, DummyBackendConfig, FrameGraph};
//!
//! let mut backend = DummyBackend::new(DummyBackendConfig::default())?;
//! let mut graph = FrameGraph::from_json(r#"{
//!     "name": "deferred",
//!     "passes": [
//!         { "name": "GBuffer",
//!           "outputs": [ { "name": "albedo", "type": "attachment", "format": "RGBA8UNorm",
//!                          "op": "LoadOpClear", "resolution": [800, 600] } ] },
//!         { "name": "Lighting",
//!           "inputs": [ { "name": "albedo", "type": "attachment" } ],
//!           "outputs": [ { "name": "final", "type": "attachment", "format": "RGBA8UNorm",
//!                          "op": "LoadOpClear", "resolution": [800, 600] } ] }
//!     ]
//! }"#)?;
//!
//! let report = graph.compile(&mut backend)?;
//! assert_eq!(report.pass_order, ["GBuffer", "Lighting"]);
//! graph.shutdown(&mut backend)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod builder;
mod description;
mod error;
mod node;
mod pass;
mod resource;
mod target;

use std::collections::HashSet;
use std::path::Path;

pub use builder::FrameGraphBuilder;
pub use description::{FrameGraphDescription, InputDescription, OutputDescription, PassDescription};
pub use error::{CompileError, GraphError, ParseError};
pub use node::{FrameGraphNode, InputCreation, NodeCreation, NodeHandle, OutputCreation};
pub use pass::{FrameGraphRenderPass, PassContext};
pub use resource::{
    BufferInfo, FrameGraphResource, ResourceHandle, ResourceInfo, ResourceType, TextureInfo,
};
pub use target::{AttachmentDescriptor, FrameBufferDescriptor, LoadOp, RenderPassDescriptor};

use crate::backend::{
    BackendError, FrameBufferHandle, RenderBackend, RenderPassHandle, TextureHandle,
};
use crate::compiler::{self, CompileReport, CompiledFrameGraph};

/// A named frame graph with its compiled state.
#[derive(Debug, Default)]
pub struct FrameGraph {
    name: String,
    builder: FrameGraphBuilder,
    compiled: CompiledFrameGraph,
    is_compiled: bool,
}

impl FrameGraph {
    /// Create an empty, unnamed graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a graph from a JSON description.
    pub fn from_json(text: &str) -> Result<Self, ParseError> {
        let mut graph = Self::new();
        graph.parse_json(text)?;
        Ok(graph)
    }

    /// Add the passes of a JSON description.
    pub fn parse_json(&mut self, text: &str) -> Result<(), ParseError> {
        self.parse(&FrameGraphDescription::from_json(text)?)
    }

    /// Add the passes of a description file.
    pub fn parse_file(&mut self, path: impl AsRef<Path>) -> Result<(), ParseError> {
        self.parse(&FrameGraphDescription::from_file(path.as_ref())?)
    }

    /// Add the passes of a description and take its name.
    ///
    /// Every pass is validated before any node is created, so on error the
    /// graph is left as it was.
    pub fn parse(&mut self, description: &FrameGraphDescription) -> Result<(), ParseError> {
        let creations = description
            .passes
            .iter()
            .map(PassDescription::to_node_creation)
            .collect::<Result<Vec<_>, _>>()?;

        let mut nodes = HashSet::new();
        let mut outputs = HashSet::new();
        for creation in &creations {
            self.builder.validate(creation)?;
            if !nodes.insert(creation.name.as_str()) {
                return Err(GraphError::DuplicateNode(creation.name.clone()).into());
            }
            let registered = creation
                .outputs
                .iter()
                .filter(|output| output.ty != ResourceType::Reference);
            for output in registered {
                if !outputs.insert(output.name.as_str()) {
                    return Err(GraphError::DuplicateResource {
                        resource: output.name.clone(),
                        producer: creation.name.clone(),
                    }
                    .into());
                }
            }
        }

        for creation in creations {
            self.builder.create_node(creation)?;
        }
        if !description.name.is_empty() {
            self.name = description.name.clone();
        }
        self.is_compiled = false;
        log::info!(
            "FrameGraph '{}': parsed {} passes",
            self.name,
            description.passes.len()
        );
        Ok(())
    }

    /// Graph name taken from the last description parsed.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Node and resource registry.
    pub fn builder(&self) -> &FrameGraphBuilder {
        &self.builder
    }

    /// Mutable registry, for adding nodes in code.
    ///
    /// Changes take effect at the next compile.
    pub fn builder_mut(&mut self) -> &mut FrameGraphBuilder {
        self.is_compiled = false;
        &mut self.builder
    }

    /// Attach rendering code to the node called `name`.
    pub fn register_render_pass(
        &mut self,
        name: &str,
        render_pass: impl FrameGraphRenderPass + 'static,
    ) -> Result<(), GraphError> {
        self.builder.register_render_pass(name, Box::new(render_pass))
    }

    /// Enabled nodes in execution order, empty before the first compile.
    pub fn pass_order(&self) -> &[NodeHandle] {
        self.compiled.pass_order()
    }

    /// Whether the last compile succeeded and nothing changed since.
    pub fn is_compiled(&self) -> bool {
        self.is_compiled
    }

    /// Order the passes and create the objects they render with.
    pub fn compile(&mut self, backend: &mut dyn RenderBackend) -> Result<CompileReport, CompileError> {
        self.is_compiled = false;
        let report = compiler::compile(&mut self.builder, &mut self.compiled, backend)?;
        self.is_compiled = true;

        for (order, &node) in self.compiled.pass_order().iter().enumerate() {
            let parts = ContextParts::collect(&self.builder, node);
            if let Some(pass) = self.builder.render_pass_mut(&parts.name) {
                pass.on_compiled(&parts.context(order));
            }
        }
        log::info!(
            "FrameGraph '{}': compiled {} passes",
            self.name,
            report.pass_order.len()
        );
        Ok(report)
    }

    /// Invoke the registered passes in compiled order.
    ///
    /// Returns how many passes ran. Nodes without registered code are
    /// skipped; nothing runs before a successful compile.
    pub fn render(&mut self) -> usize {
        if !self.is_compiled {
            log::warn!("FrameGraph '{}': render before compile", self.name);
            return 0;
        }

        let mut rendered = 0;
        for (order, &node) in self.compiled.pass_order().iter().enumerate() {
            let parts = ContextParts::collect(&self.builder, node);
            if let Some(pass) = self.builder.render_pass_mut(&parts.name) {
                pass.render(&parts.context(order));
                rendered += 1;
            }
        }
        rendered
    }

    /// Destroy every backend object the graph created.
    ///
    /// Nodes stay registered; the graph can be compiled again.
    pub fn shutdown(&mut self, backend: &mut dyn RenderBackend) -> Result<(), BackendError> {
        let mut textures: Vec<TextureHandle> = self.compiled.free_textures().collect();
        for index in 0..self.builder.resource_count() {
            let resource = self.builder.resource_mut(ResourceHandle::new(index));
            let is_output = resource.output == Some(ResourceHandle::new(index));
            if let Some(info) = resource.texture_info_mut() {
                if let Some(texture) = info.texture.take() {
                    if is_output && !textures.contains(&texture) {
                        textures.push(texture);
                    }
                }
            }
        }
        for &texture in &textures {
            backend.destroy_texture(texture)?;
        }

        let nodes: Vec<NodeHandle> = self.builder.node_handles().collect();
        for node in nodes {
            let record = self.builder.node_mut(node);
            let (frame_buffer, render_pass) = (record.frame_buffer.take(), record.render_pass.take());
            if let Some(frame_buffer) = frame_buffer {
                backend.destroy_frame_buffer(frame_buffer)?;
            }
            if let Some(render_pass) = render_pass {
                backend.destroy_render_pass(render_pass)?;
            }
        }

        self.compiled.clear();
        self.is_compiled = false;
        log::info!(
            "FrameGraph '{}': shut down, {} textures destroyed",
            self.name,
            textures.len()
        );
        Ok(())
    }
}

/// Owned pieces of a [`PassContext`], collected before the pass is borrowed
/// mutably from the builder.
struct ContextParts {
    name: String,
    render_pass: Option<RenderPassHandle>,
    frame_buffer: Option<FrameBufferHandle>,
    input_textures: Vec<TextureHandle>,
    output_textures: Vec<TextureHandle>,
}

impl ContextParts {
    fn collect(builder: &FrameGraphBuilder, node: NodeHandle) -> Self {
        let record = builder.node(node);
        let input_textures = record
            .inputs
            .iter()
            .filter(|&&input| !builder.resource(input).external)
            .filter_map(|&input| builder.resource(input).output)
            .filter_map(|output| builder.resource(output).texture())
            .collect();
        let output_textures = record
            .outputs
            .iter()
            .filter_map(|&output| builder.resource(output).texture())
            .collect();
        Self {
            name: record.name.clone(),
            render_pass: record.render_pass,
            frame_buffer: record.frame_buffer,
            input_textures,
            output_textures,
        }
    }

    fn context(&self, order: usize) -> PassContext<'_> {
        PassContext {
            name: &self.name,
            order,
            render_pass: self.render_pass,
            frame_buffer: self.frame_buffer,
            input_textures: self.input_textures.clone(),
            output_textures: self.output_textures.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DummyBackend, DummyBackendConfig};
    use std::cell::RefCell;
    use std::rc::Rc;

    const TWO_PASSES: &str = r#"{
        "name": "deferred",
        "passes": [
            { "name": "GBuffer",
              "outputs": [ { "name": "albedo", "type": "attachment", "format": "RGBA8UNorm",
                             "op": "LoadOpClear", "resolution": [800, 600] } ] },
            { "name": "Lighting",
              "inputs": [ { "name": "albedo", "type": "attachment" } ],
              "outputs": [ { "name": "final", "type": "attachment", "format": "RGBA8UNorm",
                             "op": "LoadOpClear", "resolution": [800, 600] } ] }
        ]
    }"#;

    fn backend() -> DummyBackend {
        DummyBackend::new(DummyBackendConfig::default()).unwrap()
    }

    #[test]
    fn test_parse_sets_name() {
        let graph = FrameGraph::from_json(TWO_PASSES).unwrap();
        assert_eq!(graph.name(), "deferred");
        assert_eq!(graph.builder().node_count(), 2);
        assert!(!graph.is_compiled());
        assert!(graph.pass_order().is_empty());
    }

    #[test]
    fn test_parse_is_atomic() {
        let mut graph = FrameGraph::from_json(TWO_PASSES).unwrap();
        let again = graph.parse_json(
            r#"{ "passes": [ { "name": "Post" }, { "name": "GBuffer" } ] }"#,
        );
        assert!(matches!(
            again,
            Err(ParseError::Graph(GraphError::DuplicateNode(name))) if name == "GBuffer"
        ));
        assert!(graph.builder().get_node("Post").is_none());

        let within = graph.parse_json(
            r#"{ "passes": [ { "name": "A" }, { "name": "A" } ] }"#,
        );
        assert!(matches!(within, Err(ParseError::Graph(GraphError::DuplicateNode(_)))));
        assert_eq!(graph.builder().node_count(), 2);
    }

    #[test]
    fn test_render_calls_passes_in_order() {
        let mut backend = backend();
        let mut graph = FrameGraph::from_json(TWO_PASSES).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));

        for name in ["Lighting", "GBuffer"] {
            let seen = Rc::clone(&seen);
            graph
                .register_render_pass(name, move |ctx: &PassContext<'_>| {
                    assert!(ctx.render_pass.is_some());
                    assert!(ctx.frame_buffer.is_some());
                    seen.borrow_mut().push((ctx.order, ctx.name.to_string()));
                })
                .unwrap();
        }

        assert_eq!(graph.render(), 0);
        graph.compile(&mut backend).unwrap();
        assert_eq!(graph.render(), 2);
        assert_eq!(
            *seen.borrow(),
            vec![(0, "GBuffer".to_string()), (1, "Lighting".to_string())]
        );
    }

    #[test]
    fn test_shutdown_releases_everything() {
        let mut backend = backend();
        let mut graph = FrameGraph::from_json(TWO_PASSES).unwrap();
        graph.compile(&mut backend).unwrap();
        assert_eq!(backend.live_textures(), 2);

        graph.shutdown(&mut backend).unwrap();
        assert_eq!(backend.live_textures(), 0);
        assert_eq!(backend.live_render_passes(), 0);
        assert_eq!(backend.live_frame_buffers(), 0);
        assert!(!graph.is_compiled());

        graph.compile(&mut backend).unwrap();
        assert_eq!(backend.live_render_passes(), 2);
    }
}
