//! Node and resource registries of a frame graph.

use std::collections::HashMap;
use std::fmt;

use super::error::GraphError;
use super::node::{FrameGraphNode, InputCreation, NodeCreation, NodeHandle, OutputCreation};
use super::pass::FrameGraphRenderPass;
use super::resource::{FrameGraphResource, ResourceHandle, ResourceInfo, ResourceType};

/// Creates nodes and resource records and looks them up by name.
///
/// Output names are unique across the builder, except for `reference`
/// outputs, which are never registered. Inputs are anonymous placeholders
/// until the compiler patches them from the output of the same name.
#[derive(Default)]
pub struct FrameGraphBuilder {
    nodes: Vec<FrameGraphNode>,
    resources: Vec<FrameGraphResource>,
    node_map: HashMap<String, NodeHandle>,
    resource_map: HashMap<String, ResourceHandle>,
    render_passes: HashMap<String, Box<dyn FrameGraphRenderPass>>,
}

impl fmt::Debug for FrameGraphBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameGraphBuilder")
            .field("nodes", &self.nodes.len())
            .field("resources", &self.resources.len())
            .field("render_passes", &self.render_passes.len())
            .finish()
    }
}

impl FrameGraphBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that `creation` could be added without name conflicts.
    pub fn validate(&self, creation: &NodeCreation) -> Result<(), GraphError> {
        if self.node_map.contains_key(&creation.name) {
            return Err(GraphError::DuplicateNode(creation.name.clone()));
        }
        for (i, output) in creation.outputs.iter().enumerate() {
            let has_texture_info = matches!(output.info, Some(ResourceInfo::Texture(_)));
            if output.ty.is_texture_backed() && !has_texture_info {
                return Err(GraphError::MissingTextureInfo {
                    node: creation.name.clone(),
                    resource: output.name.clone(),
                });
            }
            if output.ty == ResourceType::Reference {
                continue;
            }
            if let Some(&existing) = self.resource_map.get(&output.name) {
                let producer = self.resources[existing.index()]
                    .producer
                    .map(|node| self.nodes[node.index()].name.clone())
                    .unwrap_or_default();
                return Err(GraphError::DuplicateResource {
                    resource: output.name.clone(),
                    producer,
                });
            }
            let repeated = creation.outputs[..i]
                .iter()
                .any(|o| o.ty != ResourceType::Reference && o.name == output.name);
            if repeated {
                return Err(GraphError::DuplicateResource {
                    resource: output.name.clone(),
                    producer: creation.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Create a node together with its input and output records.
    pub fn create_node(&mut self, creation: NodeCreation) -> Result<NodeHandle, GraphError> {
        self.validate(&creation)?;

        let handle = NodeHandle::new(self.nodes.len());
        let outputs = creation
            .outputs
            .iter()
            .map(|output| self.create_node_output(output, handle))
            .collect::<Vec<_>>();
        let inputs = creation
            .inputs
            .iter()
            .map(|input| self.create_node_input(input))
            .collect::<Vec<_>>();

        log::debug!(
            "FrameGraphBuilder: node '{}' with {} inputs and {} outputs",
            creation.name,
            inputs.len(),
            outputs.len()
        );

        self.nodes.push(FrameGraphNode {
            name: creation.name.clone(),
            enabled: creation.enabled,
            edges: Vec::with_capacity(outputs.len()),
            inputs,
            outputs,
            render_pass: None,
            frame_buffer: None,
        });
        self.node_map.insert(creation.name, handle);
        Ok(handle)
    }

    fn create_node_output(&mut self, output: &OutputCreation, producer: NodeHandle) -> ResourceHandle {
        let handle = ResourceHandle::new(self.resources.len());
        self.resources.push(FrameGraphResource {
            name: output.name.clone(),
            ty: output.ty,
            info: output.info,
            producer: Some(producer),
            output: Some(handle),
            reference_count: 0,
            external: false,
        });
        if output.ty != ResourceType::Reference {
            self.resource_map.insert(output.name.clone(), handle);
        }
        handle
    }

    fn create_node_input(&mut self, input: &InputCreation) -> ResourceHandle {
        let handle = ResourceHandle::new(self.resources.len());
        self.resources.push(FrameGraphResource {
            name: input.name.clone(),
            ty: input.ty,
            info: None,
            producer: None,
            output: None,
            reference_count: 0,
            external: input.external,
        });
        handle
    }

    /// Attach rendering code to an existing node.
    ///
    /// Does nothing if code is already registered under `name`.
    pub fn register_render_pass(
        &mut self,
        name: &str,
        render_pass: Box<dyn FrameGraphRenderPass>,
    ) -> Result<(), GraphError> {
        if self.render_passes.contains_key(name) {
            return Ok(());
        }
        if !self.node_map.contains_key(name) {
            return Err(GraphError::UnknownNode(name.to_string()));
        }
        self.render_passes.insert(name.to_string(), render_pass);
        Ok(())
    }

    /// Whether rendering code is registered for the node.
    pub fn has_render_pass(&self, name: &str) -> bool {
        self.render_passes.contains_key(name)
    }

    pub(crate) fn render_pass_mut(
        &mut self,
        name: &str,
    ) -> Option<&mut Box<dyn FrameGraphRenderPass>> {
        self.render_passes.get_mut(name)
    }

    /// Node registered under `name`.
    pub fn get_node(&self, name: &str) -> Option<NodeHandle> {
        self.node_map.get(name).copied()
    }

    /// Output registered under `name`.
    pub fn get_resource(&self, name: &str) -> Option<ResourceHandle> {
        self.resource_map.get(name).copied()
    }

    /// Node record.
    ///
    /// # Panics
    ///
    /// Panics if the handle came from another builder.
    pub fn node(&self, handle: NodeHandle) -> &FrameGraphNode {
        &self.nodes[handle.index()]
    }

    /// Mutable node record.
    pub fn node_mut(&mut self, handle: NodeHandle) -> &mut FrameGraphNode {
        &mut self.nodes[handle.index()]
    }

    /// Resource record.
    ///
    /// # Panics
    ///
    /// Panics if the handle came from another builder.
    pub fn resource(&self, handle: ResourceHandle) -> &FrameGraphResource {
        &self.resources[handle.index()]
    }

    /// Mutable resource record.
    pub fn resource_mut(&mut self, handle: ResourceHandle) -> &mut FrameGraphResource {
        &mut self.resources[handle.index()]
    }

    /// Handles of every node, in creation order.
    pub fn node_handles(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        (0..self.nodes.len()).map(NodeHandle::new)
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of resource records, inputs included.
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Remove every node, resource and registered pass.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.resources.clear();
        self.node_map.clear();
        self.resource_map.clear();
        self.render_passes.clear();
    }
}
