//! Frame graph error types.

use thiserror::Error;

use crate::backend::BackendError;

/// Errors raised by the builder's node and resource registries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Two nodes share a name.
    #[error("node '{0}' is already defined")]
    DuplicateNode(String),
    /// Two non-reference outputs share a name.
    #[error("resource '{resource}' is already produced by node '{producer}'")]
    DuplicateResource {
        /// Resource name.
        resource: String,
        /// Node that registered it first.
        producer: String,
    },
    /// No node is registered under the name.
    #[error("no node named '{0}'")]
    UnknownNode(String),
    /// A texture or attachment output declared without texture parameters.
    #[error("output '{resource}' of node '{node}' needs texture parameters")]
    MissingTextureInfo {
        /// Node being created.
        node: String,
        /// Output name.
        resource: String,
    },
}

/// Errors raised while reading a frame graph description.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The document is not valid JSON or does not have the expected shape.
    #[error("malformed frame graph description: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The description file could not be read.
    #[error("failed to read frame graph description: {0}")]
    Io(#[from] std::io::Error),
    /// Resource type outside `texture`, `attachment`, `buffer`, `reference`.
    #[error("pass '{pass}': unknown resource type '{value}'")]
    UnknownResourceType {
        /// Pass being parsed.
        pass: String,
        /// Offending value.
        value: String,
    },
    /// Pixel format name outside the supported set.
    #[error("pass '{pass}': unknown format '{value}' for '{resource}'")]
    UnknownFormat {
        /// Pass being parsed.
        pass: String,
        /// Output being parsed.
        resource: String,
        /// Offending value.
        value: String,
    },
    /// Load operation other than `LoadOpClear` or `LoadOpLoad`.
    #[error("pass '{pass}': unknown load op '{value}' for '{resource}'")]
    UnknownLoadOp {
        /// Pass being parsed.
        pass: String,
        /// Output being parsed.
        resource: String,
        /// Offending value.
        value: String,
    },
    /// A pass, input or output with an empty name.
    #[error("pass '{pass}': {what} without a name")]
    MissingName {
        /// Pass being parsed (empty when the pass itself is unnamed).
        pass: String,
        /// "pass", "input" or "output".
        what: &'static str,
    },
    /// A texture or attachment output without a required field.
    #[error("pass '{pass}': output '{resource}' is missing '{field}'")]
    MissingField {
        /// Pass being parsed.
        pass: String,
        /// Output being parsed.
        resource: String,
        /// Field name.
        field: &'static str,
    },
    /// A resolution that is not two positive integers.
    #[error("pass '{pass}': output '{resource}' has invalid resolution {value:?}")]
    InvalidResolution {
        /// Pass being parsed.
        pass: String,
        /// Output being parsed.
        resource: String,
        /// Offending value.
        value: Vec<u32>,
    },
    /// Buffer outputs are not supported yet.
    #[error("pass '{pass}': buffer output '{resource}' is not supported")]
    UnsupportedBufferOutput {
        /// Pass being parsed.
        pass: String,
        /// Output being parsed.
        resource: String,
    },
    /// The description conflicts with itself or with already registered nodes.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Errors raised by [`FrameGraph::compile`](super::FrameGraph::compile).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// A non-external input names a resource no node produces.
    #[error("node '{node}' reads '{resource}', which no node produces")]
    UnresolvedInput {
        /// Consuming node.
        node: String,
        /// Input name.
        resource: String,
    },
    /// An enabled node reads the output of a disabled node.
    #[error("node '{node}' reads '{resource}' from disabled node '{producer}'")]
    DisabledProducer {
        /// Consuming node.
        node: String,
        /// Input name.
        resource: String,
        /// Disabled producer.
        producer: String,
    },
    /// The edges form a cycle.
    #[error("frame graph contains a cycle through node '{0}'")]
    CyclicDependency(String),
    /// Attachments of one node disagree on their size.
    #[error(
        "node '{node}': '{resource}' is {actual_width}x{actual_height}, expected {expected_width}x{expected_height}"
    )]
    ResolutionMismatch {
        /// Node whose frame buffer is being built.
        node: String,
        /// Resource that disagrees.
        resource: String,
        /// Width of the first attachment.
        expected_width: u32,
        /// Height of the first attachment.
        expected_height: u32,
        /// Width of the offending attachment.
        actual_width: u32,
        /// Height of the offending attachment.
        actual_height: u32,
    },
    /// The render backend refused to create an object.
    #[error("render backend failed: {0}")]
    Backend(#[from] BackendError),
}
