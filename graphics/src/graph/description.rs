//! Declarative frame graph description format.
//!
//! A description is a JSON document naming the graph and listing its passes:
//!
//! ```json
//! {
//!   "name": "deferred",
//!   "passes": [
//!     { "name": "gbuffer",
//!       "outputs": [ { "name": "albedo", "type": "attachment",
//!                      "format": "RGBA8UNorm", "op": "LoadOpClear",
//!                      "resolution": [800, 600] } ] },
//!     { "name": "lighting",
//!       "inputs": [ { "name": "albedo", "type": "attachment" } ],
//!       "outputs": [ { "name": "final", "type": "attachment",
//!                      "format": "RGBA8UNorm", "op": "LoadOpClear",
//!                      "resolution": [800, 600] } ] }
//!   ]
//! }
//! ```
//!
//! Type, format and load-op fields are kept as strings by serde and checked
//! in [`PassDescription::to_node_creation`], so each mistake maps to its own
//! [`ParseError`] variant.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::TextureFormat;

use super::error::ParseError;
use super::node::{InputCreation, NodeCreation, OutputCreation};
use super::resource::{ResourceInfo, ResourceType, TextureInfo};
use super::target::LoadOp;

fn default_enabled() -> bool {
    true
}

/// A whole frame graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameGraphDescription {
    /// Graph name.
    #[serde(default)]
    pub name: String,
    /// Passes in declaration order.
    #[serde(default)]
    pub passes: Vec<PassDescription>,
}

/// One pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassDescription {
    /// Pass name.
    #[serde(default)]
    pub name: String,
    /// Whether the pass takes part in compile; defaults to `true`.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Inputs in declaration order.
    #[serde(default)]
    pub inputs: Vec<InputDescription>,
    /// Outputs in declaration order.
    #[serde(default)]
    pub outputs: Vec<OutputDescription>,
}

/// One pass input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDescription {
    /// Resource name.
    #[serde(default)]
    pub name: String,
    /// `texture`, `attachment`, `buffer` or `reference`.
    #[serde(rename = "type")]
    pub ty: String,
    /// Provided from outside the graph.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub external: bool,
}

/// One pass output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDescription {
    /// Resource name.
    #[serde(default)]
    pub name: String,
    /// `texture`, `attachment`, `buffer` or `reference`.
    #[serde(rename = "type")]
    pub ty: String,
    /// Pixel format name, required for texture-backed outputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// `LoadOpClear` or `LoadOpLoad`, required for texture-backed outputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    /// `[width, height]`, required for texture-backed outputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Vec<u32>>,
}

impl FrameGraphDescription {
    /// Parse a description from JSON text.
    pub fn from_json(text: &str) -> Result<Self, ParseError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read and parse a description file.
    pub fn from_file(path: &Path) -> Result<Self, ParseError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, ParseError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn parse_type(pass: &str, value: &str) -> Result<ResourceType, ParseError> {
    value
        .parse()
        .map_err(|value| ParseError::UnknownResourceType {
            pass: pass.to_string(),
            value,
        })
}

impl PassDescription {
    /// Validate the pass and turn it into a builder record.
    pub fn to_node_creation(&self) -> Result<NodeCreation, ParseError> {
        if self.name.is_empty() {
            return Err(ParseError::MissingName {
                pass: String::new(),
                what: "pass",
            });
        }
        let mut creation = NodeCreation::new(self.name.clone()).with_enabled(self.enabled);

        for input in &self.inputs {
            if input.name.is_empty() {
                return Err(ParseError::MissingName {
                    pass: self.name.clone(),
                    what: "input",
                });
            }
            let ty = parse_type(&self.name, &input.ty)?;
            let mut record = InputCreation::new(input.name.clone(), ty);
            record.external = input.external;
            creation = creation.with_input(record);
        }

        for output in &self.outputs {
            creation = creation.with_output(self.output_creation(output)?);
        }
        Ok(creation)
    }

    fn output_creation(&self, output: &OutputDescription) -> Result<OutputCreation, ParseError> {
        if output.name.is_empty() {
            return Err(ParseError::MissingName {
                pass: self.name.clone(),
                what: "output",
            });
        }
        let missing = |field| ParseError::MissingField {
            pass: self.name.clone(),
            resource: output.name.clone(),
            field,
        };

        let ty = parse_type(&self.name, &output.ty)?;
        match ty {
            ResourceType::Reference => Ok(OutputCreation::reference(output.name.clone())),
            ResourceType::Buffer => Err(ParseError::UnsupportedBufferOutput {
                pass: self.name.clone(),
                resource: output.name.clone(),
            }),
            ResourceType::Texture | ResourceType::Attachment => {
                let format_name = output.format.as_deref().ok_or_else(|| missing("format"))?;
                let format: TextureFormat =
                    format_name
                        .parse()
                        .map_err(|_| ParseError::UnknownFormat {
                            pass: self.name.clone(),
                            resource: output.name.clone(),
                            value: format_name.to_string(),
                        })?;

                let op_name = output.op.as_deref().ok_or_else(|| missing("op"))?;
                let load_op: LoadOp = op_name.parse().map_err(|value| ParseError::UnknownLoadOp {
                    pass: self.name.clone(),
                    resource: output.name.clone(),
                    value,
                })?;

                let resolution = output.resolution.as_ref().ok_or_else(|| missing("resolution"))?;
                let (width, height) = match resolution.as_slice() {
                    &[width, height] if width > 0 && height > 0 => (width, height),
                    _ => {
                        return Err(ParseError::InvalidResolution {
                            pass: self.name.clone(),
                            resource: output.name.clone(),
                            value: resolution.clone(),
                        });
                    }
                };

                Ok(OutputCreation {
                    name: output.name.clone(),
                    ty,
                    info: Some(ResourceInfo::Texture(TextureInfo::new_2d(
                        width, height, format, load_op,
                    ))),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pass(json: &str) -> PassDescription {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_defaults() {
        let desc = pass(r#"{ "name": "empty" }"#);
        assert!(desc.enabled);
        assert!(desc.inputs.is_empty());
        let creation = desc.to_node_creation().unwrap();
        assert_eq!(creation, NodeCreation::new("empty"));
    }

    #[test]
    fn test_attachment_output() {
        let desc = pass(
            r#"{ "name": "gbuffer", "enabled": false,
                 "outputs": [ { "name": "depth", "type": "attachment", "format": "D24UNormS8UInt",
                                "op": "LoadOpClear", "resolution": [640, 480] } ] }"#,
        );
        let creation = desc.to_node_creation().unwrap();
        assert!(!creation.enabled);
        assert_eq!(
            creation.outputs[0],
            OutputCreation::attachment(
                "depth",
                640,
                480,
                TextureFormat::Depth24UnormStencil8,
                LoadOp::Clear
            )
        );
    }

    #[test]
    fn test_unknown_values() {
        let bad_type = pass(r#"{ "name": "p", "inputs": [ { "name": "x", "type": "image" } ] }"#);
        assert!(matches!(
            bad_type.to_node_creation(),
            Err(ParseError::UnknownResourceType { value, .. }) if value == "image"
        ));

        let bad_format = pass(
            r#"{ "name": "p", "outputs": [ { "name": "x", "type": "texture", "format": "RGB8",
                 "op": "LoadOpLoad", "resolution": [1, 1] } ] }"#,
        );
        assert!(matches!(
            bad_format.to_node_creation(),
            Err(ParseError::UnknownFormat { value, .. }) if value == "RGB8"
        ));

        let bad_op = pass(
            r#"{ "name": "p", "outputs": [ { "name": "x", "type": "texture", "format": "R8UNorm",
                 "op": "LoadOpDontCare", "resolution": [1, 1] } ] }"#,
        );
        assert!(matches!(
            bad_op.to_node_creation(),
            Err(ParseError::UnknownLoadOp { value, .. }) if value == "LoadOpDontCare"
        ));
    }

    #[test]
    fn test_missing_fields() {
        let unnamed = pass(r#"{ "name": "p", "outputs": [ { "type": "reference" } ] }"#);
        assert!(matches!(
            unnamed.to_node_creation(),
            Err(ParseError::MissingName { what: "output", .. })
        ));

        let no_format = pass(
            r#"{ "name": "p", "outputs": [ { "name": "x", "type": "attachment",
                 "op": "LoadOpClear", "resolution": [1, 1] } ] }"#,
        );
        assert!(matches!(
            no_format.to_node_creation(),
            Err(ParseError::MissingField { field: "format", .. })
        ));

        let flat = pass(
            r#"{ "name": "p", "outputs": [ { "name": "x", "type": "attachment",
                 "format": "R8UNorm", "op": "LoadOpClear", "resolution": [1, 1, 1] } ] }"#,
        );
        assert!(matches!(
            flat.to_node_creation(),
            Err(ParseError::InvalidResolution { .. })
        ));
    }

    #[test]
    fn test_buffer_output_unsupported() {
        let desc = pass(r#"{ "name": "p", "outputs": [ { "name": "b", "type": "buffer" } ] }"#);
        assert!(matches!(
            desc.to_node_creation(),
            Err(ParseError::UnsupportedBufferOutput { .. })
        ));
    }

    #[test]
    fn test_json_round_trip_keeps_shape() {
        let text = r#"{ "name": "g", "passes": [ { "name": "p",
            "inputs": [ { "name": "sky", "type": "texture", "external": true } ] } ] }"#;
        let desc = FrameGraphDescription::from_json(text).unwrap();
        let again = FrameGraphDescription::from_json(&desc.to_json().unwrap()).unwrap();
        assert_eq!(desc, again);
        assert!(again.passes[0].inputs[0].external);
    }
}
