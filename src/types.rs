use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ComfyError, Result};

/// Identifies this process to ComfyUI.
///
/// The same value tags the WebSocket connection and every submitted prompt,
/// which is how ComfyUI routes a prompt's events to the right socket. Create
/// one at startup and hand it to [`ComfyClient::new`](crate::ComfyClient::new).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// A fresh random (UUID v4) identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ClientId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

fn default_img_type() -> String {
    "output".to_string()
}

/// Reference to an image stored in ComfyUI's output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default = "default_img_type")]
    pub img_type: String,
}

/// Images one workflow node produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeOutput {
    pub node_id: String,
    pub images: Vec<ImageRef>,
}

/// The `outputs` section of a finished prompt's history entry.
///
/// Nodes keep the order ComfyUI listed them in. Nodes that produced no
/// images (no `images` key) are left out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputManifest {
    pub nodes: Vec<NodeOutput>,
}

impl OutputManifest {
    /// Parse the body of `GET /history/{prompt_id}`.
    pub fn from_history(prompt_id: &str, history: &Value) -> Result<Self> {
        let entry = history.get(prompt_id).ok_or_else(|| {
            ComfyError::InvalidResponse(format!("History has no entry for prompt {}", prompt_id))
        })?;

        let outputs = entry
            .get("outputs")
            .and_then(|o| o.as_object())
            .ok_or_else(|| {
                ComfyError::InvalidResponse(format!(
                    "History entry for prompt {} has no outputs",
                    prompt_id
                ))
            })?;

        let mut nodes = Vec::new();
        for (node_id, node_output) in outputs {
            if let Some(images) = node_output.get("images") {
                let images: Vec<ImageRef> = serde_json::from_value(images.clone())?;
                nodes.push(NodeOutput {
                    node_id: node_id.clone(),
                    images,
                });
            }
        }

        Ok(Self { nodes })
    }

    /// Every image reference, node by node.
    pub fn images(&self) -> impl Iterator<Item = &ImageRef> {
        self.nodes.iter().flat_map(|node| node.images.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.images().next().is_none()
    }
}
