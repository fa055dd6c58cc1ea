use std::path::Path;

use rand::Rng;
use serde_json::{Map, Value};

use crate::error::{ComfyError, Result};

/// Input written with the user's prompt on every prompt node.
pub const TEXT_INPUT: &str = "text";
/// Input written with a fresh seed on the seed node.
pub const SEED_INPUT: &str = "noise_seed";

/// Smallest seed [`random_seed`] returns.
pub const MIN_SEED: u64 = 1;
/// Largest seed [`random_seed`] returns (10^14).
pub const MAX_SEED: u64 = 100_000_000_000_000;

/// A uniformly random seed in `[MIN_SEED, MAX_SEED]`.
pub fn random_seed() -> u64 {
    rand::rng().random_range(MIN_SEED..=MAX_SEED)
}

/// Which nodes of a workflow receive the prompt and the seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeBindings {
    /// Nodes whose `text` input gets the prompt (base and refiner encoders).
    pub prompt_nodes: Vec<String>,
    /// Node whose `noise_seed` input gets a fresh seed.
    pub seed_node: String,
}

impl Default for NodeBindings {
    fn default() -> Self {
        Self {
            prompt_nodes: vec!["6".to_string(), "15".to_string()],
            seed_node: "10".to_string(),
        }
    }
}

impl NodeBindings {
    pub fn new(prompt_nodes: Vec<String>, seed_node: impl Into<String>) -> Self {
        Self {
            prompt_nodes,
            seed_node: seed_node.into(),
        }
    }
}

/// A ComfyUI workflow in API format, loaded once and reused per request.
///
/// The graph is kept as loaded; [`apply`](Self::apply) works on a copy, so
/// every request starts from the same document.
///
/// # Example
/// ```
/// use comfyui_studio::{NodeBindings, WorkflowTemplate};
/// use serde_json::json;
///
/// let template = WorkflowTemplate::from_value(
///     json!({
///         "6":  {"inputs": {"text": ""}},
///         "15": {"inputs": {"text": ""}},
///         "10": {"inputs": {"noise_seed": 0}}
///     }),
///     NodeBindings::default(),
/// )
/// .unwrap();
///
/// let workflow = template.apply_with_seed("a cat", 42).unwrap();
/// assert_eq!(workflow["6"]["inputs"]["text"], "a cat");
/// assert_eq!(workflow["10"]["inputs"]["noise_seed"], 42);
/// ```
#[derive(Debug, Clone)]
pub struct WorkflowTemplate {
    graph: Map<String, Value>,
    bindings: NodeBindings,
}

impl WorkflowTemplate {
    /// Read a workflow JSON file from disk.
    pub fn load(path: impl AsRef<Path>, bindings: NodeBindings) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ComfyError::Io {
            context: format!("Cannot read workflow template {}", path.display()),
            source: e,
        })?;
        let value: Value = serde_json::from_str(&raw)?;
        let template = Self::from_value(value, bindings)?;
        tracing::debug!(
            path = %path.display(),
            nodes = template.graph.len(),
            "Loaded workflow template"
        );
        Ok(template)
    }

    /// Wrap an already-parsed workflow. The document must be a JSON object.
    pub fn from_value(value: Value, bindings: NodeBindings) -> Result<Self> {
        match value {
            Value::Object(graph) => Ok(Self { graph, bindings }),
            other => Err(ComfyError::Template(format!(
                "Workflow must be a JSON object of nodes, found {}",
                json_kind(&other)
            ))),
        }
    }

    /// The graph as loaded, untouched by any request.
    pub fn graph(&self) -> &Map<String, Value> {
        &self.graph
    }

    /// Workflow for one request: `prompt` on every prompt node, random seed.
    pub fn apply(&self, prompt: &str) -> Result<Value> {
        self.apply_with_seed(prompt, random_seed())
    }

    /// Same as [`apply`](Self::apply) with a caller-chosen seed.
    pub fn apply_with_seed(&self, prompt: &str, seed: u64) -> Result<Value> {
        let mut graph = self.graph.clone();
        for node_id in &self.bindings.prompt_nodes {
            set_input(&mut graph, node_id, TEXT_INPUT, Value::from(prompt))?;
        }
        set_input(&mut graph, &self.bindings.seed_node, SEED_INPUT, Value::from(seed))?;
        Ok(Value::Object(graph))
    }
}

fn set_input(graph: &mut Map<String, Value>, node_id: &str, input: &str, value: Value) -> Result<()> {
    let node = graph.get_mut(node_id).ok_or_else(|| {
        ComfyError::Template(format!("Workflow has no node \"{}\"", node_id))
    })?;
    let inputs = node
        .get_mut("inputs")
        .and_then(|i| i.as_object_mut())
        .ok_or_else(|| {
            ComfyError::Template(format!("Node \"{}\" has no inputs object", node_id))
        })?;
    inputs.insert(input.to_string(), value);
    Ok(())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sdxl_template() -> WorkflowTemplate {
        WorkflowTemplate::from_value(
            json!({
                "4": {
                    "class_type": "CheckpointLoaderSimple",
                    "inputs": {"ckpt_name": "sd_xl_base_1.0.safetensors"}
                },
                "6": {
                    "class_type": "CLIPTextEncode",
                    "inputs": {"text": "placeholder", "clip": ["4", 1]}
                },
                "10": {
                    "class_type": "KSamplerAdvanced",
                    "inputs": {"noise_seed": 0, "steps": 25, "cfg": 8.0}
                },
                "15": {
                    "class_type": "CLIPTextEncode",
                    "inputs": {"text": "placeholder", "clip": ["12", 1]}
                }
            }),
            NodeBindings::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_apply_sets_both_prompt_nodes() {
        let workflow = sdxl_template().apply("a cat").unwrap();
        assert_eq!(workflow["6"]["inputs"]["text"], "a cat");
        assert_eq!(workflow["15"]["inputs"]["text"], "a cat");
    }

    #[test]
    fn test_apply_leaves_other_fields_unchanged() {
        let template = sdxl_template();
        let workflow = template.apply_with_seed("a cat", 7).unwrap();

        assert_eq!(workflow["4"], template.graph()["4"]);
        assert_eq!(workflow["6"]["class_type"], "CLIPTextEncode");
        assert_eq!(workflow["6"]["inputs"]["clip"], json!(["4", 1]));
        assert_eq!(workflow["10"]["inputs"]["steps"], 25);
        assert_eq!(workflow["10"]["inputs"]["cfg"], 8.0);

        // Restoring the three written fields gives back the loaded text.
        let mut restored = workflow.clone();
        restored["6"]["inputs"]["text"] = json!("placeholder");
        restored["15"]["inputs"]["text"] = json!("placeholder");
        restored["10"]["inputs"]["noise_seed"] = json!(0);
        assert_eq!(
            serde_json::to_string(&restored).unwrap(),
            serde_json::to_string(template.graph()).unwrap()
        );
    }

    #[test]
    fn test_apply_does_not_touch_template() {
        let template = sdxl_template();
        template.apply("first").unwrap();
        assert_eq!(template.graph()["6"]["inputs"]["text"], "placeholder");
        assert_eq!(template.graph()["10"]["inputs"]["noise_seed"], 0);
    }

    #[test]
    fn test_seed_in_range() {
        let template = sdxl_template();
        for _ in 0..200 {
            let workflow = template.apply("x").unwrap();
            let seed = workflow["10"]["inputs"]["noise_seed"].as_u64().unwrap();
            assert!((MIN_SEED..=MAX_SEED).contains(&seed), "seed {} out of range", seed);
        }
    }

    #[test]
    fn test_successive_seeds_differ() {
        let template = sdxl_template();
        let a = template.apply("x").unwrap()["10"]["inputs"]["noise_seed"].clone();
        let b = template.apply("x").unwrap()["10"]["inputs"]["noise_seed"].clone();
        assert_ne!(a, b);
    }

    #[test]
    fn test_minimal_scenario() {
        let template = WorkflowTemplate::from_value(
            json!({
                "6": {"inputs": {"text": ""}},
                "15": {"inputs": {"text": ""}},
                "10": {"inputs": {"noise_seed": 0}}
            }),
            NodeBindings::default(),
        )
        .unwrap();

        let workflow = template.apply("a cat").unwrap();
        assert_eq!(workflow["6"]["inputs"]["text"], "a cat");
        assert_eq!(workflow["15"]["inputs"]["text"], "a cat");
        assert_ne!(workflow["10"]["inputs"]["noise_seed"], 0);
    }

    #[test]
    fn test_missing_prompt_node_fails() {
        let template = WorkflowTemplate::from_value(
            json!({
                "6": {"inputs": {"text": ""}},
                "10": {"inputs": {"noise_seed": 0}}
            }),
            NodeBindings::default(),
        )
        .unwrap();

        let err = template.apply("a cat").unwrap_err();
        assert!(matches!(err, ComfyError::Template(_)));
        assert!(err.to_string().contains("\"15\""));
    }

    #[test]
    fn test_missing_seed_node_fails() {
        let template = WorkflowTemplate::from_value(
            json!({
                "6": {"inputs": {"text": ""}},
                "15": {"inputs": {"text": ""}}
            }),
            NodeBindings::default(),
        )
        .unwrap();
        assert!(template.apply("a cat").is_err());
    }

    #[test]
    fn test_node_without_inputs_fails() {
        let template = WorkflowTemplate::from_value(
            json!({
                "6": {"class_type": "CLIPTextEncode"},
                "15": {"inputs": {"text": ""}},
                "10": {"inputs": {"noise_seed": 0}}
            }),
            NodeBindings::default(),
        )
        .unwrap();
        let err = template.apply("a cat").unwrap_err();
        assert!(err.to_string().contains("no inputs object"));
    }

    #[test]
    fn test_absent_input_key_is_inserted() {
        let template = WorkflowTemplate::from_value(
            json!({
                "6": {"inputs": {}},
                "15": {"inputs": {}},
                "10": {"inputs": {}}
            }),
            NodeBindings::default(),
        )
        .unwrap();
        let workflow = template.apply_with_seed("hi", 3).unwrap();
        assert_eq!(workflow["6"]["inputs"]["text"], "hi");
        assert_eq!(workflow["10"]["inputs"]["noise_seed"], 3);
    }

    #[test]
    fn test_custom_bindings() {
        let template = WorkflowTemplate::from_value(
            json!({
                "3": {"inputs": {"seed": 1, "noise_seed": 0}},
                "7": {"inputs": {"text": ""}}
            }),
            NodeBindings::new(vec!["7".into()], "3"),
        )
        .unwrap();
        let workflow = template.apply_with_seed("dog", 99).unwrap();
        assert_eq!(workflow["7"]["inputs"]["text"], "dog");
        assert_eq!(workflow["3"]["inputs"]["noise_seed"], 99);
        assert_eq!(workflow["3"]["inputs"]["seed"], 1);
    }

    #[test]
    fn test_non_object_rejected() {
        let err = WorkflowTemplate::from_value(json!([1, 2]), NodeBindings::default()).unwrap_err();
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn test_default_bindings() {
        let bindings = NodeBindings::default();
        assert_eq!(bindings.prompt_nodes, ["6", "15"]);
        assert_eq!(bindings.seed_node, "10");
    }
}
