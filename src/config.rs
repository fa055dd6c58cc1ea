use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ComfyError, Result};
use crate::workflow::NodeBindings;

pub const SERVER_ADDRESS_VAR: &str = "COMFY_SERVER_ADDRESS";
pub const WORKFLOW_PATH_VAR: &str = "COMFY_WORKFLOW_PATH";
pub const PROMPT_NODES_VAR: &str = "COMFY_PROMPT_NODES";
pub const SEED_NODE_VAR: &str = "COMFY_SEED_NODE";
pub const WAIT_TIMEOUT_VAR: &str = "COMFY_WAIT_TIMEOUT_SECS";
pub const DEFAULT_PROMPT_VAR: &str = "COMFY_DEFAULT_PROMPT";

/// Text the prompt box starts with.
pub const DEFAULT_PROMPT: &str =
    "1girl, masterpiece, best quality, silver hair, looking at viewer";

/// Settings for one studio process.
///
/// Use [`StudioConfig::from_env()`] in the binary, or
/// [`StudioConfig::builder()`] when wiring things up by hand.
#[derive(Debug, Clone)]
pub struct StudioConfig {
    /// ComfyUI address, `host:port` or a full URL.
    pub server_address: String,

    /// Path to the workflow template (ComfyUI API-format JSON).
    pub workflow_path: PathBuf,

    /// Nodes that receive the prompt and the seed.
    pub bindings: NodeBindings,

    /// Upper bound on the completion wait. `None` waits indefinitely.
    pub wait_timeout: Option<Duration>,

    /// Initial contents of the prompt box.
    pub default_prompt: String,
}

impl StudioConfig {
    /// Start building a config with the builder pattern.
    pub fn builder(
        server_address: impl Into<String>,
        workflow_path: impl Into<PathBuf>,
    ) -> StudioConfigBuilder {
        StudioConfigBuilder {
            config: StudioConfig {
                server_address: server_address.into(),
                workflow_path: workflow_path.into(),
                bindings: NodeBindings::default(),
                wait_timeout: None,
                default_prompt: DEFAULT_PROMPT.to_string(),
            },
        }
    }

    /// Read settings from the process environment, after loading `.env` from
    /// the working directory if there is one.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenv::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings through `lookup`, which maps a variable name to its
    /// value. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |key: &str| {
            get(key).ok_or_else(|| ComfyError::Config(format!("{} is not set", key)))
        };

        let mut builder = Self::builder(required(SERVER_ADDRESS_VAR)?, required(WORKFLOW_PATH_VAR)?);

        let defaults = NodeBindings::default();
        let prompt_nodes = match get(PROMPT_NODES_VAR) {
            Some(raw) => parse_node_list(&raw)?,
            None => defaults.prompt_nodes,
        };
        let seed_node = get(SEED_NODE_VAR).unwrap_or(defaults.seed_node);
        builder = builder.with_bindings(NodeBindings::new(prompt_nodes, seed_node));

        if let Some(raw) = get(WAIT_TIMEOUT_VAR) {
            let secs: u64 = raw.parse().map_err(|_| {
                ComfyError::Config(format!(
                    "{} must be a whole number of seconds, got {:?}",
                    WAIT_TIMEOUT_VAR, raw
                ))
            })?;
            builder = builder.with_wait_timeout(Duration::from_secs(secs));
        }

        if let Some(prompt) = get(DEFAULT_PROMPT_VAR) {
            builder = builder.with_default_prompt(prompt);
        }

        Ok(builder.build())
    }
}

fn parse_node_list(raw: &str) -> Result<Vec<String>> {
    let nodes: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect();
    if nodes.is_empty() {
        return Err(ComfyError::Config(format!(
            "{} must list at least one node id",
            PROMPT_NODES_VAR
        )));
    }
    Ok(nodes)
}

/// Builder for [`StudioConfig`].
pub struct StudioConfigBuilder {
    config: StudioConfig,
}

impl StudioConfigBuilder {
    /// Override which nodes receive the prompt and seed.
    pub fn with_bindings(mut self, bindings: NodeBindings) -> Self {
        self.config.bindings = bindings;
        self
    }

    /// Bound the completion wait.
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.config.wait_timeout = Some(timeout);
        self
    }

    /// Set the initial prompt text.
    pub fn with_default_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.default_prompt = prompt.into();
        self
    }

    /// Build the final [`StudioConfig`].
    pub fn build(self) -> StudioConfig {
        self.config
    }
}
