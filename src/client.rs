use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::{ComfyError, Result, Stage};
use crate::events;
use crate::types::{ClientId, ImageRef, OutputManifest};
use crate::workflow::WorkflowTemplate;

/// Open event channel to ComfyUI.
pub type EventStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Accepts `host:port` as well as full URLs; drops trailing slashes.
fn normalize(address: String) -> String {
    let address = address.trim().trim_end_matches('/');
    if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}

fn ws_endpoint_for(endpoint: &str) -> String {
    if let Some(rest) = endpoint.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = endpoint.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        endpoint.to_string()
    }
}

/// Async client for a ComfyUI server instance.
///
/// Submits prompts over REST, waits for them on the WebSocket event channel,
/// and downloads the resulting images. Every request and the event channel
/// carry the same [`ClientId`].
///
/// # Example
/// ```no_run
/// use comfyui_studio::{ClientId, ComfyClient, NodeBindings, WorkflowTemplate};
///
/// # async fn example() -> comfyui_studio::Result<()> {
/// let client = ComfyClient::new("127.0.0.1:8188", ClientId::generate());
/// let template = WorkflowTemplate::load("workflow_api.json", NodeBindings::default())?;
/// let images = client.generate(&template, "a lighthouse at dusk").await?;
/// println!("{} image(s)", images.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ComfyClient {
    http: Client,
    endpoint: String,
    ws_endpoint: String,
    client_id: ClientId,
    wait_timeout: Option<Duration>,
}

impl ComfyClient {
    /// Create a client for the ComfyUI instance at `address` (`host:port`
    /// or a full `http(s)://` URL).
    pub fn new(address: impl Into<String>, client_id: ClientId) -> Self {
        let endpoint = normalize(address.into());
        let ws_endpoint = ws_endpoint_for(&endpoint);
        Self {
            http: Client::new(),
            endpoint,
            ws_endpoint,
            client_id,
            wait_timeout: None,
        }
    }

    /// Connect the event channel somewhere other than the derived `ws://` URL.
    pub fn with_ws_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.ws_endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    /// Bound the completion wait. `None` (the default) waits indefinitely.
    pub fn with_wait_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Returns the configured endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the configured client ID.
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// URL of the event channel for this client.
    pub fn ws_url(&self) -> String {
        format!("{}/ws?clientId={}", self.ws_endpoint, self.client_id)
    }

    fn unreachable(&self, source: reqwest::Error) -> ComfyError {
        ComfyError::Network {
            context: format!(
                "Cannot connect to ComfyUI at {}, is the service running?",
                self.endpoint
            ),
            source,
        }
    }

    // ── Health ──────────────────────────────────────────────────────

    /// Check whether ComfyUI is reachable via `/system_stats`.
    pub async fn health(&self) -> Result<bool> {
        let url = format!("{}/system_stats", self.endpoint);
        let resp = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;
        Ok(resp.status().is_success())
    }

    // ── Prompt ──────────────────────────────────────────────────────

    /// Queue a workflow for execution. Returns the `prompt_id`.
    pub async fn submit(&self, workflow: &Value) -> Result<String> {
        let url = format!("{}/prompt", self.endpoint);
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": self.client_id,
        });

        let resp = self
            .http
            .post(&url)
            .timeout(Duration::from_secs(30))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body_text = resp.text().await.unwrap_or_default();
            return Err(ComfyError::Http {
                status,
                body: body_text,
            });
        }

        let json: Value = resp.json().await.map_err(|e| ComfyError::Network {
            context: "Failed to parse ComfyUI /prompt response".into(),
            source: e,
        })?;

        if let Some(errors) = json.get("node_errors").and_then(|e| e.as_object()) {
            if !errors.is_empty() {
                return Err(ComfyError::NodeErrors(
                    serde_json::to_string(errors).unwrap_or_default(),
                ));
            }
        }

        let prompt_id = json
            .get("prompt_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| ComfyError::InvalidResponse("Response missing prompt_id".into()))?;

        tracing::info!(prompt_id = %prompt_id, "Queued prompt");
        Ok(prompt_id)
    }

    // ── Event channel ───────────────────────────────────────────────

    /// Open the WebSocket event channel for this client.
    pub async fn connect_events(&self) -> Result<EventStream> {
        let url = self.ws_url();
        let (stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| ComfyError::WebSocket {
                context: format!("Cannot open ComfyUI event channel at {}", url),
                source: Box::new(e),
            })?;
        tracing::debug!(url = %url, "Event channel connected");
        Ok(stream)
    }

    /// Wait on `channel` until `prompt_id` finishes, honouring the configured
    /// wait bound. Returns the number of frames received.
    pub async fn await_completion(&self, channel: &mut EventStream, prompt_id: &str) -> Result<usize> {
        match self.wait_timeout {
            Some(limit) => tokio::time::timeout(limit, events::await_completion(channel, prompt_id))
                .await
                .map_err(|_| ComfyError::Timeout {
                    prompt_id: prompt_id.to_string(),
                })?,
            None => events::await_completion(channel, prompt_id).await,
        }
    }

    // ── History ─────────────────────────────────────────────────────

    /// Fetch the output manifest of a finished prompt.
    pub async fn history(&self, prompt_id: &str) -> Result<OutputManifest> {
        let url = format!("{}/history/{}", self.endpoint, prompt_id);
        let resp = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| ComfyError::Network {
                context: "Failed to fetch ComfyUI history".into(),
                source: e,
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ComfyError::Http { status, body });
        }

        let json: Value = resp.json().await.map_err(|e| ComfyError::Network {
            context: "Failed to parse ComfyUI history response".into(),
            source: e,
        })?;

        OutputManifest::from_history(prompt_id, &json)
    }

    // ── Image download ──────────────────────────────────────────────

    /// Download an output image by its reference. Returns raw bytes.
    pub async fn image(&self, img: &ImageRef) -> Result<Vec<u8>> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/view", self.endpoint),
            &[
                ("filename", img.filename.as_str()),
                ("subfolder", img.subfolder.as_str()),
                ("type", img.img_type.as_str()),
            ],
        )
        .map_err(|e| ComfyError::InvalidResponse(format!("Bad image URL: {}", e)))?;

        let resp = self
            .http
            .get(url)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| ComfyError::Network {
                context: format!("Failed to fetch image {} from ComfyUI", img.filename),
                source: e,
            })?;

        if !resp.status().is_success() {
            return Err(ComfyError::Http {
                status: resp.status().as_u16(),
                body: format!("Failed to fetch image {}", img.filename),
            });
        }

        let bytes = resp.bytes().await.map_err(|e| ComfyError::Network {
            context: "Failed to read image bytes".into(),
            source: e,
        })?;
        Ok(bytes.to_vec())
    }

    /// Download every image a finished prompt produced, in manifest order.
    pub async fn fetch_outputs(&self, prompt_id: &str) -> Result<Vec<Vec<u8>>> {
        let manifest = self.history(prompt_id).await?;
        let mut images = Vec::new();
        for img in manifest.images() {
            images.push(self.image(img).await?);
        }
        tracing::info!(prompt_id, images = images.len(), "Fetched outputs");
        Ok(images)
    }

    // ── Full generation ─────────────────────────────────────────────

    /// Run one prompt end to end and return the raw image bytes.
    ///
    /// The event channel is opened before the prompt is queued and closed
    /// before this returns, whether or not the run succeeded. Errors are
    /// tagged with the [`Stage`] that failed.
    pub async fn generate(&self, template: &WorkflowTemplate, prompt: &str) -> Result<Vec<Vec<u8>>> {
        let workflow = template.apply(prompt).map_err(|e| e.during(Stage::Template))?;
        let mut channel = self
            .connect_events()
            .await
            .map_err(|e| e.during(Stage::Wait))?;

        let result = self.run(&mut channel, &workflow).await;

        if let Err(e) = channel.close(None).await {
            tracing::debug!(error = %e, "Closing event channel failed");
        }
        result
    }

    async fn run(&self, channel: &mut EventStream, workflow: &Value) -> Result<Vec<Vec<u8>>> {
        let prompt_id = self
            .submit(workflow)
            .await
            .map_err(|e| e.during(Stage::Submission))?;
        self.await_completion(channel, &prompt_id)
            .await
            .map_err(|e| e.during(Stage::Wait))?;
        self.fetch_outputs(&prompt_id)
            .await
            .map_err(|e| e.during(Stage::Fetch))
    }
}
