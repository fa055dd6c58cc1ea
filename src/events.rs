//! ComfyUI's WebSocket event channel.
//!
//! ComfyUI pushes JSON text frames (`{"type": ..., "data": {...}}`) to every
//! socket opened with `/ws?clientId=...`, plus binary frames carrying preview
//! images. Only one frame matters here: `executing` with `node: null` for our
//! prompt, which ComfyUI sends once the whole graph has run.

use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::error::{ComfyError, Result};

/// A decoded text frame from the event channel.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl ServerMessage {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// The `data.prompt_id` field, when present.
    pub fn prompt_id(&self) -> Option<&str> {
        self.data.get("prompt_id").and_then(|v| v.as_str())
    }

    /// True for `executing` with an explicit `node: null` for `prompt_id`.
    pub fn is_completion_of(&self, prompt_id: &str) -> bool {
        self.kind == "executing"
            && self.data.get("node").is_some_and(Value::is_null)
            && self.prompt_id() == Some(prompt_id)
    }
}

/// Receive frames until ComfyUI reports `prompt_id` finished.
///
/// Returns how many frames were received, the completion frame included.
/// There is no timeout here; the stream ending or failing first is an error.
pub async fn await_completion<S>(events: &mut S, prompt_id: &str) -> Result<usize>
where
    S: Stream<Item = std::result::Result<Message, tungstenite::Error>> + Unpin,
{
    let mut received = 0usize;

    while let Some(frame) = events.next().await {
        received += 1;
        let frame = frame.map_err(|e| ComfyError::WebSocket {
            context: format!("Event channel failed while waiting for prompt {}", prompt_id),
            source: Box::new(e),
        })?;

        let text = match frame {
            Message::Text(text) => text,
            // Previews, pings and close frames.
            _ => continue,
        };

        let message = ServerMessage::parse(&text)?;
        if message.is_completion_of(prompt_id) {
            tracing::debug!(prompt_id, frames = received, "Prompt finished executing");
            return Ok(received);
        }

        match message.kind.as_str() {
            "executing" if message.prompt_id() == Some(prompt_id) => {
                tracing::debug!(prompt_id, node = %message.data["node"], "Executing node");
            }
            "execution_error" if message.prompt_id() == Some(prompt_id) => {
                let err = message
                    .data
                    .get("exception_message")
                    .and_then(|v| v.as_str())
                    .unwrap_or("Unknown error");
                tracing::warn!(prompt_id, error = err, "ComfyUI reported an execution error");
            }
            _ => {}
        }
    }

    Err(ComfyError::ChannelClosed {
        prompt_id: prompt_id.to_string(),
    })
}
