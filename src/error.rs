use std::fmt;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// The step of a generation request an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Writing the prompt and seed into the workflow template.
    Template,
    /// `POST /prompt`.
    Submission,
    /// Waiting on the event channel for the completion frame.
    Wait,
    /// Reading history and downloading images.
    Fetch,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Template => "Preparing workflow",
            Stage::Submission => "Submitting prompt",
            Stage::Wait => "Waiting for completion",
            Stage::Fetch => "Fetching images",
        };
        f.write_str(label)
    }
}

/// Errors returned by ComfyUI Studio operations.
#[derive(Error, Debug)]
pub enum ComfyError {
    /// A required setting is missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The workflow template does not have the expected shape.
    #[error("Workflow template error: {0}")]
    Template(String),

    /// Filesystem failure with context.
    #[error("{context}: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },

    /// ComfyUI returned a non-success HTTP status.
    #[error("ComfyUI returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The response from ComfyUI was missing expected fields.
    #[error("{0}")]
    InvalidResponse(String),

    /// The queued workflow had node-level errors.
    #[error("Workflow node errors: {0}")]
    NodeErrors(String),

    /// Network-level request failure with context.
    #[error("{context}: {source}")]
    Network {
        context: String,
        source: reqwest::Error,
    },

    /// WebSocket transport failure with context.
    #[error("{context}: {source}")]
    WebSocket {
        context: String,
        source: Box<tungstenite::Error>,
    },

    /// The event channel ended before the completion frame arrived.
    #[error("Event channel closed before prompt {prompt_id} completed")]
    ChannelClosed { prompt_id: String },

    /// The configured wait bound elapsed.
    #[error("Timed out waiting for prompt {prompt_id}")]
    Timeout { prompt_id: String },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A downloaded artifact could not be decoded as an image.
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    /// Any of the above, tagged with the generation step that failed.
    #[error("{stage} failed: {source}")]
    Stage {
        stage: Stage,
        source: Box<ComfyError>,
    },
}

impl ComfyError {
    /// Tag this error with the generation step it happened in.
    pub fn during(self, stage: Stage) -> Self {
        ComfyError::Stage {
            stage,
            source: Box::new(self),
        }
    }

    /// The generation step this error was tagged with, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ComfyError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ComfyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_message_is_one_line() {
        let err = ComfyError::InvalidResponse("Response missing prompt_id".into())
            .during(Stage::Submission);
        assert_eq!(
            err.to_string(),
            "Submitting prompt failed: Response missing prompt_id"
        );
        assert_eq!(err.stage(), Some(Stage::Submission));
    }

    #[test]
    fn test_untagged_error_has_no_stage() {
        let err = ComfyError::Config("COMFY_WORKFLOW_PATH is not set".into());
        assert!(err.stage().is_none());
        assert_eq!(
            err.to_string(),
            "Configuration error: COMFY_WORKFLOW_PATH is not set"
        );
    }

    #[test]
    fn test_http_error_display() {
        let err = ComfyError::Http {
            status: 500,
            body: "boom".into(),
        };
        assert_eq!(err.to_string(), "ComfyUI returned HTTP 500: boom");
    }
}
