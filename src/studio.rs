//! Front-end state, independent of the GUI toolkit.
//!
//! [`Studio`] holds what the window shows (prompt text, status line, decoded
//! images) and implements the rules of the Generate button. The window only
//! draws it and forwards clicks.

use std::future::Future;
use std::sync::Arc;

use crate::client::ComfyClient;
use crate::error::Result;
use crate::workflow::WorkflowTemplate;

/// Something that turns a prompt into encoded images.
///
/// [`ComfyGenerator`] is the real implementation; tests substitute their own.
pub trait ImageGenerator: Send + Sync {
    /// Run one generation. Returns the raw bytes of every produced image.
    fn generate(&self, prompt: &str) -> impl Future<Output = Result<Vec<Vec<u8>>>> + Send;
}

/// A [`ComfyClient`] bound to the workflow loaded at startup.
#[derive(Debug, Clone)]
pub struct ComfyGenerator {
    client: ComfyClient,
    template: Arc<WorkflowTemplate>,
}

impl ComfyGenerator {
    pub fn new(client: ComfyClient, template: WorkflowTemplate) -> Self {
        Self {
            client,
            template: Arc::new(template),
        }
    }
}

impl ImageGenerator for ComfyGenerator {
    async fn generate(&self, prompt: &str) -> Result<Vec<Vec<u8>>> {
        self.client.generate(&self.template, prompt).await
    }
}

/// What the status line says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Idle,
    /// The click was rejected before anything was sent.
    Warning(String),
    Generating,
    Complete { images: usize },
    Failed(String),
}

impl Status {
    pub fn message(&self) -> String {
        match self {
            Status::Idle => String::new(),
            Status::Warning(msg) => msg.clone(),
            Status::Generating => "Generating... ComfyUI is working on it".to_string(),
            Status::Complete { images: 1 } => "Generation complete (1 image)".to_string(),
            Status::Complete { images } => format!("Generation complete ({} images)", images),
            Status::Failed(err) => format!("Error: {}", err),
        }
    }
}

/// An image decoded to straight RGBA8, ready for upload to the GPU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl DecodedImage {
    /// Decode PNG, JPEG or WebP bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let rgba = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Self {
            width,
            height,
            rgba: rgba.into_raw(),
        })
    }
}

/// State behind the studio window.
#[derive(Debug, Clone)]
pub struct Studio {
    prompt: String,
    status: Status,
    images: Vec<DecodedImage>,
}

impl Studio {
    pub fn new(default_prompt: impl Into<String>) -> Self {
        Self {
            prompt: default_prompt.into(),
            status: Status::Idle,
            images: Vec::new(),
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// The prompt text box binds to this.
    pub fn prompt_mut(&mut self) -> &mut String {
        &mut self.prompt
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn images(&self) -> &[DecodedImage] {
        &self.images
    }

    pub fn is_generating(&self) -> bool {
        self.status == Status::Generating
    }

    /// Handle a click on Generate.
    ///
    /// Returns the prompt to send, or `None` (with a warning status) when the
    /// box is empty. Images from the previous run are dropped either way.
    pub fn begin(&mut self) -> Option<String> {
        self.images.clear();
        if self.prompt.is_empty() {
            self.status = Status::Warning("Please enter a prompt".to_string());
            return None;
        }
        self.status = Status::Generating;
        Some(self.prompt.clone())
    }

    /// Record the outcome of the generation started by [`begin`](Self::begin).
    pub fn finish(&mut self, outcome: Result<Vec<Vec<u8>>>) {
        let decoded = outcome.and_then(|images| {
            images
                .iter()
                .map(|bytes| DecodedImage::decode(bytes))
                .collect::<Result<Vec<_>>>()
        });

        match decoded {
            Ok(images) => {
                tracing::info!(images = images.len(), "Generation complete");
                self.status = Status::Complete {
                    images: images.len(),
                };
                self.images = images;
            }
            Err(e) => {
                tracing::error!(error = %e, "Generation failed");
                self.status = Status::Failed(e.to_string());
                self.images.clear();
            }
        }
    }

    /// Click, generate and record in one go.
    pub async fn activate<G: ImageGenerator>(&mut self, generator: &G) {
        if let Some(prompt) = self.begin() {
            let outcome = generator.generate(&prompt).await;
            self.finish(outcome);
        }
    }
}
