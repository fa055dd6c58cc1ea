//! # comfyui-studio
//!
//! Prompt-to-image desktop client for
//! [ComfyUI](https://github.com/comfyanonymous/ComfyUI).
//!
//! Loads an API-format workflow once, writes the user's prompt and a fresh
//! seed into it per request, queues it over REST, waits for ComfyUI's
//! completion event on the WebSocket channel, then downloads the output
//! images. The `gui` feature (on by default) adds the eframe window and the
//! `comfyui-studio` binary.
//!
//! ## Quick Start
//!
//! ```no_run
//! use comfyui_studio::{ClientId, ComfyClient, StudioConfig, WorkflowTemplate};
//!
//! # async fn example() -> comfyui_studio::Result<()> {
//! let config = StudioConfig::from_env()?;
//! let template = WorkflowTemplate::load(&config.workflow_path, config.bindings.clone())?;
//! let client = ComfyClient::new(&config.server_address, ClientId::generate())
//!     .with_wait_timeout(config.wait_timeout);
//!
//! let images = client.generate(&template, "a sunset over mountains").await?;
//! for (i, bytes) in images.iter().enumerate() {
//!     println!("image {}: {} bytes", i, bytes.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod events;
#[cfg(feature = "gui")]
pub mod gui;
pub mod studio;
pub mod types;
pub mod workflow;

pub use client::{ComfyClient, EventStream};
pub use config::StudioConfig;
pub use error::{ComfyError, Result, Stage};
pub use studio::{ComfyGenerator, DecodedImage, ImageGenerator, Status, Studio};
pub use types::{ClientId, ImageRef, NodeOutput, OutputManifest};
pub use workflow::{NodeBindings, WorkflowTemplate};
