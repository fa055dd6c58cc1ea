//! Generate images from the command line, without the window.
//!
//! Reads the same `COMFY_*` settings as the desktop app (a `.env` file in the
//! working directory works too) and prints what came back.
//!
//! ```sh
//! cargo run --example headless_generate -- "a lighthouse at dusk, oil painting"
//! ```

use comfyui_studio::{ClientId, ComfyClient, DecodedImage, StudioConfig, WorkflowTemplate};

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let config = StudioConfig::from_env()?;
    let prompt = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config.default_prompt.clone());

    let template = WorkflowTemplate::load(&config.workflow_path, config.bindings.clone())?;
    let client = ComfyClient::new(&config.server_address, ClientId::generate())
        .with_wait_timeout(config.wait_timeout);

    if !client.health().await? {
        eprintln!("ComfyUI is not responding at {}", client.endpoint());
        return Ok(());
    }

    println!("Prompt: {}", prompt);
    let images = client.generate(&template, &prompt).await?;
    println!("Generated {} image(s)", images.len());

    for (i, bytes) in images.iter().enumerate() {
        let decoded = DecodedImage::decode(bytes)?;
        println!(
            "  #{}: {}x{} ({} bytes encoded)",
            i + 1,
            decoded.width,
            decoded.height,
            bytes.len()
        );
    }

    Ok(())
}
