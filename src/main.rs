use anyhow::anyhow;
use comfyui_studio::gui::{StudioApp, TITLE};
use comfyui_studio::{ClientId, ComfyClient, ComfyGenerator, StudioConfig, WorkflowTemplate};
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

fn bootstrap(runtime: &Runtime) -> comfyui_studio::Result<(ComfyGenerator, String)> {
    let config = StudioConfig::from_env()?;
    let template = WorkflowTemplate::load(&config.workflow_path, config.bindings.clone())?;

    let client_id = ClientId::generate();
    tracing::info!(client_id = %client_id, server = %config.server_address, "Starting");
    let client = ComfyClient::new(&config.server_address, client_id)
        .with_wait_timeout(config.wait_timeout);

    match runtime.block_on(client.health()) {
        Ok(true) => tracing::info!(endpoint = client.endpoint(), "ComfyUI is online"),
        Ok(false) => tracing::warn!(endpoint = client.endpoint(), "ComfyUI answered with an error status"),
        Err(e) => tracing::warn!(error = %e, "ComfyUI is not reachable yet"),
    }

    Ok((ComfyGenerator::new(client, template), config.default_prompt))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let runtime = Runtime::new()?;
    let app = match bootstrap(&runtime) {
        Ok((generator, default_prompt)) => StudioApp::ready(runtime, generator, default_prompt),
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            StudioApp::halted(e.to_string())
        }
    };

    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default()
            .with_inner_size([900.0, 1000.0])
            .with_min_inner_size([480.0, 400.0])
            .with_title(TITLE),
        ..Default::default()
    };

    eframe::run_native(TITLE, options, Box::new(move |_cc| Ok(Box::new(app))))
        .map_err(|e| anyhow!("{}", e))
}
