//! The eframe window.

use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;

use eframe::egui;
use tokio::runtime::Runtime;

use crate::error::{ComfyError, Result};
use crate::studio::{ImageGenerator, Status, Studio};

pub const TITLE: &str = "ComfyUI Studio";

/// Everything needed once configuration and the template loaded fine.
pub struct Session<G> {
    runtime: Runtime,
    generator: Arc<G>,
    studio: Studio,
    pending: Option<Receiver<Result<Vec<Vec<u8>>>>>,
    textures: Vec<egui::TextureHandle>,
}

/// Top-level eframe app.
pub enum StudioApp<G> {
    Ready(Box<Session<G>>),
    /// Startup failed; only the message is shown.
    Halted(String),
}

impl<G: ImageGenerator + 'static> StudioApp<G> {
    pub fn ready(runtime: Runtime, generator: G, default_prompt: impl Into<String>) -> Self {
        StudioApp::Ready(Box::new(Session {
            runtime,
            generator: Arc::new(generator),
            studio: Studio::new(default_prompt),
            pending: None,
            textures: Vec::new(),
        }))
    }

    pub fn halted(message: impl Into<String>) -> Self {
        StudioApp::Halted(message.into())
    }
}

impl<G: ImageGenerator + 'static> eframe::App for StudioApp<G> {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading(TITLE);
            ui.add_space(8.0);
            match self {
                StudioApp::Ready(session) => session.show(ctx, ui),
                StudioApp::Halted(message) => {
                    ui.colored_label(egui::Color32::LIGHT_RED, format!("Error: {}", message));
                }
            }
        });
    }
}

impl<G: ImageGenerator + 'static> Session<G> {
    fn show(&mut self, ctx: &egui::Context, ui: &mut egui::Ui) {
        self.poll(ctx);

        ui.label("Prompt");
        ui.add(
            egui::TextEdit::multiline(self.studio.prompt_mut())
                .desired_rows(4)
                .desired_width(f32::INFINITY),
        );

        let idle = self.pending.is_none();
        if ui
            .add_enabled(idle, egui::Button::new("Generate"))
            .clicked()
        {
            self.trigger(ctx);
        }

        ui.add_space(4.0);
        match self.studio.status() {
            Status::Idle => {}
            Status::Warning(msg) => {
                ui.colored_label(egui::Color32::YELLOW, msg.as_str());
            }
            Status::Failed(_) => {
                ui.colored_label(egui::Color32::LIGHT_RED, self.studio.status().message());
            }
            Status::Generating => {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label(self.studio.status().message());
                });
            }
            status @ Status::Complete { .. } => {
                ui.label(status.message());
            }
        }

        ui.separator();
        egui::ScrollArea::vertical().show(ui, |ui| {
            for texture in &self.textures {
                let width = ui.available_width();
                ui.add(
                    egui::Image::from_texture(egui::load::SizedTexture::from_handle(texture))
                        .max_width(width)
                        .maintain_aspect_ratio(true),
                );
                ui.label("Generated image");
                ui.add_space(8.0);
            }
        });
    }

    fn trigger(&mut self, ctx: &egui::Context) {
        self.textures.clear();
        let Some(prompt) = self.studio.begin() else {
            return;
        };

        let (tx, rx) = mpsc::channel();
        let generator = Arc::clone(&self.generator);
        let ctx = ctx.clone();
        self.runtime.spawn(async move {
            let outcome = generator.generate(&prompt).await;
            // The window may already be gone.
            let _ = tx.send(outcome);
            ctx.request_repaint();
        });
        self.pending = Some(rx);
    }

    fn poll(&mut self, ctx: &egui::Context) {
        let received = match &self.pending {
            Some(rx) => rx.try_recv(),
            None => return,
        };

        let outcome = match received {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return,
            Err(TryRecvError::Disconnected) => Err(ComfyError::InvalidResponse(
                "Generation task ended without a result".into(),
            )),
        };
        self.pending = None;
        self.studio.finish(outcome);
        self.upload(ctx);
    }

    fn upload(&mut self, ctx: &egui::Context) {
        self.textures = self
            .studio
            .images()
            .iter()
            .enumerate()
            .map(|(i, img)| {
                let color = egui::ColorImage::from_rgba_unmultiplied(
                    [img.width as usize, img.height as usize],
                    &img.rgba,
                );
                ctx.load_texture(format!("generated-{}", i), color, egui::TextureOptions::LINEAR)
            })
            .collect();
    }
}
