use std::path::PathBuf;

use anyhow::Context;
use camrec_camera_model::{CameraId, CameraList};
use camrec_capture_engine::{
    GstBackend, RecordTransition, SessionPhase, SessionRegistry, SessionSettings, StateSnapshot,
    ViewTransition,
};
use camrec_common::config::AppConfig;
use clap::Parser;
use eframe::egui::{self, Color32};

#[derive(Parser)]
#[command(name = "camrec-gui", about = "Show and record network cameras", version)]
struct Args {
    /// Camera list file
    #[arg(short, long, default_value = "video-recorder.json")]
    cameras: PathBuf,

    /// Output directory for segments (overrides the config file)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load();
    if args.verbose {
        config.logging.level = "debug".to_string();
    }
    if let Some(output) = args.output {
        config.output_dir = output;
    }
    camrec_common::logging::init_logging(&config.logging);

    let list = CameraList::load(&args.cameras)
        .with_context(|| format!("Failed to load camera list {}", args.cameras.display()))?;
    std::fs::create_dir_all(&config.output_dir)?;

    let backend = GstBackend::new()?;
    let app = ControlApp::new(SessionRegistry::new(
        list,
        std::sync::Arc::new(backend),
        SessionSettings::from_config(&config),
    ));
    tracing::info!(
        cameras = app.cameras.len(),
        output = %config.output_dir.display(),
        "Opening control window"
    );
    let width = 40.0 + 170.0 * app.cameras.len().max(1) as f32;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Video Recorder")
            .with_inner_size([width, 190.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Video Recorder",
        options,
        Box::new(move |_cc| Box::new(app)),
    )
    .map_err(|e| anyhow::anyhow!("control window failed: {e}"))
}

/// One column per camera with a view toggle and a record toggle.
///
/// Dropping the app drops the registry, which stops and joins every
/// worker before the process exits.
struct ControlApp {
    registry: SessionRegistry,
    cameras: Vec<CameraId>,
    status: String,
}

impl ControlApp {
    fn new(registry: SessionRegistry) -> Self {
        let cameras = registry.cameras().map(|c| c.id()).collect();
        Self {
            registry,
            cameras,
            status: "Ready".to_string(),
        }
    }

    fn toggle_view(&mut self, id: &CameraId) {
        self.status = match self.registry.toggle_view(id) {
            Ok(ViewTransition::Started) => format!("{id}: opening stream"),
            Ok(ViewTransition::Stopped { report: Some(report) }) => format!(
                "{id}: stopped, {} frame(s) in {} segment(s)",
                report.frames_written,
                report.segments.len()
            ),
            Ok(ViewTransition::Stopped { report: None }) => format!("{id}: worker panicked"),
            Err(e) => e.to_string(),
        };
    }

    fn toggle_record(&mut self, id: &CameraId) {
        self.status = match self.registry.toggle_record(id) {
            Ok(RecordTransition::Started) => format!("{id}: recording"),
            Ok(RecordTransition::Stopped) => format!("{id}: recording stopped"),
            Ok(RecordTransition::Ignored) => format!("{id}: show the video first"),
            Err(e) => e.to_string(),
        };
    }
}

fn phase_label(snapshot: &StateSnapshot) -> (&'static str, Color32) {
    if snapshot.open_failed() {
        return ("stream did not open", Color32::from_rgb(220, 80, 80));
    }
    match snapshot.phase {
        SessionPhase::Idle | SessionPhase::Closed => ("idle", Color32::GRAY),
        SessionPhase::Opening => ("opening...", Color32::from_rgb(220, 180, 60)),
        SessionPhase::Streaming if snapshot.recording => ("recording", Color32::from_rgb(230, 60, 60)),
        SessionPhase::Streaming => ("streaming", Color32::from_rgb(90, 200, 110)),
        SessionPhase::Draining => ("closing...", Color32::from_rgb(220, 180, 60)),
    }
}

impl eframe::App for ControlApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Workers change phase on their own; keep the labels fresh.
        ctx.request_repaint_after(std::time::Duration::from_millis(200));

        let mut view_clicked = None;
        let mut record_clicked = None;

        egui::CentralPanel::default().show(ctx, |ui| {
            if self.cameras.is_empty() {
                ui.label("No cameras configured.");
                return;
            }

            ui.columns(self.cameras.len(), |columns| {
                for (ui, id) in columns.iter_mut().zip(&self.cameras) {
                    let snapshot = match self.registry.snapshot(id) {
                        Ok(snapshot) => snapshot,
                        Err(_) => continue,
                    };

                    ui.vertical_centered(|ui| {
                        ui.heading(id.as_str());
                        ui.add_space(4.0);

                        let view_text = if snapshot.viewing {
                            "Hide Video"
                        } else {
                            "Show Video"
                        };
                        if ui.button(view_text).clicked() {
                            view_clicked = Some(id.clone());
                        }

                        let record_text = if snapshot.recording {
                            "Stop Record"
                        } else {
                            "Start Record"
                        };
                        let record_button = egui::Button::new(record_text);
                        if ui.add_enabled(snapshot.viewing, record_button).clicked() {
                            record_clicked = Some(id.clone());
                        }

                        let (label, color) = phase_label(&snapshot);
                        ui.colored_label(color, label);
                    });
                }
            });

            ui.separator();
            ui.label(format!("Status: {}", self.status));
        });

        if let Some(id) = view_clicked {
            self.toggle_view(&id);
        }
        if let Some(id) = record_clicked {
            self.toggle_record(&id);
        }
    }
}
