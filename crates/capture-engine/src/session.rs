//! Camera worker.
//!
//! One `CameraSession` runs per viewed camera on its own thread:
//!
//! ```text
//! Opening ──(open failed)──────────────────────────┐
//!    │                                             ▼
//!    └──► Streaming ──(stop requested)──► Draining ──► Closed
//! ```
//!
//! While streaming, each iteration reads one frame (the only blocking
//! call), shows it, records it if `recording` is set, and then checks
//! `stop_requested`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use camrec_camera_model::CameraConfig;
use camrec_common::config::AppConfig;

use crate::backend::{
    DisplaySurface, Frame, FrameSource, MediaBackend, NullDisplay, SegmentWriter,
    SourceTimeouts, StreamProperties, WriterSpec,
};
use crate::segment::SegmentNamer;
use crate::state::{RecordingState, SessionPhase};

/// Consecutive read failures between repeated error lines.
const READ_FAILURE_LOG_INTERVAL: u64 = 100;

/// Settings shared by every camera worker.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Directory segments are written to.
    pub output_dir: PathBuf,

    /// Segment container extension (without the dot).
    pub container_extension: String,

    /// Declared frame rate of every segment.
    pub segment_fps: u32,

    /// Open and read timeouts for the source.
    pub timeouts: SourceTimeouts,

    /// Pause after a failed read.
    pub read_failure_backoff: Duration,

    /// Whether to open a display surface per camera.
    pub display: bool,
}

impl SessionSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            container_extension: config.recording.container_extension.clone(),
            segment_fps: config.recording.segment_fps,
            timeouts: SourceTimeouts {
                open: config.recording.open_timeout(),
                read: config.recording.read_timeout(),
            },
            read_failure_backoff: config.recording.read_failure_backoff(),
            display: config.display.enabled,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// What one worker run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionReport {
    /// Camera name.
    pub camera: String,

    /// Whether the stream opened and the worker reached Streaming.
    pub opened: bool,

    /// Native stream properties, when opened.
    pub properties: Option<StreamProperties>,

    /// Frames read successfully.
    pub frames_read: u64,

    /// Failed read attempts.
    pub read_failures: u64,

    /// Frames appended to segments.
    pub frames_written: u64,

    /// Frames that should have been recorded but were not.
    pub frames_dropped: u64,

    /// Segment files created, in order.
    pub segments: Vec<PathBuf>,
}

/// Handles owned by the worker while streaming.
struct LiveStream {
    source: Box<dyn FrameSource>,
    display: Box<dyn DisplaySurface>,
    writer: Option<Box<dyn SegmentWriter>>,
    /// Recording generation the open writer belongs to.
    writer_generation: u64,
    properties: StreamProperties,
    failure_streak: u64,
}

/// The capture/display/record loop for one camera.
pub struct CameraSession {
    camera: CameraConfig,
    state: Arc<RecordingState>,
    backend: Arc<dyn MediaBackend>,
    settings: SessionSettings,
    namer: SegmentNamer,
    report: SessionReport,
}

impl CameraSession {
    pub fn new(
        camera: CameraConfig,
        state: Arc<RecordingState>,
        backend: Arc<dyn MediaBackend>,
        settings: SessionSettings,
        namer: SegmentNamer,
    ) -> Self {
        let report = SessionReport {
            camera: camera.name.clone(),
            ..SessionReport::default()
        };
        Self {
            camera,
            state,
            backend,
            settings,
            namer,
            report,
        }
    }

    /// Run the worker to completion.
    ///
    /// Returns once `stop_requested` has been observed and every handle is
    /// released, or immediately if the stream cannot be opened.
    pub fn run(mut self) -> SessionReport {
        self.state.set_phase(SessionPhase::Opening);

        let Some(mut live) = self.open() else {
            self.state.set_phase(SessionPhase::Closed);
            return self.report;
        };

        self.state.set_phase(SessionPhase::Streaming);
        self.stream(&mut live);

        self.state.set_phase(SessionPhase::Draining);
        self.drain(live);

        self.state.set_phase(SessionPhase::Closed);
        self.report
    }

    fn open(&mut self) -> Option<LiveStream> {
        let camera = &self.camera.name;
        let source =
            match self
                .backend
                .open_source(camera, &self.camera.url, self.settings.timeouts)
            {
                Ok(source) => source,
                Err(e) => {
                    tracing::error!(camera = %camera, error = %e, "Capture not opened");
                    return None;
                }
            };

        let properties = source.properties();
        tracing::info!(camera = %camera, "Capture opened successfully");
        tracing::info!(
            camera = %camera,
            height = properties.height,
            width = properties.width,
            fps = properties.fps,
            "Native stream properties"
        );

        self.report.opened = true;
        self.report.properties = Some(properties);

        let display = self.open_display(properties);
        Some(LiveStream {
            source,
            display,
            writer: None,
            writer_generation: 0,
            properties,
            failure_streak: 0,
        })
    }

    fn open_display(&self, properties: StreamProperties) -> Box<dyn DisplaySurface> {
        if !self.settings.display {
            return Box::new(NullDisplay);
        }
        match self.backend.open_display(&self.camera.name, properties) {
            Ok(display) => display,
            Err(e) => {
                tracing::warn!(camera = %self.camera.name, error = %e, "Display not opened; continuing without it");
                Box::new(NullDisplay)
            }
        }
    }

    fn stream(&mut self, live: &mut LiveStream) {
        loop {
            let frame = self.read(live);

            if let Some(frame) = frame.as_ref() {
                live.display.show(frame);
            }

            self.apply_recording(live, frame.as_ref());

            if self.state.stop_requested() {
                break;
            }
        }
    }

    /// One read attempt. Failures are logged and tolerated.
    fn read(&mut self, live: &mut LiveStream) -> Option<Frame> {
        match live.source.read_frame() {
            Ok(frame) => {
                if live.failure_streak > 0 {
                    tracing::info!(
                        camera = %self.camera.name,
                        failures = live.failure_streak,
                        "Frame reads recovered"
                    );
                    live.failure_streak = 0;
                }
                self.report.frames_read += 1;
                Some(frame)
            }
            Err(e) => {
                live.failure_streak += 1;
                self.report.read_failures += 1;
                if live.failure_streak == 1 {
                    tracing::error!(camera = %self.camera.name, error = %e, "Frame not grabbed");
                } else if live.failure_streak % READ_FAILURE_LOG_INTERVAL == 0 {
                    tracing::error!(
                        camera = %self.camera.name,
                        failures = live.failure_streak,
                        error = %e,
                        "Frame not grabbed, reads still failing"
                    );
                }
                if !self.settings.read_failure_backoff.is_zero() {
                    std::thread::sleep(self.settings.read_failure_backoff);
                }
                None
            }
        }
    }

    /// Open, append to, or close the current segment according to the
    /// `recording` flag and its generation.
    fn apply_recording(&mut self, live: &mut LiveStream, frame: Option<&Frame>) {
        if !self.state.is_recording() {
            if let Some(writer) = live.writer.take() {
                self.finish_segment(writer);
            }
            return;
        }

        // Recording went off and on again between two polls.
        let generation = self.state.segment_generation();
        if live.writer_generation != generation {
            if let Some(writer) = live.writer.take() {
                self.finish_segment(writer);
            }
        }

        let Some(frame) = frame else {
            return;
        };

        if !frame.has_dimensions(live.properties.width, live.properties.height) {
            self.report.frames_dropped += 1;
            tracing::warn!(
                camera = %self.camera.name,
                width = frame.width,
                height = frame.height,
                "Frame size differs from stream size; not recorded"
            );
            return;
        }

        if live.writer.is_none() {
            match self.open_segment(live.properties) {
                Some(writer) => {
                    live.writer = Some(writer);
                    live.writer_generation = generation;
                }
                None => {
                    self.report.frames_dropped += 1;
                    return;
                }
            }
        }

        let Some(writer) = live.writer.as_mut() else {
            return;
        };
        match writer.write_frame(frame) {
            Ok(()) => self.report.frames_written += 1,
            Err(e) => {
                self.report.frames_dropped += 1;
                tracing::error!(camera = %self.camera.name, error = %e, "Frame not written; closing segment");
                if let Some(writer) = live.writer.take() {
                    self.finish_segment(writer);
                }
            }
        }
    }

    fn open_segment(&mut self, properties: StreamProperties) -> Option<Box<dyn SegmentWriter>> {
        let path = self.namer.next_path();
        let spec = WriterSpec {
            width: properties.width,
            height: properties.height,
            fps: self.settings.segment_fps,
        };

        match self.backend.open_writer(&path, spec) {
            Ok(writer) => {
                tracing::info!(camera = %self.camera.name, path = %path.display(), "Writer opened successfully");
                self.report.segments.push(path);
                Some(writer)
            }
            Err(e) => {
                tracing::error!(camera = %self.camera.name, error = %e, "Writer not opened");
                None
            }
        }
    }

    fn finish_segment(&mut self, writer: Box<dyn SegmentWriter>) {
        let path = writer.path().to_path_buf();
        match writer.finish() {
            Ok(summary) => tracing::info!(
                camera = %self.camera.name,
                path = %summary.path.display(),
                frames = summary.frames_written,
                "Segment closed"
            ),
            Err(e) => tracing::error!(
                camera = %self.camera.name,
                path = %path.display(),
                error = %e,
                "Segment did not close cleanly"
            ),
        }
    }

    fn drain(&mut self, live: LiveStream) {
        let LiveStream {
            source,
            display,
            writer,
            ..
        } = live;

        if let Some(writer) = writer {
            self.finish_segment(writer);
        }

        tracing::info!(camera = %self.camera.name, "Release video");
        source.close();
        display.close();
    }
}
