//! Camera registry: the single owner of every camera's state and worker.
//!
//! The registry lives on the control thread. Starting a view spawns one
//! worker thread; stopping it raises `stop_requested` and joins the worker,
//! so when [`SessionRegistry::toggle_view`] returns in the stop direction no
//! read or write for that camera is in flight and its segment is closed.
//!
//! Cancellation is cooperative only. A worker notices a stop request after
//! its current frame read returns, so a stop waits up to one read timeout.

use std::sync::Arc;
use std::thread::JoinHandle;

use camrec_camera_model::{CameraConfig, CameraId, CameraList};
use camrec_common::clock::{SystemClock, WallClock};
use camrec_common::error::{CamrecError, CamrecResult};
use serde::Serialize;

use crate::backend::MediaBackend;
use crate::segment::SegmentNamer;
use crate::session::{CameraSession, SessionReport, SessionSettings};
use crate::state::{RecordingState, SessionPhase, StateSnapshot};

/// Outcome of [`SessionRegistry::toggle_view`].
#[derive(Debug, Clone, PartialEq)]
pub enum ViewTransition {
    /// A worker was spawned.
    Started,
    /// The worker was stopped and joined. `report` is `None` if the worker
    /// panicked.
    Stopped { report: Option<SessionReport> },
}

/// Outcome of [`SessionRegistry::toggle_record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordTransition {
    Started,
    Stopped,
    /// The camera is not viewing; nothing changed.
    Ignored,
}

/// One row of [`SessionRegistry::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CameraStatus {
    pub camera: CameraId,
    pub url: String,
    #[serde(flatten)]
    pub state: StateSnapshot,
    pub worker_alive: bool,
}

struct RegistryEntry {
    camera: CameraConfig,
    state: Arc<RecordingState>,
    worker: Option<JoinHandle<SessionReport>>,
}

/// Maps each configured camera to its state and worker.
pub struct SessionRegistry {
    backend: Arc<dyn MediaBackend>,
    settings: SessionSettings,
    clock: Arc<dyn WallClock>,
    entries: Vec<RegistryEntry>,
}

impl SessionRegistry {
    /// Create a registry using the system clock for segment names.
    pub fn new(
        cameras: CameraList,
        backend: Arc<dyn MediaBackend>,
        settings: SessionSettings,
    ) -> Self {
        Self::with_clock(cameras, backend, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(
        cameras: CameraList,
        backend: Arc<dyn MediaBackend>,
        settings: SessionSettings,
        clock: Arc<dyn WallClock>,
    ) -> Self {
        let entries = cameras
            .into_vec()
            .into_iter()
            .map(|camera| RegistryEntry {
                camera,
                state: Arc::new(RecordingState::new()),
                worker: None,
            })
            .collect();

        Self {
            backend,
            settings,
            clock,
            entries,
        }
    }

    /// Configured cameras in configuration order.
    pub fn cameras(&self) -> impl Iterator<Item = &CameraConfig> {
        self.entries.iter().map(|e| &e.camera)
    }

    pub fn snapshot(&self, id: &CameraId) -> CamrecResult<StateSnapshot> {
        let index = self.index_of(id)?;
        Ok(self.entries[index].state.snapshot())
    }

    /// Status of every camera.
    pub fn status(&self) -> Vec<CameraStatus> {
        self.entries
            .iter()
            .map(|entry| CameraStatus {
                camera: entry.camera.id(),
                url: entry.camera.url.clone(),
                state: entry.state.snapshot(),
                worker_alive: entry
                    .worker
                    .as_ref()
                    .is_some_and(|handle| !handle.is_finished()),
            })
            .collect()
    }

    /// Start viewing a camera, or stop it if it is viewing.
    ///
    /// Stopping blocks until the worker has exited.
    pub fn toggle_view(&mut self, id: &CameraId) -> CamrecResult<ViewTransition> {
        let index = self.index_of(id)?;
        if self.entries[index].state.is_viewing() {
            Ok(self.stop_view(index))
        } else {
            self.start_view(index)?;
            Ok(ViewTransition::Started)
        }
    }

    /// Flip recording for a viewing camera. Ignored with a warning when the
    /// camera is not viewing.
    pub fn toggle_record(&mut self, id: &CameraId) -> CamrecResult<RecordTransition> {
        let index = self.index_of(id)?;
        let entry = &self.entries[index];

        if !entry.state.is_viewing() {
            tracing::warn!(camera = %entry.camera.name, "Record toggled while not viewing; ignored");
            return Ok(RecordTransition::Ignored);
        }

        if entry.state.toggle_recording() {
            tracing::info!(camera = %entry.camera.name, "Start recording");
            Ok(RecordTransition::Started)
        } else {
            tracing::info!(camera = %entry.camera.name, "Stop recording");
            Ok(RecordTransition::Stopped)
        }
    }

    /// Stop and join every viewing camera.
    pub fn shutdown(&mut self) -> Vec<SessionReport> {
        let viewing: Vec<usize> = (0..self.entries.len())
            .filter(|&i| self.entries[i].state.is_viewing() || self.entries[i].worker.is_some())
            .collect();

        if !viewing.is_empty() {
            tracing::info!(cameras = viewing.len(), "Shutting down camera workers");
        }

        viewing
            .into_iter()
            .filter_map(|index| match self.stop_view(index) {
                ViewTransition::Stopped { report } => report,
                ViewTransition::Started => None,
            })
            .collect()
    }

    fn index_of(&self, id: &CameraId) -> CamrecResult<usize> {
        self.entries
            .iter()
            .position(|e| e.camera.name == id.as_str())
            .ok_or_else(|| CamrecError::unknown_camera(id.as_str()))
    }

    fn start_view(&mut self, index: usize) -> CamrecResult<()> {
        let entry = &mut self.entries[index];
        let name = entry.camera.name.clone();

        if let Some(stale) = entry.worker.take() {
            tracing::warn!(camera = %name, "Joining stale worker before restart");
            join_worker(&name, stale);
        }

        tracing::info!(camera = %name, "Show video");
        entry.state.begin_viewing();

        let namer = SegmentNamer::new(
            name.clone(),
            self.settings.output_dir.clone(),
            self.settings.container_extension.clone(),
            Arc::clone(&self.clock),
        );
        let session = CameraSession::new(
            entry.camera.clone(),
            Arc::clone(&entry.state),
            Arc::clone(&self.backend),
            self.settings.clone(),
            namer,
        );

        let spawned = std::thread::Builder::new()
            .name(format!("camera-{name}"))
            .spawn(move || session.run());

        match spawned {
            Ok(handle) => {
                entry.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                entry.state.set_phase(SessionPhase::Closed);
                entry.state.end_viewing();
                Err(CamrecError::worker(
                    name,
                    format!("failed to spawn worker thread: {e}"),
                ))
            }
        }
    }

    fn stop_view(&mut self, index: usize) -> ViewTransition {
        let entry = &mut self.entries[index];
        let name = entry.camera.name.as_str();

        tracing::info!(camera = %name, "Hide video");
        entry.state.request_stop();

        let report = entry
            .worker
            .take()
            .and_then(|handle| join_worker(name, handle));

        entry.state.set_phase(SessionPhase::Closed);
        entry.state.end_viewing();
        ViewTransition::Stopped { report }
    }
}

/// Join a worker thread, logging its report or its panic.
fn join_worker(camera: &str, handle: JoinHandle<SessionReport>) -> Option<SessionReport> {
    match handle.join() {
        Ok(report) => {
            tracing::info!(
                camera = %camera,
                opened = report.opened,
                frames_read = report.frames_read,
                read_failures = report.read_failures,
                frames_written = report.frames_written,
                frames_dropped = report.frames_dropped,
                segments = report.segments.len(),
                "Worker joined"
            );
            Some(report)
        }
        Err(_) => {
            tracing::error!(camera = %camera, "Worker panicked");
            None
        }
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        DisplaySurface, FrameSource, SegmentWriter, SourceTimeouts, StreamProperties, WriterSpec,
    };
    use std::path::Path;

    /// Backend whose sources never open.
    struct Unreachable;

    impl MediaBackend for Unreachable {
        fn open_source(
            &self,
            camera: &str,
            _url: &str,
            _timeouts: SourceTimeouts,
        ) -> CamrecResult<Box<dyn FrameSource>> {
            Err(CamrecError::source_open(camera, "host unreachable"))
        }

        fn open_writer(
            &self,
            path: &Path,
            _spec: WriterSpec,
        ) -> CamrecResult<Box<dyn SegmentWriter>> {
            Err(CamrecError::writer_open(path, "unused"))
        }

        fn open_display(
            &self,
            title: &str,
            _properties: StreamProperties,
        ) -> CamrecResult<Box<dyn DisplaySurface>> {
            Err(CamrecError::display(title, "unused"))
        }
    }

    fn registry() -> SessionRegistry {
        let cameras = CameraList::new(vec![
            CameraConfig::new("Gate", "rtsp://cam/gate"),
            CameraConfig::new("Yard", "rtsp://cam/yard"),
        ])
        .unwrap();
        SessionRegistry::new(cameras, Arc::new(Unreachable), SessionSettings::default())
    }

    fn wait_for_phase(registry: &SessionRegistry, id: &CameraId, phase: SessionPhase) {
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while registry.snapshot(id).unwrap().phase != phase {
            assert!(std::time::Instant::now() < deadline, "worker never reached {phase:?}");
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }

    #[test]
    fn test_unknown_camera_is_an_error() {
        let mut registry = registry();
        let err = registry.toggle_view(&CameraId::from("Garage")).unwrap_err();
        assert!(matches!(err, CamrecError::UnknownCamera { ref name } if name == "Garage"));
    }

    #[test]
    fn test_record_while_not_viewing_is_ignored() {
        let mut registry = registry();
        let gate = CameraId::from("Gate");
        assert_eq!(
            registry.toggle_record(&gate).unwrap(),
            RecordTransition::Ignored
        );
        let snap = registry.snapshot(&gate).unwrap();
        assert!(!snap.recording && !snap.viewing);
    }

    #[test]
    fn test_stop_after_failed_open_resolves_to_not_viewing() {
        let mut registry = registry();
        let gate = CameraId::from("Gate");

        assert_eq!(registry.toggle_view(&gate).unwrap(), ViewTransition::Started);
        wait_for_phase(&registry, &gate, SessionPhase::Closed);
        assert!(registry.snapshot(&gate).unwrap().open_failed());

        match registry.toggle_view(&gate).unwrap() {
            ViewTransition::Stopped { report: Some(report) } => {
                assert!(!report.opened);
                assert_eq!(report.frames_read, 0);
                assert!(report.segments.is_empty());
            }
            other => panic!("unexpected transition {other:?}"),
        }
        let snap = registry.snapshot(&gate).unwrap();
        assert!(!snap.viewing);
        assert!(!registry.status()[0].worker_alive);
    }

    #[test]
    fn test_shutdown_only_touches_viewing_cameras() {
        let mut registry = registry();
        registry.toggle_view(&CameraId::from("Yard")).unwrap();

        let reports = registry.shutdown();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].camera, "Yard");
        assert!(registry.status().iter().all(|s| !s.state.viewing));
    }

    #[test]
    fn test_join_worker_returns_report() {
        let handle = std::thread::spawn(|| SessionReport {
            camera: "Gate".to_string(),
            frames_read: 3,
            ..SessionReport::default()
        });
        let report = join_worker("Gate", handle).unwrap();
        assert_eq!(report.frames_read, 3);
    }

    #[test]
    fn test_join_worker_absorbs_panic() {
        let handle = std::thread::spawn(|| -> SessionReport { panic!("worker blew up") });
        assert!(join_worker("Gate", handle).is_none());
    }

    #[test]
    fn test_restart_after_failed_open_spawns_fresh_worker() {
        let mut registry = registry();
        let gate = CameraId::from("Gate");

        registry.toggle_view(&gate).unwrap();
        wait_for_phase(&registry, &gate, SessionPhase::Closed);
        registry.toggle_view(&gate).unwrap();
        assert_eq!(registry.toggle_view(&gate).unwrap(), ViewTransition::Started);
        wait_for_phase(&registry, &gate, SessionPhase::Closed);

        match registry.toggle_view(&gate).unwrap() {
            ViewTransition::Stopped { report: Some(report) } => assert!(!report.opened),
            other => panic!("unexpected transition {other:?}"),
        }
    }
}
