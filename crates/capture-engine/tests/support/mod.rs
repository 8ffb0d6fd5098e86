//! Scripted in-memory media backend for registry scenarios.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use camrec_camera_model::{CameraConfig, CameraList};
use camrec_capture_engine::{
    DisplaySurface, Frame, FrameSource, MediaBackend, SegmentSummary, SegmentWriter,
    SessionSettings, SourceTimeouts, StreamProperties, WriterSpec,
};
use camrec_common::error::{CamrecError, CamrecResult};

/// Something the fake backend was asked to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    SourceOpened { camera: String },
    SourceClosed { camera: String },
    WriterOpened { path: PathBuf, spec: WriterSpec },
    WriterFinished { path: PathBuf, frames: u64 },
    DisplayOpened { title: String },
    DisplayClosed { title: String },
    Shown { title: String, sequence: u64, width: u32 },
    Written { path: PathBuf, sequence: u64 },
}

#[derive(Debug, Default)]
struct Script {
    unreachable: AtomicBool,
    failing_reads: AtomicU64,
    failing_writer_opens: AtomicUsize,
    failing_writes: AtomicUsize,
    resized_frames: AtomicU64,
}

/// Backend whose sources produce 64x48 frames every millisecond.
#[derive(Debug, Clone, Default)]
pub struct FakeBackend {
    events: Arc<Mutex<Vec<Event>>>,
    script: Arc<Script>,
}

pub const WIDTH: u32 = 64;
pub const HEIGHT: u32 = 48;
pub const FRAME_INTERVAL: Duration = Duration::from_millis(1);

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent source open fails.
    pub fn make_unreachable(&self) {
        self.script.unreachable.store(true, Ordering::SeqCst);
    }

    /// The next `n` reads, on any source, fail.
    pub fn fail_next_reads(&self, n: u64) {
        self.script.failing_reads.store(n, Ordering::SeqCst);
    }

    /// The next `n` writer opens fail.
    pub fn fail_next_writer_opens(&self, n: usize) {
        self.script.failing_writer_opens.store(n, Ordering::SeqCst);
    }

    /// The next `n` frame writes, on any writer, fail.
    pub fn fail_next_writes(&self, n: usize) {
        self.script.failing_writes.store(n, Ordering::SeqCst);
    }

    /// The next `n` frames are delivered at half the native size.
    pub fn resize_next_frames(&self, n: u64) {
        self.script.resized_frames.store(n, Ordering::SeqCst);
    }

    /// Sequences shown on the display titled `title`, in order.
    pub fn shown_sequences(&self, title: &str) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Shown { title: t, sequence, .. } if t == title => Some(sequence),
                _ => None,
            })
            .collect()
    }

    /// Sequences appended to the segment at `path`, in order.
    pub fn written_sequences(&self, path: &Path) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Written { path: p, sequence } if p == path => Some(sequence),
                _ => None,
            })
            .collect()
    }

    /// Lifecycle events only, without per-frame `Shown`/`Written` entries.
    pub fn lifecycle(&self) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| !matches!(e, Event::Shown { .. } | Event::Written { .. }))
            .collect()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| matches(e)).count()
    }

    pub fn writers_opened(&self) -> Vec<PathBuf> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::WriterOpened { path, .. } => Some(path),
                _ => None,
            })
            .collect()
    }

    pub fn finished_frames(&self, path: &Path) -> Option<u64> {
        self.events().into_iter().find_map(|e| match e {
            Event::WriterFinished { path: p, frames } if p == path => Some(frames),
            _ => None,
        })
    }

    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl MediaBackend for FakeBackend {
    fn open_source(
        &self,
        camera: &str,
        _url: &str,
        _timeouts: SourceTimeouts,
    ) -> CamrecResult<Box<dyn FrameSource>> {
        if self.script.unreachable.load(Ordering::SeqCst) {
            return Err(CamrecError::source_open(camera, "connection refused"));
        }
        self.record(Event::SourceOpened {
            camera: camera.to_string(),
        });
        Ok(Box::new(FakeSource {
            camera: camera.to_string(),
            backend: self.clone(),
            sequence: 0,
        }))
    }

    fn open_writer(&self, path: &Path, spec: WriterSpec) -> CamrecResult<Box<dyn SegmentWriter>> {
        let pending = self.script.failing_writer_opens.load(Ordering::SeqCst);
        if pending > 0 {
            self.script
                .failing_writer_opens
                .store(pending - 1, Ordering::SeqCst);
            return Err(CamrecError::writer_open(path, "codec unavailable"));
        }
        std::fs::File::create(path).map_err(|e| CamrecError::writer_open(path, e.to_string()))?;
        self.record(Event::WriterOpened {
            path: path.to_path_buf(),
            spec,
        });
        Ok(Box::new(FakeWriter {
            path: path.to_path_buf(),
            frames: 0,
            backend: self.clone(),
        }))
    }

    fn open_display(
        &self,
        title: &str,
        _properties: StreamProperties,
    ) -> CamrecResult<Box<dyn DisplaySurface>> {
        self.record(Event::DisplayOpened {
            title: title.to_string(),
        });
        Ok(Box::new(FakeDisplay {
            title: title.to_string(),
            backend: self.clone(),
        }))
    }
}

struct FakeSource {
    camera: String,
    backend: FakeBackend,
    sequence: u64,
}

impl FrameSource for FakeSource {
    fn read_frame(&mut self) -> CamrecResult<Frame> {
        std::thread::sleep(FRAME_INTERVAL);

        let failing = &self.backend.script.failing_reads;
        let remaining = failing.load(Ordering::SeqCst);
        if remaining > 0 {
            failing.store(remaining - 1, Ordering::SeqCst);
            return Err(CamrecError::frame_read(&self.camera, "no sample within timeout"));
        }

        let resized = &self.backend.script.resized_frames;
        let shrink = resized.load(Ordering::SeqCst);
        let (width, height) = if shrink > 0 {
            resized.store(shrink - 1, Ordering::SeqCst);
            (WIDTH / 2, HEIGHT / 2)
        } else {
            (WIDTH, HEIGHT)
        };

        let frame = Frame::new(
            width,
            height,
            vec![0u8; Frame::expected_len(width, height)],
            self.sequence,
        );
        self.sequence += 1;
        Ok(frame)
    }

    fn properties(&self) -> StreamProperties {
        StreamProperties {
            width: WIDTH,
            height: HEIGHT,
            fps: 30.0,
        }
    }

    fn close(self: Box<Self>) {
        self.backend.record(Event::SourceClosed {
            camera: self.camera.clone(),
        });
    }
}

struct FakeWriter {
    path: PathBuf,
    frames: u64,
    backend: FakeBackend,
}

impl SegmentWriter for FakeWriter {
    fn write_frame(&mut self, frame: &Frame) -> CamrecResult<()> {
        let failing = &self.backend.script.failing_writes;
        let pending = failing.load(Ordering::SeqCst);
        if pending > 0 {
            failing.store(pending - 1, Ordering::SeqCst);
            return Err(CamrecError::write(&self.path, "disk full"));
        }

        assert!(frame.has_dimensions(WIDTH, HEIGHT));
        self.backend.record(Event::Written {
            path: self.path.clone(),
            sequence: frame.sequence,
        });
        self.frames += 1;
        Ok(())
    }

    fn finish(self: Box<Self>) -> CamrecResult<SegmentSummary> {
        self.backend.record(Event::WriterFinished {
            path: self.path.clone(),
            frames: self.frames,
        });
        Ok(SegmentSummary {
            path: self.path.clone(),
            frames_written: self.frames,
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

struct FakeDisplay {
    title: String,
    backend: FakeBackend,
}

impl DisplaySurface for FakeDisplay {
    fn show(&mut self, frame: &Frame) {
        self.backend.record(Event::Shown {
            title: self.title.clone(),
            sequence: frame.sequence,
            width: frame.width,
        });
    }

    fn close(self: Box<Self>) {
        self.backend.record(Event::DisplayClosed {
            title: self.title.clone(),
        });
    }
}

/// Fresh, empty output directory unique to this process and `tag`.
pub fn output_dir(tag: &str) -> PathBuf {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!(
        "camrec_scenario_{tag}_{}_{n}",
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn settings(output_dir: &Path) -> SessionSettings {
    SessionSettings {
        output_dir: output_dir.to_path_buf(),
        read_failure_backoff: Duration::ZERO,
        ..SessionSettings::default()
    }
}

pub fn cameras(names: &[&str]) -> CameraList {
    CameraList::new(
        names
            .iter()
            .map(|name| CameraConfig::new(*name, format!("rtsp://cameras.local/{name}")))
            .collect(),
    )
    .unwrap()
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(1));
    }
}
