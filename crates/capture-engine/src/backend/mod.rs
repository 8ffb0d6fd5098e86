//! Media backend contracts.
//!
//! A camera worker touches media only through these traits: a
//! [`FrameSource`] it reads from, a [`SegmentWriter`] per recording segment,
//! and a [`DisplaySurface`] it renders into. A [`MediaBackend`] opens all
//! three. The production implementation is [`GstBackend`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use camrec_common::error::CamrecResult;

pub mod gst_backend;

pub use gst_backend::GstBackend;

/// One decoded video frame as packed RGBx pixels (4 bytes per pixel,
/// no row padding).
///
/// Pixel data is reference counted so display and writer can share it.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
    /// Position of this frame in the source's read order, starting at 0.
    pub sequence: u64,
}

impl Frame {
    pub const BYTES_PER_PIXEL: usize = 4;

    pub fn new(width: u32, height: u32, data: impl Into<Arc<[u8]>>, sequence: u64) -> Self {
        Self {
            width,
            height,
            data: data.into(),
            sequence,
        }
    }

    /// Expected data length for the frame's dimensions.
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * Self::BYTES_PER_PIXEL
    }

    pub fn has_dimensions(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }
}

/// Native properties of an opened stream, queried once after open.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamProperties {
    pub width: u32,
    pub height: u32,
    /// Frame rate advertised by the source; `0.0` when unknown.
    pub fps: f64,
}

/// Timeouts applied while opening and reading a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceTimeouts {
    pub open: Duration,
    pub read: Duration,
}

impl Default for SourceTimeouts {
    fn default() -> Self {
        Self {
            open: Duration::from_secs(10),
            read: Duration::from_secs(5),
        }
    }
}

/// Encoding parameters of one output segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterSpec {
    pub width: u32,
    pub height: u32,
    /// Declared frame rate of the output file.
    pub fps: u32,
}

/// What a finished segment contains.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentSummary {
    pub path: PathBuf,
    pub frames_written: u64,
}

/// An open stream. `read_frame` is the worker's only blocking call.
pub trait FrameSource: Send {
    /// Block until the next frame is available or the read fails.
    fn read_frame(&mut self) -> CamrecResult<Frame>;

    /// Native stream properties, fixed for the lifetime of the source.
    fn properties(&self) -> StreamProperties;

    /// Release the capture handle.
    fn close(self: Box<Self>);
}

/// An open output file for one recording segment.
pub trait SegmentWriter: Send {
    /// Append a frame to the segment.
    fn write_frame(&mut self, frame: &Frame) -> CamrecResult<()>;

    /// Flush and close the file.
    fn finish(self: Box<Self>) -> CamrecResult<SegmentSummary>;

    /// Path of the file being written.
    fn path(&self) -> &Path;
}

/// A live, named visual surface for one camera.
pub trait DisplaySurface: Send {
    /// Render a frame.
    fn show(&mut self, frame: &Frame);

    /// Tear the surface down.
    fn close(self: Box<Self>);
}

/// Factory for sources, writers, and display surfaces.
pub trait MediaBackend: Send + Sync {
    /// Open the stream at `url`. `camera` is used for error reporting.
    fn open_source(
        &self,
        camera: &str,
        url: &str,
        timeouts: SourceTimeouts,
    ) -> CamrecResult<Box<dyn FrameSource>>;

    /// Create a new output file at `path`.
    fn open_writer(&self, path: &Path, spec: WriterSpec) -> CamrecResult<Box<dyn SegmentWriter>>;

    /// Open a display surface titled `title`.
    fn open_display(
        &self,
        title: &str,
        properties: StreamProperties,
    ) -> CamrecResult<Box<dyn DisplaySurface>>;
}

/// Display surface that discards frames. Used when display is disabled or
/// no window can be opened.
#[derive(Debug, Default)]
pub struct NullDisplay;

impl DisplaySurface for NullDisplay {
    fn show(&mut self, _frame: &Frame) {}

    fn close(self: Box<Self>) {}
}
