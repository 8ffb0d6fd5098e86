//! GStreamer media backend.
//!
//! Pipelines:
//!
//! ```text
//! source:  <uridecodebin | v4l2src | filesrc ! decodebin> ! videoconvert ! RGBx ! appsink
//! writer:  appsrc ! videoconvert ! jpegenc ! avimux ! filesink
//! display: appsrc ! videoconvert ! autovideosink
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use camrec_common::error::{CamrecError, CamrecResult};
use gst::prelude::*;
use gstreamer as gst;
use gstreamer_app as gst_app;

use super::{
    DisplaySurface, Frame, FrameSource, MediaBackend, SegmentSummary, SegmentWriter,
    SourceTimeouts, StreamProperties, WriterSpec,
};

/// Upper bound on waiting for EOS to reach the muxer when closing a segment.
const EOS_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

const RAW_FORMAT: &str = "RGBx";

/// Elements the backend builds pipelines from, and whether each is needed
/// for every camera (`v4l2src` only matters for device paths).
pub const PIPELINE_ELEMENTS: &[(&str, bool)] = &[
    ("uridecodebin", true),
    ("decodebin", true),
    ("filesrc", true),
    ("v4l2src", false),
    ("videoconvert", true),
    ("appsink", true),
    ("appsrc", true),
    ("jpegenc", true),
    ("avimux", true),
    ("filesink", true),
    ("autovideosink", false),
];

/// Availability of one GStreamer element on this system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementCheck {
    pub name: &'static str,
    pub required: bool,
    pub available: bool,
}

/// Media backend built on GStreamer.
#[derive(Debug, Clone, Copy, Default)]
pub struct GstBackend;

impl GstBackend {
    /// Initialize GStreamer and create the backend.
    pub fn new() -> CamrecResult<Self> {
        init_gstreamer()?;
        Ok(Self)
    }

    /// Check which pipeline elements are installed.
    pub fn check_elements(&self) -> Vec<ElementCheck> {
        PIPELINE_ELEMENTS
            .iter()
            .map(|&(name, required)| ElementCheck {
                name,
                required,
                available: gst::ElementFactory::find(name).is_some(),
            })
            .collect()
    }
}

impl MediaBackend for GstBackend {
    fn open_source(
        &self,
        camera: &str,
        url: &str,
        timeouts: SourceTimeouts,
    ) -> CamrecResult<Box<dyn FrameSource>> {
        Ok(Box::new(GstFrameSource::open(camera, url, timeouts)?))
    }

    fn open_writer(&self, path: &Path, spec: WriterSpec) -> CamrecResult<Box<dyn SegmentWriter>> {
        Ok(Box::new(GstSegmentWriter::create(path, spec)?))
    }

    fn open_display(
        &self,
        title: &str,
        properties: StreamProperties,
    ) -> CamrecResult<Box<dyn DisplaySurface>> {
        Ok(Box::new(GstDisplaySurface::open(title, properties)?))
    }
}

/// Decoding pipeline ending in an appsink.
pub struct GstFrameSource {
    camera: String,
    pipeline: gst::Pipeline,
    appsink: gst_app::AppSink,
    properties: StreamProperties,
    read_timeout: Duration,
    /// The frame pulled while probing the stream during open.
    pending: Option<Frame>,
    next_sequence: u64,
}

impl GstFrameSource {
    /// Build the decoding pipeline and wait for the first frame.
    ///
    /// Native properties come from the first frame's caps.
    pub fn open(camera: &str, url: &str, timeouts: SourceTimeouts) -> CamrecResult<Self> {
        init_gstreamer()?;

        let launch = source_launch(url);
        tracing::debug!(camera, %launch, "Building source pipeline");
        let pipeline =
            launch_pipeline(&launch).map_err(|e| CamrecError::source_open(camera, e))?;

        let appsink = pipeline
            .by_name("sink")
            .and_then(|element| element.dynamic_cast::<gst_app::AppSink>().ok())
            .ok_or_else(|| CamrecError::source_open(camera, "source pipeline has no appsink"))?;

        if let Err(e) = pipeline.set_state(gst::State::Playing) {
            let detail = take_bus_error(&pipeline).unwrap_or_else(|| format!("{e:?}"));
            shutdown_pipeline(&pipeline);
            return Err(CamrecError::source_open(camera, detail));
        }

        let Some(sample) = appsink.try_pull_sample(clock_time(timeouts.open)) else {
            let detail = take_bus_error(&pipeline).unwrap_or_else(|| {
                if appsink.is_eos() {
                    "stream ended before the first frame".to_string()
                } else {
                    format!("no frame within {:?}", timeouts.open)
                }
            });
            shutdown_pipeline(&pipeline);
            return Err(CamrecError::source_open(camera, detail));
        };

        let probed = sample_properties(&sample).and_then(|properties| {
            sample_to_frame(&sample, 0).map(|frame| (properties, frame))
        });
        let (properties, first_frame) = match probed {
            Ok(probed) => probed,
            Err(message) => {
                shutdown_pipeline(&pipeline);
                return Err(CamrecError::source_open(camera, message));
            }
        };

        Ok(Self {
            camera: camera.to_string(),
            pipeline,
            appsink,
            properties,
            read_timeout: timeouts.read,
            pending: Some(first_frame),
            next_sequence: 1,
        })
    }
}

impl FrameSource for GstFrameSource {
    fn read_frame(&mut self) -> CamrecResult<Frame> {
        if let Some(frame) = self.pending.take() {
            return Ok(frame);
        }

        match self.appsink.try_pull_sample(clock_time(self.read_timeout)) {
            Some(sample) => {
                let frame = sample_to_frame(&sample, self.next_sequence)
                    .map_err(|message| CamrecError::frame_read(&self.camera, message))?;
                self.next_sequence += 1;
                Ok(frame)
            }
            None => {
                let message = take_bus_error(&self.pipeline).unwrap_or_else(|| {
                    if self.appsink.is_eos() {
                        "end of stream".to_string()
                    } else {
                        format!("no frame within {:?}", self.read_timeout)
                    }
                });
                Err(CamrecError::frame_read(&self.camera, message))
            }
        }
    }

    fn properties(&self) -> StreamProperties {
        self.properties
    }

    fn close(self: Box<Self>) {
        shutdown_pipeline(&self.pipeline);
    }
}

impl Drop for GstFrameSource {
    fn drop(&mut self) {
        shutdown_pipeline(&self.pipeline);
    }
}

/// Motion-JPEG in AVI segment writer.
pub struct GstSegmentWriter {
    path: PathBuf,
    pipeline: gst::Pipeline,
    appsrc: gst_app::AppSrc,
    spec: WriterSpec,
    frames_written: u64,
}

impl GstSegmentWriter {
    /// Create the output file and start the encoding pipeline.
    pub fn create(path: &Path, spec: WriterSpec) -> CamrecResult<Self> {
        init_gstreamer()?;

        if spec.width == 0 || spec.height == 0 || spec.fps == 0 {
            return Err(CamrecError::writer_open(
                path,
                format!(
                    "invalid segment format {}x{} @ {} fps",
                    spec.width, spec.height, spec.fps
                ),
            ));
        }

        let launch = writer_launch(path);
        let pipeline = launch_pipeline(&launch).map_err(|e| CamrecError::writer_open(path, e))?;
        let appsrc = pipeline
            .by_name("src")
            .and_then(|element| element.dynamic_cast::<gst_app::AppSrc>().ok())
            .ok_or_else(|| CamrecError::writer_open(path, "writer pipeline has no appsrc"))?;

        appsrc.set_caps(Some(&raw_caps(spec.width, spec.height, spec.fps)));
        appsrc.set_format(gst::Format::Time);

        // filesink opens the file on this transition.
        if let Err(e) = pipeline.set_state(gst::State::Playing) {
            let detail = take_bus_error(&pipeline).unwrap_or_else(|| format!("{e:?}"));
            shutdown_pipeline(&pipeline);
            return Err(CamrecError::writer_open(path, detail));
        }

        Ok(Self {
            path: path.to_path_buf(),
            pipeline,
            appsrc,
            spec,
            frames_written: 0,
        })
    }
}

impl SegmentWriter for GstSegmentWriter {
    fn write_frame(&mut self, frame: &Frame) -> CamrecResult<()> {
        if !frame.has_dimensions(self.spec.width, self.spec.height) {
            return Err(CamrecError::write(
                &self.path,
                format!(
                    "frame is {}x{}, segment is {}x{}",
                    frame.width, frame.height, self.spec.width, self.spec.height
                ),
            ));
        }

        let frame_ns = 1_000_000_000 / u64::from(self.spec.fps);
        let mut buffer = gst::Buffer::from_slice(Arc::clone(&frame.data));
        if let Some(buffer) = buffer.get_mut() {
            buffer.set_pts(gst::ClockTime::from_nseconds(self.frames_written * frame_ns));
            buffer.set_duration(gst::ClockTime::from_nseconds(frame_ns));
        }

        self.appsrc.push_buffer(buffer).map_err(|flow| {
            let detail = take_bus_error(&self.pipeline).unwrap_or_else(|| format!("{flow:?}"));
            CamrecError::write(&self.path, detail)
        })?;
        self.frames_written += 1;
        Ok(())
    }

    fn finish(self: Box<Self>) -> CamrecResult<SegmentSummary> {
        // EOS makes avimux write its index; without it the file is unplayable.
        if let Err(flow) = self.appsrc.end_of_stream() {
            tracing::warn!(path = %self.path.display(), ?flow, "Failed to send EOS; segment may be truncated");
        }

        let drain = wait_for_eos(&self.pipeline, EOS_DRAIN_TIMEOUT);
        shutdown_pipeline(&self.pipeline);

        match drain {
            Ok(()) => Ok(SegmentSummary {
                path: self.path.clone(),
                frames_written: self.frames_written,
            }),
            Err(message) => Err(CamrecError::write(&self.path, message)),
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for GstSegmentWriter {
    fn drop(&mut self) {
        shutdown_pipeline(&self.pipeline);
    }
}

/// Live preview window fed from an appsrc.
pub struct GstDisplaySurface {
    title: String,
    pipeline: gst::Pipeline,
    appsrc: gst_app::AppSrc,
    dimensions: (u32, u32),
    push_failed: bool,
}

impl GstDisplaySurface {
    pub fn open(title: &str, properties: StreamProperties) -> CamrecResult<Self> {
        init_gstreamer()?;

        let launch = "appsrc name=src is-live=true do-timestamp=true format=time ! videoconvert ! autovideosink sync=false";
        let pipeline = launch_pipeline(launch).map_err(|e| CamrecError::display(title, e))?;
        let appsrc = pipeline
            .by_name("src")
            .and_then(|element| element.dynamic_cast::<gst_app::AppSrc>().ok())
            .ok_or_else(|| CamrecError::display(title, "display pipeline has no appsrc"))?;

        appsrc.set_caps(Some(&raw_caps(properties.width, properties.height, 0)));

        if let Err(e) = pipeline.set_state(gst::State::Playing) {
            let detail = take_bus_error(&pipeline).unwrap_or_else(|| format!("{e:?}"));
            shutdown_pipeline(&pipeline);
            return Err(CamrecError::display(title, detail));
        }

        // Video sinks use the title tag as their window title.
        let mut tags = gst::TagList::new();
        if let Some(tags) = tags.get_mut() {
            tags.add::<gst::tags::Title>(&title, gst::TagMergeMode::Replace);
        }
        appsrc.send_event(gst::event::Tag::new(tags));

        Ok(Self {
            title: title.to_string(),
            pipeline,
            appsrc,
            dimensions: (properties.width, properties.height),
            push_failed: false,
        })
    }
}

impl DisplaySurface for GstDisplaySurface {
    fn show(&mut self, frame: &Frame) {
        if self.dimensions != (frame.width, frame.height) {
            self.appsrc
                .set_caps(Some(&raw_caps(frame.width, frame.height, 0)));
            self.dimensions = (frame.width, frame.height);
        }

        let buffer = gst::Buffer::from_slice(Arc::clone(&frame.data));
        if let Err(flow) = self.appsrc.push_buffer(buffer) {
            if !self.push_failed {
                let detail = take_bus_error(&self.pipeline).unwrap_or_else(|| format!("{flow:?}"));
                tracing::warn!(camera = %self.title, error = %detail, "Display stopped accepting frames");
                self.push_failed = true;
            }
        }
    }

    fn close(self: Box<Self>) {
        shutdown_pipeline(&self.pipeline);
    }
}

impl Drop for GstDisplaySurface {
    fn drop(&mut self) {
        shutdown_pipeline(&self.pipeline);
    }
}

/// Launch description for a camera URL.
pub fn source_launch(url: &str) -> String {
    format!(
        "{} ! videoconvert ! video/x-raw,format={RAW_FORMAT} ! appsink name=sink sync=false max-buffers=8",
        source_fragment(url)
    )
}

/// Source element(s) for a URL: URIs go through `uridecodebin`, V4L2 device
/// nodes through `v4l2src`, anything else is treated as a local file.
fn source_fragment(url: &str) -> String {
    let url = url.trim();
    if url.contains("://") {
        format!("uridecodebin uri=\"{}\"", escape_quotes(url))
    } else if url.starts_with("/dev/video") {
        format!("v4l2src device=\"{}\"", escape_quotes(url))
    } else {
        format!("filesrc location=\"{}\" ! decodebin", escape_quotes(url))
    }
}

fn writer_launch(path: &Path) -> String {
    format!(
        "appsrc name=src ! videoconvert ! jpegenc ! avimux ! filesink location=\"{}\"",
        escape_path(path)
    )
}

fn raw_caps(width: u32, height: u32, fps: u32) -> gst::Caps {
    gst::Caps::builder("video/x-raw")
        .field("format", RAW_FORMAT)
        .field("width", width as i32)
        .field("height", height as i32)
        .field("framerate", gst::Fraction::new(fps as i32, 1))
        .build()
}

fn sample_properties(sample: &gst::Sample) -> Result<StreamProperties, String> {
    let caps = sample.caps().ok_or("frame carried no caps")?;
    let structure = caps.structure(0).ok_or("frame caps are empty")?;
    let width = structure
        .get::<i32>("width")
        .map_err(|e| format!("frame caps have no width: {e}"))?;
    let height = structure
        .get::<i32>("height")
        .map_err(|e| format!("frame caps have no height: {e}"))?;
    let fps = structure
        .get::<gst::Fraction>("framerate")
        .map(|f| {
            if f.denom() == 0 {
                0.0
            } else {
                f.numer() as f64 / f.denom() as f64
            }
        })
        .unwrap_or(0.0);

    Ok(StreamProperties {
        width: width.max(0) as u32,
        height: height.max(0) as u32,
        fps,
    })
}

fn sample_to_frame(sample: &gst::Sample, sequence: u64) -> Result<Frame, String> {
    let properties = sample_properties(sample)?;
    let buffer = sample.buffer().ok_or("sample carried no buffer")?;
    let map = buffer
        .map_readable()
        .map_err(|e| format!("frame buffer not readable: {e}"))?;

    let expected = Frame::expected_len(properties.width, properties.height);
    let data = map.as_slice();
    if data.len() < expected {
        return Err(format!(
            "frame buffer holds {} bytes, {}x{} needs {expected}",
            data.len(),
            properties.width,
            properties.height
        ));
    }

    Ok(Frame::new(
        properties.width,
        properties.height,
        Arc::<[u8]>::from(&data[..expected]),
        sequence,
    ))
}

fn launch_pipeline(launch: &str) -> Result<gst::Pipeline, String> {
    let element =
        gst::parse::launch(launch).map_err(|e| format!("Failed to build pipeline: {e}"))?;
    element
        .dynamic_cast::<gst::Pipeline>()
        .map_err(|_| "Launch string did not produce a pipeline".to_string())
}

/// Pop the first pending error message from the pipeline bus.
fn take_bus_error(pipeline: &gst::Pipeline) -> Option<String> {
    let bus = pipeline.bus()?;
    let msg = bus.pop_filtered(&[gst::MessageType::Error])?;
    match msg.view() {
        gst::MessageView::Error(e) => Some(match e.debug() {
            Some(debug) => format!("{} ({debug})", e.error()),
            None => e.error().to_string(),
        }),
        _ => None,
    }
}

fn wait_for_eos(pipeline: &gst::Pipeline, deadline: Duration) -> Result<(), String> {
    let Some(bus) = pipeline.bus() else {
        return Ok(());
    };

    let start = Instant::now();
    loop {
        let elapsed = start.elapsed();
        if elapsed >= deadline {
            return Err(format!("EOS drain timed out after {deadline:?}"));
        }
        match bus.timed_pop(clock_time(deadline - elapsed)) {
            Some(msg) => match msg.view() {
                gst::MessageView::Eos(_) => return Ok(()),
                gst::MessageView::Error(e) => {
                    return Err(format!("pipeline error during EOS drain: {}", e.error()));
                }
                _ => {}
            },
            None => return Err(format!("EOS drain timed out after {deadline:?}")),
        }
    }
}

fn shutdown_pipeline(pipeline: &gst::Pipeline) {
    if let Err(e) = pipeline.set_state(gst::State::Null) {
        tracing::debug!(error = ?e, "Failed to set pipeline to Null");
    }
}

fn clock_time(duration: Duration) -> gst::ClockTime {
    gst::ClockTime::from_nseconds(duration.as_nanos().min(u64::MAX as u128) as u64)
}

fn init_gstreamer() -> CamrecResult<()> {
    static GST_INIT: OnceLock<Result<(), String>> = OnceLock::new();
    let init_res = GST_INIT.get_or_init(|| gst::init().map_err(|e| e.to_string()));
    match init_res {
        Ok(()) => Ok(()),
        Err(e) => Err(CamrecError::unsupported(format!(
            "Failed to initialize GStreamer: {e}"
        ))),
    }
}

fn escape_quotes(value: &str) -> String {
    value.replace('"', "\\\"")
}

fn escape_path(path: &Path) -> String {
    escape_quotes(&path.to_string_lossy())
}
