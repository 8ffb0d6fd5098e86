//! camrec Capture Engine
//!
//! Runs one worker thread per viewed camera. Each worker reads frames from
//! its stream, shows them, and appends them to a timestamped MJPEG/AVI
//! segment while recording is enabled. The [`SessionRegistry`] is the only
//! thing that starts and stops workers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              SessionRegistry                 │
//! │   toggle_view / toggle_record / shutdown     │
//! └──────┬──────────────────────────┬────────────┘
//!        │ Arc<RecordingState>      │ spawn / join
//!        ▼                          ▼
//! ┌──────────────┐     ┌──────────────────────────┐
//! │ viewing      │◄────┤ CameraSession (thread)   │
//! │ recording    │     │  FrameSource ─► Display  │
//! │ stop_request │     │        └──────► Segment  │
//! └──────────────┘     └────────────┬─────────────┘
//!                                   ▼
//!                  "<name> YYYY-MM-DD HH-MM-SS.avi"
//! ```

pub mod backend;
pub mod registry;
pub mod segment;
pub mod session;
pub mod state;

pub use backend::{
    DisplaySurface, Frame, FrameSource, GstBackend, MediaBackend, NullDisplay, SegmentSummary,
    SegmentWriter, SourceTimeouts, StreamProperties, WriterSpec,
};
pub use registry::{CameraStatus, RecordTransition, SessionRegistry, ViewTransition};
pub use segment::SegmentNamer;
pub use session::{CameraSession, SessionReport, SessionSettings};
pub use state::{RecordingState, SessionPhase, StateSnapshot};
