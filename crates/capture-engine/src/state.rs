//! Per-camera flags shared between the control thread and the worker.
//!
//! The control thread writes `viewing`, `recording` and `stop_requested`;
//! the worker reads them once per frame and writes only its own phase.
//! All accesses are `SeqCst` so a flag set by the control thread is seen
//! by the worker's next poll.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use serde::Serialize;

/// Lifecycle phase of a camera worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No worker has run since the state was created or reset.
    Idle,
    /// Opening the stream.
    Opening,
    /// Reading, displaying and (optionally) recording frames.
    Streaming,
    /// Closing the writer, capture handle and display.
    Draining,
    /// The worker has finished.
    Closed,
}

impl SessionPhase {
    fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Opening => 1,
            Self::Streaming => 2,
            Self::Draining => 3,
            Self::Closed => 4,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Opening,
            2 => Self::Streaming,
            3 => Self::Draining,
            4 => Self::Closed,
            _ => Self::Idle,
        }
    }
}

/// Shared recording flags for one camera.
#[derive(Debug)]
pub struct RecordingState {
    viewing: AtomicBool,
    recording: AtomicBool,
    stop_requested: AtomicBool,
    phase: AtomicU8,
    /// Bumped each time recording turns on. A writer opened under an older
    /// generation belongs to a finished segment.
    segment_generation: AtomicU64,
}

/// Point-in-time copy of a [`RecordingState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateSnapshot {
    pub viewing: bool,
    pub recording: bool,
    pub stop_requested: bool,
    pub phase: SessionPhase,
}

impl StateSnapshot {
    /// Viewing was requested but the worker already ended on its own
    /// (the stream never opened).
    pub fn open_failed(&self) -> bool {
        self.viewing && !self.stop_requested && self.phase == SessionPhase::Closed
    }
}

impl RecordingState {
    pub fn new() -> Self {
        Self {
            viewing: AtomicBool::new(false),
            recording: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            phase: AtomicU8::new(SessionPhase::Idle.as_u8()),
            segment_generation: AtomicU64::new(0),
        }
    }

    pub fn is_viewing(&self) -> bool {
        self.viewing.load(Ordering::SeqCst)
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Number of times recording has been turned on.
    pub fn segment_generation(&self) -> u64 {
        self.segment_generation.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> SessionPhase {
        SessionPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            viewing: self.is_viewing(),
            recording: self.is_recording(),
            stop_requested: self.stop_requested(),
            phase: self.phase(),
        }
    }

    /// Control side: mark viewing as started for a fresh worker.
    pub(crate) fn begin_viewing(&self) {
        self.stop_requested.store(false, Ordering::SeqCst);
        self.phase
            .store(SessionPhase::Opening.as_u8(), Ordering::SeqCst);
        self.viewing.store(true, Ordering::SeqCst);
    }

    /// Control side: ask the worker to leave its loop.
    pub(crate) fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    /// Control side: the worker has been joined.
    pub(crate) fn end_viewing(&self) {
        self.recording.store(false, Ordering::SeqCst);
        self.viewing.store(false, Ordering::SeqCst);
        self.stop_requested.store(false, Ordering::SeqCst);
    }

    /// Control side: flip `recording`, returning the new value.
    ///
    /// The generation is bumped before `recording` turns on, so a worker
    /// that sees the new flag also sees the new generation.
    pub(crate) fn toggle_recording(&self) -> bool {
        if self.recording.load(Ordering::SeqCst) {
            self.recording.store(false, Ordering::SeqCst);
            false
        } else {
            self.segment_generation.fetch_add(1, Ordering::SeqCst);
            self.recording.store(true, Ordering::SeqCst);
            true
        }
    }

    /// Worker side: publish the current phase.
    pub(crate) fn set_phase(&self, phase: SessionPhase) {
        self.phase.store(phase.as_u8(), Ordering::SeqCst);
    }
}

impl Default for RecordingState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_new_state_is_idle() {
        let state = RecordingState::new();
        assert_eq!(
            state.snapshot(),
            StateSnapshot {
                viewing: false,
                recording: false,
                stop_requested: false,
                phase: SessionPhase::Idle,
            }
        );
    }

    #[test]
    fn test_toggle_recording_returns_new_value() {
        let state = RecordingState::new();
        assert!(state.toggle_recording());
        assert!(state.is_recording());
        assert!(!state.toggle_recording());
        assert!(!state.is_recording());
    }

    #[test]
    fn test_off_then_on_starts_new_generation() {
        let state = RecordingState::new();
        assert_eq!(state.segment_generation(), 0);

        state.toggle_recording();
        let first = state.segment_generation();
        state.toggle_recording();
        assert_eq!(state.segment_generation(), first);
        state.toggle_recording();

        assert!(state.is_recording());
        assert_eq!(state.segment_generation(), first + 1);
    }

    #[test]
    fn test_begin_viewing_clears_stale_stop() {
        let state = RecordingState::new();
        state.request_stop();
        state.begin_viewing();
        assert!(state.is_viewing());
        assert!(!state.stop_requested());
        assert_eq!(state.phase(), SessionPhase::Opening);
    }

    #[test]
    fn test_end_viewing_clears_recording() {
        let state = RecordingState::new();
        state.begin_viewing();
        state.toggle_recording();
        state.request_stop();
        state.end_viewing();
        let snap = state.snapshot();
        assert!(!snap.viewing && !snap.recording && !snap.stop_requested);
    }

    #[test]
    fn test_open_failed_detection() {
        let state = RecordingState::new();
        state.begin_viewing();
        state.set_phase(SessionPhase::Closed);
        assert!(state.snapshot().open_failed());

        state.request_stop();
        assert!(!state.snapshot().open_failed());
    }

    #[test]
    fn test_phase_roundtrip() {
        for phase in [
            SessionPhase::Idle,
            SessionPhase::Opening,
            SessionPhase::Streaming,
            SessionPhase::Draining,
            SessionPhase::Closed,
        ] {
            assert_eq!(SessionPhase::from_u8(phase.as_u8()), phase);
        }
    }

    #[test]
    fn test_snapshot_serializes_phase_in_snake_case() {
        let state = RecordingState::new();
        state.begin_viewing();
        state.set_phase(SessionPhase::Streaming);
        state.toggle_recording();

        let json = serde_json::to_value(state.snapshot()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "viewing": true,
                "recording": true,
                "stop_requested": false,
                "phase": "streaming",
            })
        );
    }

    #[test]
    fn test_stop_is_visible_across_threads() {
        let state = Arc::new(RecordingState::new());
        state.begin_viewing();

        let worker_state = Arc::clone(&state);
        let worker = std::thread::spawn(move || {
            let mut polls = 0u64;
            while !worker_state.stop_requested() {
                polls += 1;
                std::thread::yield_now();
            }
            polls
        });

        state.request_stop();
        worker.join().unwrap();
        assert!(state.stop_requested());
    }
}
