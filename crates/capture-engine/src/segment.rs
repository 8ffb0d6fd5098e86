//! Output paths for recording segments.

use std::path::PathBuf;
use std::sync::Arc;

use camrec_camera_model::segment::numbered_segment_file_name;
use camrec_common::clock::WallClock;

/// Highest ` (n)` suffix tried before giving up on a unique name.
const MAX_SAME_SECOND_SEGMENTS: u32 = 999;

/// Derives segment file paths for one camera.
#[derive(Clone)]
pub struct SegmentNamer {
    camera: String,
    output_dir: PathBuf,
    extension: String,
    clock: Arc<dyn WallClock>,
}

impl SegmentNamer {
    pub fn new(
        camera: impl Into<String>,
        output_dir: impl Into<PathBuf>,
        extension: impl Into<String>,
        clock: Arc<dyn WallClock>,
    ) -> Self {
        Self {
            camera: camera.into(),
            output_dir: output_dir.into(),
            extension: extension.into(),
            clock,
        }
    }

    /// Path for a segment opened now.
    ///
    /// Uses `<camera> <timestamp>.<ext>`; when that file already exists a
    /// ` (2)`, ` (3)`, ... suffix keeps earlier segments from being
    /// overwritten.
    pub fn next_path(&self) -> PathBuf {
        let opened_at = self.clock.now();
        let mut n = 1;
        loop {
            let candidate = self.output_dir.join(numbered_segment_file_name(
                &self.camera,
                opened_at,
                &self.extension,
                n,
            ));
            if !candidate.exists() || n >= MAX_SAME_SECOND_SEGMENTS {
                return candidate;
            }
            n += 1;
        }
    }
}

impl std::fmt::Debug for SegmentNamer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentNamer")
            .field("camera", &self.camera)
            .field("output_dir", &self.output_dir)
            .field("extension", &self.extension)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camrec_common::clock::ManualClock;
    use chrono::NaiveDate;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("camrec_test_{tag}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn ten_o_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::fixed(
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
        ))
    }

    #[test]
    fn test_next_path_uses_output_dir_and_timestamp() {
        let dir = temp_dir("namer_plain");
        let namer = SegmentNamer::new("Gate", &dir, "avi", ten_o_clock());
        assert_eq!(namer.next_path(), dir.join("Gate 2024-01-01 10-00-00.avi"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_same_second_segments_get_suffixes() {
        let dir = temp_dir("namer_collision");
        let namer = SegmentNamer::new("Gate", &dir, "avi", ten_o_clock());

        let first = namer.next_path();
        std::fs::write(&first, b"").unwrap();
        let second = namer.next_path();
        assert_eq!(second, dir.join("Gate 2024-01-01 10-00-00 (2).avi"));
        std::fs::write(&second, b"").unwrap();
        assert_eq!(
            namer.next_path(),
            dir.join("Gate 2024-01-01 10-00-00 (3).avi")
        );

        std::fs::remove_dir_all(&dir).ok();
    }
}
