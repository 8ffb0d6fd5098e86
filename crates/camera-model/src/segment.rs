//! Recording segment naming.
//!
//! A segment is one continuous span of recording written to exactly one
//! file, named `<camera> <YYYY-MM-DD HH-MM-SS>.<ext>` after the local time
//! at which the file was opened.

use chrono::NaiveDateTime;

/// `strftime` pattern for the timestamp part of a segment name.
pub const SEGMENT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H-%M-%S";

/// File name of a segment opened at `opened_at`.
pub fn segment_file_name(camera: &str, opened_at: NaiveDateTime, extension: &str) -> String {
    format!(
        "{camera} {}.{extension}",
        opened_at.format(SEGMENT_TIMESTAMP_FORMAT)
    )
}

/// File name of the `n`-th segment opened within the same second.
///
/// `n <= 1` yields the plain name; higher values insert ` (n)` before the
/// extension.
pub fn numbered_segment_file_name(
    camera: &str,
    opened_at: NaiveDateTime,
    extension: &str,
    n: u32,
) -> String {
    if n <= 1 {
        return segment_file_name(camera, opened_at, extension);
    }
    format!(
        "{camera} {} ({n}).{extension}",
        opened_at.format(SEGMENT_TIMESTAMP_FORMAT)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn gate_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_segment_name_matches_recorder_scheme() {
        assert_eq!(
            segment_file_name("Gate", gate_time(), "avi"),
            "Gate 2024-01-01 10-00-00.avi"
        );
    }

    #[test]
    fn test_numbered_names() {
        assert_eq!(
            numbered_segment_file_name("Gate", gate_time(), "avi", 1),
            "Gate 2024-01-01 10-00-00.avi"
        );
        assert_eq!(
            numbered_segment_file_name("Gate", gate_time(), "avi", 3),
            "Gate 2024-01-01 10-00-00 (3).avi"
        );
    }

    proptest! {
        #[test]
        fn prop_segment_name_shape(
            name in "[A-Za-z0-9_ -]{1,12}",
            secs in 0i64..4_000_000_000i64,
        ) {
            let at = chrono::DateTime::from_timestamp(secs, 0).unwrap().naive_utc();
            let file = segment_file_name(&name, at, "avi");

            let prefix = format!("{name} ");
            prop_assert!(file.starts_with(&prefix));
            prop_assert!(file.ends_with(".avi"));

            let stamp = &file[prefix.len()..file.len() - ".avi".len()];
            let parsed = NaiveDateTime::parse_from_str(stamp, SEGMENT_TIMESTAMP_FORMAT).unwrap();
            prop_assert_eq!(parsed, at);
        }
    }
}
