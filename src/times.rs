use std::path::Path;

use chrono::{DateTime, Local, NaiveDateTime};
use filetime::FileTime;

/// Convert sidecar epoch seconds (UTC) to local wall-clock time.
/// Embedded tags and file times both use the local zone.
pub fn local_datetime(timestamp: i64) -> NaiveDateTime {
    DateTime::from_timestamp(timestamp, 0)
        .unwrap_or(DateTime::UNIX_EPOCH)
        .with_timezone(&Local)
        .naive_local()
}

/// Stamp the file's modification and access times with the record's epoch.
pub fn apply_file_times(path: &Path, timestamp: i64) -> std::io::Result<()> {
    let ft = FileTime::from_unix_time(timestamp, 0);
    filetime::set_file_times(path, ft, ft)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_range_epoch_clamps_to_unix_epoch() {
        // Just exercises the fallback path; format still succeeds.
        let dt = local_datetime(i64::MAX);
        assert!(dt.format("%Y:%m:%d %H:%M:%S").to_string().len() >= 19);
    }

    #[test]
    fn test_apply_file_times() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        std::fs::write(&path, b"x").unwrap();

        apply_file_times(&path, 1_600_000_000).unwrap();

        let meta = std::fs::metadata(&path).unwrap();
        let mtime = FileTime::from_last_modification_time(&meta);
        assert_eq!(mtime.unix_seconds(), 1_600_000_000);
    }
}
