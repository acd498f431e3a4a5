use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::times;

const TRANSCODER: &str = "ffmpeg";
const TRANSCODE_TIMEOUT: Duration = Duration::from_secs(30);

/// Non-fatal video tagging failures. Every variant leaves the original file
/// untouched and no temporary output behind.
#[derive(Debug, Error)]
pub enum VideoError {
    #[error("transcoder binary {0:?} not found")]
    TranscoderMissing(String),
    #[error("transcoder timed out after {}s", TRANSCODE_TIMEOUT.as_secs())]
    Timeout,
    #[error("transcoder failed ({status}): {stderr}")]
    Failed { status: ExitStatus, stderr: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Re-mux a video through a stream-copy pass that attaches `creation_time`
/// and `date` tags, plus `location`/`location-eng` when both coordinates are
/// non-zero. On success the tagged copy atomically replaces the original via
/// a same-filesystem rename. `altitude` is part of the record interface but
/// the container tags carry no altitude.
pub fn write_video_metadata(
    path: &Path,
    lat: f64,
    lng: f64,
    _altitude: f64,
    timestamp: i64,
) -> Result<(), VideoError> {
    write_with_transcoder(TRANSCODER, path, lat, lng, timestamp, TRANSCODE_TIMEOUT)
}

fn write_with_transcoder(
    transcoder: &str,
    path: &Path,
    lat: f64,
    lng: f64,
    timestamp: i64,
    timeout: Duration,
) -> Result<(), VideoError> {
    let transcoder =
        which::which(transcoder).map_err(|_| VideoError::TranscoderMissing(transcoder.into()))?;

    let tmp = temp_path(path);
    let result = run_transcoder(&transcoder, path, &tmp, lat, lng, timestamp, timeout);
    if result.is_err() && tmp.exists() {
        if let Err(err) = fs::remove_file(&tmp) {
            log::warn!("could not remove {}: {}", tmp.display(), err);
        }
    }
    result
}

/// Sibling temporary output: `{path}.tmp`, so the final rename stays on the
/// same filesystem.
fn temp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

fn run_transcoder(
    transcoder: &Path,
    input: &Path,
    tmp: &Path,
    lat: f64,
    lng: f64,
    timestamp: i64,
    timeout: Duration,
) -> Result<(), VideoError> {
    let datetime = times::local_datetime(timestamp)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();

    let mut cmd = Command::new(transcoder);
    cmd.arg("-i")
        .arg(input)
        .arg("-c")
        .arg("copy")
        .arg("-metadata")
        .arg(format!("creation_time={}", datetime))
        .arg("-metadata")
        .arg(format!("date={}", datetime));
    if lat != 0.0 && lng != 0.0 {
        // ISO 6709-ish signed fixed-point, e.g. "-33.450000-070.660000/"
        let location = format!("{:+.6}{:+.6}/", lat, lng);
        cmd.arg("-metadata")
            .arg(format!("location={}", location))
            .arg("-metadata")
            .arg(format!("location-eng={}", location));
    }
    cmd.arg("-y")
        .arg(tmp)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn()?;

    // Drain stderr on a separate thread so a chatty transcoder can't fill
    // the pipe and stall.
    let stderr_pipe = child.stderr.take();
    let drain = std::thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut stderr) = stderr_pipe {
            stderr.read_to_string(&mut buf).ok();
        }
        buf
    });

    let status = match wait_with_deadline(&mut child, timeout) {
        Ok(Some(status)) => status,
        // Timed out, or the wait itself failed; either way kill and reap so
        // no zombie survives the error return.
        other => {
            child.kill().ok();
            child.wait().ok();
            drain.join().ok();
            return Err(match other {
                Err(err) => VideoError::Io(err),
                _ => VideoError::Timeout,
            });
        }
    };
    let stderr = drain.join().unwrap_or_default();

    if !status.success() {
        return Err(VideoError::Failed {
            status,
            stderr: stderr.trim().to_string(),
        });
    }

    fs::rename(tmp, input)?;
    Ok(())
}

fn wait_with_deadline(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_video(dir: &Path) -> PathBuf {
        let path = dir.join("clip.mp4");
        fs::write(&path, b"fake video bytes").unwrap();
        path
    }

    #[test]
    fn test_temp_path_is_sibling() {
        assert_eq!(
            temp_path(Path::new("/a/b/clip.mp4")),
            PathBuf::from("/a/b/clip.mp4.tmp")
        );
    }

    #[test]
    fn test_missing_transcoder_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = make_video(dir.path());

        let err = write_with_transcoder(
            "no-such-transcoder-binary",
            &path,
            1.0,
            2.0,
            0,
            TRANSCODE_TIMEOUT,
        )
        .unwrap_err();
        assert!(matches!(err, VideoError::TranscoderMissing(_)));
        assert_eq!(fs::read(&path).unwrap(), b"fake video bytes");
        assert!(!temp_path(&path).exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = make_video(dir.path());

        // `false` ignores its arguments and exits 1 without producing output.
        let err =
            write_with_transcoder("false", &path, 0.0, 0.0, 0, TRANSCODE_TIMEOUT).unwrap_err();
        assert!(matches!(err, VideoError::Failed { .. }));
        assert_eq!(fs::read(&path).unwrap(), b"fake video bytes");
        assert!(!temp_path(&path).exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_cleans_up_partial_output() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = make_video(dir.path());

        // Fake transcoder: writes a partial output file (its last argument)
        // and then hangs well past the deadline.
        let script = dir.path().join("slow-transcoder.sh");
        fs::write(
            &script,
            "#!/bin/sh\nfor last; do :; done\necho partial > \"$last\"\nexec sleep 60\n",
        )
        .unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let err = write_with_transcoder(
            script.to_str().unwrap(),
            &path,
            0.0,
            0.0,
            0,
            Duration::from_millis(300),
        )
        .unwrap_err();
        assert!(matches!(err, VideoError::Timeout));
        assert_eq!(fs::read(&path).unwrap(), b"fake video bytes");
        assert!(!temp_path(&path).exists());
    }
}
