mod exif_write;
mod locate;
mod record;
mod times;
mod title;
mod video_write;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Parser)]
#[command(
    name = "takeout-metafix",
    version,
    about = "Match exported media to sidecar metadata and rewrite timestamps and GPS"
)]
struct Cli {
    /// Album directories containing media files and their .json sidecars
    #[arg(required = true)]
    dirs: Vec<PathBuf>,

    /// Suffix the export tool appends to edited variants
    #[arg(long, default_value = locate::DEFAULT_EDITED_SUFFIX)]
    edited_suffix: String,

    /// Directory name (inside each album) for superseded originals
    #[arg(long, default_value = "EditedRaw")]
    superseded_dir: String,
}

#[derive(Default)]
struct Summary {
    matched: u64,
    unmatched: u64,
    image_failures: u64,
    gps_skipped: u64,
    videos_tagged: u64,
    videos_skipped: u64,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let mut summary = Summary::default();
    for dir in &cli.dirs {
        process_dir(dir, &cli.edited_suffix, &cli.superseded_dir, &mut summary)?;
    }

    eprintln!(
        "Matched {} records ({} unmatched)",
        summary.matched, summary.unmatched
    );
    eprintln!(
        "Image metadata failures: {}, GPS blocks skipped: {}",
        summary.image_failures, summary.gps_skipped
    );
    eprintln!(
        "Videos tagged: {}, skipped: {}",
        summary.videos_tagged, summary.videos_skipped
    );
    Ok(())
}

fn process_dir(
    dir: &Path,
    edited_suffix: &str,
    superseded_name: &str,
    summary: &mut Summary,
) -> anyhow::Result<()> {
    let superseded_dir = dir.join(superseded_name);
    fs::create_dir_all(&superseded_dir)
        .with_context(|| format!("creating {}", superseded_dir.display()))?;

    let mut sidecars: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    sidecars.sort();

    eprintln!("Processing {} ({} sidecars)", dir.display(), sidecars.len());
    let pb = ProgressBar::new(sidecars.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40}] {pos}/{len} matching records")
            .unwrap(),
    );

    // Single-writer set of titles already claimed this run; the locator's
    // last-resort fallback reads it.
    let mut moved: HashSet<String> = HashSet::new();

    for sidecar in &sidecars {
        pb.inc(1);

        // Album-level metadata files describe no single media item.
        if sidecar
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("metadata"))
        {
            continue;
        }

        let rec = match record::read_sidecar(sidecar) {
            Ok(rec) => rec,
            Err(err) => {
                log::warn!("skipping sidecar {}: {:#}", sidecar.display(), err);
                continue;
            }
        };

        let safe_title = title::sanitize_title(&rec.title);
        let found = match locate::locate(dir, &safe_title, &moved, &superseded_dir, edited_suffix)
        {
            Some(found) => found,
            None => {
                log::warn!("no file found for record {:?}", rec.title);
                summary.unmatched += 1;
                continue;
            }
        };

        let path = dir.join(&found);
        apply_metadata(&path, &rec, summary);

        if let Err(err) = times::apply_file_times(&path, rec.timestamp) {
            log::warn!("could not set file times on {}: {}", path.display(), err);
        }

        moved.insert(safe_title);
        summary.matched += 1;
    }

    pb.finish_and_clear();
    Ok(())
}

/// Dispatch to the image or video writer by MIME type. Image container
/// failures surface here as errors; everything else is non-fatal.
fn apply_metadata(path: &Path, rec: &record::MetadataRecord, summary: &mut Summary) {
    let mime = mime_guess::from_path(path).first();
    let kind = mime.as_ref().map(|m| m.type_());

    if kind == Some(mime_guess::mime::IMAGE) {
        match exif_write::write_image_metadata(
            path,
            rec.latitude,
            rec.longitude,
            rec.altitude,
            rec.timestamp,
        ) {
            Ok(exif_write::GpsStatus::Written) => {}
            Ok(exif_write::GpsStatus::Skipped(reason)) => {
                log::warn!("GPS tags skipped for {}: {}", path.display(), reason);
                summary.gps_skipped += 1;
            }
            Err(err) => {
                log::error!("image metadata failed for {}: {}", path.display(), err);
                summary.image_failures += 1;
            }
        }
    } else if kind == Some(mime_guess::mime::VIDEO) {
        match video_write::write_video_metadata(
            path,
            rec.latitude,
            rec.longitude,
            rec.altitude,
            rec.timestamp,
        ) {
            Ok(()) => summary.videos_tagged += 1,
            Err(err) => {
                log::warn!("video metadata skipped for {}: {}", path.display(), err);
                summary.videos_skipped += 1;
            }
        }
    } else {
        log::debug!("no metadata writer for {}", path.display());
    }
}
