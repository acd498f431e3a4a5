use std::fs;
use std::io::Cursor;
use std::path::Path;

use exif::{Context, Field, In, Rational, Tag, Value};
use img_parts::jpeg::{markers, Jpeg, JpegSegment};
use img_parts::png::Png;
use img_parts::{Bytes, ImageEXIF};
use thiserror::Error;

use crate::times;

/// Fatal image-metadata failures. An unreadable or unsupported container
/// likely means a corrupt file, so these propagate instead of being logged
/// and swallowed.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("unsupported container format {0:?}")]
    UnsupportedFormat(String),
    #[error("metadata container error: {0}")]
    Exif(#[from] exif::Error),
    #[error("image container error: {0}")]
    Container(#[from] img_parts::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Outcome of the independently-failable GPS pass.
#[derive(Debug)]
pub enum GpsStatus {
    Written,
    /// GPS tags could not be written; the timestamp tags already committed
    /// are retained.
    Skipped(String),
}

enum Format {
    Jpeg,
    Png,
}

fn container_format(path: &Path) -> Result<Format, MetadataError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => Ok(Format::Jpeg),
        "png" => Ok(Format::Png),
        other => Err(MetadataError::UnsupportedFormat(other.to_string())),
    }
}

/// Rewrite the timestamp tags, then the GPS block, of an image file.
///
/// Two passes, each committing the file: the first sets `DateTime`,
/// `DateTimeOriginal` and `DateTimeDigitized`; the second replaces the GPS
/// IFD. A GPS failure is reported as `GpsStatus::Skipped` without undoing
/// the timestamps. A container that cannot be loaded at all is an error.
pub fn write_image_metadata(
    path: &Path,
    lat: f64,
    lng: f64,
    altitude: f64,
    timestamp: i64,
) -> Result<GpsStatus, MetadataError> {
    let format = container_format(path)?;
    let datetime = times::local_datetime(timestamp)
        .format("%Y:%m:%d %H:%M:%S")
        .to_string();

    rewrite_exif(path, &format, |fields| {
        fields.retain(|f| {
            !matches!(f.tag, Tag::DateTime | Tag::DateTimeOriginal | Tag::DateTimeDigitized)
        });
        for tag in [Tag::DateTime, Tag::DateTimeOriginal, Tag::DateTimeDigitized] {
            fields.push(Field {
                tag,
                ifd_num: In::PRIMARY,
                value: ascii(&datetime),
            });
        }
    })?;

    match write_gps_block(path, &format, lat, lng, altitude) {
        Ok(()) => Ok(GpsStatus::Written),
        Err(err) => Ok(GpsStatus::Skipped(err.to_string())),
    }
}

/// Replace the whole GPS IFD with a freshly built block.
///
/// The altitude reference is the fixed "below sea level" sentinel `1`
/// regardless of sign, matching what this tool has always written.
fn write_gps_block(
    path: &Path,
    format: &Format,
    lat: f64,
    lng: f64,
    altitude: f64,
) -> Result<(), MetadataError> {
    let (lat_deg, lat_min, lat_sec, lat_ref) = to_deg(lat, ["S", "N"]);
    let (lng_deg, lng_min, lng_sec, lng_ref) = to_deg(lng, ["W", "E"]);

    rewrite_exif(path, format, |fields| {
        fields.retain(|f| f.tag.context() != Context::Gps);

        let gps = [
            (Tag::GPSVersionID, Value::Byte(vec![2, 0, 0, 0])),
            (Tag::GPSAltitudeRef, Value::Byte(vec![1])),
            (
                Tag::GPSAltitude,
                Value::Rational(vec![rational(round_to(altitude, 2), 100)]),
            ),
            (Tag::GPSLatitudeRef, ascii(lat_ref)),
            (Tag::GPSLatitude, dms_rationals(lat_deg, lat_min, lat_sec)),
            (Tag::GPSLongitudeRef, ascii(lng_ref)),
            (Tag::GPSLongitude, dms_rationals(lng_deg, lng_min, lng_sec)),
        ];
        for (tag, value) in gps {
            fields.push(Field {
                tag,
                ifd_num: In::PRIMARY,
                value,
            });
        }
    })
}

/// Load the file's EXIF fields, let `edit` rewrite them, then serialize and
/// re-embed the block without touching image data.
fn rewrite_exif(
    path: &Path,
    format: &Format,
    edit: impl FnOnce(&mut Vec<Field>),
) -> Result<(), MetadataError> {
    let bytes = fs::read(path)?;
    let parsed = exif::Reader::new().read_from_container(&mut Cursor::new(bytes.as_slice()))?;

    let mut fields: Vec<Field> = parsed
        .fields()
        .map(|f| Field {
            tag: f.tag,
            ifd_num: f.ifd_num,
            value: f.value.clone(),
        })
        .collect();
    edit(&mut fields);

    let mut buf = Cursor::new(Vec::new());
    let mut writer = exif::experimental::Writer::new();
    for field in &fields {
        writer.push_field(field);
    }
    writer.write(&mut buf, false)?;
    let exif_bytes = Bytes::from(buf.into_inner());

    match format {
        Format::Jpeg => {
            let mut jpeg = Jpeg::from_bytes(bytes.into())?;
            replace_exif_segment(&mut jpeg, &exif_bytes);
            fs::write(path, jpeg.encoder().bytes())?;
        }
        Format::Png => {
            let mut png = Png::from_bytes(bytes.into())?;
            png.set_exif(Some(exif_bytes));
            fs::write(path, png.encoder().bytes())?;
        }
    }
    Ok(())
}

const EXIF_HEADER: &[u8] = b"Exif\0\0";

/// Swap the JPEG's EXIF APP1 segment for a freshly serialized one.
///
/// `Jpeg::set_exif` inserts at a fixed segment index and panics on JPEGs
/// with fewer segments than it assumes, so the segment list is rebuilt here
/// instead: drop any existing EXIF APP1, then place the new one near the
/// front (after APP0-style headers when present).
fn replace_exif_segment(jpeg: &mut Jpeg, exif: &[u8]) {
    let mut contents = Vec::with_capacity(EXIF_HEADER.len() + exif.len());
    contents.extend_from_slice(EXIF_HEADER);
    contents.extend_from_slice(exif);
    let segment = JpegSegment::new_with_contents(markers::APP1, Bytes::from(contents));

    let segments = jpeg.segments_mut();
    segments.retain(|s| {
        !(s.marker() == markers::APP1 && s.contents().starts_with(EXIF_HEADER))
    });
    let pos = segments.len().min(3);
    segments.insert(pos, segment);
}

fn ascii(s: &str) -> Value {
    Value::Ascii(vec![s.as_bytes().to_vec()])
}

/// Decimal degrees to (degrees, minutes, seconds, hemisphere reference).
/// `refs` is ordered negative-first, e.g. `["S", "N"]` or `["W", "E"]`;
/// exactly zero yields an empty reference.
fn to_deg(value: f64, refs: [&'static str; 2]) -> (u32, u32, f64, &'static str) {
    let reference = if value < 0.0 {
        refs[0]
    } else if value > 0.0 {
        refs[1]
    } else {
        ""
    };
    let abs = value.abs();
    let deg = abs.floor();
    let rem_min = (abs - deg) * 60.0;
    let min = rem_min.floor();
    let sec = round_to((rem_min - min) * 60.0, 5);
    (deg as u32, min as u32, sec, reference)
}

fn round_to(value: f64, places: u32) -> f64 {
    let scale = 10f64.powi(places as i32);
    (value * scale).round() / scale
}

/// Fixed-denominator rational. Negative input loses its sign; EXIF rationals
/// are unsigned and the sign is carried by the reference tags.
fn rational(value: f64, denom: u32) -> Rational {
    Rational {
        num: (value.abs() * denom as f64).round() as u32,
        denom,
    }
}

fn dms_rationals(deg: u32, min: u32, sec: f64) -> Value {
    Value::Rational(vec![
        Rational { num: deg, denom: 1 },
        Rational { num: min, denom: 1 },
        rational(sec, 100_000),
    ])
}
