use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

/// One sidecar metadata record: the media item's declared title, true
/// capture time and location. Produced once per media item by the export.
#[derive(Debug, Clone)]
pub struct MetadataRecord {
    pub title: String,
    /// Capture time as epoch seconds (UTC).
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

#[derive(Deserialize)]
struct Sidecar {
    title: String,
    #[serde(rename = "photoTakenTime", default)]
    photo_taken_time: TimeBlock,
    #[serde(rename = "geoData", default)]
    geo_data: GeoData,
    #[serde(rename = "geoDataExif", default)]
    geo_data_exif: GeoData,
}

#[derive(Deserialize, Default)]
struct TimeBlock {
    #[serde(default)]
    timestamp: Timestamp,
}

/// The export writes the epoch either as a quoted string or a bare integer.
#[derive(Deserialize)]
#[serde(untagged)]
enum Timestamp {
    Text(String),
    Int(i64),
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::Int(0)
    }
}

impl Timestamp {
    fn epoch(&self) -> anyhow::Result<i64> {
        match self {
            Timestamp::Text(s) => s
                .parse()
                .with_context(|| format!("bad epoch timestamp {:?}", s)),
            Timestamp::Int(v) => Ok(*v),
        }
    }
}

#[derive(Deserialize, Default, Clone, Copy)]
struct GeoData {
    #[serde(default)]
    latitude: f64,
    #[serde(default)]
    longitude: f64,
    #[serde(default)]
    altitude: f64,
}

impl GeoData {
    fn is_zero(&self) -> bool {
        self.latitude == 0.0 && self.longitude == 0.0 && self.altitude == 0.0
    }
}

/// Read and parse one sidecar JSON file.
pub fn read_sidecar(path: &Path) -> anyhow::Result<MetadataRecord> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    parse_sidecar(&bytes).with_context(|| format!("parsing {}", path.display()))
}

/// Parse sidecar JSON bytes. The app-level `geoData` block is often zeroed
/// while the `geoDataExif` copy carries the real fix, so fall back to it.
pub fn parse_sidecar(bytes: &[u8]) -> anyhow::Result<MetadataRecord> {
    let sidecar: Sidecar = serde_json::from_slice(bytes)?;

    let geo = if sidecar.geo_data.is_zero() {
        sidecar.geo_data_exif
    } else {
        sidecar.geo_data
    };

    Ok(MetadataRecord {
        title: sidecar.title,
        timestamp: sidecar.photo_taken_time.timestamp.epoch()?,
        latitude: geo.latitude,
        longitude: geo.longitude,
        altitude: geo.altitude,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_string_timestamp() {
        let json = br#"{
            "title": "IMG_0001.jpg",
            "photoTakenTime": {"timestamp": "1600000000"},
            "geoData": {"latitude": -33.45, "longitude": -70.66, "altitude": 520.0}
        }"#;
        let rec = parse_sidecar(json).unwrap();
        assert_eq!(rec.title, "IMG_0001.jpg");
        assert_eq!(rec.timestamp, 1_600_000_000);
        assert_eq!(rec.latitude, -33.45);
    }

    #[test]
    fn test_parse_integer_timestamp() {
        let json = br#"{
            "title": "clip.mp4",
            "photoTakenTime": {"timestamp": 1234567890}
        }"#;
        let rec = parse_sidecar(json).unwrap();
        assert_eq!(rec.timestamp, 1_234_567_890);
        assert_eq!(rec.latitude, 0.0);
    }

    #[test]
    fn test_geo_data_exif_fallback() {
        let json = br#"{
            "title": "a.jpg",
            "photoTakenTime": {"timestamp": "1"},
            "geoData": {"latitude": 0.0, "longitude": 0.0, "altitude": 0.0},
            "geoDataExif": {"latitude": 48.85, "longitude": 2.35, "altitude": 35.0}
        }"#;
        let rec = parse_sidecar(json).unwrap();
        assert_eq!(rec.latitude, 48.85);
        assert_eq!(rec.longitude, 2.35);
    }

    #[test]
    fn test_missing_title_is_error() {
        assert!(parse_sidecar(br#"{"photoTakenTime": {"timestamp": "1"}}"#).is_err());
    }

    #[test]
    fn test_unparsable_timestamp_is_error() {
        let json = br#"{"title": "a.jpg", "photoTakenTime": {"timestamp": "soon"}}"#;
        assert!(parse_sidecar(json).is_err());
    }
}
