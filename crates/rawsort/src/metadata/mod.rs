//! Per-photo metadata records and the exiftool JSON field parsing that
//! produces them.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Folder names that never count as a prior category when inferring one from
/// the record's containing directory.
const NON_CATEGORY_DIRS: &[&str] = &["organized_photos", "photos", "raw", "input", "output"];

/// One record per source file. Immutable once produced by the extraction
/// pipeline, except for `assigned_category`: set once by the scorer and
/// overwritten at most once more by burst promotion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoRecord {
    pub file_path: PathBuf,
    pub file_size: u64,
    /// Source file modification time, unix seconds.
    pub modified_time: i64,
    pub camera_make: String,
    pub camera_model: String,
    pub lens_model: String,
    /// 0.0 when unknown.
    pub focal_length_mm: f64,
    /// 0.0 when unknown.
    pub f_number: f64,
    /// 0 when unknown.
    pub iso: u32,
    /// Camera-native fraction notation, e.g. "1/500". Empty when absent.
    pub shutter_speed: String,
    pub metering_mode: String,
    pub focus_mode: String,
    pub af_area_mode: String,
    pub scene_mode: String,
    pub exposure_mode: String,
    pub flash: String,
    /// String with unit suffix, e.g. "35 cm". Empty when absent.
    pub subject_distance: String,
    /// Epoch seconds including any sub-second component; 0.0 when unknown.
    pub capture_timestamp: f64,
    /// Category inferred from the containing folder name, if it names one.
    pub prior_category: Option<String>,
    /// Empty until the scorer has run.
    #[serde(default)]
    pub assigned_category: String,
}

impl PhotoRecord {
    /// Builds a record from one exiftool `-j` output object.
    pub fn from_exif(path: &Path, exif: &Value, file_size: u64, modified_time: i64) -> Self {
        let capture_timestamp = parse_capture_timestamp(exif);

        Self {
            file_path: path.to_path_buf(),
            file_size,
            modified_time,
            camera_make: string_field(exif, &["Make"]),
            camera_model: string_field(exif, &["Model"]),
            lens_model: string_field(exif, &["LensModel", "LensSpec"]),
            focal_length_mm: numeric_field(exif, &["FocalLength"]),
            f_number: numeric_field(exif, &["FNumber"]),
            iso: numeric_field(exif, &["ISO"]) as u32,
            shutter_speed: string_field(exif, &["ShutterSpeed", "ExposureTime"]),
            metering_mode: string_field(exif, &["MeteringMode"]),
            focus_mode: string_field(exif, &["FocusMode"]),
            af_area_mode: string_field(exif, &["AFAreaModeSetting", "AFAreaMode"]),
            scene_mode: string_field(exif, &["SceneMode"]),
            exposure_mode: string_field(exif, &["ExposureMode"]),
            flash: string_field(exif, &["Flash"]),
            subject_distance: string_field(exif, &["SubjectDistance"]),
            capture_timestamp,
            prior_category: prior_category_from_path(path),
            assigned_category: String::new(),
        }
    }

    /// Minimal record for files where only filesystem information is known.
    pub fn from_stat(path: &Path, file_size: u64, modified_time: i64) -> Self {
        Self::from_exif(path, &Value::Null, file_size, modified_time)
    }

    /// Capture year and month for date-based subfolder placement. Falls back
    /// to a `YYYYMMDD-` filename prefix when the timestamp is unknown.
    pub fn capture_year_month(&self) -> Option<(i32, u32)> {
        if self.capture_timestamp > 0.0 {
            let dt = DateTime::from_timestamp(self.capture_timestamp as i64, 0)?;
            return Some((dt.year(), dt.month()));
        }

        parse_date_from_filename(&self.file_path)
    }

    /// Trailing sequence number in the file stem (e.g. "CVR00482" -> 482).
    /// Used only by the deprecated sequence-based burst fallback.
    pub fn sequence_number(&self) -> Option<u64> {
        let stem = self.file_path.file_stem()?.to_str()?;
        let digits: String = stem
            .chars()
            .rev()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if digits.is_empty() {
            return None;
        }

        digits.chars().rev().collect::<String>().parse().ok()
    }
}

fn string_field(exif: &Value, keys: &[&str]) -> String {
    for key in keys {
        match exif.get(key) {
            Some(Value::String(s)) if !s.is_empty() => return s.clone(),
            Some(Value::Number(n)) => return n.to_string(),
            _ => continue,
        }
    }
    String::new()
}

/// Reads a numeric field that exiftool may emit as a number or as a string
/// with a unit suffix ("50.0 mm"). Returns 0.0 when absent or unparsable.
fn numeric_field(exif: &Value, keys: &[&str]) -> f64 {
    for key in keys {
        match exif.get(key) {
            Some(Value::Number(n)) => return n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => {
                let numeric: String = s
                    .trim()
                    .chars()
                    .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                    .collect();
                if let Ok(v) = numeric.parse::<f64>() {
                    return v;
                }
            }
            _ => continue,
        }
    }
    0.0
}

/// Parses the capture timestamp from the usual date fields, preferring
/// DateTimeOriginal. Unparsable or absent dates yield 0.0.
fn parse_capture_timestamp(exif: &Value) -> f64 {
    let base = ["DateTimeOriginal", "CreateDate"].iter().find_map(|key| {
        let raw = exif.get(*key)?.as_str()?;
        parse_exif_datetime(raw)
    });

    let Some(base) = base else {
        return 0.0;
    };

    base + parse_subseconds(exif)
}

/// Exif dates use "2024:09:08 14:30:25", optionally followed by a timezone
/// offset which is ignored here (local capture time orders a collection
/// consistently as long as it is applied uniformly).
fn parse_exif_datetime(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.len() < 19 {
        return None;
    }

    NaiveDateTime::parse_from_str(&trimmed[..19], "%Y:%m:%d %H:%M:%S")
        .ok()
        .map(|dt| dt.and_utc().timestamp() as f64)
}

/// SubSecTimeOriginal is a bare digit string: "57" means 0.57 seconds.
fn parse_subseconds(exif: &Value) -> f64 {
    ["SubSecTimeOriginal", "SubSecTime"]
        .iter()
        .find_map(|key| {
            let raw = exif.get(*key)?.as_str()?.trim();
            if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            let value: f64 = raw.parse().ok()?;
            Some(value / 10f64.powi(raw.len() as i32))
        })
        .unwrap_or(0.0)
}

/// Infers a prior category from the record's containing folder name.
/// Date-like names (2024, 2024-09, 2024-09-08, 09) and known container
/// names never count.
pub fn prior_category_from_path(path: &Path) -> Option<String> {
    let parent = path.parent()?.file_name()?.to_str()?;

    if parent.is_empty() || is_date_like(parent) {
        return None;
    }

    let lowered = parent.to_lowercase();
    if NON_CATEGORY_DIRS.contains(&lowered.as_str()) {
        return None;
    }

    Some(parent.to_string())
}

fn is_date_like(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_digit() || c == '-')
}

/// Parses dates from filename prefixes like "20240908-CVR00482.ARW".
fn parse_date_from_filename(path: &Path) -> Option<(i32, u32)> {
    let name = path.file_name()?.to_str()?;
    let re = regex::Regex::new(r"^(\d{4})(\d{2})(\d{2})-").ok()?;
    let caps = re.captures(name)?;

    let year: i32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let day: u32 = caps[3].parse().ok()?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }

    Some((year, month))
}
