use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The category assigned when no rule clears the confidence threshold.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// The category burst members are promoted to.
pub const EVENT_CATEGORY: &str = "Event";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Worker pool size for metadata extraction.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Files per exiftool invocation when the cache is disabled.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    /// Location of the persistent metadata cache. Defaults to the platform
    /// cache directory.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Optional progress marker enabling resumable runs.
    #[serde(default)]
    pub progress_file: Option<PathBuf>,
    /// Per-file extraction timeout.
    #[serde(default = "default_extract_timeout")]
    pub extract_timeout_secs: u64,
    /// Per-batch extraction timeout, independent of batch size.
    #[serde(default = "default_batch_timeout")]
    pub batch_timeout_secs: u64,
    /// Minimum top score required to accept a non-Uncategorized result.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default)]
    pub burst: BurstConfig,
    /// Category rules. Declaration order is the tie-break order.
    #[serde(default = "default_categories")]
    pub categories: Vec<CategoryRule>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            batch_size: default_batch_size(),
            cache_enabled: true,
            cache_dir: default_cache_dir(),
            progress_file: None,
            extract_timeout_secs: default_extract_timeout(),
            batch_timeout_secs: default_batch_timeout(),
            confidence_threshold: default_confidence_threshold(),
            burst: BurstConfig::default(),
            categories: default_categories(),
        }
    }
}

fn default_max_workers() -> usize {
    (num_cpus::get() + 4).min(32)
}

fn default_batch_size() -> usize {
    50
}

fn default_true() -> bool {
    true
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("rawsort")
}

fn default_extract_timeout() -> u64 {
    30
}

fn default_batch_timeout() -> u64 {
    60
}

fn default_confidence_threshold() -> f64 {
    3.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BurstConfig {
    /// Maximum gap between adjacent photos in a burst (timestamp path).
    #[serde(default = "default_burst_window")]
    pub window_secs: f64,
    /// Minimum run length for a burst group.
    #[serde(default = "default_burst_min_len")]
    pub min_len: usize,
    /// Maximum filename sequence-number gap (deprecated fallback path, used
    /// only when no record carries a capture timestamp).
    #[serde(default = "default_sequence_gap")]
    pub sequence_gap: u64,
    /// Maximum adjacent file-mtime gap on the fallback path. Applied only
    /// when both files have a known mtime; capture timestamps do not exist
    /// on this path at all.
    #[serde(default = "default_sequence_window")]
    pub sequence_window_secs: f64,
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self {
            window_secs: default_burst_window(),
            min_len: default_burst_min_len(),
            sequence_gap: default_sequence_gap(),
            sequence_window_secs: default_sequence_window(),
        }
    }
}

fn default_burst_window() -> f64 {
    1.0
}

fn default_burst_min_len() -> usize {
    5
}

fn default_sequence_gap() -> u64 {
    3
}

fn default_sequence_window() -> f64 {
    30.0
}

/// One scoring rule per category. All thresholds are optional; a rule with no
/// thresholds (e.g. Event) only participates through burst promotion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRule {
    pub name: String,
    /// Inclusive focal length range in millimeters.
    #[serde(default)]
    pub focal_range: Option<(f64, f64)>,
    #[serde(default)]
    pub f_number_max: Option<f64>,
    #[serde(default)]
    pub f_number_min: Option<f64>,
    #[serde(default)]
    pub iso_min: Option<u32>,
    #[serde(default)]
    pub subject_distance_max_cm: Option<f64>,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl CategoryRule {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            focal_range: None,
            f_number_max: None,
            f_number_min: None,
            iso_min: None,
            subject_distance_max_cm: None,
            weight: 1.0,
        }
    }

    pub fn with_focal_range(mut self, lo: f64, hi: f64) -> Self {
        self.focal_range = Some((lo, hi));
        self
    }
}

/// The built-in rule set. Order matters: it is the classification tie-break
/// order.
pub fn default_categories() -> Vec<CategoryRule> {
    vec![
        CategoryRule {
            f_number_max: Some(2.8),
            ..CategoryRule::named("Portrait").with_focal_range(50.0, 135.0)
        },
        CategoryRule {
            f_number_min: Some(8.0),
            ..CategoryRule::named("Landscape").with_focal_range(0.0, 35.0)
        },
        CategoryRule::named("Street").with_focal_range(28.0, 50.0),
        CategoryRule::named(EVENT_CATEGORY),
        CategoryRule::named("Wildlife").with_focal_range(200.0, 999.0),
        CategoryRule::named("Sports").with_focal_range(200.0, 999.0),
        CategoryRule {
            subject_distance_max_cm: Some(50.0),
            ..CategoryRule::named("Macro")
        },
        CategoryRule::named("Architecture").with_focal_range(0.0, 24.0),
        CategoryRule {
            iso_min: Some(1600),
            ..CategoryRule::named("Night")
        },
    ]
}
