//! Rule-based category scoring.
//!
//! `score` is a pure, total function over any record: every indicator for
//! every category is always evaluated, contributions are unconditional
//! weighted additions or subtractions, and per-category totals clamp at zero
//! so one category can never count against another.

use crate::config::schema::{CategoryRule, UNCATEGORIZED};
use crate::metadata::PhotoRecord;

// Indicator contributions, multiplied by the rule's weight.
const FOCAL_MATCH: f64 = 3.0;
const FOCAL_MISS_PENALTY: f64 = 1.0;
const APERTURE_MATCH: f64 = 2.0;
const ISO_MATCH: f64 = 2.0;
const SUBJECT_DISTANCE_MATCH: f64 = 3.0;
const SCENE_MODE_MATCH: f64 = 5.0;
const MACRO_LENS_MATCH: f64 = 5.0;
const AF_AREA_MATCH: f64 = 1.0;
const METERING_MATCH: f64 = 1.0;
const STREET_APERTURE_MATCH: f64 = 1.0;
const CONTINUOUS_AF_TRACKING: f64 = 1.0;
const CONTINUOUS_AF_SPORTS: f64 = 2.0;
const FAST_SHUTTER_MATCH: f64 = 2.0;
const MEDIUM_SHUTTER_MATCH: f64 = 1.0;

const FAST_SHUTTER_SECS: f64 = 1.0 / 500.0;
const MEDIUM_SHUTTER_SECS: f64 = 1.0 / 100.0;

pub struct Scorer {
    rules: Vec<CategoryRule>,
    confidence_threshold: f64,
}

impl Scorer {
    pub fn new(rules: Vec<CategoryRule>, confidence_threshold: f64) -> Self {
        Self {
            rules,
            confidence_threshold,
        }
    }

    pub fn rules(&self) -> &[CategoryRule] {
        &self.rules
    }

    /// Scores a record against every rule, in rule declaration order.
    pub fn score(&self, record: &PhotoRecord) -> Vec<(String, f64)> {
        self.rules
            .iter()
            .map(|rule| (rule.name.clone(), score_category(rule, record)))
            .collect()
    }

    /// Picks the category with the strictly greatest score. Ties resolve to
    /// the earliest rule in declaration order; a maximum below the confidence
    /// threshold yields "Uncategorized".
    pub fn classify(&self, record: &PhotoRecord) -> String {
        let mut best: Option<(&CategoryRule, f64)> = None;

        for rule in &self.rules {
            let score = score_category(rule, record);
            let beats = match best {
                Some((_, best_score)) => score > best_score,
                None => true,
            };
            if beats {
                best = Some((rule, score));
            }
        }

        match best {
            Some((rule, score)) if score >= self.confidence_threshold => rule.name.clone(),
            _ => UNCATEGORIZED.to_string(),
        }
    }
}

fn score_category(rule: &CategoryRule, record: &PhotoRecord) -> f64 {
    let w = rule.weight;
    let mut score = 0.0;

    if let Some((lo, hi)) = rule.focal_range {
        if record.focal_length_mm > 0.0 {
            if (lo..=hi).contains(&record.focal_length_mm) {
                score += FOCAL_MATCH * w;
            } else {
                score -= FOCAL_MISS_PENALTY * w;
            }
        }
    }

    if let Some(max) = rule.f_number_max {
        if record.f_number > 0.0 && record.f_number <= max {
            score += APERTURE_MATCH * w;
        }
    }

    if let Some(min) = rule.f_number_min {
        if record.f_number >= min {
            score += APERTURE_MATCH * w;
        }
    }

    if let Some(min) = rule.iso_min {
        if record.iso >= min {
            score += ISO_MATCH * w;
        }
        if record.iso >= min.saturating_mul(2) {
            score += ISO_MATCH * w;
        }
    }

    if let Some(max_cm) = rule.subject_distance_max_cm {
        if let Some(cm) = parse_subject_distance_cm(&record.subject_distance) {
            if cm < max_cm {
                score += SUBJECT_DISTANCE_MATCH * w;
            }
        }
    }

    if !record.scene_mode.is_empty()
        && record
            .scene_mode
            .to_lowercase()
            .contains(&rule.name.to_lowercase())
    {
        score += SCENE_MODE_MATCH * w;
    }

    score += name_keyed_score(rule, record) * w;

    score.max(0.0)
}

/// Behavioral refinements keyed by the conventional category names. Custom
/// category names simply contribute nothing here.
fn name_keyed_score(rule: &CategoryRule, record: &PhotoRecord) -> f64 {
    let mut score = 0.0;

    match rule.name.as_str() {
        "Portrait" => {
            if matches!(
                record.af_area_mode.as_str(),
                "Center" | "Spot" | "Flexible Spot"
            ) {
                score += AF_AREA_MATCH;
            }
        }
        "Landscape" => {
            if matches!(record.af_area_mode.as_str(), "Wide" | "Zone") {
                score += AF_AREA_MATCH;
            }
        }
        "Street" => {
            if matches!(
                record.metering_mode.as_str(),
                "Average" | "Center-weighted average"
            ) {
                score += METERING_MATCH;
            }
            if is_continuous_af(record) {
                score += CONTINUOUS_AF_TRACKING;
            }
            if record.f_number >= 4.0 && record.f_number <= 8.0 {
                score += STREET_APERTURE_MATCH;
            }
        }
        "Wildlife" => {
            if is_continuous_af(record) {
                score += CONTINUOUS_AF_TRACKING;
            }
        }
        "Sports" => {
            if is_continuous_af(record) {
                score += CONTINUOUS_AF_SPORTS;
            }
            if let Some(secs) = parse_shutter_secs(&record.shutter_speed) {
                if secs <= FAST_SHUTTER_SECS {
                    score += FAST_SHUTTER_MATCH;
                } else if secs <= MEDIUM_SHUTTER_SECS {
                    score += MEDIUM_SHUTTER_MATCH;
                }
            }
        }
        "Macro" => {
            if record.lens_model.to_lowercase().contains("macro") {
                score += MACRO_LENS_MATCH;
            }
        }
        _ => {}
    }

    score
}

fn is_continuous_af(record: &PhotoRecord) -> bool {
    matches!(record.focus_mode.as_str(), "AF-C" | "Continuous AF")
}

/// Parses camera-native shutter notation. "1/500" is the fraction 1/500
/// seconds; plain decimals ("0.5", "2") are accepted for long exposures.
/// Unparsable or missing strings return `None` and contribute nothing.
pub fn parse_shutter_secs(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let secs = if let Some((num, den)) = trimmed.split_once('/') {
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        if den == 0.0 {
            return None;
        }
        num / den
    } else {
        trimmed.parse().ok()?
    };

    (secs.is_finite() && secs > 0.0).then_some(secs)
}

/// Parses subject distance strings with unit suffixes ("35 cm", "2.40 m")
/// into centimeters.
pub fn parse_subject_distance_cm(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();

    let cm = if let Some(num) = trimmed.strip_suffix("cm") {
        num.trim().parse::<f64>().ok()?
    } else if let Some(num) = trimmed.strip_suffix('m') {
        num.trim().parse::<f64>().ok()? * 100.0
    } else {
        return None;
    };

    (cm.is_finite() && cm >= 0.0).then_some(cm)
}
