use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_yaml::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

/// Validates a configuration. Errors here are fatal and must be reported
/// before any extraction begins.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.max_workers == 0 {
        return Err(ConfigError::Validation {
            message: "max_workers must be at least 1".to_string(),
        });
    }

    if config.batch_size == 0 {
        return Err(ConfigError::Validation {
            message: "batch_size must be at least 1".to_string(),
        });
    }

    if !config.confidence_threshold.is_finite() || config.confidence_threshold < 0.0 {
        return Err(ConfigError::Validation {
            message: format!(
                "confidence_threshold must be a non-negative number, got {}",
                config.confidence_threshold
            ),
        });
    }

    if !config.burst.window_secs.is_finite() || config.burst.window_secs <= 0.0 {
        return Err(ConfigError::Validation {
            message: format!(
                "burst.window_secs must be positive, got {}",
                config.burst.window_secs
            ),
        });
    }

    if !config.burst.sequence_window_secs.is_finite() || config.burst.sequence_window_secs <= 0.0 {
        return Err(ConfigError::Validation {
            message: format!(
                "burst.sequence_window_secs must be positive, got {}",
                config.burst.sequence_window_secs
            ),
        });
    }

    if config.burst.min_len < 2 {
        return Err(ConfigError::Validation {
            message: "burst.min_len must be at least 2".to_string(),
        });
    }

    if config.categories.is_empty() {
        return Err(ConfigError::Validation {
            message: "at least one category rule is required".to_string(),
        });
    }

    let mut names = std::collections::HashSet::new();
    for rule in &config.categories {
        if rule.name.trim().is_empty() {
            return Err(ConfigError::InvalidRule {
                name: rule.name.clone(),
                reason: "Category name must not be empty".to_string(),
            });
        }

        if !names.insert(&rule.name) {
            return Err(ConfigError::InvalidRule {
                name: rule.name.clone(),
                reason: "Duplicate category name".to_string(),
            });
        }

        if !rule.weight.is_finite() || rule.weight <= 0.0 {
            return Err(ConfigError::InvalidRule {
                name: rule.name.clone(),
                reason: format!("weight must be positive, got {}", rule.weight),
            });
        }

        if let Some((lo, hi)) = rule.focal_range {
            if !lo.is_finite() || !hi.is_finite() || lo < 0.0 || lo > hi {
                return Err(ConfigError::InvalidRule {
                    name: rule.name.clone(),
                    reason: format!("focal_range ({}, {}) is not a valid range", lo, hi),
                });
            }
        }

        for (field, value) in [
            ("f_number_max", rule.f_number_max),
            ("f_number_min", rule.f_number_min),
            ("subject_distance_max_cm", rule.subject_distance_max_cm),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v <= 0.0 {
                    return Err(ConfigError::InvalidRule {
                        name: rule.name.clone(),
                        reason: format!("{} must be positive, got {}", field, v),
                    });
                }
            }
        }
    }

    Ok(())
}
