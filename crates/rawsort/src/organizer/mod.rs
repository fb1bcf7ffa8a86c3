//! Physical reorganization of classified photos into
//! `<output_root>/<category>/<YYYY-MM>/` folders.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::config::schema::UNCATEGORIZED;
use crate::error::OrganizeError;
use crate::metadata::PhotoRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Copy,
    Move,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub source: PathBuf,
    pub target: PathBuf,
    pub category: String,
}

#[derive(Debug, Default)]
pub struct OrganizePlan {
    pub entries: Vec<PlanEntry>,
}

/// Outcome of applying a plan. Failures are per-file and never abort the
/// rest of the plan.
#[derive(Debug, Default)]
pub struct OrganizeReport {
    pub organized_by_category: BTreeMap<String, usize>,
    pub failures: Vec<(PathBuf, OrganizeError)>,
}

impl OrganizeReport {
    pub fn organized_total(&self) -> usize {
        self.organized_by_category.values().sum()
    }
}

pub struct Organizer {
    output_root: PathBuf,
    mode: TransferMode,
}

impl Organizer {
    pub fn new<P: AsRef<Path>>(output_root: P, mode: TransferMode) -> Self {
        Self {
            output_root: output_root.as_ref().to_path_buf(),
            mode,
        }
    }

    /// Maps each record to its target path. Records without a capture date
    /// land directly under their category folder. Pure; touches no files.
    pub fn plan(&self, records: &[PhotoRecord]) -> OrganizePlan {
        let entries = records
            .iter()
            .map(|record| {
                let category = if record.assigned_category.is_empty() {
                    UNCATEGORIZED
                } else {
                    record.assigned_category.as_str()
                };

                let mut target = self.output_root.join(category);
                if let Some((year, month)) = record.capture_year_month() {
                    target.push(format!("{:04}-{:02}", year, month));
                }
                if let Some(name) = record.file_path.file_name() {
                    target.push(name);
                }

                PlanEntry {
                    source: record.file_path.clone(),
                    target,
                    category: category.to_string(),
                }
            })
            .collect();

        OrganizePlan { entries }
    }

    /// Executes a plan entry by entry. An existing target or a failed
    /// transfer fails only that entry.
    pub fn apply(&self, plan: &OrganizePlan) -> OrganizeReport {
        let mut report = OrganizeReport::default();

        for entry in &plan.entries {
            match self.apply_entry(entry) {
                Ok(()) => {
                    *report
                        .organized_by_category
                        .entry(entry.category.clone())
                        .or_insert(0) += 1;
                }
                Err(e) => {
                    warn!("Failed to organize '{}': {}", entry.source.display(), e);
                    report.failures.push((entry.source.clone(), e));
                }
            }
        }

        info!(
            "Organized {} photo(s) into {} ({} failure(s))",
            report.organized_total(),
            self.output_root.display(),
            report.failures.len()
        );
        report
    }

    fn apply_entry(&self, entry: &PlanEntry) -> Result<(), OrganizeError> {
        if entry.target.exists() {
            return Err(OrganizeError::TargetExists(entry.target.clone()));
        }

        if let Some(parent) = entry.target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| OrganizeError::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        match self.mode {
            TransferMode::Copy => copy_file(&entry.source, &entry.target),
            TransferMode::Move => move_file(&entry.source, &entry.target),
        }
    }
}

fn copy_file(from: &Path, to: &Path) -> Result<(), OrganizeError> {
    std::fs::copy(from, to)
        .map(|_| ())
        .map_err(|e| OrganizeError::TransferFile {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source: e,
        })
}

/// Rename first; cross-device moves fall back to copy plus delete.
fn move_file(from: &Path, to: &Path) -> Result<(), OrganizeError> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }

    debug!(
        "Rename failed for '{}', falling back to copy and delete",
        from.display()
    );
    copy_file(from, to)?;
    std::fs::remove_file(from).map_err(|e| OrganizeError::TransferFile {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(path: &Path, category: &str, timestamp: f64) -> PhotoRecord {
        let mut record = PhotoRecord::from_stat(path, 0, 0);
        record.assigned_category = category.to_string();
        record.capture_timestamp = timestamp;
        record
    }

    // 2024-09-08 14:30:25 UTC
    const SEPT_2024: f64 = 1_725_805_825.0;

    #[test]
    fn test_plan_uses_category_and_month() {
        let organizer = Organizer::new("/out", TransferMode::Copy);
        let records = vec![record(Path::new("/in/a.arw"), "Portrait", SEPT_2024)];

        let plan = organizer.plan(&records);
        assert_eq!(
            plan.entries[0].target,
            PathBuf::from("/out/Portrait/2024-09/a.arw")
        );
    }

    #[test]
    fn test_plan_without_date_omits_month_folder() {
        let organizer = Organizer::new("/out", TransferMode::Copy);
        let records = vec![record(Path::new("/in/a.arw"), "Portrait", 0.0)];

        let plan = organizer.plan(&records);
        assert_eq!(plan.entries[0].target, PathBuf::from("/out/Portrait/a.arw"));
    }

    #[test]
    fn test_plan_empty_category_is_uncategorized() {
        let organizer = Organizer::new("/out", TransferMode::Copy);
        let records = vec![record(Path::new("/in/a.arw"), "", 0.0)];

        let plan = organizer.plan(&records);
        assert_eq!(plan.entries[0].category, UNCATEGORIZED);
    }

    #[test]
    fn test_apply_copy() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("a.arw");
        std::fs::write(&source, b"raw").unwrap();

        let out = temp.path().join("out");
        let organizer = Organizer::new(&out, TransferMode::Copy);
        let plan = organizer.plan(&[record(&source, "Portrait", SEPT_2024)]);
        let report = organizer.apply(&plan);

        assert_eq!(report.organized_total(), 1);
        assert!(report.failures.is_empty());
        assert!(out.join("Portrait/2024-09/a.arw").exists());
        assert!(source.exists());
    }

    #[test]
    fn test_apply_move_removes_source() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("a.arw");
        std::fs::write(&source, b"raw").unwrap();

        let out = temp.path().join("out");
        let organizer = Organizer::new(&out, TransferMode::Move);
        let plan = organizer.plan(&[record(&source, "Night", 0.0)]);
        let report = organizer.apply(&plan);

        assert_eq!(report.organized_total(), 1);
        assert!(out.join("Night/a.arw").exists());
        assert!(!source.exists());
    }

    #[test]
    fn test_existing_target_fails_only_that_entry() {
        let temp = TempDir::new().unwrap();
        let first = temp.path().join("a.arw");
        let second = temp.path().join("b.arw");
        std::fs::write(&first, b"raw").unwrap();
        std::fs::write(&second, b"raw").unwrap();

        let out = temp.path().join("out");
        std::fs::create_dir_all(out.join("Portrait")).unwrap();
        std::fs::write(out.join("Portrait/a.arw"), b"already here").unwrap();

        let organizer = Organizer::new(&out, TransferMode::Copy);
        let plan = organizer.plan(&[
            record(&first, "Portrait", 0.0),
            record(&second, "Portrait", 0.0),
        ]);
        let report = organizer.apply(&plan);

        assert_eq!(report.organized_total(), 1);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            report.failures[0].1,
            OrganizeError::TargetExists(_)
        ));
        // The pre-existing file is untouched.
        assert_eq!(
            std::fs::read(out.join("Portrait/a.arw")).unwrap(),
            b"already here"
        );
    }

    #[test]
    fn test_missing_source_is_transfer_failure() {
        let temp = TempDir::new().unwrap();
        let organizer = Organizer::new(temp.path().join("out"), TransferMode::Copy);

        let plan = organizer.plan(&[record(Path::new("/nonexistent/a.arw"), "Portrait", 0.0)]);
        let report = organizer.apply(&plan);

        assert_eq!(report.organized_total(), 0);
        assert!(matches!(
            report.failures[0].1,
            OrganizeError::TransferFile { .. }
        ));
    }
}
