//! Burst sequence detection.
//!
//! A burst is a run of at least `min_len` records where every adjacent pair
//! of capture timestamps is at most `window_secs` apart. Detection is a pure
//! pass over the scored record set; promotion rewrites member categories.

use log::{debug, info};

use crate::config::schema::EVENT_CATEGORY;
use crate::metadata::PhotoRecord;

/// Indices into the record slice handed to [`detect`], in capture order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurstGroup {
    pub members: Vec<usize>,
}

impl BurstGroup {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Detects bursts by capture timestamp.
///
/// Records are ordered by `(capture_timestamp, file_path)` and scanned once;
/// a run closes when the gap to the next record exceeds the window. A run
/// always contains the record that started it. Records with an unknown
/// (zero) timestamp are never within the window of anything.
pub fn detect(records: &[PhotoRecord], window_secs: f64, min_len: usize) -> Vec<BurstGroup> {
    if records.len() < min_len || min_len == 0 {
        return Vec::new();
    }

    let mut order: Vec<usize> = (0..records.len()).collect();
    order.sort_by(|&a, &b| {
        records[a]
            .capture_timestamp
            .total_cmp(&records[b].capture_timestamp)
            .then_with(|| records[a].file_path.cmp(&records[b].file_path))
    });

    let mut groups = Vec::new();
    let mut run: Vec<usize> = Vec::new();

    for &idx in &order {
        let within = match run.last() {
            Some(&prev) => {
                let prev_ts = records[prev].capture_timestamp;
                let ts = records[idx].capture_timestamp;
                prev_ts > 0.0 && ts > 0.0 && ts - prev_ts <= window_secs
            }
            None => false,
        };

        if within {
            run.push(idx);
        } else {
            close_run(&mut groups, &mut run, min_len);
            run.push(idx);
        }
    }
    close_run(&mut groups, &mut run, min_len);

    debug!(
        "Burst detection found {} group(s) across {} records",
        groups.len(),
        records.len()
    );
    groups
}

/// Fallback detection over trailing filename sequence numbers, for
/// collections whose files carry no capture timestamps at all. A run
/// tolerates numeric gaps up to `max_gap` (skipped frames) and, when both
/// files have a known modification time, requires adjacent mtimes within
/// `window_secs`. An unknown (zero) mtime skips the time check rather than
/// breaking the run, since archives on this path often lack reliable
/// filesystem times too.
#[deprecated(note = "timestamp-based detect() is canonical; kept for timestamp-free archives")]
pub fn detect_by_sequence(
    records: &[PhotoRecord],
    max_gap: u64,
    window_secs: f64,
    min_len: usize,
) -> Vec<BurstGroup> {
    if records.len() < min_len || min_len == 0 {
        return Vec::new();
    }

    let mut numbered: Vec<(usize, u64)> = records
        .iter()
        .enumerate()
        .filter_map(|(i, r)| r.sequence_number().map(|n| (i, n)))
        .collect();
    numbered.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| {
        records[a.0].file_path.cmp(&records[b.0].file_path)
    }));

    let mut groups = Vec::new();
    let mut run: Vec<usize> = Vec::new();
    let mut prev: Option<(usize, u64)> = None;

    for (idx, seq) in numbered {
        let within = match prev {
            Some((prev_idx, prev_seq)) => {
                let seq_ok = seq.saturating_sub(prev_seq) <= max_gap;

                let prev_mtime = records[prev_idx].modified_time;
                let mtime = records[idx].modified_time;
                let time_ok = prev_mtime <= 0
                    || mtime <= 0
                    || (mtime - prev_mtime).unsigned_abs() as f64 <= window_secs;

                seq_ok && time_ok
            }
            None => false,
        };

        if !within {
            close_run(&mut groups, &mut run, min_len);
        }
        run.push(idx);
        prev = Some((idx, seq));
    }
    close_run(&mut groups, &mut run, min_len);

    groups
}

fn close_run(groups: &mut Vec<BurstGroup>, run: &mut Vec<usize>, min_len: usize) {
    if run.len() >= min_len {
        groups.push(BurstGroup {
            members: std::mem::take(run),
        });
    } else {
        run.clear();
    }
}

/// Rewrites every burst member's category to the burst category. Returns the
/// number of records promoted.
pub fn promote(records: &mut [PhotoRecord], groups: &[BurstGroup]) -> usize {
    let mut promoted = 0;
    for group in groups {
        for &idx in &group.members {
            records[idx].assigned_category = EVENT_CATEGORY.to_string();
            promoted += 1;
        }
    }

    if promoted > 0 {
        info!(
            "Promoted {} record(s) across {} burst group(s)",
            promoted,
            groups.len()
        );
    }
    promoted
}
