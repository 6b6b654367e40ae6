//! Aggregates computed once over a completed results table.

use serde::{Deserialize, Serialize};

use crate::results::ResultsTable;

/// How many samples fell at or under one latency threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdCount {
    pub threshold_us: f64,
    pub count: usize,
    /// Share of all samples, 0 to 100
    pub percentage: f64,
}

/// Latency distribution of a run, in microseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub samples: usize,
    pub thresholds: Vec<ThresholdCount>,
    /// Largest sample, 0 for an empty table
    pub max_us: f64,
    pub min_us: Option<f64>,
    pub mean_us: Option<f64>,
    pub median_us: Option<f64>,
    pub p95_us: Option<f64>,
    pub p99_us: Option<f64>,
}

impl LatencySummary {
    /// Summarizes every sample in `table` against `thresholds_us`.
    ///
    /// A sample counts toward a threshold when it is less than or equal to it.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_table(table: &ResultsTable, thresholds_us: &[f64]) -> Self {
        let mut sorted = table.samples().to_vec();
        sorted.sort_unstable_by(f64::total_cmp);
        let samples = sorted.len();

        let thresholds = thresholds_us
            .iter()
            .map(|&threshold_us| {
                // sorted ascending: the count is the insertion point past the threshold
                let count = sorted.partition_point(|sample| *sample <= threshold_us);
                let percentage = if samples == 0 {
                    0.0
                } else {
                    count as f64 / samples as f64 * 100.0
                };
                ThresholdCount {
                    threshold_us,
                    count,
                    percentage,
                }
            })
            .collect();

        let mean_us = if samples == 0 {
            None
        } else {
            Some(sorted.iter().sum::<f64>() / samples as f64)
        };

        Self {
            samples,
            thresholds,
            max_us: sorted.last().copied().unwrap_or(0.0),
            min_us: sorted.first().copied(),
            mean_us,
            median_us: median(&sorted),
            p95_us: percentile(&sorted, 0.95),
            p99_us: percentile(&sorted, 0.99),
        }
    }

    /// Returns the count for `threshold_us`, if it was summarized.
    #[must_use]
    pub fn count_at(&self, threshold_us: f64) -> Option<usize> {
        self.thresholds
            .iter()
            .find(|entry| entry.threshold_us.total_cmp(&threshold_us).is_eq())
            .map(|entry| entry.count)
    }
}

fn median(sorted: &[f64]) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Nearest-rank percentile of an ascending slice, `percentile` in `0.0..=1.0`.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn percentile(sorted: &[f64], percentile: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=1.0).contains(&percentile) {
        return None;
    }
    let rank = ((sorted.len() as f64) * percentile).ceil() as usize;
    let index = rank.saturating_sub(1);
    Some(sorted[index.min(sorted.len() - 1)])
}
