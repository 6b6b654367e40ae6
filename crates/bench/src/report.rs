//! CSV export and console report of a completed run.

use std::fmt::{self, Write as _};
use std::io::{self, Write};

use crate::driver::RunOutcome;
use crate::payload::Payload;
use crate::results::ResultsTable;
use crate::summary::LatencySummary;

/// Writes the timing table followed by the threshold summary.
///
/// One line per trial: the 1-based trial number, then that trial's sample
/// from every worker in worker order. The footer has one
/// `Count less than {t}us: {count} ({percentage}%)` line per threshold and a
/// final `Max duration: {max}` line.
///
/// # Errors
///
/// Propagates any error from `writer`.
pub fn write_timing_csv<W: Write>(
    mut writer: W,
    table: &ResultsTable,
    summary: &LatencySummary,
) -> io::Result<()> {
    for trial in 0..table.trials() {
        write!(writer, "{}", trial + 1)?;
        for sample in table.trial(trial) {
            write!(writer, ",{sample}")?;
        }
        writeln!(writer)?;
    }

    for entry in &summary.thresholds {
        writeln!(
            writer,
            "Count less than {}us: {} ({}%)",
            entry.threshold_us, entry.count, entry.percentage
        )?;
    }
    writeln!(writer, "Max duration: {}", summary.max_us)?;
    writer.flush()
}

/// Writes one comma-separated line of values per payload.
///
/// # Errors
///
/// Propagates any error from `writer`.
pub fn write_payload_csv<'a, W, I>(mut writer: W, payloads: I) -> io::Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a Payload>,
{
    for payload in payloads {
        let mut values = payload.as_slice().iter();
        if let Some(first) = values.next() {
            write!(writer, "{first}")?;
        }
        for value in values {
            write!(writer, ",{value}")?;
        }
        writeln!(writer)?;
    }
    writer.flush()
}

/// Console report of a run.
pub struct PerformanceReport<'a> {
    title: String,
    outcome: &'a RunOutcome,
    summary: LatencySummary,
}

impl<'a> PerformanceReport<'a> {
    #[must_use]
    pub fn new(title: impl Into<String>, outcome: &'a RunOutcome, summary: LatencySummary) -> Self {
        Self {
            title: title.into(),
            outcome,
            summary,
        }
    }

    #[must_use]
    pub const fn summary(&self) -> &LatencySummary {
        &self.summary
    }

    /// Generates a human-readable report.
    #[must_use]
    pub fn to_string_pretty(&self) -> String {
        let mut report = String::new();
        // writing into a String cannot fail
        let _ = self.write_pretty(&mut report);
        report
    }

    fn write_pretty(&self, report: &mut String) -> fmt::Result {
        let table = self.outcome.table();

        writeln!(report, "=== {} ===", self.title)?;
        writeln!(
            report,
            "Workers: {}  Trials: {}  Samples: {}",
            table.workers(),
            table.trials(),
            self.summary.samples
        )?;
        writeln!(report, "Duration: {:?}", self.outcome.elapsed())?;
        writeln!(
            report,
            "Throughput: {:.2} round trips/sec",
            self.outcome.throughput()
        )?;
        if let Some(high_water) = self.outcome.pending_high_water() {
            writeln!(report, "Pending high-water mark: {high_water}")?;
        }

        for entry in &self.summary.thresholds {
            writeln!(
                report,
                "Count less than {}us: {} ({}%)",
                entry.threshold_us, entry.count, entry.percentage
            )?;
        }
        writeln!(report, "Max duration: {}", self.summary.max_us)?;

        if self.summary.samples > 0 {
            writeln!(report, "\nLatency (us):")?;
            if let Some(min) = self.summary.min_us {
                writeln!(report, "  Min: {min:.3}")?;
            }
            if let Some(mean) = self.summary.mean_us {
                writeln!(report, "  Avg: {mean:.3}")?;
            }
            if let Some(median) = self.summary.median_us {
                writeln!(report, "  Median: {median:.3}")?;
            }
            if let Some(p95) = self.summary.p95_us {
                writeln!(report, "  P95: {p95:.3}")?;
            }
            if let Some(p99) = self.summary.p99_us {
                writeln!(report, "  P99: {p99:.3}")?;
            }
            writeln!(report, "  Max: {:.3}", self.summary.max_us)?;
        }

        Ok(())
    }
}

impl fmt::Display for PerformanceReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_pretty())
    }
}

/// Reporter for generating performance reports.
pub struct Reporter;

impl Reporter {
    /// Summarizes `outcome` against `thresholds_us` and wraps it in a report.
    #[must_use]
    pub fn generate<'a>(
        title: impl Into<String>,
        outcome: &'a RunOutcome,
        thresholds_us: &[f64],
    ) -> PerformanceReport<'a> {
        let summary = LatencySummary::from_table(outcome.table(), thresholds_us);
        PerformanceReport::new(title, outcome, summary)
    }
}
