//! Drives reports through range → query → fetch → transform → write.
//!
//! Reports run strictly one after another. A failing report is logged and
//! recorded in the [`RunSummary`]; it never stops the ones after it, and it
//! never reaches the writer with a partial payload.

use crate::date_range::{compute, CivilClock};
use crate::loader::{ReportSource, SourceError};
use crate::output::{OutputError, SheetPayload, SheetWriter};
use crate::query::{self, Query};
use crate::spec::ReportSpec;
use crate::transform::{transform, TransformError};
use crate::types::{DateRange, ReportRow, RunStats, SummaryRow};
use chrono::{DateTime, SecondsFormat, Utc};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Bounded exponential backoff for transient source failures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total fetch attempts, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let ms = self.base_delay.as_millis() as f64 * self.multiplier.powi(exp);
        let cap = self.max_delay.as_millis() as f64;
        if !ms.is_finite() || ms > cap {
            return self.max_delay;
        }
        Duration::from_millis(ms.max(0.0) as u64)
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("source unavailable after {attempts} attempt(s): {message}")]
    SourceUnavailable { attempts: u32, message: String },

    #[error("query rejected: {0}")]
    QueryRejected(String),

    #[error("row {row_index} has {actual} cells, expected {expected}")]
    RowShape {
        row_index: usize,
        expected: usize,
        actual: usize,
    },

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Output(#[from] OutputError),
}

impl RunError {
    /// Short machine-friendly name used in the run summary.
    pub fn kind(&self) -> &'static str {
        match self {
            RunError::SourceUnavailable { .. } => "source_unavailable",
            RunError::QueryRejected(_) => "query_rejected",
            RunError::RowShape { .. } => "row_shape",
            RunError::Transform(_) => "transform",
            RunError::Output(_) => "output",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunResult {
    pub row_count: usize,
}

#[derive(Debug)]
pub struct ReportOutcome {
    pub key: String,
    pub sheet_name: String,
    pub range: DateRange,
    pub query: String,
    pub result: Result<RunResult, RunError>,
}

impl ReportOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    fn to_row(&self) -> SummaryRow {
        let (status, rows, error) = match &self.result {
            Ok(r) => ("ok", r.row_count.to_string(), String::new()),
            Err(e) => ("failed", "-".to_string(), format!("{}: {}", e.kind(), e)),
        };
        SummaryRow {
            report: self.key.clone(),
            sheet: self.sheet_name.clone(),
            range: self.range.to_string(),
            status: status.to_string(),
            rows,
            error,
        }
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub reference: DateTime<Utc>,
    pub outcomes: Vec<ReportOutcome>,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ReportOutcome> {
        self.outcomes.iter().filter(|o| !o.is_ok())
    }

    pub fn outcome(&self, key: &str) -> Option<&ReportOutcome> {
        self.outcomes.iter().find(|o| o.key == key)
    }

    pub fn to_rows(&self) -> Vec<SummaryRow> {
        self.outcomes.iter().map(ReportOutcome::to_row).collect()
    }

    pub fn stats(&self) -> RunStats {
        RunStats {
            reference: self.reference.to_rfc3339_opts(SecondsFormat::Secs, true),
            succeeded: self.succeeded(),
            failed: self.failed(),
            reports: self.to_rows(),
        }
    }
}

pub struct ReportRunner<'a, S: ReportSource + ?Sized, W: SheetWriter + ?Sized> {
    source: &'a S,
    writer: &'a mut W,
    clock: CivilClock,
    retry: RetryPolicy,
}

impl<'a, S: ReportSource + ?Sized, W: SheetWriter + ?Sized> ReportRunner<'a, S, W> {
    pub fn new(source: &'a S, writer: &'a mut W) -> Self {
        ReportRunner {
            source,
            writer,
            clock: CivilClock::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_clock(mut self, clock: CivilClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run a single report.
    pub fn run(&mut self, spec: &ReportSpec, reference: DateTime<Utc>) -> Result<RunResult, RunError> {
        self.run_report(spec, reference).result
    }

    /// Run every report in order, isolating failures.
    pub fn run_all(&mut self, specs: &[ReportSpec], reference: DateTime<Utc>) -> RunSummary {
        let outcomes: Vec<ReportOutcome> = specs
            .iter()
            .map(|spec| self.run_report(spec, reference))
            .collect();
        let summary = RunSummary { reference, outcomes };
        info!(
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            "run finished"
        );
        summary
    }

    fn run_report(&mut self, spec: &ReportSpec, reference: DateTime<Utc>) -> ReportOutcome {
        let range = compute(reference, &self.clock, spec.lookback());
        let query = query::build(spec, range);
        let rendered = query.to_string();
        info!(report = spec.key(), sheet = spec.sheet_name(), %range, "report started");
        debug!(report = spec.key(), query = %rendered);

        let result = self.execute(spec, &query);
        match &result {
            Ok(r) => info!(report = spec.key(), rows = r.row_count, "report written"),
            Err(e) => error!(
                report = spec.key(),
                %range,
                query = %rendered,
                kind = e.kind(),
                error = %e,
                "report failed"
            ),
        }
        ReportOutcome {
            key: spec.key().to_string(),
            sheet_name: spec.sheet_name().to_string(),
            range,
            query: rendered,
            result,
        }
    }

    fn execute(&mut self, spec: &ReportSpec, query: &Query) -> Result<RunResult, RunError> {
        let mut rows = self.fetch_with_retry(spec.key(), query)?;
        check_shape(&rows, query.fields.len())?;
        let hints = transform(&mut rows, spec.rules())?;
        let header = spec.header();
        self.writer.write(&SheetPayload {
            sheet_name: spec.sheet_name(),
            header: &header,
            rows: &rows,
            hints: &hints,
            header_style: spec.header_style(),
        })?;
        Ok(RunResult { row_count: rows.len() })
    }

    fn fetch_with_retry(&self, report: &str, query: &Query) -> Result<Vec<ReportRow>, RunError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.source.fetch(query) {
                Ok(rows) => return Ok(rows),
                Err(SourceError::Rejected(message)) => return Err(RunError::QueryRejected(message)),
                Err(SourceError::Unavailable(message)) if attempt < max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        report,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "source unavailable, retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(SourceError::Unavailable(message)) => {
                    return Err(RunError::SourceUnavailable { attempts: attempt, message })
                }
            }
        }
    }
}

fn check_shape(rows: &[ReportRow], expected: usize) -> Result<(), RunError> {
    match rows.iter().position(|r| r.len() != expected) {
        Some(row_index) => Err(RunError::RowShape {
            row_index,
            expected,
            actual: rows[row_index].len(),
        }),
        None => Ok(()),
    }
}
