//! Scheduled advertising performance reports.
//!
//! Each report is a [`spec::ReportSpec`]: a date window, a query against the
//! reporting interface, a set of column rules that turn raw exports into
//! localized sheets, and a target sheet. [`runner::ReportRunner`] drives a
//! list of specs through a [`loader::ReportSource`] and an
//! [`output::SheetWriter`].

pub mod config;
pub mod date_range;
pub mod dictionary;
pub mod loader;
pub mod output;
pub mod query;
pub mod reports;
pub mod runner;
pub mod spec;
pub mod transform;
pub mod types;
pub mod util;

pub use date_range::CivilClock;
pub use loader::{CsvReportSource, ReportSource, SourceError};
pub use output::{CsvSheetWriter, OutputError, SheetPayload, SheetWriter, XlsxWorkbookWriter};
pub use runner::{ReportRunner, RetryPolicy, RunError, RunSummary};
pub use spec::{ReportSpec, SpecError};
