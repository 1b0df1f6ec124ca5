use crate::query::{Query, DATE_FIELD};
use crate::types::{CellValue, ReportRow};
use crate::util::parse_date_safe;
use csv::ReaderBuilder;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const METRIC_PREFIX: &str = "metrics.";
/// Segments whose values are numbers rather than labels.
const NUMERIC_SEGMENTS: &[&str] = &["segments.hour"];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Transient: network, quota, or an export that is not there yet.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// The source understood the request and refused it.
    #[error("query rejected: {0}")]
    Rejected(String),
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Unavailable(_))
    }
}

/// Executes a report query. Rows come back in select-list order and with
/// the select list's arity.
pub trait ReportSource {
    fn fetch(&self, query: &Query) -> Result<Vec<ReportRow>, SourceError>;
}

/// Answers queries from report exports on disk, one `<resource>.csv` per
/// entity level whose header row holds the dot-qualified field names.
#[derive(Debug, Clone)]
pub struct CsvReportSource {
    dir: PathBuf,
}

impl CsvReportSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CsvReportSource { dir: dir.into() }
    }

    pub fn path_for(&self, resource: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", resource))
    }
}

impl ReportSource for CsvReportSource {
    fn fetch(&self, query: &Query) -> Result<Vec<ReportRow>, SourceError> {
        let path = self.path_for(query.resource());
        let rows = load_export(&path, query)?;
        debug!(path = %path.display(), rows = rows.len(), "loaded export");
        Ok(rows)
    }
}

fn load_export(path: &Path, query: &Query) -> Result<Vec<ReportRow>, SourceError> {
    if !path.exists() {
        return Err(SourceError::Unavailable(format!("{} not found", path.display())));
    }
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| SourceError::Unavailable(e.to_string()))?;
    let headers = rdr
        .headers()
        .map_err(|e| SourceError::Unavailable(e.to_string()))?
        .clone();
    let field_pos = |field: &str| {
        headers.iter().position(|h| h.trim() == field).ok_or_else(|| {
            SourceError::Rejected(format!(
                "unrecognized field `{}` for resource `{}`",
                field,
                query.resource()
            ))
        })
    };

    let select: Vec<(usize, &str)> = query
        .fields
        .iter()
        .map(|f| field_pos(f).map(|pos| (pos, f.as_str())))
        .collect::<Result<_, _>>()?;
    let filters: Vec<(usize, _)> = query
        .predicates
        .iter()
        .map(|p| field_pos(&p.field).map(|pos| (pos, p)))
        .collect::<Result<_, _>>()?;
    let date_pos = headers.iter().position(|h| h.trim() == DATE_FIELD);

    let mut rows: Vec<ReportRow> = Vec::new();
    for (line, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| SourceError::Rejected(format!("record {}: {}", line + 1, e)))?;

        if let Some(pos) = date_pos {
            match parse_date_safe(record.get(pos)) {
                Some(d) if query.range.contains_between(d) => {}
                _ => continue,
            }
        }
        let keep = filters
            .iter()
            .all(|(pos, p)| p.matches(&typed_cell(&p.field, record.get(*pos).unwrap_or(""))));
        if !keep {
            continue;
        }

        rows.push(
            select
                .iter()
                .map(|&(pos, field)| typed_cell(field, record.get(pos).unwrap_or("")))
                .collect(),
        );
    }

    sort_rows(&mut rows, query);
    Ok(rows)
}

/// Metrics are typed numerically; attributes and segments (names, keyword
/// text, ids, dates) keep their exported text verbatim.
fn typed_cell(field: &str, raw: &str) -> CellValue {
    if field.starts_with(METRIC_PREFIX) || NUMERIC_SEGMENTS.contains(&field) {
        CellValue::parse(raw)
    } else if raw.trim().is_empty() {
        CellValue::Empty
    } else {
        CellValue::Text(raw.to_string())
    }
}

/// Stable multi-key sort following the query's ORDER BY.
fn sort_rows(rows: &mut [ReportRow], query: &Query) {
    let keys: Vec<(usize, _)> = query
        .order_by
        .iter()
        .filter_map(|k| query.fields.iter().position(|f| *f == k.field).map(|pos| (pos, k)))
        .collect();
    if keys.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        keys.iter().fold(Ordering::Equal, |ord, (pos, key)| {
            ord.then_with(|| key.compare(&a[*pos], &b[*pos]))
        })
    });
}
