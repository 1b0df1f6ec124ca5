use crate::util::{parse_f64_safe, parse_i64_safe};
use chrono::NaiveDate;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use tabled::Tabled;

/// A single typed cell of a report row.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Int(i64),
    Float(f64),
    Empty,
}

impl CellValue {
    /// Type a raw exported value: integer first, then float, otherwise text.
    /// Blank input becomes `Empty`.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return CellValue::Empty;
        }
        if let Some(i) = parse_i64_safe(Some(raw)) {
            return CellValue::Int(i);
        }
        if let Some(f) = parse_f64_safe(Some(raw)) {
            return CellValue::Float(f);
        }
        CellValue::Text(raw.to_string())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(i) => Some(*i as f64),
            CellValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Ordering used when sorting rows: empty cells first, then numbers
    /// (compared numerically), then text (compared lexicographically).
    pub fn sort_cmp(&self, other: &CellValue) -> Ordering {
        fn rank(c: &CellValue) -> u8 {
            match c {
                CellValue::Empty => 0,
                CellValue::Int(_) | CellValue::Float(_) => 1,
                CellValue::Text(_) => 2,
            }
        }
        match (self, other) {
            (CellValue::Int(a), CellValue::Int(b)) => a.cmp(b),
            (CellValue::Text(a), CellValue::Text(b)) => a.cmp(b),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
                _ => rank(self).cmp(&rank(other)),
            },
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => f.write_str(s),
            CellValue::Int(i) => write!(f, "{}", i),
            CellValue::Float(v) => write!(f, "{}", v),
            CellValue::Empty => Ok(()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        CellValue::Int(i)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Float(v)
    }
}

/// One row as returned by the reporting source, in select-list order.
pub type ReportRow = Vec<CellValue>;

/// The reporting resource a query selects from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityLevel {
    Customer,
    Campaign,
    AdGroup,
    KeywordView,
    SearchTermView,
    GeographicView,
    ConversionAction,
}

impl EntityLevel {
    pub fn resource(&self) -> &'static str {
        match self {
            EntityLevel::Customer => "customer",
            EntityLevel::Campaign => "campaign",
            EntityLevel::AdGroup => "ad_group",
            EntityLevel::KeywordView => "keyword_view",
            EntityLevel::SearchTermView => "search_term_view",
            EntityLevel::GeographicView => "geographic_view",
            EntityLevel::ConversionAction => "conversion_action",
        }
    }
}

impl fmt::Display for EntityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookbackUnit {
    Days,
    Months,
}

/// How far back a report reaches from the reference date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookback {
    pub unit: LookbackUnit,
    pub amount: u32,
}

impl Lookback {
    pub const fn days(amount: u32) -> Self {
        Lookback { unit: LookbackUnit::Days, amount }
    }

    pub const fn months(amount: u32) -> Self {
        Lookback { unit: LookbackUnit::Months, amount }
    }
}

impl fmt::Display for Lookback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unit {
            LookbackUnit::Days => write!(f, "{} days", self.amount),
            LookbackUnit::Months => write!(f, "{} months", self.amount),
        }
    }
}

/// Civil date window; `start` inclusive, `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Returns `None` when `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(DateRange { start, end })
    }

    /// Like [`DateRange::new`] but pulls `start` down to `end` instead of
    /// failing.
    pub fn clamped(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start: start.min(end), end }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Membership as the reporting interface evaluates `BETWEEN`: both
    /// bounds included.
    pub fn contains_between(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

/// Display hint attached to a column for the output collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericFormat {
    /// `#,##0`
    GroupedInt,
    /// `#,##0.00`
    Count2,
    /// `¥#,##0`
    Yen,
    /// `0.00%`
    Percent2,
    /// `0.0`
    Score1,
}

impl NumericFormat {
    pub fn pattern(&self) -> &'static str {
        match self {
            NumericFormat::GroupedInt => "#,##0",
            NumericFormat::Count2 => "#,##0.00",
            NumericFormat::Yen => "¥#,##0",
            NumericFormat::Percent2 => "0.00%",
            NumericFormat::Score1 => "0.0",
        }
    }
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct SummaryRow {
    #[serde(rename = "Report")]
    #[tabled(rename = "Report")]
    pub report: String,
    #[serde(rename = "Sheet")]
    #[tabled(rename = "Sheet")]
    pub sheet: String,
    #[serde(rename = "Range")]
    #[tabled(rename = "Range")]
    pub range: String,
    #[serde(rename = "Status")]
    #[tabled(rename = "Status")]
    pub status: String,
    #[serde(rename = "Rows")]
    #[tabled(rename = "Rows")]
    pub rows: String,
    #[serde(rename = "Error")]
    #[tabled(rename = "Error")]
    pub error: String,
}

#[derive(Debug, Tabled, Clone)]
pub struct CatalogRow {
    #[tabled(rename = "Key")]
    pub key: String,
    #[tabled(rename = "Sheet")]
    pub sheet: String,
    #[tabled(rename = "Entity")]
    pub entity: String,
    #[tabled(rename = "Lookback")]
    pub lookback: String,
    #[tabled(rename = "Columns")]
    pub columns: usize,
}

#[derive(Debug, Serialize)]
pub struct RunStats {
    pub reference: String,
    pub succeeded: usize,
    pub failed: usize,
    pub reports: Vec<SummaryRow>,
}
