//! Query construction for the reporting interface.
//!
//! A [`Query`] is a structured value; its `Display` impl renders the query
//! string the reporting interface executes:
//!
//! ```text
//! SELECT a, b FROM entity WHERE segments.date BETWEEN 'start' AND 'end'
//!   [AND predicate]* ORDER BY key ASC|DESC, ...
//! ```

use crate::spec::ReportSpec;
use crate::types::{CellValue, DateRange, EntityLevel};
use std::cmp::Ordering;
use std::fmt;

pub const DATE_FIELD: &str = "segments.date";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        SortKey { field: field.into(), direction: SortDirection::Asc }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        SortKey { field: field.into(), direction: SortDirection::Desc }
    }

    /// Compare two cells under this key's direction.
    pub fn compare(&self, a: &CellValue, b: &CellValue) -> Ordering {
        match self.direction {
            SortDirection::Asc => a.sort_cmp(b),
            SortDirection::Desc => b.sort_cmp(a),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            SortDirection::Asc => write!(f, "{} ASC", self.field),
            SortDirection::Desc => write!(f, "{} DESC", self.field),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        }
    }

    fn holds(&self, ord: Ordering) -> bool {
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Ne => ord != Ordering::Equal,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Text(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Number(n) => write!(f, "{}", n),
            Literal::Text(s) => write!(f, "'{}'", s.replace('\'', "\\'")),
        }
    }
}

/// A `field op literal` condition appended to the WHERE clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: String,
    pub op: CompareOp,
    pub value: Literal,
}

impl Predicate {
    pub fn new(field: impl Into<String>, op: CompareOp, value: Literal) -> Self {
        Predicate { field: field.into(), op, value }
    }

    pub fn gt(field: impl Into<String>, n: f64) -> Self {
        Self::new(field, CompareOp::Gt, Literal::Number(n))
    }

    pub fn eq_text(field: impl Into<String>, s: impl Into<String>) -> Self {
        Self::new(field, CompareOp::Eq, Literal::Text(s.into()))
    }

    /// Evaluate against a cell: numeric literals compare numerically (a
    /// non-numeric cell never matches), text literals compare as strings.
    pub fn matches(&self, cell: &CellValue) -> bool {
        let ord = match &self.value {
            Literal::Number(n) => match cell.as_f64().and_then(|v| v.partial_cmp(n)) {
                Some(ord) => ord,
                None => return false,
            },
            Literal::Text(s) => cell.to_string().as_str().cmp(s.as_str()),
        };
        self.op.holds(ord)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.op.symbol(), self.value)
    }
}

/// Metrics the reporting interface refuses to return for a given entity
/// level when a segment is present. `entity: None` applies to every level;
/// `segment: None` applies whether or not any segment is selected.
#[derive(Debug)]
pub struct CompatibilityRule {
    pub entity: Option<EntityLevel>,
    pub segment: Option<&'static str>,
    pub disallowed: &'static [&'static str],
}

const IMPRESSION_SHARE: &[&str] = &[
    "metrics.search_impression_share",
    "metrics.search_top_impression_share",
    "metrics.search_absolute_top_impression_share",
    "metrics.search_rank_lost_impression_share",
    "metrics.search_rank_lost_top_impression_share",
    "metrics.search_rank_lost_absolute_top_impression_share",
    "metrics.search_exact_match_impression_share",
    "metrics.search_click_share",
];

// Conversion-action segmentation only supports conversion metrics.
const NON_CONVERSION_METRICS: &[&str] = &[
    "metrics.cost_micros",
    "metrics.clicks",
    "metrics.impressions",
    "metrics.ctr",
    "metrics.average_cpc",
    "metrics.search_impression_share",
    "metrics.search_top_impression_share",
    "metrics.search_absolute_top_impression_share",
    "metrics.search_rank_lost_impression_share",
    "metrics.search_rank_lost_top_impression_share",
    "metrics.search_rank_lost_absolute_top_impression_share",
    "metrics.search_exact_match_impression_share",
    "metrics.search_click_share",
];

pub static COMPATIBILITY: &[CompatibilityRule] = &[
    CompatibilityRule {
        entity: None,
        segment: Some("segments.conversion_action_name"),
        disallowed: NON_CONVERSION_METRICS,
    },
    CompatibilityRule {
        entity: Some(EntityLevel::SearchTermView),
        segment: None,
        disallowed: IMPRESSION_SHARE,
    },
    CompatibilityRule {
        entity: Some(EntityLevel::GeographicView),
        segment: None,
        disallowed: IMPRESSION_SHARE,
    },
];

/// A selected metric that is undefined for the entity/segment combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incompatibility {
    pub metric: String,
    pub context: String,
}

/// Check `fields` (selected and filtered) against [`COMPATIBILITY`].
pub fn check_compatibility<'a>(
    entity: EntityLevel,
    fields: impl IntoIterator<Item = &'a str> + Clone,
) -> Result<(), Incompatibility> {
    for rule in COMPATIBILITY {
        if rule.entity.is_some_and(|e| e != entity) {
            continue;
        }
        if let Some(segment) = rule.segment {
            if !fields.clone().into_iter().any(|f| f == segment) {
                continue;
            }
        }
        if let Some(metric) = fields
            .clone()
            .into_iter()
            .find(|f| rule.disallowed.contains(f))
        {
            let context = match rule.segment {
                Some(segment) => format!("{} with {}", entity, segment),
                None => entity.to_string(),
            };
            return Err(Incompatibility { metric: metric.to_string(), context });
        }
    }
    Ok(())
}

/// A fully specified report query.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub fields: Vec<String>,
    pub entity: EntityLevel,
    pub range: DateRange,
    pub predicates: Vec<Predicate>,
    pub order_by: Vec<SortKey>,
}

impl Query {
    pub fn resource(&self) -> &'static str {
        self.entity.resource()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SELECT {} FROM {} WHERE {} BETWEEN '{}' AND '{}'",
            self.fields.join(", "),
            self.entity.resource(),
            DATE_FIELD,
            self.range.start().format("%Y-%m-%d"),
            self.range.end().format("%Y-%m-%d"),
        )?;
        for p in &self.predicates {
            write!(f, " AND {}", p)?;
        }
        if !self.order_by.is_empty() {
            let keys: Vec<String> = self.order_by.iter().map(|k| k.to_string()).collect();
            write!(f, " ORDER BY {}", keys.join(", "))?;
        }
        Ok(())
    }
}

/// Bind a validated spec to a date window. Columns, predicates and sort keys
/// are carried over verbatim.
pub fn build(spec: &ReportSpec, range: DateRange) -> Query {
    Query {
        fields: spec.select_fields().map(str::to_string).collect(),
        entity: spec.entity(),
        range,
        predicates: spec.predicates().to_vec(),
        order_by: spec.sort_keys().to_vec(),
    }
}
