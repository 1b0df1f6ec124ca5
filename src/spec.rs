//! Report definitions.
//!
//! A [`ReportSpec`] is immutable and can only be obtained from
//! [`ReportSpecBuilder::build`], which resolves every column-addressed rule
//! to a position and rejects anything the reporting interface or the
//! transformer would trip over later. A spec that exists is runnable.

use crate::dictionary::Dictionary;
use crate::query::{check_compatibility, Predicate, SortKey};
use crate::types::{EntityLevel, Lookback, NumericFormat};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("report `{report}` selects no columns")]
    NoColumns { report: String },

    #[error("report `{report}` selects `{column}` more than once")]
    DuplicateColumn { report: String, column: String },

    #[error("report `{report}` refers to `{column}`, which is not selected")]
    UnknownColumn { report: String, column: String },

    #[error("report `{report}` converts `{column}` from micros more than once")]
    DuplicateCurrency { report: String, column: String },

    #[error("report `{report}` requests `{metric}`, which is unavailable for {context}")]
    IncompatibleMetric {
        report: String,
        metric: String,
        context: String,
    },

    #[error("unknown report `{0}`")]
    UnknownReport(String),
}

/// A selected field and its localized header label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub field: String,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// Micros to whole currency units.
    Currency,
    /// Relabel through a shared dictionary.
    Categorical(Dictionary),
    /// Display hint only; values are left alone.
    Format(NumericFormat),
}

/// A rule bound to a resolved column position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRule {
    pub column: usize,
    pub field: String,
    pub kind: RuleKind,
}

/// Header row styling for output backends that support it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderStyle {
    pub background: u32,
    pub font: u32,
}

impl HeaderStyle {
    pub const fn with_background(background: u32) -> Self {
        HeaderStyle { background, font: 0xFFFFFF }
    }
}

impl Default for HeaderStyle {
    fn default() -> Self {
        HeaderStyle::with_background(0x4472C4)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportSpec {
    key: String,
    sheet_name: String,
    entity: EntityLevel,
    columns: Vec<ColumnDef>,
    predicates: Vec<Predicate>,
    sort_keys: Vec<SortKey>,
    rules: Vec<ColumnRule>,
    header_style: HeaderStyle,
    lookback: Lookback,
}

impl ReportSpec {
    pub fn builder(
        key: impl Into<String>,
        sheet_name: impl Into<String>,
        entity: EntityLevel,
        lookback: Lookback,
    ) -> ReportSpecBuilder {
        ReportSpecBuilder {
            key: key.into(),
            sheet_name: sheet_name.into(),
            entity,
            lookback,
            columns: Vec::new(),
            predicates: Vec::new(),
            sort_keys: Vec::new(),
            rules: Vec::new(),
            header_style: HeaderStyle::default(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    pub fn entity(&self) -> EntityLevel {
        self.entity
    }

    pub fn lookback(&self) -> Lookback {
        self.lookback
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn select_fields(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.field.as_str())
    }

    /// Localized header, one label per selected column.
    pub fn header(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.label.clone()).collect()
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn sort_keys(&self) -> &[SortKey] {
        &self.sort_keys
    }

    pub fn rules(&self) -> &[ColumnRule] {
        &self.rules
    }

    pub fn header_style(&self) -> HeaderStyle {
        self.header_style
    }

    pub fn column_index(&self, field: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.field == field)
    }
}

#[derive(Debug, Clone)]
pub struct ReportSpecBuilder {
    key: String,
    sheet_name: String,
    entity: EntityLevel,
    lookback: Lookback,
    columns: Vec<ColumnDef>,
    predicates: Vec<Predicate>,
    sort_keys: Vec<SortKey>,
    rules: Vec<(String, RuleKind)>,
    header_style: HeaderStyle,
}

impl ReportSpecBuilder {
    pub fn column(mut self, field: impl Into<String>, label: impl Into<String>) -> Self {
        self.columns.push(ColumnDef { field: field.into(), label: label.into() });
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn order_by(mut self, key: SortKey) -> Self {
        self.sort_keys.push(key);
        self
    }

    pub fn currency(mut self, field: impl Into<String>) -> Self {
        self.rules.push((field.into(), RuleKind::Currency));
        self
    }

    pub fn categorical(mut self, field: impl Into<String>, dictionary: Dictionary) -> Self {
        self.rules.push((field.into(), RuleKind::Categorical(dictionary)));
        self
    }

    pub fn format(mut self, field: impl Into<String>, format: NumericFormat) -> Self {
        self.rules.push((field.into(), RuleKind::Format(format)));
        self
    }

    /// Same display hint on several columns.
    pub fn formats(mut self, fields: &[&str], format: NumericFormat) -> Self {
        for field in fields {
            self.rules.push((field.to_string(), RuleKind::Format(format)));
        }
        self
    }

    pub fn header_style(mut self, style: HeaderStyle) -> Self {
        self.header_style = style;
        self
    }

    pub fn build(self) -> Result<ReportSpec, SpecError> {
        let report = self.key.clone();
        if self.columns.is_empty() {
            return Err(SpecError::NoColumns { report });
        }

        let mut seen = HashSet::new();
        for c in &self.columns {
            if !seen.insert(c.field.as_str()) {
                return Err(SpecError::DuplicateColumn { report, column: c.field.clone() });
            }
        }
        let position = |field: &str| self.columns.iter().position(|c| c.field == field);

        let mut rules = Vec::with_capacity(self.rules.len());
        let mut converted = HashSet::new();
        for (field, kind) in &self.rules {
            let column = position(field).ok_or_else(|| SpecError::UnknownColumn {
                report: report.clone(),
                column: field.clone(),
            })?;
            if *kind == RuleKind::Currency && !converted.insert(column) {
                return Err(SpecError::DuplicateCurrency { report, column: field.clone() });
            }
            rules.push(ColumnRule { column, field: field.clone(), kind: *kind });
        }

        if let Some(key) = self.sort_keys.iter().find(|k| position(&k.field).is_none()) {
            return Err(SpecError::UnknownColumn { report, column: key.field.clone() });
        }

        let referenced = self
            .columns
            .iter()
            .map(|c| c.field.as_str())
            .chain(self.predicates.iter().map(|p| p.field.as_str()));
        check_compatibility(self.entity, referenced).map_err(|e| SpecError::IncompatibleMetric {
            report: report.clone(),
            metric: e.metric,
            context: e.context,
        })?;

        Ok(ReportSpec {
            key: self.key,
            sheet_name: self.sheet_name,
            entity: self.entity,
            columns: self.columns,
            predicates: self.predicates,
            sort_keys: self.sort_keys,
            rules,
            header_style: self.header_style,
            lookback: self.lookback,
        })
    }
}
