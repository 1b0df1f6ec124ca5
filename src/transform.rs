//! Column transformations applied to fetched rows.
//!
//! Rules run in declared order and each one touches only its own column, so
//! rules on different columns commute. Rows are edited in place; their count
//! and order never change.
//!
//! The currency rule is not idempotent: running it twice on one column
//! divides by a million again. [`crate::spec::ReportSpecBuilder::build`]
//! rejects duplicate currency rules, and the runner transforms each fetched
//! batch exactly once.

use crate::spec::{ColumnRule, RuleKind};
use crate::types::{CellValue, NumericFormat, ReportRow};
use crate::util::{parse_f64_safe, round_micros, round_micros_f64};
use std::collections::BTreeMap;
use thiserror::Error;

/// Display hints keyed by column position.
pub type FormatHints = BTreeMap<usize, NumericFormat>;

#[derive(Debug, Error, Clone, PartialEq)]
#[error("column `{column}` row {row_index}: {raw_value:?} is not a micros amount")]
pub struct TransformError {
    pub column: String,
    pub row_index: usize,
    pub raw_value: String,
}

/// Apply `rules` to every row and collect the display hints.
pub fn transform(rows: &mut [ReportRow], rules: &[ColumnRule]) -> Result<FormatHints, TransformError> {
    let mut hints = FormatHints::new();
    for rule in rules {
        match rule.kind {
            RuleKind::Currency => apply_currency(rows, rule)?,
            RuleKind::Categorical(dictionary) => {
                for cell in column_cells(rows, rule.column) {
                    if let CellValue::Text(raw) = cell {
                        let label = dictionary.lookup(raw.as_str()).to_owned();
                        *raw = label;
                    }
                }
            }
            RuleKind::Format(format) => {
                hints.insert(rule.column, format);
            }
        }
    }
    Ok(hints)
}

fn column_cells(rows: &mut [ReportRow], column: usize) -> impl Iterator<Item = &mut CellValue> {
    rows.iter_mut().filter_map(move |row| row.get_mut(column))
}

fn apply_currency(rows: &mut [ReportRow], rule: &ColumnRule) -> Result<(), TransformError> {
    for (row_index, row) in rows.iter_mut().enumerate() {
        let Some(cell) = row.get_mut(rule.column) else {
            continue;
        };
        let units = micros_to_units(cell).ok_or_else(|| TransformError {
            column: rule.field.clone(),
            row_index,
            raw_value: cell.to_string(),
        })?;
        *cell = units;
    }
    Ok(())
}

/// Convert one micros cell to whole units. Numeric text is accepted; empty
/// cells stay empty; anything else is `None`.
pub fn micros_to_units(cell: &CellValue) -> Option<CellValue> {
    match cell {
        CellValue::Int(micros) => Some(CellValue::Int(round_micros(*micros))),
        CellValue::Float(micros) => Some(float_units(*micros)),
        CellValue::Text(raw) => parse_f64_safe(Some(raw)).map(float_units),
        CellValue::Empty => Some(CellValue::Empty),
    }
}

fn float_units(micros: f64) -> CellValue {
    let units = round_micros_f64(micros);
    if units.abs() < i64::MAX as f64 {
        CellValue::Int(units as i64)
    } else {
        CellValue::Float(units)
    }
}
