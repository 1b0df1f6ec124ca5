// Utility helpers for parsing raw exported values and rendering numbers.
//
// Everything that has to deal with loosely formatted text lives here so the
// rest of the pipeline can work with typed cells.
use crate::types::{CellValue, NumericFormat};
use chrono::NaiveDate;
use num_format::{Locale, ToFormattedString};

/// One currency unit expressed in micros.
pub const MICROS_PER_UNIT: i64 = 1_000_000;

/// Parse a string-like value into `f64` while being forgiving about
/// formatting issues common in exports (thousands separators, spaces).
///
/// Values containing alphabetic characters are rejected, which also keeps
/// `NaN` and `inf` out of the pipeline.
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    if s.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let s = s.replace(",", "");
    s.parse::<f64>().ok()
}

pub fn parse_i64_safe(s: Option<&str>) -> Option<i64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<i64>().ok()
}

pub fn parse_date_safe(s: Option<&str>) -> Option<NaiveDate> {
    // Report dates are `YYYY-MM-DD`.
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Micros to whole units, rounding half away from zero with exact integer
/// arithmetic.
pub fn round_micros(micros: i64) -> i64 {
    let units = micros / MICROS_PER_UNIT;
    let rem = micros % MICROS_PER_UNIT;
    if rem.abs() * 2 >= MICROS_PER_UNIT {
        units + micros.signum()
    } else {
        units
    }
}

/// Float variant of [`round_micros`]; `f64::round` already rounds half away
/// from zero.
pub fn round_micros_f64(micros: f64) -> f64 {
    (micros / MICROS_PER_UNIT as f64).round()
}

/// Keep alphanumerics, underscores and whitespace, then collapse whitespace
/// runs into a single `_`.
pub fn sanitize_sheet_component(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join("_")
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Fixed decimals plus locale thousands separators, e.g. `1,234,567.89`.
    let neg = n.is_sign_negative();
    let abs_n = n.abs();
    let s = format!("{:.*}", decimals, abs_n);
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        if decimals > 0 {
            res.push('.');
            res.push_str(frac);
        }
    } else if decimals > 0 {
        res.push('.');
        res.push_str(&"0".repeat(decimals));
    }
    if neg && res.chars().any(|c| c.is_ascii_digit() && c != '0') {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}

/// Render a cell the way a spreadsheet would display it under `hint`.
/// Text and empty cells, and cells without a hint, render as-is.
pub fn render_cell(cell: &CellValue, hint: Option<NumericFormat>) -> String {
    let (Some(v), Some(hint)) = (cell.as_f64(), hint) else {
        return cell.to_string();
    };
    match hint {
        NumericFormat::GroupedInt => format_number(v, 0),
        NumericFormat::Count2 => format_number(v, 2),
        NumericFormat::Yen => {
            let digits = format_number(v.abs(), 0);
            if v < 0.0 && digits != "0" {
                format!("-¥{}", digits)
            } else {
                format!("¥{}", digits)
            }
        }
        NumericFormat::Percent2 => format!("{:.2}%", v * 100.0),
        NumericFormat::Score1 => format!("{:.1}", v),
    }
}
