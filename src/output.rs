use crate::spec::HeaderStyle;
use crate::transform::FormatHints;
use crate::types::{CellValue, ReportRow};
use crate::util::render_cell;
use calamine::{open_workbook, Data, Reader, Xlsx};
use rust_xlsxwriter::{Color, Format, Workbook, Worksheet, XlsxError};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tabled::{settings::Style, Table, Tabled};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

const MAX_SHEET_NAME: usize = 31;
const FORBIDDEN_SHEET_CHARS: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];
const FORBIDDEN_FILE_CHARS: &[char] = &['/', '\\', '\0'];

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("workbook: {0}")]
    Workbook(String),

    #[error("invalid sheet name `{0}`")]
    InvalidSheetName(String),
}

impl From<XlsxError> for OutputError {
    fn from(e: XlsxError) -> Self {
        OutputError::Workbook(e.to_string())
    }
}

/// Everything a writer needs to replace one sheet.
#[derive(Debug, Clone, Copy)]
pub struct SheetPayload<'a> {
    pub sheet_name: &'a str,
    pub header: &'a [String],
    pub rows: &'a [ReportRow],
    pub hints: &'a FormatHints,
    pub header_style: HeaderStyle,
}

/// Persists report sheets. `write` clears and rewrites the named sheet,
/// creating it when absent; it is only called with a complete payload.
pub trait SheetWriter {
    fn write(&mut self, payload: &SheetPayload<'_>) -> Result<(), OutputError>;

    /// Flush anything staged by `write`.
    fn finish(&mut self) -> Result<(), OutputError> {
        Ok(())
    }
}

/// Sheet names as a workbook accepts them: at most 31 characters and none
/// of `[ ] : * ? / \`.
pub fn validate_excel_sheet_name(name: &str) -> Result<(), OutputError> {
    if name.trim().is_empty()
        || name.chars().count() > MAX_SHEET_NAME
        || name.contains(FORBIDDEN_SHEET_CHARS)
    {
        return Err(OutputError::InvalidSheetName(name.to_string()));
    }
    Ok(())
}

/// Sheet names that can stand in for a file name inside the output directory.
pub fn validate_file_sheet_name(name: &str) -> Result<(), OutputError> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." || name.contains(FORBIDDEN_FILE_CHARS) {
        return Err(OutputError::InvalidSheetName(name.to_string()));
    }
    Ok(())
}

/// One `<dir>/<sheet>.csv` per sheet, values rendered with their display hint.
#[derive(Debug, Clone)]
pub struct CsvSheetWriter {
    dir: PathBuf,
}

impl CsvSheetWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CsvSheetWriter { dir: dir.into() }
    }

    pub fn path_for(&self, sheet_name: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", sheet_name))
    }
}

impl SheetWriter for CsvSheetWriter {
    fn write(&mut self, payload: &SheetPayload<'_>) -> Result<(), OutputError> {
        validate_file_sheet_name(payload.sheet_name)?;
        fs::create_dir_all(&self.dir)?;

        // Staged next to the target so the rename stays on one filesystem.
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        {
            let mut wtr = csv::Writer::from_writer(tmp.as_file_mut());
            wtr.write_record(payload.header)?;
            for row in payload.rows {
                let record: Vec<String> = row
                    .iter()
                    .enumerate()
                    .map(|(i, cell)| render_cell(cell, payload.hints.get(&i).copied()))
                    .collect();
                wtr.write_record(&record)?;
            }
            wtr.flush()?;
        }
        let path = self.path_for(payload.sheet_name);
        tmp.persist(&path).map_err(|e| e.error)?;
        debug!(path = %path.display(), rows = payload.rows.len(), "sheet written");
        Ok(())
    }
}

/// Builds each sheet as it is written and saves a single `.xlsx` workbook on
/// `finish`. Sheets already in the workbook that this run does not rewrite
/// are carried over by value.
pub struct XlsxWorkbookWriter {
    path: PathBuf,
    sheets: Vec<(String, Worksheet)>,
}

/// A sheet read back from an existing workbook.
#[derive(Debug, Clone, PartialEq)]
pub struct ExistingSheet {
    pub name: String,
    pub header: Vec<String>,
    pub rows: Vec<ReportRow>,
}

impl XlsxWorkbookWriter {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, OutputError> {
        let path = path.into();
        let existing = if path.exists() {
            read_existing(&path)?
        } else {
            Vec::new()
        };
        let mut sheets = Vec::with_capacity(existing.len());
        for sheet in existing {
            let ws = build_worksheet(&sheet.name, &sheet.header, &sheet.rows, &FormatHints::new(), None)?;
            sheets.push((sheet.name, ws));
        }
        if !sheets.is_empty() {
            info!(path = %path.display(), sheets = sheets.len(), "loaded existing workbook");
        }
        Ok(XlsxWorkbookWriter { path, sheets })
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|(name, _)| name.as_str()).collect()
    }
}

pub fn read_existing(path: &Path) -> Result<Vec<ExistingSheet>, OutputError> {
    let mut workbook: Xlsx<_> =
        open_workbook(path).map_err(|e| OutputError::Workbook(format!("{}: {}", path.display(), e)))?;
    let names = workbook.sheet_names().to_vec();
    let mut sheets = Vec::with_capacity(names.len());
    for name in names {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| OutputError::Workbook(format!("sheet `{}`: {}", name, e)))?;
        let mut rows = range.rows().map(|r| r.iter().map(cell_from_data).collect::<ReportRow>());
        let header = rows
            .next()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .unwrap_or_default();
        sheets.push(ExistingSheet {
            name,
            header,
            rows: rows.collect(),
        });
    }
    Ok(sheets)
}

fn cell_from_data(data: &Data) -> CellValue {
    match data {
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(f) => CellValue::Float(*f),
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        other => CellValue::Text(other.to_string()),
    }
}

impl SheetWriter for XlsxWorkbookWriter {
    fn write(&mut self, payload: &SheetPayload<'_>) -> Result<(), OutputError> {
        let name = payload.sheet_name;
        validate_excel_sheet_name(name)?;
        // Workbooks compare sheet names case-insensitively.
        let folded = name.to_lowercase();
        if self
            .sheets
            .iter()
            .any(|(existing, _)| existing != name && existing.to_lowercase() == folded)
        {
            return Err(OutputError::InvalidSheetName(name.to_string()));
        }

        let ws = build_worksheet(
            name,
            payload.header,
            payload.rows,
            payload.hints,
            Some(payload.header_style),
        )?;
        match self.sheets.iter_mut().find(|(existing, _)| existing == name) {
            Some(slot) => slot.1 = ws,
            None => self.sheets.push((name.to_string(), ws)),
        }
        debug!(sheet = name, rows = payload.rows.len(), "sheet staged");
        Ok(())
    }

    fn finish(&mut self) -> Result<(), OutputError> {
        let mut workbook = Workbook::new();
        let count = self.sheets.len();
        for (_, ws) in self.sheets.drain(..) {
            workbook.push_worksheet(ws);
        }
        let bytes = workbook.save_to_buffer()?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        info!(path = %self.path.display(), sheets = count, "workbook saved");
        Ok(())
    }
}

fn header_format(style: HeaderStyle) -> Format {
    Format::new()
        .set_bold()
        .set_background_color(Color::RGB(style.background))
        .set_font_color(Color::RGB(style.font))
}

fn cell_index<T: TryFrom<usize>>(i: usize, what: &str) -> Result<T, OutputError> {
    T::try_from(i).map_err(|_| OutputError::Workbook(format!("{} {} is out of range", what, i)))
}

/// Lays out one sheet: the header row (styled unless carried over), then the
/// data with each hinted column's number format.
fn build_worksheet(
    name: &str,
    header: &[String],
    rows: &[ReportRow],
    hints: &FormatHints,
    style: Option<HeaderStyle>,
) -> Result<Worksheet, OutputError> {
    let mut ws = Worksheet::new();
    ws.set_name(name)?;

    let bold = style.map(header_format);
    for (col, label) in header.iter().enumerate() {
        let col: u16 = cell_index(col, "column")?;
        match &bold {
            Some(fmt) => ws.write_string_with_format(0, col, label, fmt)?,
            None => ws.write_string(0, col, label)?,
        };
    }

    let formats: Vec<(usize, Format)> = hints
        .iter()
        .map(|(col, hint)| (*col, Format::new().set_num_format(hint.pattern())))
        .collect();
    let format_for = |col: usize| formats.iter().find(|(c, _)| *c == col).map(|(_, f)| f);

    for (r, row) in rows.iter().enumerate() {
        let r: u32 = cell_index(r + 1, "row")?;
        for (c, cell) in row.iter().enumerate() {
            let col: u16 = cell_index(c, "column")?;
            match (cell.as_f64(), cell, format_for(c)) {
                (Some(v), _, Some(fmt)) => {
                    ws.write_number_with_format(r, col, v, fmt)?;
                }
                (Some(v), _, None) => {
                    ws.write_number(r, col, v)?;
                }
                (None, CellValue::Text(s), _) => {
                    ws.write_string(r, col, s)?;
                }
                _ => {}
            }
        }
    }
    ws.autofit();
    Ok(ws)
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), OutputError> {
    let s = serde_json::to_string_pretty(value)?;
    fs::write(path, s)?;
    Ok(())
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().cloned().take(max_rows).collect();
    if slice.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let table_str = Table::new(slice).with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NumericFormat;
    use pretty_assertions::assert_eq;

    fn payload<'a>(
        name: &'a str,
        header: &'a [String],
        rows: &'a [ReportRow],
        hints: &'a FormatHints,
    ) -> SheetPayload<'a> {
        SheetPayload {
            sheet_name: name,
            header,
            rows,
            hints,
            header_style: HeaderStyle::default(),
        }
    }

    #[test]
    fn csv_writer_renders_hints() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CsvSheetWriter::new(dir.path());
        let header = vec!["キャンペーン名".to_string(), "費用 (円)".to_string(), "CTR".to_string()];
        let rows = vec![vec![CellValue::from("A"), CellValue::Int(12345), CellValue::Float(0.1234)]];
        let hints = FormatHints::from([(1, NumericFormat::Yen), (2, NumericFormat::Percent2)]);
        writer.write(&payload("raw_campaign", &header, &rows, &hints)).unwrap();

        let written = fs::read_to_string(dir.path().join("raw_campaign.csv")).unwrap();
        assert_eq!(written, "キャンペーン名,費用 (円),CTR\nA,\"¥12,345\",12.34%\n");
    }

    #[test]
    fn csv_writer_replaces_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CsvSheetWriter::new(dir.path());
        let header = vec!["名前".to_string()];
        let hints = FormatHints::new();
        let first = vec![vec![CellValue::from("old")], vec![CellValue::from("older")]];
        writer.write(&payload("s", &header, &first, &hints)).unwrap();
        let second = vec![vec![CellValue::from("new")]];
        writer.write(&payload("s", &header, &second, &hints)).unwrap();

        let written = fs::read_to_string(dir.path().join("s.csv")).unwrap();
        assert_eq!(written, "名前\nnew\n");
    }

    #[test]
    fn rejects_bad_sheet_names() {
        assert!(validate_excel_sheet_name("CV_購入").is_ok());
        assert!(validate_excel_sheet_name("").is_err());
        assert!(validate_excel_sheet_name("a/b").is_err());
        assert!(validate_excel_sheet_name("a:b").is_err());
        assert!(validate_excel_sheet_name(&"x".repeat(32)).is_err());

        assert!(validate_file_sheet_name(&"x".repeat(32)).is_ok());
        assert!(validate_file_sheet_name("a:b").is_ok());
        assert!(validate_file_sheet_name("a/b").is_err());
        assert!(validate_file_sheet_name("..").is_err());
        assert!(validate_file_sheet_name(" ").is_err());
    }

    #[test]
    fn long_sheet_names_only_bind_workbooks() {
        let dir = tempfile::tempdir().unwrap();
        let name = format!("CV_{}", "オンライン資料請求フォーム送信完了".repeat(2));
        assert!(name.chars().count() > 31);
        let header = vec!["名前".to_string()];
        let rows = vec![vec![CellValue::from("a")]];
        let hints = FormatHints::new();

        let mut csv = CsvSheetWriter::new(dir.path());
        csv.write(&payload(&name, &header, &rows, &hints)).unwrap();
        assert!(csv.path_for(&name).exists());

        let mut xlsx = XlsxWorkbookWriter::open(dir.path().join("out.xlsx")).unwrap();
        let err = xlsx.write(&payload(&name, &header, &rows, &hints)).unwrap_err();
        assert!(matches!(err, OutputError::InvalidSheetName(_)));
    }

    #[test]
    fn xlsx_writer_round_trips_through_calamine() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.xlsx");
        let header = vec!["日付".to_string(), "費用 (円)".to_string()];
        let hints = FormatHints::from([(1, NumericFormat::Yen)]);

        let mut writer = XlsxWorkbookWriter::open(&path).unwrap();
        let rows = vec![vec![CellValue::from("2024-05-01"), CellValue::Int(5)]];
        writer.write(&payload("raw_campaign", &header, &rows, &hints)).unwrap();
        writer.write(&payload("keep_me", &header, &rows, &hints)).unwrap();
        writer.finish().unwrap();

        // A second run rewrites one sheet and keeps the other.
        let mut writer = XlsxWorkbookWriter::open(&path).unwrap();
        assert_eq!(writer.sheet_names(), vec!["raw_campaign", "keep_me"]);
        let rows = vec![vec![CellValue::from("2024-05-02"), CellValue::Int(7)]];
        writer.write(&payload("raw_campaign", &header, &rows, &hints)).unwrap();
        writer.finish().unwrap();

        let sheets = read_existing(&path).unwrap();
        assert_eq!(sheets.len(), 2);
        assert_eq!(sheets[0].header, header);
        assert_eq!(sheets[0].rows[0][0], CellValue::from("2024-05-02"));
        assert_eq!(sheets[0].rows[0][1].as_f64(), Some(7.0));
        assert_eq!(sheets[1].rows[0][0], CellValue::from("2024-05-01"));
    }

    #[test]
    fn oversized_cell_fails_only_its_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.xlsx");
        let header = vec!["キャンペーン名".to_string()];
        let hints = FormatHints::new();
        let good = vec![vec![CellValue::from("A")]];
        let huge = vec![vec![CellValue::Text("x".repeat(40_000))]];

        let mut writer = XlsxWorkbookWriter::open(&path).unwrap();
        writer.write(&payload("before", &header, &good, &hints)).unwrap();
        let err = writer.write(&payload("too_big", &header, &huge, &hints)).unwrap_err();
        assert!(matches!(err, OutputError::Workbook(_)));
        writer.write(&payload("after", &header, &good, &hints)).unwrap();
        assert_eq!(writer.sheet_names(), vec!["before", "after"]);
        writer.finish().unwrap();

        let names: Vec<String> = read_existing(&path).unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["before", "after"]);
    }

    #[test]
    fn case_only_sheet_clash_is_rejected_at_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.xlsx");
        let header = vec!["名前".to_string()];
        let rows = vec![vec![CellValue::from("a")]];
        let hints = FormatHints::new();

        let mut writer = XlsxWorkbookWriter::open(&path).unwrap();
        writer.write(&payload("Raw_Campaign", &header, &rows, &hints)).unwrap();
        let err = writer.write(&payload("raw_campaign", &header, &rows, &hints)).unwrap_err();
        assert!(matches!(err, OutputError::InvalidSheetName(_)));
        // Rewriting under the identical name is still fine.
        writer.write(&payload("Raw_Campaign", &header, &rows, &hints)).unwrap();
        writer.finish().unwrap();
        assert_eq!(read_existing(&path).unwrap().len(), 1);
    }

    #[test]
    fn header_style_and_number_formats_reach_the_workbook() {
        use std::io::Read;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.xlsx");
        let header = vec!["費用 (円)".to_string(), "CTR".to_string()];
        let rows = vec![vec![CellValue::Int(12345), CellValue::Float(0.1234)]];
        let hints = FormatHints::from([(0, NumericFormat::Yen), (1, NumericFormat::Percent2)]);

        let mut writer = XlsxWorkbookWriter::open(&path).unwrap();
        writer
            .write(&SheetPayload {
                header_style: HeaderStyle::with_background(0x34A853),
                ..payload("raw_campaign", &header, &rows, &hints)
            })
            .unwrap();
        writer.finish().unwrap();

        let mut archive = zip::ZipArchive::new(fs::File::open(&path).unwrap()).unwrap();
        let mut styles = String::new();
        archive
            .by_name("xl/styles.xml")
            .unwrap()
            .read_to_string(&mut styles)
            .unwrap();
        assert!(styles.contains("<b/>"), "{styles}");
        assert!(styles.contains(r#"rgb="FF34A853""#), "{styles}");
        assert!(styles.contains(r#"rgb="FFFFFFFF""#), "{styles}");
        assert!(styles.contains(r#"formatCode="¥#,##0""#), "{styles}");
        // 0.00% is a built-in format and is referenced by id.
        assert!(styles.contains(r#"numFmtId="10""#), "{styles}");

        let sheet = &read_existing(&path).unwrap()[0];
        assert_eq!(sheet.rows[0][0].as_f64(), Some(12345.0));
        assert_eq!(sheet.rows[0][1].as_f64(), Some(0.1234));
    }
}
