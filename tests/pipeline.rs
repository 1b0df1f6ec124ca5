use ads_report::dictionary::Dictionary;
use ads_report::output::{read_existing, write_json, OutputError, SheetPayload, SheetWriter};
use ads_report::query::Query;
use ads_report::reports;
use ads_report::types::{CellValue, EntityLevel, Lookback, ReportRow};
use ads_report::{
    CivilClock, CsvReportSource, CsvSheetWriter, ReportRunner, ReportSpec, RetryPolicy, RunError,
    SourceError, XlsxWorkbookWriter,
};
use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::fs;
use std::time::Duration;

struct FnSource<F> {
    respond: F,
    calls: Cell<usize>,
}

impl<F> FnSource<F>
where
    F: Fn(&Query, usize) -> Result<Vec<ReportRow>, SourceError>,
{
    fn new(respond: F) -> Self {
        FnSource { respond, calls: Cell::new(0) }
    }
}

impl<F> ads_report::ReportSource for FnSource<F>
where
    F: Fn(&Query, usize) -> Result<Vec<ReportRow>, SourceError>,
{
    fn fetch(&self, query: &Query) -> Result<Vec<ReportRow>, SourceError> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        (self.respond)(query, call)
    }
}

#[derive(Default)]
struct MemoryWriter {
    sheets: BTreeMap<String, (Vec<String>, Vec<ReportRow>)>,
    fail_on: Option<String>,
}

impl SheetWriter for MemoryWriter {
    fn write(&mut self, payload: &SheetPayload<'_>) -> Result<(), OutputError> {
        if self.fail_on.as_deref() == Some(payload.sheet_name) {
            return Err(OutputError::Workbook("sheet is protected".into()));
        }
        self.sheets.insert(
            payload.sheet_name.to_string(),
            (payload.header.to_vec(), payload.rows.to_vec()),
        );
        Ok(())
    }
}

fn reference() -> DateTime<Utc> {
    // 2024-05-10 12:00 in Tokyo.
    Utc.with_ymd_and_hms(2024, 5, 10, 3, 0, 0).unwrap()
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        multiplier: 2.0,
    }
}

fn small_campaign_spec(key: &str, sheet: &str) -> ReportSpec {
    ReportSpec::builder(key, sheet, EntityLevel::Campaign, Lookback::days(7))
        .column("segments.date", "日付")
        .column("campaign.name", "キャンペーン名")
        .column("metrics.cost_micros", "費用 (円)")
        .column("metrics.clicks", "クリック数")
        .currency("metrics.cost_micros")
        .build()
        .unwrap()
}

fn campaign_row(cost: CellValue) -> ReportRow {
    vec![
        CellValue::from("2024-05-01"),
        CellValue::from("CampaignA"),
        cost,
        CellValue::Int(10),
    ]
}

#[test]
fn single_report_end_to_end() {
    let spec = small_campaign_spec("campaign", "raw_campaign");
    let source = FnSource::new(|_: &Query, _| Ok(vec![campaign_row(CellValue::Int(5_000_000))]));
    let mut writer = MemoryWriter::default();

    let result = ReportRunner::new(&source, &mut writer)
        .with_retry(fast_retry())
        .run(&spec, reference())
        .unwrap();

    assert_eq!(result.row_count, 1);
    let (header, rows) = &writer.sheets["raw_campaign"];
    assert_eq!(header, &vec!["日付", "キャンペーン名", "費用 (円)", "クリック数"]);
    assert_eq!(rows, &vec![campaign_row(CellValue::Int(5))]);
}

#[test]
fn one_failing_window_does_not_stop_the_others() {
    let specs = reports::keyword_reports().unwrap();
    let source = FnSource::new(|q: &Query, _| {
        if (q.range.end() - q.range.start()).num_days() == 7 {
            Err(SourceError::Unavailable("quota exceeded".into()))
        } else {
            let mut row = vec![CellValue::Int(1_500_000); 23];
            row[1] = CellValue::from("PHRASE");
            Ok(vec![row])
        }
    });
    let mut writer = MemoryWriter::default();

    let summary = ReportRunner::new(&source, &mut writer)
        .with_retry(fast_retry())
        .run_all(&specs, reference());

    assert_eq!(summary.succeeded(), 3);
    assert_eq!(summary.failed(), 1);
    let failed: Vec<&str> = summary.failures().map(|o| o.key.as_str()).collect();
    assert_eq!(failed, vec!["keyword_7days"]);
    match &summary.outcome("keyword_7days").unwrap().result {
        Err(RunError::SourceUnavailable { attempts, .. }) => assert_eq!(*attempts, 3),
        other => panic!("unexpected: {other:?}"),
    }

    let written: Vec<&str> = writer.sheets.keys().map(String::as_str).collect();
    assert_eq!(
        written,
        vec!["キーワード_昨日", "キーワード_過去30日", "キーワード_過去90日"]
    );
    let (_, rows) = &writer.sheets["キーワード_過去30日"];
    assert_eq!(rows[0][1], CellValue::from("フレーズ一致"));
    assert_eq!(rows[0][4], CellValue::Int(2));
    assert_eq!(rows[0][5], CellValue::Int(1_500_000));

    let summary_rows = summary.to_rows();
    assert_eq!(summary_rows[1].status, "failed");
    assert!(summary_rows[1].error.starts_with("source_unavailable"));
    assert_eq!(summary_rows[0].rows, "1");
}

#[test]
fn transient_failures_are_retried() {
    let spec = small_campaign_spec("campaign", "raw_campaign");
    let source = FnSource::new(|_: &Query, call| {
        if call < 2 {
            Err(SourceError::Unavailable("timeout".into()))
        } else {
            Ok(vec![campaign_row(CellValue::Int(1_000_000))])
        }
    });
    let mut writer = MemoryWriter::default();
    let result = ReportRunner::new(&source, &mut writer)
        .with_retry(fast_retry())
        .run(&spec, reference());

    assert_eq!(result.unwrap().row_count, 1);
    assert_eq!(source.calls.get(), 3);
}

#[test]
fn rejected_queries_are_not_retried() {
    let spec = small_campaign_spec("campaign", "raw_campaign");
    let source = FnSource::new(|_: &Query, _| Err(SourceError::Rejected("bad field".into())));
    let mut writer = MemoryWriter::default();
    let err = ReportRunner::new(&source, &mut writer)
        .with_retry(fast_retry())
        .run(&spec, reference())
        .unwrap_err();

    assert_eq!(err.kind(), "query_rejected");
    assert_eq!(source.calls.get(), 1);
    assert!(writer.sheets.is_empty());
}

#[test]
fn malformed_currency_fails_only_that_report() {
    let specs = vec![
        small_campaign_spec("broken", "broken_sheet"),
        small_campaign_spec("fine", "fine_sheet"),
    ];
    let source = FnSource::new(|_: &Query, call| {
        let cost = if call == 0 { CellValue::from("n/a") } else { CellValue::Int(2_000_000) };
        Ok(vec![campaign_row(CellValue::Int(0)), campaign_row(cost)])
    });
    let mut writer = MemoryWriter::default();
    let summary = ReportRunner::new(&source, &mut writer)
        .with_retry(fast_retry())
        .run_all(&specs, reference());

    match &summary.outcomes[0].result {
        Err(RunError::Transform(e)) => {
            assert_eq!(e.column, "metrics.cost_micros");
            assert_eq!(e.row_index, 1);
            assert_eq!(e.raw_value, "n/a");
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert!(summary.outcomes[1].is_ok());
    assert!(!writer.sheets.contains_key("broken_sheet"));
    assert_eq!(writer.sheets["fine_sheet"].1[1][2], CellValue::Int(2));
}

#[test]
fn short_rows_are_rejected() {
    let spec = small_campaign_spec("campaign", "raw_campaign");
    let source = FnSource::new(|_: &Query, _| {
        Ok(vec![vec![CellValue::from("2024-05-01"), CellValue::from("CampaignA")]])
    });
    let mut writer = MemoryWriter::default();
    let err = ReportRunner::new(&source, &mut writer)
        .run(&spec, reference())
        .unwrap_err();
    assert!(matches!(
        err,
        RunError::RowShape { row_index: 0, expected: 4, actual: 2 }
    ));
}

#[test]
fn writer_failure_is_isolated() {
    let specs = vec![
        small_campaign_spec("a", "protected"),
        small_campaign_spec("b", "open"),
    ];
    let source = FnSource::new(|_: &Query, _| Ok(vec![campaign_row(CellValue::Int(0))]));
    let mut writer = MemoryWriter { fail_on: Some("protected".into()), ..Default::default() };
    let summary = ReportRunner::new(&source, &mut writer).run_all(&specs, reference());

    assert_eq!(summary.outcomes[0].result.as_ref().unwrap_err().kind(), "output");
    assert!(summary.outcomes[1].is_ok());
    assert_eq!(writer.sheets.len(), 1);
}

#[test]
fn outcome_records_window_and_query() {
    let spec = small_campaign_spec("campaign", "raw_campaign");
    let source = FnSource::new(|_: &Query, _| Ok(Vec::new()));
    let mut writer = MemoryWriter::default();
    let summary = ReportRunner::new(&source, &mut writer)
        .with_clock(CivilClock::FixedShift(14))
        .run_all(std::slice::from_ref(&spec), reference());

    let outcome = &summary.outcomes[0];
    assert_eq!(outcome.range.to_string(), "2024-05-04..2024-05-11");
    assert!(outcome
        .query
        .contains("WHERE segments.date BETWEEN '2024-05-04' AND '2024-05-11'"));
    // An empty result still clears and rewrites the sheet.
    assert_eq!(writer.sheets["raw_campaign"].1.len(), 0);
}

#[test]
fn csv_export_to_csv_sheet() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    fs::write(
        input.path().join("geographic_view.csv"),
        "segments.date,campaign.name,segments.geo_target_region,metrics.cost_micros,\
         metrics.impressions,metrics.clicks,metrics.conversions,metrics.conversions_value\n\
         2024-05-02,CampA,Osaka,2500000,100,10,0,0\n\
         2024-01-01,CampA,Tokyo,9000000,1,1,1,1\n\
         2024-05-01,CampA,Tokyo,1500000,1234,56,2.5,3000\n",
    )
    .unwrap();

    let spec = reports::geography().unwrap();
    let source = CsvReportSource::new(input.path());
    let mut writer = CsvSheetWriter::new(output.path());
    let result = ReportRunner::new(&source, &mut writer)
        .run(&spec, reference())
        .unwrap();
    assert_eq!(result.row_count, 2);

    let written = fs::read_to_string(output.path().join("raw_prefectures.csv")).unwrap();
    assert_eq!(
        written,
        "日付,名前,都道府県,費用 (円),インプレッション,クリック数,CV数,CV価値 (円)\n\
         2024-05-01,CampA,東京都,¥2,\"1,234\",56,2.50,\"¥3,000\"\n\
         2024-05-02,CampA,大阪府,¥3,100,10,0.00,¥0\n"
    );
}

#[test]
fn conversion_detail_relabels_category_and_type() {
    let spec = reports::conversion_action_detail().unwrap();
    let source = FnSource::new(|q: &Query, _| {
        assert_eq!(q.resource(), "conversion_action");
        Ok(vec![vec![
            CellValue::from("購入完了"),
            CellValue::from("PURCHASE"),
            CellValue::from("GOOGLE_ANALYTICS_4"),
            CellValue::Float(12.5),
            CellValue::Int(48_000_000_000),
        ]])
    });
    let mut writer = MemoryWriter::default();
    ReportRunner::new(&source, &mut writer)
        .run(&spec, reference())
        .unwrap();

    let (_, rows) = &writer.sheets["CV詳細"];
    assert_eq!(
        rows[0],
        vec![
            CellValue::from("購入完了"),
            CellValue::from(Dictionary::ConversionCategory.lookup("PURCHASE")),
            CellValue::from("GA4"),
            CellValue::Float(12.5),
            CellValue::Int(48_000),
        ]
    );
}

#[test]
fn workbook_write_failure_keeps_the_other_sheets() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.xlsx");
    let specs = vec![
        small_campaign_spec("oversized", "oversized_sheet"),
        small_campaign_spec("fine", "fine_sheet"),
    ];
    let source = FnSource::new(|_: &Query, call| {
        let mut row = campaign_row(CellValue::Int(3_000_000));
        if call == 0 {
            // Longer than a workbook cell can hold.
            row[1] = CellValue::Text("長".repeat(33_000));
        }
        Ok(vec![row])
    });

    let mut writer = XlsxWorkbookWriter::open(&path).unwrap();
    let summary = ReportRunner::new(&source, &mut writer)
        .with_retry(fast_retry())
        .run_all(&specs, reference());
    writer.finish().unwrap();

    assert_eq!(summary.outcomes[0].result.as_ref().unwrap_err().kind(), "output");
    assert!(summary.outcomes[1].is_ok());

    let sheets = read_existing(&path).unwrap();
    assert_eq!(sheets.len(), 1);
    assert_eq!(sheets[0].name, "fine_sheet");
    assert_eq!(sheets[0].header, vec!["日付", "キャンペーン名", "費用 (円)", "クリック数"]);
    assert_eq!(sheets[0].rows[0][1], CellValue::from("CampaignA"));
    assert_eq!(sheets[0].rows[0][2].as_f64(), Some(3.0));
}

#[test]
fn summary_json_has_counts_and_per_report_rows() {
    let specs = vec![
        small_campaign_spec("a", "protected"),
        small_campaign_spec("b", "open"),
    ];
    let source = FnSource::new(|_: &Query, _| Ok(vec![campaign_row(CellValue::Int(0))]));
    let mut writer = MemoryWriter { fail_on: Some("protected".into()), ..Default::default() };
    let summary = ReportRunner::new(&source, &mut writer).run_all(&specs, reference());

    let value = serde_json::to_value(summary.stats()).unwrap();
    assert_eq!(
        value,
        json!({
            "reference": "2024-05-10T03:00:00Z",
            "succeeded": 1,
            "failed": 1,
            "reports": [
                {
                    "Report": "a",
                    "Sheet": "protected",
                    "Range": "2024-05-04..2024-05-11",
                    "Status": "failed",
                    "Rows": "-",
                    "Error": "output: workbook: sheet is protected",
                },
                {
                    "Report": "b",
                    "Sheet": "open",
                    "Range": "2024-05-04..2024-05-11",
                    "Status": "ok",
                    "Rows": "1",
                    "Error": "",
                },
            ],
        })
    );

    // The same shape lands on disk.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("summary.json");
    write_json(&path, &summary.stats()).unwrap();
    let on_disk: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk, value);
}
