use crate::dictionary::Dictionary;
use crate::query::{Predicate, SortKey};
use crate::spec::{HeaderStyle, ReportSpec, ReportSpecBuilder, SpecError};
use crate::types::{CatalogRow, EntityLevel, Lookback, NumericFormat};
use crate::util::sanitize_sheet_component;

const COST: &str = "metrics.cost_micros";
const CPC: &str = "metrics.average_cpc";
const CPA: &str = "metrics.cost_per_conversion";
const CONVERSIONS: &str = "metrics.conversions";
const CONVERSIONS_VALUE: &str = "metrics.conversions_value";
const ALL_CONVERSIONS: &str = "metrics.all_conversions";
const ALL_CONVERSIONS_VALUE: &str = "metrics.all_conversions_value";
const CONVERSION_ACTION: &str = "segments.conversion_action_name";

const CONVERSION_GREEN: HeaderStyle = HeaderStyle::with_background(0x34A853);
const CONVERSION_BLUE: HeaderStyle = HeaderStyle::with_background(0x4285F4);
const CONVERSION_PURPLE: HeaderStyle = HeaderStyle::with_background(0x9C27B0);

/// Rolling windows shared by the keyword and search query reports.
const WINDOWS: [(u32, &str); 4] = [(1, "昨日"), (7, "過去7日"), (30, "過去30日"), (90, "過去90日")];

/// Every scheduled report, in run order.
pub fn catalog() -> Result<Vec<ReportSpec>, SpecError> {
    let mut specs = vec![campaign_daily()?, ad_group_daily()?];
    specs.extend(keyword_reports()?);
    specs.extend(search_query_reports()?);
    specs.push(geography()?);
    specs.push(time_slot()?);
    specs.push(campaign_conversion_action()?);
    specs.push(ad_group_conversion_action()?);
    specs.push(conversion_action_detail()?);
    Ok(specs)
}

/// Pick reports by key in the order given; an empty list selects everything.
pub fn select(catalog: &[ReportSpec], keys: &[String]) -> Result<Vec<ReportSpec>, SpecError> {
    if keys.is_empty() {
        return Ok(catalog.to_vec());
    }
    keys.iter()
        .map(|key| {
            catalog
                .iter()
                .find(|s| s.key() == key)
                .cloned()
                .ok_or_else(|| SpecError::UnknownReport(key.clone()))
        })
        .collect()
}

pub fn catalog_rows(specs: &[ReportSpec]) -> Vec<CatalogRow> {
    specs
        .iter()
        .map(|s| CatalogRow {
            key: s.key().to_string(),
            sheet: s.sheet_name().to_string(),
            entity: s.entity().to_string(),
            lookback: s.lookback().to_string(),
            columns: s.columns().len(),
        })
        .collect()
}

fn with_share_columns(b: ReportSpecBuilder) -> ReportSpecBuilder {
    b.column("metrics.search_impression_share", "IS")
        .column("metrics.search_top_impression_share", "上部IS")
        .column("metrics.search_absolute_top_impression_share", "最上部IS")
        .column("metrics.search_rank_lost_impression_share", "IS損失率(ランク)")
        .column("metrics.search_rank_lost_top_impression_share", "上位IS損失率(ランク)")
        .column(
            "metrics.search_rank_lost_absolute_top_impression_share",
            "最上位IS損失率(ランク)",
        )
}

fn daily_head(key: &str, sheet: &str, entity: EntityLevel, name_field: &str) -> ReportSpecBuilder {
    let b = ReportSpec::builder(key, sheet, entity, Lookback::months(6))
        .column("segments.date", "日付")
        .column(name_field, "名前")
        .column(COST, "費用 (円)")
        .column("metrics.clicks", "クリック数")
        .column(CONVERSIONS, "コンバージョン数")
        .column("metrics.impressions", "インプレッション数");
    with_share_columns(b)
}

pub fn campaign_daily() -> Result<ReportSpec, SpecError> {
    daily_head("campaign", "raw_campaign", EntityLevel::Campaign, "campaign.name")
        .column("metrics.search_click_share", "クリックシェア")
        .column("metrics.ctr", "CTR")
        .column(CPC, "CPC (円)")
        .currency(COST)
        .currency(CPC)
        .order_by(SortKey::asc("segments.date"))
        .build()
}

/// Same shape as the campaign report minus click share.
pub fn ad_group_daily() -> Result<ReportSpec, SpecError> {
    daily_head("ad_group", "raw_ad_group", EntityLevel::AdGroup, "ad_group.name")
        .column("metrics.ctr", "CTR")
        .column(CPC, "CPC (円)")
        .currency(COST)
        .currency(CPC)
        .order_by(SortKey::asc("segments.date"))
        .build()
}

pub fn keyword(days: u32, label: &str) -> Result<ReportSpec, SpecError> {
    let b = ReportSpec::builder(
        format!("keyword_{}days", days),
        format!("キーワード_{}", label),
        EntityLevel::KeywordView,
        Lookback::days(days),
    )
    .column("ad_group_criterion.keyword.text", "キーワード")
    .column("ad_group_criterion.keyword.match_type", "マッチタイプ")
    .column("campaign.name", "キャンペーン名")
    .column("ad_group.name", "広告グループ名")
    .column(COST, "コスト")
    .column("metrics.impressions", "インプ")
    .column("metrics.clicks", "クリック数")
    .column("metrics.ctr", "CTR")
    .column(CPC, "CPC")
    .column(CONVERSIONS, "CV")
    .column("metrics.conversions_from_interactions_rate", "CVR")
    .column(CPA, "CPA");
    with_share_columns(b)
        .column("metrics.search_exact_match_impression_share", "完全一致のIS")
        .column("metrics.historical_quality_score", "品質スコア")
        .column("metrics.historical_search_predicted_ctr", "推定CTR")
        .column("metrics.historical_landing_page_quality_score", "LPの利便性")
        .column("metrics.historical_creative_quality_score", "広告の関連性")
        .categorical("ad_group_criterion.keyword.match_type", Dictionary::MatchType)
        .currency(COST)
        .currency(CPC)
        .currency(CPA)
        .categorical("metrics.historical_search_predicted_ctr", Dictionary::QualityBucket)
        .categorical("metrics.historical_landing_page_quality_score", Dictionary::QualityBucket)
        .categorical("metrics.historical_creative_quality_score", Dictionary::QualityBucket)
        .formats(&["metrics.impressions", "metrics.clicks"], NumericFormat::GroupedInt)
        .format(CONVERSIONS, NumericFormat::Count2)
        .formats(&[COST, CPC, CPA], NumericFormat::Yen)
        .formats(
            &[
                "metrics.ctr",
                "metrics.conversions_from_interactions_rate",
                "metrics.search_impression_share",
                "metrics.search_top_impression_share",
                "metrics.search_absolute_top_impression_share",
                "metrics.search_rank_lost_impression_share",
                "metrics.search_rank_lost_top_impression_share",
                "metrics.search_rank_lost_absolute_top_impression_share",
                "metrics.search_exact_match_impression_share",
            ],
            NumericFormat::Percent2,
        )
        .format("metrics.historical_quality_score", NumericFormat::Score1)
        .order_by(SortKey::desc(CONVERSIONS))
        .build()
}

pub fn keyword_reports() -> Result<Vec<ReportSpec>, SpecError> {
    WINDOWS.iter().map(|(days, label)| keyword(*days, label)).collect()
}

pub fn search_query(days: u32, label: &str) -> Result<ReportSpec, SpecError> {
    ReportSpec::builder(
        format!("query_{}days", days),
        format!("クエリ_{}", label),
        EntityLevel::SearchTermView,
        Lookback::days(days),
    )
    .column("search_term_view.search_term", "検索クエリ")
    .column("search_term_view.status", "ステータス")
    .column("segments.keyword.info.text", "キーワード")
    .column("segments.keyword.info.match_type", "マッチタイプ")
    .column("campaign.name", "キャンペーン名")
    .column("ad_group.name", "広告グループ名")
    .column(COST, "コスト")
    .column("metrics.impressions", "インプ")
    .column("metrics.clicks", "クリック数")
    .column("metrics.ctr", "CTR")
    .column(CPC, "CPC")
    .column(CONVERSIONS, "CV")
    .column("metrics.conversions_from_interactions_rate", "CVR")
    .column(CPA, "CPA")
    .categorical("search_term_view.status", Dictionary::SearchTermStatus)
    .categorical("segments.keyword.info.match_type", Dictionary::MatchType)
    .currency(COST)
    .currency(CPC)
    .currency(CPA)
    .formats(&["metrics.impressions", "metrics.clicks"], NumericFormat::GroupedInt)
    .format(CONVERSIONS, NumericFormat::Count2)
    .formats(&[COST, CPC, CPA], NumericFormat::Yen)
    .formats(
        &["metrics.ctr", "metrics.conversions_from_interactions_rate"],
        NumericFormat::Percent2,
    )
    .order_by(SortKey::desc(CONVERSIONS))
    .build()
}

pub fn search_query_reports() -> Result<Vec<ReportSpec>, SpecError> {
    WINDOWS.iter().map(|(days, label)| search_query(*days, label)).collect()
}

/// Conversion value is left in its exported unit here; only cost is scaled.
pub fn geography() -> Result<ReportSpec, SpecError> {
    ReportSpec::builder("geography", "raw_prefectures", EntityLevel::GeographicView, Lookback::months(3))
        .column("segments.date", "日付")
        .column("campaign.name", "名前")
        .column("segments.geo_target_region", "都道府県")
        .column(COST, "費用 (円)")
        .column("metrics.impressions", "インプレッション")
        .column("metrics.clicks", "クリック数")
        .column(CONVERSIONS, "CV数")
        .column(CONVERSIONS_VALUE, "CV価値 (円)")
        .currency(COST)
        .categorical("segments.geo_target_region", Dictionary::Prefecture)
        .formats(&["metrics.impressions", "metrics.clicks"], NumericFormat::GroupedInt)
        .format(CONVERSIONS, NumericFormat::Count2)
        .formats(&[COST, CONVERSIONS_VALUE], NumericFormat::Yen)
        .order_by(SortKey::asc("segments.date"))
        .build()
}

pub fn time_slot() -> Result<ReportSpec, SpecError> {
    ReportSpec::builder("time_slot", "raw_campaign_time_slot", EntityLevel::Campaign, Lookback::months(3))
        .column("segments.date", "日付")
        .column("segments.hour", "時間")
        .column("campaign.name", "キャンペーン名")
        .column(COST, "費用 (円)")
        .column("metrics.clicks", "クリック数")
        .column(CONVERSIONS, "コンバージョン数")
        .column("metrics.impressions", "インプレッション数")
        .column("metrics.search_impression_share", "インプレッションシェア")
        .column("metrics.search_top_impression_share", "上部インプレッションシェア")
        .column("metrics.search_absolute_top_impression_share", "最上部インプレッションシェア")
        .currency(COST)
        .formats(&["metrics.clicks", "metrics.impressions"], NumericFormat::GroupedInt)
        .format(CONVERSIONS, NumericFormat::Count2)
        .format(COST, NumericFormat::Yen)
        .formats(
            &[
                "metrics.search_impression_share",
                "metrics.search_top_impression_share",
                "metrics.search_absolute_top_impression_share",
            ],
            NumericFormat::Percent2,
        )
        .order_by(SortKey::asc("segments.date"))
        .build()
}

fn conversion_metrics(b: ReportSpecBuilder) -> ReportSpecBuilder {
    b.column(CONVERSIONS, "CV数")
        .column(CONVERSIONS_VALUE, "CV価値 (円)")
        .column(ALL_CONVERSIONS, "全CV数")
        .column(ALL_CONVERSIONS_VALUE, "全CV価値 (円)")
        .currency(CONVERSIONS_VALUE)
        .currency(ALL_CONVERSIONS_VALUE)
        .formats(&[CONVERSIONS, ALL_CONVERSIONS], NumericFormat::Count2)
        .formats(&[CONVERSIONS_VALUE, ALL_CONVERSIONS_VALUE], NumericFormat::Yen)
        .filter(Predicate::gt(CONVERSIONS, 0.0))
}

pub fn campaign_conversion_action() -> Result<ReportSpec, SpecError> {
    let b = ReportSpec::builder(
        "conversion_action",
        "raw_campaign_conversion_action",
        EntityLevel::Campaign,
        Lookback::months(6),
    )
    .column("segments.date", "日付")
    .column("campaign.name", "キャンペーン名")
    .column("campaign.id", "キャンペーンID")
    .column(CONVERSION_ACTION, "コンバージョンアクション名");
    conversion_metrics(b)
        .header_style(CONVERSION_GREEN)
        .order_by(SortKey::desc("segments.date"))
        .order_by(SortKey::asc("campaign.name"))
        .order_by(SortKey::asc(CONVERSION_ACTION))
        .build()
}

pub fn ad_group_conversion_action() -> Result<ReportSpec, SpecError> {
    let b = ReportSpec::builder(
        "ad_group_conversion_action",
        "raw_adgroup_conversion_action",
        EntityLevel::AdGroup,
        Lookback::months(6),
    )
    .column("segments.date", "日付")
    .column("campaign.name", "キャンペーン名")
    .column("campaign.id", "キャンペーンID")
    .column("ad_group.name", "広告グループ名")
    .column("ad_group.id", "広告グループID")
    .column(CONVERSION_ACTION, "コンバージョンアクション名");
    conversion_metrics(b)
        .header_style(CONVERSION_BLUE)
        .order_by(SortKey::desc("segments.date"))
        .order_by(SortKey::asc("campaign.name"))
        .order_by(SortKey::asc("ad_group.name"))
        .order_by(SortKey::asc(CONVERSION_ACTION))
        .build()
}

/// One row per conversion action with its category and source type.
pub fn conversion_action_detail() -> Result<ReportSpec, SpecError> {
    ReportSpec::builder(
        "conversion_action_detail",
        "CV詳細",
        EntityLevel::ConversionAction,
        Lookback::months(6),
    )
    .column("conversion_action.name", "コンバージョンアクション名")
    .column("conversion_action.category", "カテゴリ")
    .column("conversion_action.type", "タイプ")
    .column(ALL_CONVERSIONS, "全CV数")
    .column(ALL_CONVERSIONS_VALUE, "全CV価値 (円)")
    .categorical("conversion_action.category", Dictionary::ConversionCategory)
    .categorical("conversion_action.type", Dictionary::ConversionSource)
    .currency(ALL_CONVERSIONS_VALUE)
    .format(ALL_CONVERSIONS, NumericFormat::Count2)
    .format(ALL_CONVERSIONS_VALUE, NumericFormat::Yen)
    .order_by(SortKey::desc(ALL_CONVERSIONS))
    .build()
}

/// Sheet name for a single conversion action report.
pub fn conversion_action_sheet(name: &str) -> String {
    format!("CV_{}", sanitize_sheet_component(name))
}

/// Campaign rows for one named conversion action, built on demand.
pub fn single_conversion_action(name: &str) -> Result<ReportSpec, SpecError> {
    ReportSpec::builder(
        format!("cv:{}", name),
        conversion_action_sheet(name),
        EntityLevel::Campaign,
        Lookback::months(6),
    )
    .column("segments.date", "日付")
    .column("campaign.name", "キャンペーン名")
    .column(CONVERSION_ACTION, "コンバージョンアクション名")
    .column(CONVERSIONS, "CV数")
    .column(CONVERSIONS_VALUE, "CV価値 (円)")
    .filter(Predicate::eq_text(CONVERSION_ACTION, name))
    .filter(Predicate::gt(CONVERSIONS, 0.0))
    .currency(CONVERSIONS_VALUE)
    .format(CONVERSIONS, NumericFormat::Count2)
    .format(CONVERSIONS_VALUE, NumericFormat::Yen)
    .header_style(CONVERSION_PURPLE)
    .order_by(SortKey::desc("segments.date"))
    .order_by(SortKey::desc(CONVERSIONS))
    .build()
}
