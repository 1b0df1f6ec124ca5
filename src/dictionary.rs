//! Localized labels for the reporting interface's enumeration values.
//!
//! Each table covers one semantic domain and is shared by every report that
//! shows a column of that domain. Lookups are total: a value missing from a
//! table comes back unchanged, so new platform enum values show up raw
//! instead of failing a report.
use once_cell::sync::Lazy;
use std::collections::HashMap;

type Table = HashMap<&'static str, &'static str>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dictionary {
    MatchType,
    SearchTermStatus,
    QualityBucket,
    ConversionCategory,
    ConversionSource,
    Prefecture,
}

static MATCH_TYPE: Lazy<Table> = Lazy::new(|| {
    HashMap::from([
        ("EXACT", "完全一致"),
        ("PHRASE", "フレーズ一致"),
        ("BROAD", "インテントマッチ"),
    ])
});

static SEARCH_TERM_STATUS: Lazy<Table> =
    Lazy::new(|| HashMap::from([("NONE", "なし"), ("ADDED", "追加済み")]));

static QUALITY_BUCKET: Lazy<Table> = Lazy::new(|| {
    HashMap::from([
        ("AVERAGE", "平均"),
        ("BELOW_AVERAGE", "平均以下"),
        ("ABOVE_AVERAGE", "平均以上"),
    ])
});

static CONVERSION_CATEGORY: Lazy<Table> = Lazy::new(|| {
    HashMap::from([
        ("PURCHASE", "購入"),
        ("SIGNUP", "登録"),
        ("LEAD", "リード"),
        ("PAGE_VIEW", "ページビュー"),
        ("DOWNLOAD", "ダウンロード"),
        ("ADD_TO_CART", "カート追加"),
        ("SUBMIT_LEAD_FORM", "リードフォーム送信"),
        ("CONTACT", "お問い合わせ"),
        ("BOOK_APPOINTMENT", "予約"),
        ("GET_DIRECTIONS", "経路検索"),
        ("OUTBOUND_CLICK", "外部クリック"),
        ("OTHER", "その他"),
    ])
});

static CONVERSION_SOURCE: Lazy<Table> = Lazy::new(|| {
    HashMap::from([
        ("WEBPAGE", "ウェブページ"),
        ("APP_INSTALL", "アプリインストール"),
        ("PHONE_CALL_CLICKS", "電話クリック"),
        ("IMPORT", "インポート"),
        ("GOOGLE_ANALYTICS_4", "GA4"),
        ("GOOGLE_ANALYTICS", "GA"),
        ("FIREBASE", "Firebase"),
        ("CLICK_TO_CALL", "クリックトゥコール"),
        ("SALESFORCE", "Salesforce"),
        ("AD_CALL", "広告通話"),
        ("STORE_SALES_DIRECT_UPLOAD", "店舗売上直接アップロード"),
    ])
});

static PREFECTURE: Lazy<Table> = Lazy::new(|| {
    HashMap::from([
        ("Hokkaido", "北海道"),
        ("Aomori", "青森県"),
        ("Iwate", "岩手県"),
        ("Miyagi", "宮城県"),
        ("Akita", "秋田県"),
        ("Yamagata", "山形県"),
        ("Fukushima", "福島県"),
        ("Ibaraki", "茨城県"),
        ("Tochigi", "栃木県"),
        ("Gunma", "群馬県"),
        ("Saitama", "埼玉県"),
        ("Chiba", "千葉県"),
        ("Tokyo", "東京都"),
        ("Kanagawa", "神奈川県"),
        ("Niigata", "新潟県"),
        ("Toyama", "富山県"),
        ("Ishikawa", "石川県"),
        ("Fukui", "福井県"),
        ("Yamanashi", "山梨県"),
        ("Nagano", "長野県"),
        ("Gifu", "岐阜県"),
        ("Shizuoka", "静岡県"),
        ("Aichi", "愛知県"),
        ("Mie", "三重県"),
        ("Shiga", "滋賀県"),
        ("Kyoto", "京都府"),
        ("Osaka", "大阪府"),
        ("Hyogo", "兵庫県"),
        ("Nara", "奈良県"),
        ("Wakayama", "和歌山県"),
        ("Tottori", "鳥取県"),
        ("Shimane", "島根県"),
        ("Okayama", "岡山県"),
        ("Hiroshima", "広島県"),
        ("Yamaguchi", "山口県"),
        ("Tokushima", "徳島県"),
        ("Kagawa", "香川県"),
        ("Ehime", "愛媛県"),
        ("Kochi", "高知県"),
        ("Fukuoka", "福岡県"),
        ("Saga", "佐賀県"),
        ("Nagasaki", "長崎県"),
        ("Kumamoto", "熊本県"),
        ("Oita", "大分県"),
        ("Miyazaki", "宮崎県"),
        ("Kagoshima", "鹿児島県"),
        ("Okinawa", "沖縄県"),
    ])
});

impl Dictionary {
    pub fn table(&self) -> &'static Table {
        match self {
            Dictionary::MatchType => &MATCH_TYPE,
            Dictionary::SearchTermStatus => &SEARCH_TERM_STATUS,
            Dictionary::QualityBucket => &QUALITY_BUCKET,
            Dictionary::ConversionCategory => &CONVERSION_CATEGORY,
            Dictionary::ConversionSource => &CONVERSION_SOURCE,
            Dictionary::Prefecture => &PREFECTURE,
        }
    }

    /// Exact, case-sensitive match; unmapped values pass through.
    pub fn lookup<'a>(&self, raw: &'a str) -> &'a str {
        match self.table().get(raw) {
            Some(label) => *label,
            None => raw,
        }
    }
}
