use crate::config::BenchConfig;
use crate::reference::ReferenceData;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::prelude::{IndexedRandom, SliceRandom};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchType {
    None,
    Company,
    Person,
    Fund,
    Lp,
    InsInvestor,
    Deal,
}

impl SearchType {
    const ALL: [SearchType; 7] = [
        SearchType::None,
        SearchType::Company,
        SearchType::Person,
        SearchType::Fund,
        SearchType::Lp,
        SearchType::InsInvestor,
        SearchType::Deal,
    ];

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::None => "NONE",
            SearchType::Company => "COMPANY",
            SearchType::Person => "PERSON",
            SearchType::Fund => "FUND",
            SearchType::Lp => "LP",
            SearchType::InsInvestor => "INS_INVESTOR",
            SearchType::Deal => "DEAL",
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    After,
    Before,
    Between,
    IncludesAny,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchCondition {
    pub id: String,
    pub operator: Operator,
    pub values: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub currency_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderColumn {
    pub column_id: String,
    pub is_desc: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub search_type: SearchType,
    pub first: i32,
    pub after: String,
    pub conditions: Vec<SearchCondition>,
    pub order_columns: Vec<OrderColumn>,
    pub column_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub nodes: Vec<sonic_rs::Value>,
}

impl SearchResponse {
    pub fn item_count(&self) -> usize {
        self.nodes.len()
    }
}

// =============================================================================
// Vocabularies
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum ValueKind {
    Number,
    Amount,
    Date,
}

const RANGE_COLUMNS: [(&str, ValueKind); 11] = [
    ("company.founded_at", ValueKind::Date),
    ("company.latest_deal_date", ValueKind::Date),
    ("company.latest_deal_amount", ValueKind::Amount),
    ("company.post_money_valuation", ValueKind::Amount),
    ("company.total_deal_amount", ValueKind::Amount),
    ("company.deal_count", ValueKind::Number),
    ("company.investment_count", ValueKind::Number),
    ("company.investment_count_last_year", ValueKind::Number),
    ("company.investment_amount_last_year", ValueKind::Amount),
    ("company.acquisition_count", ValueKind::Number),
    ("company.acquisition_amount", ValueKind::Amount),
];

const COMPARE_OPERATORS: [Operator; 3] = [Operator::After, Operator::Before, Operator::Between];

const CURRENCY_CODES: [&str; 5] = ["CNY", "USD", "EUR", "GBP", "JPY"];

const OWNERSHIP_STATUSES: [&str; 4] = [
    "private_startup",
    "private_mature",
    "private_acquired",
    "public",
];

const FINANCING_STATUSES: [&str; 4] = [
    "funding_angel_backing",
    "funding_vc_backing",
    "funding_pe_backing",
    "not_seeking_fund",
];

/// Headquarter locations and deal types travel as numeric enum codes. The
/// defaults are positional (`1..=N`); the real codes come from the command
/// line.
const LOCATION_CODE_COUNT: u32 = 16;
const DEAL_TYPE_CODE_COUNT: u32 = 37;

pub fn default_location_codes() -> Vec<String> {
    numeric_codes(LOCATION_CODE_COUNT)
}

pub fn default_deal_type_codes() -> Vec<String> {
    numeric_codes(DEAL_TYPE_CODE_COUNT)
}

fn numeric_codes(count: u32) -> Vec<String> {
    (1..=count).map(|code| code.to_string()).collect()
}

const ORDER_COLUMN: &str = "company_search_result.column.founded_at";

const COLUMN_IDS: [&str; 3] = [
    "company_search_result.column.short_name",
    "company_search_result.column.full_name",
    "company_search_result.column.founded_at",
];

/// Upper bound on values drawn from a reference table for one condition.
const MAX_REFERENCE_VALUES: usize = 10;

// =============================================================================
// Request Generation
// =============================================================================

/// Builds a fresh randomized [`SearchRequest`] per call from shared reference
/// data. Safe to share across tasks.
#[derive(Debug, Clone)]
pub struct ConditionGenerator {
    reference: Arc<ReferenceData>,
    search_type: SearchType,
    page_size: i32,
    cursor: String,
    condition_count: usize,
    location_codes: Vec<String>,
    deal_type_codes: Vec<String>,
}

impl ConditionGenerator {
    pub fn new(config: &BenchConfig, reference: Arc<ReferenceData>) -> Self {
        Self {
            reference,
            search_type: config.search_type,
            page_size: config.page_size,
            cursor: encode_cursor(config.cursor_offset),
            condition_count: config.condition_count,
            location_codes: config.location_codes.clone(),
            deal_type_codes: config.deal_type_codes.clone(),
        }
    }

    pub fn build_request(&self) -> SearchRequest {
        let mut rng = rand::rng();
        SearchRequest {
            search_type: self.search_type,
            first: self.page_size,
            after: self.cursor.clone(),
            conditions: self.conditions(&mut rng),
            order_columns: vec![OrderColumn {
                column_id: ORDER_COLUMN.to_string(),
                is_desc: true,
            }],
            column_ids: COLUMN_IDS.iter().map(|id| id.to_string()).collect(),
        }
    }

    fn conditions<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<SearchCondition> {
        if self.condition_count == 0 {
            return Vec::new();
        }

        let mut candidates: Vec<SearchCondition> = RANGE_COLUMNS
            .iter()
            .map(|(id, kind)| range_condition(rng, id, *kind))
            .collect();

        let include_any = [
            ("company.ownership_status", sample_unique(rng, &OWNERSHIP_STATUSES, 0)),
            ("company.financing_status", sample_unique(rng, &FINANCING_STATUSES, 0)),
            ("company.headquarter_location", sample_unique(rng, &self.location_codes, 0)),
            ("company.latest_deal_type", sample_unique(rng, &self.deal_type_codes, 0)),
            (
                "company.vertical",
                sample_unique(rng, &self.reference.verticals, MAX_REFERENCE_VALUES),
            ),
            (
                "company.shareholder",
                sample_unique(rng, &self.reference.investors, MAX_REFERENCE_VALUES),
            ),
            (
                "company.lead_investor",
                sample_unique(rng, &self.reference.investors, MAX_REFERENCE_VALUES),
            ),
        ];

        candidates.extend(
            include_any
                .into_iter()
                .filter(|(_, values)| !values.is_empty())
                .map(|(id, values)| SearchCondition {
                    id: id.to_string(),
                    operator: Operator::IncludesAny,
                    values,
                    currency_code: String::new(),
                }),
        );

        candidates.shuffle(rng);
        candidates.truncate(self.condition_count);
        candidates
    }
}

pub fn encode_cursor(offset: u32) -> String {
    STANDARD.encode(offset.to_string())
}

fn range_condition<R: Rng + ?Sized>(rng: &mut R, id: &str, kind: ValueKind) -> SearchCondition {
    let operator = COMPARE_OPERATORS
        .choose(rng)
        .copied()
        .unwrap_or(Operator::Between);
    let between = operator == Operator::Between;

    let (values, currency_code) = match kind {
        ValueKind::Number => {
            let number = rng.random_range(1..=10u64);
            (random_bounds(rng, number, between), String::new())
        }
        ValueKind::Amount => {
            let amount = rng.random_range(0..10_000u64) * 200_000 + 1;
            let currency = CURRENCY_CODES.choose(rng).copied().unwrap_or("USD");
            (random_bounds(rng, amount, between), currency.to_string())
        }
        ValueKind::Date => {
            let start = CalendarDate::random(rng);
            let values = if between {
                let end = start.add(
                    rng.random_range(0..5),
                    rng.random_range(0..5),
                    rng.random_range(0..5),
                );
                vec![start.to_string(), end.to_string()]
            } else {
                vec![start.to_string()]
            };
            (values, String::new())
        }
    };

    SearchCondition {
        id: id.to_string(),
        operator,
        values,
        currency_code,
    }
}

/// A single value, or a `[low, high]` pair whose low bound falls at or below
/// half of `high`.
fn random_bounds<R: Rng + ?Sized>(rng: &mut R, high: u64, between: bool) -> Vec<String> {
    if !between {
        return vec![high.to_string()];
    }
    let low = (high - rng.random_range(0..high)) / 2;
    vec![low.to_string(), high.to_string()]
}

/// Picks between 1 and `max_len` distinct values (all values when `max_len`
/// is 0). Empty input yields an empty selection.
pub(crate) fn sample_unique<R, S>(rng: &mut R, values: &[S], max_len: usize) -> Vec<String>
where
    R: Rng + ?Sized,
    S: AsRef<str>,
{
    if values.is_empty() {
        return Vec::new();
    }
    let max_len = if max_len == 0 {
        values.len()
    } else {
        max_len.min(values.len())
    };
    let count = rng.random_range(1..=max_len);
    values
        .choose_multiple(rng, count)
        .map(|value| value.as_ref().to_string())
        .collect()
}

// =============================================================================
// Dates
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CalendarDate {
    year: i32,
    month: u32,
    day: u32,
}

impl CalendarDate {
    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            year: rng.random_range(1980..2020),
            month: rng.random_range(1..=12),
            day: rng.random_range(1..=28),
        }
    }

    /// Calendar addition; day overflow rolls into the following months.
    fn add(&self, years: i32, months: u32, days: u32) -> Self {
        let month_index = (self.month - 1 + months) as i32;
        let mut year = self.year + years + month_index / 12;
        let mut month = (month_index % 12) as u32 + 1;
        let mut day = self.day + days;

        loop {
            let len = days_in_month(year, month);
            if day <= len {
                break;
            }
            day -= len;
            if month == 12 {
                month = 1;
                year += 1;
            } else {
                month += 1;
            }
        }

        Self { year, month, day }
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        2 if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> Arc<ReferenceData> {
        Arc::new(ReferenceData {
            verticals: (0..20).map(|i| format!("vertical-{i}")).collect(),
            investors: (0..50).map(|i| format!("investor-{i}")).collect(),
        })
    }

    fn generator(condition_count: usize) -> ConditionGenerator {
        let mut config = BenchConfig::new(1, 1).unwrap();
        config.condition_count = condition_count;
        config.page_size = 25;
        config.search_type = SearchType::Fund;
        ConditionGenerator::new(&config, reference())
    }

    #[test]
    fn zero_conditions_yield_an_empty_list() {
        let request = generator(0).build_request();
        assert!(request.conditions.is_empty());
        assert_eq!(request.first, 25);
        assert_eq!(request.search_type, SearchType::Fund);
        assert_eq!(request.column_ids.len(), 3);
    }

    #[test]
    fn requested_condition_count_is_honored_with_distinct_ids() {
        for _ in 0..100 {
            let request = generator(5).build_request();
            assert_eq!(request.conditions.len(), 5);
            let mut ids: Vec<_> = request.conditions.iter().map(|c| c.id.as_str()).collect();
            ids.sort_unstable();
            ids.dedup();
            assert_eq!(ids.len(), 5);
        }
    }

    #[test]
    fn oversized_condition_count_takes_every_candidate() {
        let request = generator(100).build_request();
        assert_eq!(request.conditions.len(), RANGE_COLUMNS.len() + 7);
    }

    #[test]
    fn empty_reference_tables_drop_their_conditions() {
        let mut config = BenchConfig::new(1, 1).unwrap();
        config.condition_count = 100;
        let generator = ConditionGenerator::new(&config, Arc::new(ReferenceData::default()));
        let request = generator.build_request();
        assert_eq!(request.conditions.len(), RANGE_COLUMNS.len() + 4);
        assert!(request
            .conditions
            .iter()
            .all(|c| c.id != "company.vertical" && c.id != "company.shareholder"));
    }

    #[test]
    fn locations_and_deal_types_are_numeric_codes() {
        let request = generator(100).build_request();
        for id in ["company.headquarter_location", "company.latest_deal_type"] {
            let condition = request.conditions.iter().find(|c| c.id == id).unwrap();
            assert!(!condition.values.is_empty());
            assert!(condition.values.iter().all(|v| v.parse::<u32>().is_ok()));
        }
        assert_eq!(default_location_codes().len(), 16);
        assert_eq!(default_deal_type_codes().first().map(String::as_str), Some("1"));
    }

    #[test]
    fn configured_code_vocabularies_replace_the_defaults() {
        let mut config = BenchConfig::new(1, 1).unwrap();
        config.condition_count = 100;
        config.location_codes = vec!["310000".to_string()];
        config.deal_type_codes = vec!["7".to_string(), "9".to_string()];
        let generator = ConditionGenerator::new(&config, reference());

        for _ in 0..50 {
            let request = generator.build_request();
            let values = |id: &str| {
                request
                    .conditions
                    .iter()
                    .find(|c| c.id == id)
                    .map(|c| c.values.clone())
                    .unwrap()
            };
            assert_eq!(values("company.headquarter_location"), vec!["310000".to_string()]);
            assert!(values("company.latest_deal_type")
                .iter()
                .all(|v| v == "7" || v == "9"));
        }
    }

    #[test]
    fn empty_code_vocabulary_drops_its_condition() {
        let mut config = BenchConfig::new(1, 1).unwrap();
        config.condition_count = 100;
        config.location_codes.clear();
        let request = ConditionGenerator::new(&config, reference()).build_request();
        assert!(request
            .conditions
            .iter()
            .all(|c| c.id != "company.headquarter_location"));
    }

    #[test]
    fn range_conditions_have_well_formed_values() {
        let mut rng = rand::rng();
        for _ in 0..200 {
            for (id, kind) in RANGE_COLUMNS {
                let condition = range_condition(&mut rng, id, kind);
                let expected = if condition.operator == Operator::Between { 2 } else { 1 };
                assert_eq!(condition.values.len(), expected);
                match kind {
                    ValueKind::Amount => {
                        assert!(CURRENCY_CODES.contains(&condition.currency_code.as_str()))
                    }
                    _ => assert!(condition.currency_code.is_empty()),
                }
                if let (ValueKind::Number | ValueKind::Amount, [low, high]) =
                    (kind, condition.values.as_slice())
                {
                    let low: u64 = low.parse().unwrap();
                    let high: u64 = high.parse().unwrap();
                    assert!(low <= high / 2 + 1);
                }
                if let ValueKind::Date = kind {
                    assert!(condition.values.iter().all(|v| v.len() == 10));
                }
            }
        }
    }

    #[test]
    fn sample_unique_respects_bounds() {
        let mut rng = rand::rng();
        let values: Vec<String> = (0..30).map(|i| i.to_string()).collect();
        for _ in 0..100 {
            let picked = sample_unique(&mut rng, &values, 10);
            assert!((1..=10).contains(&picked.len()));
            let mut sorted = picked.clone();
            sorted.sort();
            sorted.dedup();
            assert_eq!(sorted.len(), picked.len());
        }
        assert!(sample_unique(&mut rng, &Vec::<String>::new(), 10).is_empty());
        assert_eq!(sample_unique(&mut rng, &["only"], 0), vec!["only".to_string()]);
    }

    #[test]
    fn date_addition_normalizes_like_a_calendar() {
        let date = CalendarDate { year: 2019, month: 11, day: 28 };
        assert_eq!(date.add(0, 0, 4).to_string(), "2019-12-02");
        assert_eq!(date.add(1, 3, 0).to_string(), "2021-02-28");
        assert_eq!(date.add(0, 3, 4).to_string(), "2020-03-03");
        let leap = CalendarDate { year: 2020, month: 2, day: 27 };
        assert_eq!(leap.add(0, 0, 2).to_string(), "2020-02-29");
    }

    #[test]
    fn cursor_is_base64_of_the_offset() {
        assert_eq!(encode_cursor(0), "MA==");
        assert_eq!(encode_cursor(150), "MTUw");
    }

    #[test]
    fn request_serializes_with_service_field_names() {
        let request = SearchRequest {
            search_type: SearchType::InsInvestor,
            first: 50,
            after: encode_cursor(0),
            conditions: vec![SearchCondition {
                id: "company.deal_count".to_string(),
                operator: Operator::IncludesAny,
                values: vec!["3".to_string()],
                currency_code: String::new(),
            }],
            order_columns: vec![OrderColumn {
                column_id: ORDER_COLUMN.to_string(),
                is_desc: true,
            }],
            column_ids: vec![],
        };
        let json = sonic_rs::to_string(&request).unwrap();
        assert!(json.contains(r#""searchType":"INS_INVESTOR""#));
        assert!(json.contains(r#""operator":"INCLUDES_ANY""#));
        assert!(json.contains(r#""orderColumns":[{"columnId""#));
        assert!(json.contains(r#""isDesc":true"#));
        assert!(!json.contains("currencyCode"));
    }

    #[test]
    fn search_type_indices_follow_the_service_enum() {
        assert_eq!(SearchType::from_index(0), Some(SearchType::None));
        assert_eq!(SearchType::from_index(5), Some(SearchType::InsInvestor));
        assert_eq!(SearchType::from_index(7), None);
        assert_eq!(SearchType::Lp.to_string(), "LP");
    }
}
