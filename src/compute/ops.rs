//! Aggregation and sorting over report rows
//!
//! Pure functions, public on purpose: the channel runs them on worker
//! threads, but a caller that receives an error response can fall back to
//! invoking them directly on its own thread.

use std::cmp::Ordering;
use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::rows::{self, Row};

const SPEND_FIELDS: &[&str] = &["cost", "spend"];
const AD_SALES_FIELDS: &[&str] = &["sales_1d", "sales"];
const TOTAL_SALES_FIELDS: &[&str] = &["ordered_product_sales", "totalSales"];
const DATE_FIELDS: &[&str] = &["date", "report_date"];

/// Sort direction for `sort_rows`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Headline KPI totals and ratios over a row set. Field names are the wire
/// names the dashboards consume.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiSummary {
    pub ad_spend: f64,
    pub ad_sales: f64,
    pub total_sales: f64,
    pub acos: f64,
    pub tcos: f64,
    pub roas: f64,
    pub ad_clicks: i64,
    pub avg_cpc: f64,
    pub impressions: i64,
}

/// Per-date metric sums, in first-occurrence order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateBucket {
    pub date: String,
    pub spend: f64,
    pub sales: f64,
    pub clicks: i64,
    pub impressions: i64,
}

impl DateBucket {
    fn new(date: String) -> Self {
        Self {
            date,
            spend: 0.0,
            sales: 0.0,
            clicks: 0,
            impressions: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Totals {
    spend: f64,
    ad_sales: f64,
    total_sales: f64,
    clicks: i64,
    impressions: i64,
}

impl Totals {
    fn add_row(mut self, row: &Row) -> Self {
        self.spend += rows::num_field(row, SPEND_FIELDS);
        self.ad_sales += rows::num_field(row, AD_SALES_FIELDS);
        self.total_sales += rows::num_field(row, TOTAL_SALES_FIELDS);
        self.clicks += rows::int_field(row, &["clicks"]);
        self.impressions += rows::int_field(row, &["impressions"]);
        self
    }

    fn merge(self, other: Self) -> Self {
        Self {
            spend: self.spend + other.spend,
            ad_sales: self.ad_sales + other.ad_sales,
            total_sales: self.total_sales + other.total_sales,
            clicks: self.clicks + other.clicks,
            impressions: self.impressions + other.impressions,
        }
    }
}

/// Sum spend, sales, clicks and impressions across `rows` and derive the
/// headline ratios. Every ratio is 0 when its denominator is 0.
pub fn compute_kpis(rows: &[Row]) -> KpiSummary {
    let totals = rows
        .par_iter()
        .fold(Totals::default, |acc, row| acc.add_row(row))
        .reduce(Totals::default, Totals::merge);

    let ratio = |num: f64, den: f64| if den > 0.0 { num / den } else { 0.0 };

    KpiSummary {
        ad_spend: totals.spend,
        ad_sales: totals.ad_sales,
        total_sales: totals.total_sales,
        acos: ratio(totals.spend, totals.ad_sales) * 100.0,
        tcos: ratio(totals.spend, totals.total_sales) * 100.0,
        roas: ratio(totals.ad_sales, totals.spend),
        ad_clicks: totals.clicks,
        avg_cpc: ratio(totals.spend, totals.clicks as f64),
        impressions: totals.impressions,
    }
}

/// Group rows by their date field (`date`, falling back to `report_date`)
/// and sum the metrics per group. Bucket order is the first occurrence of
/// each date, not sorted. Rows with no date field are skipped.
pub fn aggregate_by_date(rows: &[Row]) -> Vec<DateBucket> {
    let mut buckets: Vec<DateBucket> = Vec::new();
    let mut by_date: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let Some(date) = rows::text_field(row, DATE_FIELDS) else {
            continue;
        };
        let idx = *by_date.entry(date.clone()).or_insert_with(|| {
            buckets.push(DateBucket::new(date.clone()));
            buckets.len() - 1
        });

        let bucket = &mut buckets[idx];
        bucket.spend += rows::num_field(row, SPEND_FIELDS);
        bucket.sales += rows::num_field(row, AD_SALES_FIELDS);
        bucket.clicks += rows::int_field(row, &["clicks"]);
        bucket.impressions += rows::int_field(row, &["impressions"]);
    }

    buckets
}

/// Sort rows by a field. When the first operand coerces to a number both
/// operands compare numerically (so `"10"` orders after `"2"`), otherwise
/// they compare as strings.
///
/// The sort is stable: rows with equal keys keep their original relative
/// order, so repeated sorts produce deterministic output.
pub fn sort_rows(mut items: Vec<Row>, field: &str, order: SortOrder) -> Vec<Row> {
    items.par_sort_by(|a, b| {
        let ordering = compare_field(a, b, field);
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
    items
}

fn compare_field(a: &Row, b: &Row, field: &str) -> Ordering {
    let a_val = a.get(field);
    let b_val = b.get(field);

    // Numeric coercion keys off the first operand.
    if let Some(a_num) = a_val.and_then(rows::coerce_f64) {
        let b_num = b_val.and_then(rows::coerce_f64).unwrap_or(0.0);
        return a_num.partial_cmp(&b_num).unwrap_or(Ordering::Equal);
    }

    let a_text = a_val.map(value_text).unwrap_or_default();
    let b_text = b_val.map(value_text).unwrap_or_default();
    a_text.cmp(&b_text)
}

fn value_text(value: &Row) -> String {
    match value {
        Row::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kpis_sum_and_derive_ratios() {
        let rows = vec![json!({"cost": 10, "sales_1d": 0}), json!({"cost": 5, "sales_1d": 20})];
        let kpis = compute_kpis(&rows);

        assert_eq!(kpis.ad_spend, 15.0);
        assert_eq!(kpis.ad_sales, 20.0);
        assert_eq!(kpis.acos, 75.0);
        assert_eq!(kpis.roas, 20.0 / 15.0);
    }

    #[test]
    fn kpis_guard_against_zero_denominators() {
        let rows = vec![json!({"cost": 0, "sales_1d": 0, "clicks": 0})];
        let kpis = compute_kpis(&rows);

        assert_eq!(kpis.acos, 0.0);
        assert_eq!(kpis.tcos, 0.0);
        assert_eq!(kpis.roas, 0.0);
        assert_eq!(kpis.avg_cpc, 0.0);
    }

    #[test]
    fn kpis_accept_alternate_field_names() {
        let rows = vec![json!({
            "spend": "2.5",
            "sales": 10,
            "totalSales": 40,
            "clicks": "4",
            "impressions": 100
        })];
        let kpis = compute_kpis(&rows);

        assert_eq!(kpis.ad_spend, 2.5);
        assert_eq!(kpis.ad_sales, 10.0);
        assert_eq!(kpis.total_sales, 40.0);
        assert_eq!(kpis.ad_clicks, 4);
        assert_eq!(kpis.avg_cpc, 2.5 / 4.0);
    }

    #[test]
    fn kpis_on_empty_input_are_all_zero() {
        assert_eq!(compute_kpis(&[]), KpiSummary::default());
    }

    #[test]
    fn aggregate_groups_in_first_occurrence_order() {
        let rows = vec![
            json!({"date": "2024-03-02", "cost": 1, "clicks": 2}),
            json!({"report_date": "2024-03-01", "cost": 2}),
            json!({"date": "2024-03-02", "cost": 3, "clicks": 1}),
        ];
        let buckets = aggregate_by_date(&rows);

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].date, "2024-03-02");
        assert_eq!(buckets[0].spend, 4.0);
        assert_eq!(buckets[0].clicks, 3);
        assert_eq!(buckets[1].date, "2024-03-01");
        assert_eq!(buckets[1].spend, 2.0);
    }

    #[test]
    fn aggregate_skips_dateless_rows() {
        let rows = vec![json!({"cost": 5}), json!({"date": "2024-03-01", "cost": 1})];
        let buckets = aggregate_by_date(&rows);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].spend, 1.0);
    }

    #[test]
    fn sort_coerces_numeric_strings() {
        let items = vec![json!({"v": "10"}), json!({"v": "2"})];
        let sorted = sort_rows(items, "v", SortOrder::Asc);
        // Numeric order, not lexicographic "10" < "2".
        assert_eq!(sorted, vec![json!({"v": "2"}), json!({"v": "10"})]);
    }

    #[test]
    fn sort_descending_reverses() {
        let items = vec![json!({"v": 1}), json!({"v": 3}), json!({"v": 2})];
        let sorted = sort_rows(items, "v", SortOrder::Desc);
        assert_eq!(
            sorted,
            vec![json!({"v": 3}), json!({"v": 2}), json!({"v": 1})]
        );
    }

    #[test]
    fn sort_compares_non_numeric_values_as_strings() {
        let items = vec![json!({"v": "banana"}), json!({"v": "apple"})];
        let sorted = sort_rows(items, "v", SortOrder::Asc);
        assert_eq!(sorted[0], json!({"v": "apple"}));
    }

    #[test]
    fn sort_is_stable_on_equal_keys() {
        let items = vec![
            json!({"v": 1, "tag": "first"}),
            json!({"v": 2, "tag": "mid"}),
            json!({"v": 1, "tag": "second"}),
        ];
        let sorted = sort_rows(items, "v", SortOrder::Asc);
        assert_eq!(sorted[0]["tag"], "first");
        assert_eq!(sorted[1]["tag"], "second");
        assert_eq!(sorted[2]["tag"], "mid");
    }
}
