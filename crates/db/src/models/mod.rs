use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};

pub mod code_review;
pub mod pull_request;
pub mod repository;
pub mod review_session;

/// Buckets UTC timestamps into per-day counts, oldest day first.
pub(crate) fn day_counts(stamps: Vec<DateTime<Utc>>) -> Vec<(NaiveDate, i64)> {
    let mut days: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    for stamp in stamps {
        *days.entry(stamp.date_naive()).or_insert(0) += 1;
    }
    days.into_iter().collect()
}
