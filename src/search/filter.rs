//! Query filters and their translation into store predicates

use crate::error::{Error, Result};
use crate::store::MessageFilter;
use chrono::{NaiveDate, NaiveTime};

/// Request-scoped filter; absent fields impose no constraint
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilter {
    pub channel: Option<String>,
    pub user: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl QueryFilter {
    /// Conjunction of case-insensitive channel/user matches and an
    /// inclusive `ts_float` range spanning whole UTC days
    pub fn to_message_filter(&self) -> MessageFilter {
        let mut filter = MessageFilter::new();

        if let Some(channel) = non_blank(&self.channel) {
            filter = filter.with_match("channel_lower", channel.to_lowercase());
        }
        if let Some(user) = non_blank(&self.user) {
            filter = filter.with_match("user_name_lower", user.to_lowercase());
        }

        filter.with_range(
            "ts_float",
            self.start_date.map(start_of_day_epoch),
            self.end_date.map(end_of_day_epoch),
        )
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Parse a `YYYY-MM-DD` request date
pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        Error::InvalidRequest(format!("{} must be YYYY-MM-DD, got '{}'", field, value))
    })
}

/// Epoch seconds at 00:00:00 UTC on `date`
pub fn start_of_day_epoch(date: NaiveDate) -> f64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp() as f64
}

/// Epoch seconds at 23:59:59 UTC on `date`
pub fn end_of_day_epoch(date: NaiveDate) -> f64 {
    start_of_day_epoch(date) + 86_399.0
}
