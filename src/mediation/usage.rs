//! Per-identity usage counters (requests this hour and today).

use super::types::Identity;
use crate::resilience::rate_limiter::IdentityClass;
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageStats {
    pub identity_class: IdentityClass,
    /// `HH:00` of the current UTC hour.
    pub hour: String,
    /// `YYYY-MM-DD` of the current UTC day.
    pub date: String,
    pub requests_this_hour: u64,
    pub hourly_limit: u64,
    pub requests_today: u64,
}

pub(crate) fn daily_key(identity: &Identity, at: DateTime<Utc>) -> String {
    let segment = match identity.class() {
        IdentityClass::Authenticated => "user",
        IdentityClass::Anonymous => "ip",
    };
    format!(
        "usage_stats:{}:{}:{}",
        segment,
        identity.key(),
        at.format("%Y%m%d")
    )
}

/// Time left until the next UTC midnight.
pub(crate) fn until_end_of_day(at: DateTime<Utc>) -> Duration {
    let next = at
        .date_naive()
        .succ_opt()
        .map(|d| Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN)));
    next.and_then(|n| (n - at).to_std().ok())
        .filter(|d| !d.is_zero())
        .unwrap_or(Duration::from_secs(1))
}
