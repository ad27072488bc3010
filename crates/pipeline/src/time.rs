//! Report time normalization and the per-record attribute string

use chrono::{Local, TimeZone, Utc};

/// Earliest report time accepted from a caller (ms since epoch)
pub const MIN_REPORT_TIME_MS: u64 = 1_435_101_567_000;

/// Latest report time accepted from a caller (ms since epoch)
pub const MAX_REPORT_TIME_MS: u64 = 4_103_101_567_000;

/// Wall-clock time in milliseconds since the Unix epoch
#[inline]
pub fn now_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Caller report time if it lies in the accepted window, otherwise `now_ms`
#[inline]
pub fn normalize_report_time(report_time_ms: u64, now_ms: u64) -> u64 {
    if (MIN_REPORT_TIME_MS..=MAX_REPORT_TIME_MS).contains(&report_time_ms) {
        report_time_ms
    } else {
        now_ms
    }
}

/// Local `yyyyMMddHHmm` rendering of a millisecond timestamp
pub fn format_report_time(time_ms: u64) -> String {
    i64::try_from(time_ms)
        .ok()
        .and_then(|ms| Local.timestamp_millis_opt(ms).single())
        .map(|dt| dt.format("%Y%m%d%H%M").to_string())
        .unwrap_or_default()
}

/// `__addcol1__reptime=<yyyyMMddHHmm>&__addcol2__ip=<ip>`
pub fn pack_attr(time_ms: u64, client_ip: &str) -> String {
    format!(
        "__addcol1__reptime={}&__addcol2__ip={}",
        format_report_time(time_ms),
        client_ip
    )
}
