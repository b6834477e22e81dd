use chrono::{Local, TimeZone, Utc};

/// Number of decimal digits needed to write `max_number` (at least 1).
pub fn digit_count(max_number: u32) -> usize {
    max_number.to_string().len()
}

pub fn pad_number(value: u32, width: usize) -> String {
    format!("{:0>width$}", value, width = width)
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Local wall-clock rendering of a winner timestamp, e.g. `2026-02-17 00:05:12`.
pub fn format_timestamp(millis: i64) -> String {
    match Local.timestamp_millis_opt(millis).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "-".to_string(),
    }
}
