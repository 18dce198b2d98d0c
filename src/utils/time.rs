// src/utils/time.rs
use chrono::Utc;

/// Unix time in milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Unix time in whole seconds, the resolution oracle rounds are stamped with.
pub fn now_secs() -> i64 {
    Utc::now().timestamp()
}
