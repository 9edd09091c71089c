use chrono::{Local, SecondsFormat, Utc};

pub fn current_human_timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M").to_string()
}

/// UTC timestamp used for data-package `created` stamps.
pub fn current_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
