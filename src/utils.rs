//! General utilities.

use std::time::{SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in seconds.
///
/// When `VDE_TEST_EPOCH` is set (by tests), returns that value instead of
/// the actual current time so persisted timestamps are deterministic.
///
/// All code that stores or displays timestamps should use this rather than
/// `SystemTime::now()` directly.
pub fn get_now() -> u64 {
    std::env::var("VDE_TEST_EPOCH")
        .ok()
        .and_then(|val| val.parse::<u64>().ok())
        .unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("system clock before Unix epoch")
                .as_secs()
        })
}

/// Format a Unix timestamp as ISO 8601 (e.g. "2025-01-01T00:00:00Z").
///
/// Out-of-range timestamps yield an explicit placeholder rather than a
/// misleading value.
pub fn format_timestamp_iso8601(timestamp: u64) -> String {
    let Ok(timestamp) = i64::try_from(timestamp) else {
        return format!("invalid-timestamp({timestamp})");
    };

    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| format!("invalid-timestamp({timestamp})"))
}

/// Current time as ISO 8601.
pub fn now_iso8601() -> String {
    format_timestamp_iso8601(get_now())
}

/// Compact timestamp used in hook log filenames (`YYYYMMDDhhmmss`).
pub fn log_stamp() -> String {
    let ts = i64::try_from(get_now()).unwrap_or(0);
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y%m%d%H%M%S").to_string())
        .unwrap_or_else(|| "00000000000000".to_string())
}

/// Replace path separators and other filename-hostile characters so a branch
/// name can appear in a log filename.
pub fn safe_branch_for_filename(branch: &str) -> String {
    branch
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Hostname of this machine, stamped into lock-ownership records and the
/// repo-lock sentinel.
pub fn hostname() -> String {
    whoami::fallible::hostname().unwrap_or_else(|_| "unknown-host".to_string())
}

/// Name of the invoking user, for ownership records.
pub fn username() -> String {
    whoami::username()
}

/// Whether stdout is attached to a terminal.
///
/// Safety-flag validation and the hook environment both key off this.
pub fn stdout_is_tty() -> bool {
    use std::io::IsTerminal;
    std::io::stdout().is_terminal()
}
