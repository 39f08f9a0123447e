use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Wall-clock milliseconds since the unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
