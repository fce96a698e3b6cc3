/// Wall-clock milliseconds since epoch, the time base used throughout the core for trade
/// timestamps, registry bookkeeping and flush scheduling.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
