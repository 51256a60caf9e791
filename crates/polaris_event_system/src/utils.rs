//! Small helpers shared by event producers.

/// Seconds since the Unix epoch, or 0 if the clock is before it.
pub fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
