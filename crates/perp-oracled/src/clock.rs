//! Wall-clock helpers.
//!
//! The store never reads the clock itself; every timestamp it sees comes from
//! here.

/// Current Unix time in whole seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
