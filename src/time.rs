/// Wall-clock access in epoch milliseconds

pub const MS_PER_DAY: f64 = 86_400_000.0;

#[cfg(target_arch = "wasm32")]
pub fn now_ms() -> f64 {
    js_sys::Date::now()
}

#[cfg(not(target_arch = "wasm32"))]
pub fn now_ms() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as f64)
        .unwrap_or(0.0)
}

/// Day number since the epoch for a millisecond timestamp
pub fn day_number(ms: f64) -> i64 {
    (ms / MS_PER_DAY).floor() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_number() {
        assert_eq!(day_number(0.0), 0);
        assert_eq!(day_number(MS_PER_DAY - 1.0), 0);
        assert_eq!(day_number(MS_PER_DAY), 1);
        assert_eq!(day_number(10.5 * MS_PER_DAY), 10);
    }
}
