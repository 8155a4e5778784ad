// Utility functions for feed-ranking-service

/// Normalize a count against a batch-wide maximum, yielding [0, 1].
/// A zero maximum means the metric is absent from the batch entirely.
pub fn normalize_count(count: u32, batch_max: u32) -> f64 {
    if batch_max == 0 {
        0.0
    } else {
        (count as f64 / batch_max as f64).clamp(0.0, 1.0)
    }
}

/// Linear time-decay over a fixed window: 1.0 at age 0, 0.0 at the window
/// edge and beyond. Negative ages (clock skew) clamp to 1.0.
pub fn linear_decay(age_secs: i64, window_secs: i64) -> f64 {
    if window_secs <= 0 {
        return 0.0;
    }
    (1.0 - age_secs as f64 / window_secs as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_count() {
        assert!((normalize_count(5, 10) - 0.5).abs() < 1e-9);
        assert!((normalize_count(10, 10) - 1.0).abs() < 1e-9);
        assert_eq!(normalize_count(0, 0), 0.0);
        assert_eq!(normalize_count(3, 0), 0.0);
    }

    #[test]
    fn test_linear_decay() {
        let week = 7 * 24 * 3600;
        assert!((linear_decay(0, week) - 1.0).abs() < 1e-9);
        assert!((linear_decay(week / 2, week) - 0.5).abs() < 1e-9);
        assert_eq!(linear_decay(week, week), 0.0);
        assert_eq!(linear_decay(week * 2, week), 0.0);
        // Future-dated posts clamp instead of overflowing past 1.0
        assert_eq!(linear_decay(-3600, week), 1.0);
    }
}
