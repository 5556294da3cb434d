use crate::model::*;

// ── Per-member aggregation ───────────────────────────────────────

/// Sum a member's intervals into availability stats.
///
/// Each interval counts its full stored duration in whole minutes, even
/// when it only partly overlaps the window it was fetched for.
pub fn interval_stats(intervals: &[Interval]) -> IntervalStats {
    let mut stats = IntervalStats {
        total_available_minutes: 0,
        total_unavailable_minutes: 0,
        available_slots: 0,
        unavailable_slots: 0,
        availability_percentage: 0.0,
    };
    for interval in intervals {
        let minutes = interval.span.duration_minutes();
        if interval.available {
            stats.total_available_minutes += minutes;
            stats.available_slots += 1;
        } else {
            stats.total_unavailable_minutes += minutes;
            stats.unavailable_slots += 1;
        }
    }
    stats.availability_percentage =
        percentage(stats.total_available_minutes, stats.total_unavailable_minutes);
    stats
}

/// `available / (available + unavailable) * 100` to two decimals; 0 when empty.
fn percentage(available: i64, unavailable: i64) -> f64 {
    let total = available + unavailable;
    if total == 0 {
        return 0.0;
    }
    let raw = available as f64 / total as f64 * 100.0;
    (raw * 100.0).round() / 100.0
}
