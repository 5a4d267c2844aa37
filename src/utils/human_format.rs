//! Human-readable formatting for durations and throughput

use std::time::Duration;

/// Formats a duration to a compact human-readable string
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis() as u64;
    if millis == 0 {
        return "0ms".to_string();
    }

    if millis < 1000 {
        format!("{}ms", millis)
    } else if millis < 60_000 {
        let seconds = millis as f64 / 1000.0;
        if seconds >= 10.0 {
            format!("{:.1}s", seconds)
        } else {
            format!("{:.2}s", seconds)
        }
    } else if millis < 3_600_000 {
        let total_seconds = millis / 1000;
        let minutes = total_seconds / 60;
        let seconds = total_seconds % 60;

        if seconds == 0 {
            format!("{}m", minutes)
        } else {
            format!("{}m{}s", minutes, seconds)
        }
    } else {
        let total_seconds = millis / 1000;
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;

        if minutes == 0 {
            format!("{}h", hours)
        } else {
            format!("{}h{}m", hours, minutes)
        }
    }
}

/// Completions per second over the elapsed time
pub fn rate_per_second(completed: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= f64::EPSILON {
        return 0.0;
    }
    completed as f64 / secs
}

/// Estimated time to finish the remaining items at the observed rate
pub fn estimate_remaining(completed: usize, total: usize, elapsed: Duration) -> Option<Duration> {
    if completed == 0 || completed > total {
        return None;
    }
    let per_item = elapsed.as_secs_f64() / completed as f64;
    Duration::try_from_secs_f64(per_item * (total - completed) as f64).ok()
}
