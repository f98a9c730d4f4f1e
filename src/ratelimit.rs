use chrono::{DateTime, Duration, Utc};

/// Sliding-window counter. Chosen over fixed buckets to avoid edge effects
/// at bucket boundaries, where two bursts could otherwise adjoin into one
/// larger effective burst.
///
/// Prune timestamps older than `now - window`, then allow-and-append if the
/// remaining count is below the maximum; deny without appending otherwise.
pub fn check_and_record(
    window: &mut Vec<DateTime<Utc>>,
    max_per_window: u32,
    window_s: u64,
    now: DateTime<Utc>,
) -> bool {
    prune(window, window_s, now);

    if window.len() < max_per_window as usize {
        window.push(now);
        true
    } else {
        false
    }
}

/// Drop entries outside `[now - window, now]`. Future-dated entries (clock
/// stepped backwards between runs) are dropped too, so a bad clock cannot
/// wedge a category shut.
pub fn prune(window: &mut Vec<DateTime<Utc>>, window_s: u64, now: DateTime<Utc>) {
    let span = Duration::try_seconds(i64::try_from(window_s).unwrap_or(i64::MAX))
        .unwrap_or(Duration::MAX);
    let horizon = now
        .checked_sub_signed(span)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    window.retain(|ts| *ts >= horizon && *ts <= now);
}
