//! Subtitle timestamps in the `HH:MM:SS,mmm` form.

const MILLIS_PER_HOUR: u64 = 3_600_000;
const MILLIS_PER_MINUTE: u64 = 60_000;
const MILLIS_PER_SECOND: u64 = 1_000;

/// `99:59:59,999`, the largest value the two-digit hour field can hold.
const MAX_MILLIS: u64 = 100 * MILLIS_PER_HOUR - 1;

/// Format a second count as `HH:MM:SS,mmm`.
///
/// Negative, NaN and negative infinite inputs format as `00:00:00,000`.
/// Anything from 100 hours up, including positive infinity, saturates at
/// `99:59:59,999`, so the output always has two-digit hours.
///
/// Sub-millisecond precision is truncated, never rounded, so `59.9999` stays
/// in the same minute. Inputs less than a nanosecond below a millisecond
/// boundary count as reaching it: `1.001` is stored as `1.000999…` and must
/// still format as `,001`, so `0.9999999999` formats as `00:00:01,000`.
pub fn format_timecode(seconds: f64) -> String {
    let millis = to_millis(seconds);
    let hours = millis / MILLIS_PER_HOUR;
    let minutes = (millis % MILLIS_PER_HOUR) / MILLIS_PER_MINUTE;
    let secs = (millis % MILLIS_PER_MINUTE) / MILLIS_PER_SECOND;
    let ms = millis % MILLIS_PER_SECOND;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, ms)
}

/// Parse `HH:MM:SS,mmm` back into seconds.
///
/// A `.` separator is accepted as well, since some tools emit it.
pub fn parse_timecode(value: &str) -> Option<f64> {
    let value = value.trim();
    let (clock, millis) = value.split_once([',', '.'])?;
    let mut parts = clock.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let secs: u64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || minutes >= 60 || secs >= 60 || millis.len() != 3 {
        return None;
    }
    let millis: u64 = millis.parse().ok()?;

    let total = hours * MILLIS_PER_HOUR + minutes * MILLIS_PER_MINUTE + secs * MILLIS_PER_SECOND + millis;
    Some(total as f64 / 1000.0)
}

fn to_millis(seconds: f64) -> u64 {
    if seconds.is_nan() || seconds <= 0.0 {
        return 0;
    }
    if seconds >= (MAX_MILLIS / MILLIS_PER_SECOND + 1) as f64 {
        return MAX_MILLIS;
    }
    // Decimal inputs such as 1.001 are stored just below their value; the
    // epsilon keeps them from truncating down a whole millisecond.
    ((seconds * 1000.0 + 1e-6).floor() as u64).min(MAX_MILLIS)
}
