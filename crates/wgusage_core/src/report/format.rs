use chrono::TimeDelta;

const BYTE_UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];

/// Renders a byte count with binary prefixes and two decimals, e.g. `1.46 KiB`.
#[must_use]
pub fn format_bytes(bytes: i64) -> String {
    #[allow(clippy::cast_precision_loss)]
    let mut value = bytes.max(0) as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", BYTE_UNITS[unit])
}

/// Renders elapsed time as its two most significant units,
/// e.g. `3 days, 4 hours` or `5 minutes, 1 second`.
#[must_use]
pub fn format_elapsed(elapsed: TimeDelta) -> String {
    let seconds = elapsed.num_seconds().max(0);
    if seconds == 0 {
        return "just now".into();
    }

    let days = seconds / 86_400;
    let hours = seconds % 86_400 / 3_600;
    let minutes = seconds % 3_600 / 60;
    let seconds = seconds % 60;

    if days > 0 {
        format!("{}, {}", unit(days, "day"), unit(hours, "hour"))
    } else if hours > 0 {
        format!("{}, {}", unit(hours, "hour"), unit(minutes, "minute"))
    } else if minutes > 0 {
        format!("{}, {}", unit(minutes, "minute"), unit(seconds, "second"))
    } else {
        unit(seconds, "second")
    }
}

fn unit(count: i64, name: &str) -> String {
    if count == 1 {
        format!("{count} {name}")
    } else {
        format!("{count} {name}s")
    }
}
