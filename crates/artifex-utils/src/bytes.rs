const UNIT: u64 = 1024;
const PREFIXES: [char; 6] = ['K', 'M', 'G', 'T', 'P', 'E'];

/// Formats a number of bytes into a human-readable string.
///
/// Values below 1 KiB are printed as a plain integer followed by ` B`. Larger values are
/// scaled by powers of 1024 and printed with `precision` decimal places and a binary unit
/// (`KiB`, `MiB`, ... `EiB`).
///
/// # Example
///
/// ```
/// use artifex_utils::bytes::format_bytes;
///
/// assert_eq!(format_bytes(512, 1), "512 B");
/// assert_eq!(format_bytes(1536, 1), "1.5 KiB");
/// assert_eq!(format_bytes(1024_u64.pow(2), 1), "1.0 MiB");
/// ```
pub fn format_bytes(bytes: u64, precision: usize) -> String {
    if bytes < UNIT {
        return format!("{bytes} B");
    }

    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT && exp < PREFIXES.len() - 1 {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }

    format!(
        "{:.*} {}iB",
        precision,
        bytes as f64 / div as f64,
        PREFIXES[exp]
    )
}

/// Formats a transfer rate in bytes per second, e.g. `2.0 MiB/s`.
pub fn format_rate(bytes_per_sec: f64) -> String {
    let bytes = if bytes_per_sec.is_finite() && bytes_per_sec > 0.0 {
        bytes_per_sec as u64
    } else {
        0
    };
    format!("{}/s", format_bytes(bytes, 1))
}
