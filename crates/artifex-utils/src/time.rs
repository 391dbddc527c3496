use std::time::Duration;

/// Parses a compact duration string such as `30s`, `5m` or `1h30m`.
///
/// Each component is a run of digits followed by one of `s`, `m`, `h` or `d`. Returns
/// `None` for empty input, unknown units, trailing digits without a unit, or overflow.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use artifex_utils::time::parse_duration;
///
/// assert_eq!(parse_duration("1m30s"), Some(Duration::from_secs(90)));
/// assert_eq!(parse_duration("soon"), None);
/// ```
pub fn parse_duration(input: &str) -> Option<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let mut total: u64 = 0;
    let mut chars = input.chars().peekable();

    while chars.peek().is_some() {
        let mut number_str = String::new();
        while let Some(c) = chars.peek() {
            if c.is_ascii_digit() {
                number_str.push(chars.next()?);
            } else {
                break;
            }
        }

        if number_str.is_empty() {
            return None;
        }

        let number: u64 = number_str.parse().ok()?;
        let multiplier = match chars.next()? {
            's' => 1,
            'm' => 60,
            'h' => 60 * 60,
            'd' => 24 * 60 * 60,
            _ => return None,
        };

        total = total.checked_add(number.checked_mul(multiplier)?)?;
    }

    Some(Duration::from_secs(total))
}
