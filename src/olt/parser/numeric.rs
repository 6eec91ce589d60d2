//! Tolerant numeric extraction.
//!
//! Device tables decorate numbers with units (`-20.491(dbm)`, `3382m`,
//! `45C`) and use `-` or `N/A` for missing values. These helpers strip the
//! decoration and return `None` instead of failing.

fn strip_to(value: &str, keep: impl Fn(char) -> bool) -> String {
    value.chars().filter(|c| keep(*c)).collect()
}

/// Keeps digits, sign and decimal point, then parses.
pub fn safe_float(value: &str) -> Option<f64> {
    let cleaned = strip_to(value, |c| c.is_ascii_digit() || c == '-' || c == '.');
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Keeps digits and sign, then parses.
pub fn safe_int(value: &str) -> Option<i64> {
    let cleaned = strip_to(value, |c| c.is_ascii_digit() || c == '-');
    cleaned.parse::<i64>().ok()
}

/// First run of ASCII digits, e.g. `3382` from `ONU Distance: 3382m`.
pub fn leading_digits(value: &str) -> Option<i64> {
    let digits: String = value
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
