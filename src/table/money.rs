//! Monetary normalisation and BRL formatting.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_NON_NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\d,.\-]").unwrap());

/// Longest leading run that reads as a decimal number.
static RE_LEADING_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?(?:\d+(?:\.\d*)?|\.\d+)").unwrap());

/// Turn a loosely formatted amount into a number.
///
/// Everything except digits, `,`, `.` and `-` is dropped. When a comma is
/// present it is the decimal separator and any `.` before it is a thousands
/// separator, so `"R$ 1.234,56"` reads as `1234.56`. Values without a comma
/// keep `.` as the decimal point. Anything unparsable is `0.0`.
pub fn normalize_money(value: &str) -> f64 {
    let cleaned = RE_NON_NUMERIC.replace_all(value.trim(), "");
    let canonical = match cleaned.rsplit_once(',') {
        Some((int_part, frac_part)) => {
            let int_digits: String = int_part.chars().filter(|c| *c != '.' && *c != ',').collect();
            format!("{int_digits}.{frac_part}")
        }
        None => cleaned.into_owned(),
    };
    RE_LEADING_NUMBER
        .find(&canonical)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|n| n.is_finite())
        .unwrap_or(0.0)
}

/// Format an amount as Brazilian reais, e.g. `R$ 1.234,56`.
pub fn format_brl(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let (int_part, frac_part) = (cents / 100, cents % 100);

    let digits = int_part.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }

    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}R$ {grouped},{frac_part:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brazilian_thousands_and_decimal() {
        assert_eq!(normalize_money("1.234,56"), 1234.56);
        assert_eq!(normalize_money("R$ 12.345.678,9"), 12345678.9);
    }

    #[test]
    fn placeholders_are_zero() {
        assert_eq!(normalize_money("-"), 0.0);
        assert_eq!(normalize_money("abc"), 0.0);
        assert_eq!(normalize_money(""), 0.0);
    }

    #[test]
    fn dot_decimal_without_comma() {
        assert_eq!(normalize_money("10.5"), 10.5);
        assert_eq!(normalize_money("7"), 7.0);
    }

    #[test]
    fn negative_amounts() {
        assert_eq!(normalize_money("-3,50"), -3.5);
    }

    #[test]
    fn trailing_garbage_is_ignored() {
        assert_eq!(normalize_money("12-3"), 12.0);
    }

    #[test]
    fn brl_format_groups_thousands() {
        assert_eq!(format_brl(1234.56), "R$ 1.234,56");
        assert_eq!(format_brl(0.0), "R$ 0,00");
        assert_eq!(format_brl(1_000_000.0), "R$ 1.000.000,00");
        assert_eq!(format_brl(999.999), "R$ 1.000,00");
        assert_eq!(format_brl(-42.1), "-R$ 42,10");
    }
}
