use chrono::NaiveDate;
use mietwerk_core::Money;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Date formats tried in order: German day-first, ISO, two-digit German.
pub const DATE_FORMATS: &[&str] = &["%d.%m.%Y", "%Y-%m-%d", "%d.%m.%y"];

/// Parses a statement amount in German notation ("1.234,56", "-750,00"),
/// tolerating surrounding quotes, whitespace and currency markers. Plain
/// dot-decimal input ("1234.56") also parses. Returns zero Money when the
/// field is unparseable; the row parser uses [`parse_amount_checked`] to
/// tell that apart from a genuine zero.
pub fn parse_amount(raw: &str) -> Money {
    parse_amount_checked(raw).unwrap_or_else(Money::zero)
}

pub fn parse_amount_checked(raw: &str) -> Option<Money> {
    let s = raw
        .trim()
        .trim_matches('"')
        .trim()
        .trim_end_matches('€')
        .trim_end_matches("EUR")
        .trim();
    if s.is_empty() {
        return None;
    }

    // Decimal comma marks thousand-dot notation; otherwise the field is
    // already dot-decimal (or integral).
    let normalized = if s.contains(',') {
        s.replace('.', "").replace(',', ".")
    } else {
        s.to_string()
    };
    let normalized: String = normalized.chars().filter(|c| *c != ' ').collect();

    Decimal::from_str(&normalized).ok().map(Money::from_decimal)
}

/// Tries each format in order, returning the first valid calendar date.
/// Years below 1000 are rejected as mis-reads of two-digit years by a
/// four-digit format; the two-digit format later in the list picks them up.
pub fn parse_date(raw: &str, formats: &[&str]) -> Option<NaiveDate> {
    use chrono::Datelike;

    let s = raw.trim().trim_matches('"').trim();
    formats.iter().find_map(|fmt| {
        NaiveDate::parse_from_str(s, fmt)
            .ok()
            .filter(|d| d.year() >= 1000)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn german_thousand_dot_decimal_comma() {
        assert_eq!(parse_amount("1.234,56").to_cents(), 123456);
        assert_eq!(parse_amount("-750,00").to_cents(), -75000);
        assert_eq!(parse_amount("0,01").to_cents(), 1);
    }

    #[test]
    fn dot_decimal_and_integral() {
        assert_eq!(parse_amount("1234.56").to_cents(), 123456);
        assert_eq!(parse_amount("750").to_cents(), 75000);
    }

    #[test]
    fn quotes_whitespace_and_currency_markers() {
        assert_eq!(parse_amount("\"1.234,56\"").to_cents(), 123456);
        assert_eq!(parse_amount("  -750,00 € ").to_cents(), -75000);
        assert_eq!(parse_amount("750,00 EUR").to_cents(), 75000);
    }

    #[test]
    fn unparseable_is_zero_never_panics() {
        assert!(parse_amount("").is_zero());
        assert!(parse_amount("n/a").is_zero());
        assert!(parse_amount("--").is_zero());
        assert!(parse_amount_checked("n/a").is_none());
        // A real zero still parses.
        assert_eq!(parse_amount_checked("0,00"), Some(Money::zero()));
    }

    #[test]
    fn date_formats_in_order() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(parse_date("01.03.2024", DATE_FORMATS), Some(d));
        assert_eq!(parse_date("2024-03-01", DATE_FORMATS), Some(d));
        assert_eq!(parse_date("01.03.24", DATE_FORMATS), Some(d));
        assert_eq!(parse_date("31.02.2024", DATE_FORMATS), None);
        assert_eq!(parse_date("soon", DATE_FORMATS), None);
    }
}
