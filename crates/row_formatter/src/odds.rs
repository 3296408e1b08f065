use regex::Regex;
use std::sync::OnceLock;

/// `N/D` with a non-zero denominator, as `N / D`.
pub fn parse_fraction(raw: &str) -> Option<f64> {
    let (n, d) = raw.trim().split_once('/')?;
    let n: f64 = n.trim().parse().ok()?;
    let d: f64 = d.trim().parse().ok()?;
    if d == 0.0 || !n.is_finite() || !d.is_finite() {
        return None;
    }
    Some(n / d)
}

/// Half-up rounding to two places, done on the decimal representation so
/// values like 1.005 round the way they read.
pub fn round2(value: f64) -> f64 {
    let shift = |v: f64, exp: i32| format!("{v}e{exp}").parse::<f64>().unwrap_or(v * 10f64.powi(exp));
    let scaled = shift(value, 2).round();
    shift(scaled, -2)
}

/// Basketball convention: plain `N/D`.
pub fn fraction_to_decimal(raw: &str) -> Option<f64> {
    parse_fraction(raw).map(round2)
}

/// Football convention: `N/D + 1`.
pub fn fraction_to_continental(raw: &str) -> Option<f64> {
    parse_fraction(raw).map(|v| round2(round2(v) + 1.0))
}

fn handicap_token() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[0-9.\-]+").ok()).as_ref()
}

/// Leading numeric token of an Asian handicap choice label such as
/// `"(-1.5) Arsenal"` or `"-0.25 Arsenal"`. Best effort: labels the site has
/// not used so far may not parse.
pub fn parse_handicap(label: &str) -> Option<f64> {
    let first = label.split(' ').next()?;
    let token = handicap_token()?.find(first)?;
    token.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fractions_convert_exactly() {
        assert_eq!(fraction_to_decimal("5/2"), Some(2.5));
        assert_eq!(fraction_to_continental("5/2"), Some(3.5));
        assert_eq!(fraction_to_decimal("1/3"), Some(0.33));
        assert_eq!(fraction_to_continental("1/3"), Some(1.33));
        assert_eq!(fraction_to_continental("8/13"), Some(1.62));
        assert_eq!(fraction_to_decimal("100/1"), Some(100.0));
    }

    #[test]
    fn rejects_bad_fractions() {
        assert_eq!(parse_fraction("3/0"), None);
        assert_eq!(parse_fraction("evens"), None);
        assert_eq!(parse_fraction("a/b"), None);
    }

    #[test]
    fn rounding_is_half_up() {
        assert_eq!(round2(1.005), 1.01);
        assert_eq!(round2(2.675), 2.68);
        assert_eq!(round2(0.124), 0.12);
    }

    #[test]
    fn handicap_labels_seen_today() {
        assert_eq!(parse_handicap("(-1.5) Arsenal"), Some(-1.5));
        assert_eq!(parse_handicap("-0.25 Arsenal"), Some(-0.25));
        assert_eq!(parse_handicap("(+0.5) Man Utd"), Some(0.5));
        assert_eq!(parse_handicap("Arsenal"), None);
    }
}
