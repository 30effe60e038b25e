use std::sync::LazyLock;

use regex::Regex;

use crate::types::{SizeSpec, MIN_DIMENSION};

static SIZE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+)\s*[xX×]\s*(\d+)\s*$").expect("size token pattern is valid")
});
static DECIMAL_DIGIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d$").expect("digit pattern is valid"));

fn is_decimal_digit(c: char) -> bool {
    let mut buf = [0u8; 4];
    DECIMAL_DIGIT.is_match(c.encode_utf8(&mut buf))
}

/// Value of any Unicode decimal digit (`\d` in the pattern above).
///
/// Every decimal digit set is a contiguous `0..=9` run, and adjacent sets
/// start on a zero, so the distance to the start of the run gives the value.
fn digit_value(c: char) -> Option<u32> {
    if let Some(value) = c.to_digit(10) {
        return Some(value);
    }
    if !is_decimal_digit(c) {
        return None;
    }
    let mut code = c as u32;
    let mut offset = 0;
    while let Some(prev) = code
        .checked_sub(1)
        .and_then(char::from_u32)
        .filter(|&p| is_decimal_digit(p))
    {
        code = prev as u32;
        offset += 1;
    }
    Some(offset % 10)
}

fn parse_number(digits: &str) -> Option<u32> {
    digits.chars().try_fold(0u32, |acc, c| {
        acc.checked_mul(10)?.checked_add(digit_value(c)?)
    })
}

/// Parses a `WIDTHxHEIGHT` token.
///
/// Anything that doesn't match, overflows, or has a side of 30 or less
/// falls back to [`SizeSpec::Default`]. Job files are hand edited, so a typo
/// in the size never rejects the line.
pub(crate) fn parse_size(token: &str) -> SizeSpec {
    let Some(caps) = SIZE_TOKEN.captures(token) else {
        return SizeSpec::Default;
    };
    let (Some(width), Some(height)) = (parse_number(&caps[1]), parse_number(&caps[2])) else {
        return SizeSpec::Default;
    };
    if width <= MIN_DIMENSION || height <= MIN_DIMENSION {
        return SizeSpec::Default;
    }
    SizeSpec::Explicit { width, height }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_width_first() {
        assert_eq!(
            parse_size("1024x1344"),
            SizeSpec::Explicit {
                width: 1024,
                height: 1344
            }
        );
        assert_eq!(parse_size(" 768 X 512 ").dimensions(), (768, 512));
        assert_eq!(parse_size("640×480").dimensions(), (640, 480));
    }

    #[test]
    fn small_sides_fall_back() {
        assert_eq!(parse_size("0x0"), SizeSpec::Default);
        assert_eq!(parse_size("30x512"), SizeSpec::Default);
        assert_eq!(parse_size("512x30"), SizeSpec::Default);
        assert_eq!(parse_size("31x31").dimensions(), (31, 31));
    }

    #[test]
    fn accepts_non_ascii_digits() {
        assert_eq!(parse_size("１０２４x７６８").dimensions(), (1024, 768));
        assert_eq!(parse_size("١٠٢٤ × ٧٦٨").dimensions(), (1024, 768));
        assert_eq!(parse_size("१०२४x७६८").dimensions(), (1024, 768));
        // double-struck digits sit right after the bold set
        assert_eq!(
            parse_size("\u{1D7D9}\u{1D7D8}\u{1D7DA}\u{1D7DC}x\u{1D7DF}\u{1D7DE}\u{1D7E0}").dimensions(),
            (1024, 768)
        );
        assert_eq!(parse_size("３０x５１２"), SizeSpec::Default);
    }

    #[test]
    fn digit_values() {
        assert_eq!(digit_value('7'), Some(7));
        assert_eq!(digit_value('０'), Some(0));
        assert_eq!(digit_value('٩'), Some(9));
        assert_eq!(digit_value('x'), None);
        assert_eq!(parse_number("４２"), Some(42));
        assert_eq!(parse_number("99999999999"), None);
    }

    #[test]
    fn garbage_falls_back() {
        for token in ["", "1024", "1024*768", "axb", "1024x768px", "-512x512", "99999999999x512"] {
            assert_eq!(parse_size(token), SizeSpec::Default, "{token:?}");
            assert_eq!(parse_size(token).dimensions(), (1024, 1024));
        }
    }
}
