//! Phone number normalization.
//!
//! Numbers are stored as `+` followed by digits. Russian numbers written with
//! the `8` trunk prefix or without a country code are rewritten to `+7`.

/// Normalize a raw phone number. Returns an empty string when the input has
/// no digits.
pub fn normalize_phone_number(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();

    if digits.is_empty() {
        return String::new();
    }

    if digits.len() == 11 && digits.starts_with('8') {
        return format!("+7{}", &digits[1..]);
    }
    if digits.len() == 10 && digits.starts_with('9') {
        return format!("+7{digits}");
    }

    format!("+{digits}")
}

/// `+79991234567` -> `79991234567`.
pub fn strip_plus(number: &str) -> &str {
    number.strip_prefix('+').unwrap_or(number)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("+79991234567", "+79991234567")]
    #[case("79991234567", "+79991234567")]
    #[case("89991234567", "+79991234567")]
    #[case("8 (999) 123-45-67", "+79991234567")]
    #[case("9991234567", "+79991234567")]
    #[case("+44 20 7946 0958", "+442079460958")]
    #[case("380501234567", "+380501234567")]
    #[case("12345", "+12345")]
    #[case("", "")]
    #[case("no digits", "")]
    fn test_normalize(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(normalize_phone_number(raw), expected);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in ["89991234567", "9991234567", "+12025550123"] {
            let once = normalize_phone_number(raw);
            assert_eq!(normalize_phone_number(&once), once);
        }
    }

    #[test]
    fn test_strip_plus() {
        assert_eq!(strip_plus("+79991234567"), "79991234567");
        assert_eq!(strip_plus("79991234567"), "79991234567");
    }
}
