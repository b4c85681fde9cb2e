//! Verification code extraction from message text.

use std::sync::LazyLock;

use regex::Regex;

static SPLIT_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([0-9]{3,4})[\s-]+([0-9]{3,4})\b").expect("valid regex")
});

static KEYWORD_THEN_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:code|код|пароль|code is|is your code|code:|кода:|кодом:)\s*([0-9]{4,8})")
        .expect("valid regex")
});

static CODE_THEN_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([0-9]{4,8})\s*(?:is your|ваш|твой)\s*(?:code|код|пароль)")
        .expect("valid regex")
});

static STANDALONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([0-9]{4,8})\b").expect("valid regex"));

static ANY_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]{4,8})").expect("valid regex"));

/// Extract a verification code, trying the most specific shapes first:
///
/// 1. `123-456` / `123 456`, joined
/// 2. a keyword (`code`, `код`, `пароль`, ...) followed by 4-8 digits
/// 3. 4-8 digits followed by `is your code` / `ваш код` / ...
/// 4. a standalone 4-8 digit word
/// 5. the first 4-8 digits of the text with everything else removed
pub fn parse_code(text: &str) -> Option<String> {
    if text.is_empty() {
        return None;
    }

    if let Some(caps) = SPLIT_CODE.captures(text) {
        return Some(format!("{}{}", &caps[1], &caps[2]));
    }

    for re in [&*KEYWORD_THEN_CODE, &*CODE_THEN_KEYWORD, &*STANDALONE] {
        if let Some(caps) = re.captures(text) {
            return Some(caps[1].to_string());
        }
    }

    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    ANY_RUN.captures(&digits).map(|caps| caps[1].to_string())
}
