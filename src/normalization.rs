//! Normalization and validation of Costa Rican identifiers and contact data.
//!
//! Records arrive from many sources with inconsistent formatting: cedulas
//! with or without separators, phones with or without the `+506` prefix,
//! placeholder emails. Everything stored or matched goes through here.
use phonenumber::country::Id as CountryId;
use phonenumber::Mode;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Kind of identification number, derived from its digit layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CedulaKind {
    /// Natural person, 9 digits (`1-2345-6789`).
    Fisica,
    /// Legal entity, 10 digits starting with 3 (`3-101-234567`).
    Juridica,
    /// Foreign resident document, 11 or 12 digits.
    Dimex,
}

/// What a free-text query most likely refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    Cedula,
    Email,
    Telefono,
    Nombre,
}

fn cedula_query_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{1,2}-\d{3,8}-\d{1,6}$").expect("valid cedula regex"))
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // RFC 5322 simplified: local@domain.tld
    RE.get_or_init(|| {
        Regex::new(
            r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
        )
        .expect("valid email regex")
    })
}

/// Digits of a cedula, in order, with every separator removed.
pub fn cedula_digits(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Formats a cedula in its canonical dashed form.
///
/// 9 digits become `X-XXXX-XXXX` and 10 digits become `X-XXX-XXXXXX`.
/// Anything else is returned trimmed but otherwise untouched, so unknown
/// formats are never mangled.
pub fn normalize_cedula(raw: &str) -> String {
    let digits = cedula_digits(raw);
    match digits.len() {
        9 => format!("{}-{}-{}", &digits[0..1], &digits[1..5], &digits[5..9]),
        10 => format!("{}-{}-{}", &digits[0..1], &digits[1..4], &digits[4..10]),
        _ => raw.trim().to_string(),
    }
}

/// All spellings under which a cedula may have been stored by some source.
pub fn cedula_variants(raw: &str) -> Vec<String> {
    let mut variants: Vec<String> = Vec::new();
    let mut push = |v: String| {
        if !v.is_empty() && !variants.contains(&v) {
            variants.push(v);
        }
    };

    push(raw.trim().to_string());
    push(normalize_cedula(raw));

    let digits = cedula_digits(raw);
    push(digits.clone());

    if digits.len() == 9 {
        let (a, b, c) = (&digits[0..1], &digits[1..5], &digits[5..9]);
        push(format!("{} {} {}", a, b, c));
        push(format!("{}.{}.{}", a, b, c));
    } else if digits.len() == 10 {
        let (a, b, c) = (&digits[0..1], &digits[1..4], &digits[4..10]);
        push(format!("{} {} {}", a, b, c));
        push(format!("{}.{}.{}", a, b, c));
    }

    variants
}

pub fn classify_cedula(raw: &str) -> Option<CedulaKind> {
    let digits = cedula_digits(raw);
    let first = digits.chars().next()?;
    match digits.len() {
        9 if first != '0' => Some(CedulaKind::Fisica),
        10 if first == '3' => Some(CedulaKind::Juridica),
        11 | 12 => Some(CedulaKind::Dimex),
        _ => None,
    }
}

/// Guesses what a query refers to. Cedula shapes win over phone shapes,
/// except for plain 8 digit numbers which are local phone numbers.
pub fn detect_search_type(query: &str) -> SearchType {
    let q = query.trim();
    let digits_only = !q.is_empty() && q.chars().all(|c| c.is_ascii_digit());

    if cedula_query_regex().is_match(q) || (digits_only && (9..=12).contains(&q.len())) {
        return SearchType::Cedula;
    }
    if q.contains('@') && q.contains('.') {
        return SearchType::Email;
    }
    if q.starts_with("+506") || (q.starts_with("506") && q.len() >= 11) || (digits_only && q.len() == 8)
    {
        return SearchType::Telefono;
    }
    SearchType::Nombre
}

/// Validate and normalize a Costa Rican phone number.
///
/// Returns: (is_valid, normalized_phone_or_error_msg)
pub fn validate_cr_phone(raw: &str) -> (bool, String) {
    if raw.trim().is_empty() || raw.len() < 8 {
        return (false, "Phone too short".to_string());
    }

    match phonenumber::parse(Some(CountryId::CR), raw) {
        Ok(number) => {
            if phonenumber::is_valid(&number) {
                let formatted = number.format().mode(Mode::E164).to_string();
                tracing::debug!("Valid CR phone: {} -> {}", raw, formatted);
                (true, formatted)
            } else {
                tracing::debug!("Invalid CR phone number: {}", raw);
                (false, "Invalid Costa Rican phone number".to_string())
            }
        }
        Err(e) => {
            tracing::debug!("Failed to parse CR phone '{}': {:?}", raw, e);
            (false, format!("Parse error: {:?}", e))
        }
    }
}

/// Validate email address
///
/// Checks for:
/// - Basic email format (contains @ and .)
/// - Placeholder patterns (repeated digits like 999999, 000000)
/// - Minimum length requirements
pub fn is_valid_email(email: &str) -> bool {
    if email.len() < 5 || !email.contains('@') || !email.contains('.') {
        return false;
    }

    const FAKE_PATTERNS: [&str; 4] = ["999999", "111111", "000000", "123456789"];
    if let Some(pattern) = FAKE_PATTERNS.iter().find(|p| email.contains(*p)) {
        tracing::debug!("Rejected email with placeholder pattern '{}': {}", pattern, email);
        return false;
    }

    email_regex().is_match(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_nine_digit_cedula() {
        assert_eq!(normalize_cedula("123456789"), "1-2345-6789");
        assert_eq!(normalize_cedula("1 2345 6789"), "1-2345-6789");
        assert_eq!(normalize_cedula("1-2345-6789"), "1-2345-6789");
    }

    #[test]
    fn normalizes_juridica() {
        assert_eq!(normalize_cedula("3101234567"), "3-101-234567");
    }

    #[test]
    fn leaves_unknown_formats_alone() {
        assert_eq!(normalize_cedula("  12-34 "), "12-34");
        assert_eq!(normalize_cedula("sin cedula"), "sin cedula");
    }

    #[test]
    fn variants_cover_common_spellings() {
        let variants = cedula_variants("1-2345-6789");
        assert!(variants.contains(&"1-2345-6789".to_string()));
        assert!(variants.contains(&"123456789".to_string()));
        assert!(variants.contains(&"1 2345 6789".to_string()));
        assert!(variants.contains(&"1.2345.6789".to_string()));
        // no duplicates even though the input is already normalized
        let mut sorted = variants.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), variants.len());
    }

    #[test]
    fn classifies_by_layout() {
        assert_eq!(classify_cedula("1-2345-6789"), Some(CedulaKind::Fisica));
        assert_eq!(classify_cedula("3-101-234567"), Some(CedulaKind::Juridica));
        assert_eq!(classify_cedula("155812345678"), Some(CedulaKind::Dimex));
        assert_eq!(classify_cedula("012345678"), None);
        assert_eq!(classify_cedula("12345"), None);
        assert_eq!(classify_cedula(""), None);
    }

    #[test]
    fn detects_search_types() {
        assert_eq!(detect_search_type("1-2345-6789"), SearchType::Cedula);
        assert_eq!(detect_search_type("3-101-234567"), SearchType::Cedula);
        assert_eq!(detect_search_type("123456789"), SearchType::Cedula);
        assert_eq!(detect_search_type("maria@example.com"), SearchType::Email);
        assert_eq!(detect_search_type("+50688887777"), SearchType::Telefono);
        assert_eq!(detect_search_type("50688887777"), SearchType::Cedula);
        assert_eq!(detect_search_type("88887777"), SearchType::Telefono);
        assert_eq!(detect_search_type("Maria"), SearchType::Nombre);
    }

    #[test]
    fn phone_validation_normalizes_to_e164() {
        let (valid, normalized) = validate_cr_phone("8888-7777");
        assert!(valid);
        assert_eq!(normalized, "+50688887777");

        let (valid, normalized) = validate_cr_phone("+506 2222 1234");
        assert!(valid);
        assert_eq!(normalized, "+50622221234");

        let (valid, _) = validate_cr_phone("123");
        assert!(!valid);
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("mjimenez@hotmail.com"));
        assert!(!is_valid_email("user999999@example.com"));
        assert!(!is_valid_email("no-at-sign.com"));
        assert!(!is_valid_email("a@b"));
    }
}
