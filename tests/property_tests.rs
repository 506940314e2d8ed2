/// Property-based tests using proptest
/// Tests invariants that should hold for all inputs
use proptest::prelude::*;
use rust_datatico_api::normalization::{
    cedula_digits, classify_cedula, detect_search_type, is_valid_email, normalize_cedula,
    validate_cr_phone, CedulaKind, SearchType,
};
use rust_datatico_api::search::{build_search_plan, collection_label, validate_query};

// Property: normalization never panics and is stable
proptest! {
    #[test]
    fn normalize_cedula_never_panics(raw in "\\PC*") {
        let _ = normalize_cedula(&raw);
        let _ = classify_cedula(&raw);
    }

    #[test]
    fn normalize_cedula_is_idempotent(raw in "\\PC*") {
        let once = normalize_cedula(&raw);
        prop_assert_eq!(normalize_cedula(&once), once);
    }

    #[test]
    fn nine_digit_cedula_keeps_digits(digits in "[1-9][0-9]{8}") {
        let normalized = normalize_cedula(&digits);
        prop_assert_eq!(normalized.len(), 11);
        prop_assert_eq!(cedula_digits(&normalized), digits.clone());
        prop_assert_eq!(classify_cedula(&normalized), Some(CedulaKind::Fisica));
        prop_assert_eq!(detect_search_type(&normalized), SearchType::Cedula);
    }

    #[test]
    fn juridica_cedula_classified(rest in "[0-9]{9}") {
        let raw = format!("3{}", rest);
        prop_assert_eq!(classify_cedula(&raw), Some(CedulaKind::Juridica));
        prop_assert_eq!(normalize_cedula(&raw).matches('-').count(), 2);
    }
}

// Property: search type detection and query validation never panic
proptest! {
    #[test]
    fn detect_search_type_never_panics(q in "\\PC*") {
        let _ = detect_search_type(&q);
    }

    #[test]
    fn short_queries_rejected(q in "\\PC{0,1}") {
        prop_assert!(validate_query(Some(&q)).is_err());
    }

    #[test]
    fn validated_query_is_trimmed(q in "[a-zA-Z]{2,20}", pad in " {0,3}") {
        let padded = format!("{}{}{}", pad, q, pad);
        prop_assert_eq!(validate_query(Some(&padded)).unwrap(), q);
    }
}

// Property: every search plan binds exactly the parameters it references
proptest! {
    #[test]
    fn search_plan_parameters_match(q in "\\PC{2,40}") {
        let plan = build_search_plan(&q);
        let limit = format!("LIMIT ${}", plan.limit_param());
        prop_assert!(plan.sql.ends_with(&limit));
        prop_assert!(!plan.patterns.is_empty());
        // Every pattern is a valid regex that matches the literal query text
        let literal = regex::Regex::new(&plan.patterns[0]).unwrap();
        prop_assert!(literal.is_match(&q));
    }

    #[test]
    fn collection_label_never_panics(name in "[a-z0-9_]{0,40}") {
        let _ = collection_label(&name);
    }
}

// Property: phone and email validation never panic
proptest! {
    #[test]
    fn phone_validation_never_panics(phone in "\\PC*") {
        let _ = validate_cr_phone(&phone);
    }

    #[test]
    fn valid_cr_mobiles_normalize_to_e164(number in 83_000_000u32..=89_999_999u32) {
        let (valid, normalized) = validate_cr_phone(&number.to_string());
        if valid {
            prop_assert_eq!(normalized, format!("+506{}", number));
        }
    }

    #[test]
    fn email_validation_never_panics(email in "\\PC*") {
        let _ = is_valid_email(&email);
    }

    #[test]
    fn simple_emails_accepted(
        local in "[a-z]{1,10}",
        domain in "[a-z]{1,10}",
        tld in "[a-z]{2,4}"
    ) {
        let email = format!("{}@{}.{}", local, domain, tld);
        if email.len() >= 5 {
            prop_assert!(is_valid_email(&email));
        }
    }
}
