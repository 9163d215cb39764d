// crates/formvault-core/tests/proptest_cipher.rs
// ============================================================================
// Module: Cipher and Normalizer Property-Based Tests
// Description: Property tests for field encryption, hashing, and name casing.
// Purpose: Detect panics and invariants across wide input ranges.
// ============================================================================

//! Property-based tests for cipher and normalizer invariants.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    clippy::missing_docs_in_private_items,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::LazyLock;

use formvault_core::CPF_FIELD;
use formvault_core::CipherSecrets;
use formvault_core::EMAIL_FIELD;
use formvault_core::FieldCipher;
use formvault_core::Sanitizer;
use formvault_core::core::cipher::MIN_PBKDF2_ITERATIONS;
use formvault_core::runtime::strategy::encryption::hash_input;
use formvault_core::runtime::strategy::normalize::normalize_name;
use proptest::prelude::*;

fn secrets() -> CipherSecrets {
    CipherSecrets {
        key_material: vec!["auth-key-0123456789".to_string(), "secure-auth-key-abc".to_string()],
        hash_salt: "hash-salt-0123456789".to_string(),
        iterations: MIN_PBKDF2_ITERATIONS,
    }
}

static CIPHER: LazyLock<FieldCipher> =
    LazyLock::new(|| FieldCipher::from_secrets(&secrets()).expect("cipher"));

static SECOND_CIPHER: LazyLock<FieldCipher> =
    LazyLock::new(|| FieldCipher::from_secrets(&secrets()).expect("cipher"));

proptest! {
    #[test]
    fn encryption_round_trips_any_text(value in ".{0,200}") {
        let stored = CIPHER.encrypt(&value).unwrap();
        prop_assert_eq!(CIPHER.decrypt(&stored), Some(value));
    }

    #[test]
    fn encryption_is_randomized(value in ".{1,64}") {
        let first = CIPHER.encrypt(&value).unwrap();
        let second = CIPHER.encrypt(&value).unwrap();
        prop_assert_ne!(first, second);
    }

    #[test]
    fn decrypt_never_panics_on_garbage(stored in ".{0,128}") {
        let _ = CIPHER.decrypt(&stored);
    }

    #[test]
    fn keyed_hash_is_stable_across_instances(value in ".{0,64}") {
        let hash = CIPHER.keyed_hash(&value);
        prop_assert_eq!(hash.len(), 64);
        prop_assert_eq!(hash, SECOND_CIPHER.keyed_hash(&value));
    }

    #[test]
    fn email_hash_ignores_case_and_padding(local in "[a-zA-Z0-9]{1,12}", pad in " {0,3}") {
        let lower = hash_input(EMAIL_FIELD, &format!("{}@example.com", local.to_lowercase()));
        let mixed = hash_input(EMAIL_FIELD, &format!("{pad}{}@EXAMPLE.com{pad}", local.to_uppercase()));
        prop_assert_eq!(CIPHER.keyed_hash(&lower), CIPHER.keyed_hash(&mixed));
    }

    #[test]
    fn identifier_hash_ignores_punctuation(digits in "[0-9]{11}") {
        let dotted = format!("{}.{}.{}-{}", &digits[0 .. 3], &digits[3 .. 6], &digits[6 .. 9], &digits[9 ..]);
        prop_assert_eq!(hash_input(CPF_FIELD, &dotted), digits);
    }

    #[test]
    fn digit_sanitizer_output_is_digits_only(raw in "[0-9 .()+-]{0,24}") {
        if let Ok(clean) = (Sanitizer::Digits { exact_len: Some(11) }).apply(&raw) {
            prop_assert_eq!(clean.len(), 11);
            prop_assert!(clean.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn name_normalization_is_idempotent(raw in "[a-zA-ZáéíóúãõçÁÉÍÓÚÃÕÇ' -]{0,40}") {
        let once = normalize_name(&raw);
        prop_assert_eq!(normalize_name(&once), once.clone());
        prop_assert!(!once.starts_with(' '));
        prop_assert!(!once.contains("  "));
    }
}
