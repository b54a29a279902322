use luascript_crypto::{digest_hex, random_hex, DigestAlgorithm, MAX_RANDOM_BYTES};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

// ── digest ───────────────────────────────────────────────────────

#[test]
fn sha256_known_vector() {
    assert_eq!(
        digest_hex(DigestAlgorithm::Sha256, b"abc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn sha512_output_length() {
    assert_eq!(digest_hex(DigestAlgorithm::Sha512, b"").len(), 128);
    assert_eq!(digest_hex(DigestAlgorithm::Sha384, b"").len(), 96);
}

#[test]
fn algorithm_names_parse_loosely() {
    for name in ["SHA-256", "sha256", "Sha-256", "sha_256"] {
        assert_eq!(name.parse::<DigestAlgorithm>().unwrap(), DigestAlgorithm::Sha256);
    }
    assert_eq!("SHA-512".parse::<DigestAlgorithm>().unwrap().name(), "SHA-512");
}

#[test]
fn unknown_algorithm_is_an_error() {
    let err = "MD5".parse::<DigestAlgorithm>().unwrap_err();
    assert_eq!(err.to_string(), "unsupported digest algorithm: MD5");
}

// ── random ───────────────────────────────────────────────────────

#[test]
fn random_values_differ() {
    assert_ne!(random_hex(32), random_hex(32));
}

proptest! {
    #[test]
    fn random_hex_length_always_clamped(requested in any::<i64>()) {
        let hex = random_hex(requested);
        prop_assert!(hex.len() >= 2);
        prop_assert!(hex.len() <= MAX_RANDOM_BYTES * 2);
        prop_assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
