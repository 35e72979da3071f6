use giving_sync::adapters::normalize::map_gateway_response;
use giving_sync::adapters::signature::{sign_hmac_sha256, verify_hmac_sha256};
use giving_sync::domain::money::MoneyAmount;
use proptest::prelude::*;
use rust_decimal::Decimal;
use serde_json::json;

fn known_gateway_status() -> impl Strategy<Value = (&'static str, &'static str)> {
    prop_oneof![
        Just(("completed", "succeeded")),
        Just(("paid", "succeeded")),
        Just(("failed", "failed")),
        Just(("invalid", "failed")),
        Just(("pending", "pending")),
        Just(("processing", "processing")),
    ]
}

/// Randomly upper-cases each character.
fn any_case(word: &'static str) -> impl Strategy<Value = String> {
    prop::collection::vec(any::<bool>(), word.len()).prop_map(move |flags| {
        word.chars()
            .zip(flags)
            .map(|(c, upper)| if upper { c.to_ascii_uppercase() } else { c })
            .collect()
    })
}

proptest! {
    /// The gateway vocabulary maps the same way whatever its casing.
    #[test]
    fn gateway_known_statuses_ignore_case(
        (native, canonical, cased) in known_gateway_status()
            .prop_flat_map(|(native, canonical)| (Just(native), Just(canonical), any_case(native)))
    ) {
        let status = map_gateway_response(&json!({ "payment_status": cased })).unwrap();
        prop_assert_eq!(status.as_str(), canonical, "native status {}", native);
    }

    /// Anything outside the table is kept, lower-cased.
    #[test]
    fn gateway_unknown_statuses_pass_through_lowercased(raw in "[A-Za-z_]{1,20}") {
        let lower = raw.to_lowercase();
        prop_assume!(!["completed", "paid", "failed", "invalid", "pending", "processing"]
            .contains(&lower.as_str()));
        let status = map_gateway_response(&json!({ "status": raw })).unwrap();
        prop_assert_eq!(status.as_str(), lower.as_str());
    }

    /// Parsed amounts are never negative and always carry at most two decimals.
    #[test]
    fn lenient_amounts_are_non_negative_two_places(units in -1_000_000i64..1_000_000, scale in 0u32..6) {
        let raw = Decimal::new(units, scale);
        match MoneyAmount::parse_lenient(&json!(raw.to_string())) {
            Some(amount) => {
                prop_assert!(!amount.value().is_sign_negative() || amount.value().is_zero());
                prop_assert!(amount.value().scale() <= 2);
                prop_assert!((amount.value() - raw).abs() <= Decimal::new(5, 3));
            }
            None => prop_assert!(raw.is_sign_negative() && !raw.is_zero()),
        }
    }

    /// A signature made with the shared secret always verifies.
    #[test]
    fn signed_bodies_verify(secret in "[ -~]{1,64}", body in prop::collection::vec(any::<u8>(), 0..512)) {
        let signature = sign_hmac_sha256(&secret, &body).unwrap();
        prop_assert!(verify_hmac_sha256(Some(&secret), &body, Some(&signature)));
    }

    /// Flipping any byte of the body breaks the signature.
    #[test]
    fn tampered_bodies_are_rejected(
        secret in "[ -~]{1,64}",
        body in prop::collection::vec(any::<u8>(), 1..512),
        index in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let signature = sign_hmac_sha256(&secret, &body).unwrap();
        let mut tampered = body.clone();
        let i = index.index(tampered.len());
        tampered[i] ^= flip;
        prop_assert!(!verify_hmac_sha256(Some(&secret), &tampered, Some(&signature)));
    }
}
