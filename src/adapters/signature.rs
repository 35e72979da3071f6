use {
    crate::domain::error::PipelineError,
    hmac::{Hmac, Mac},
    sha2::Sha256,
};

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 over the exact raw body, hex-encoded in a header.
///
/// Fails closed: no secret, no header or a non-hex header are all invalid.
/// The comparison goes through `verify_slice`, which is constant time.
pub fn verify_hmac_sha256(secret: Option<&str>, body: &[u8], provided: Option<&str>) -> bool {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        return false;
    };
    let Some(provided) = provided.map(str::trim).filter(|s| !s.is_empty()) else {
        return false;
    };
    let Ok(expected) = hex::decode(provided) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Hex HMAC-SHA256 of `body`, the value a provider puts in its signature header.
pub fn sign_hmac_sha256(secret: &str, body: &[u8]) -> Result<String, PipelineError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PipelineError::Validation(format!("hmac key: {e}")))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Card webhooks go through the SDK's event construction.
///
/// The SDK checks the signature before it deserializes into its typed event,
/// so a parse failure means the signature matched. A signed JSON object the
/// SDK cannot model (new event or object types) is accepted and left to the
/// normalizer; only a signed body that is not a JSON object is malformed.
pub fn verify_card_event(
    body: &[u8],
    signature: Option<&str>,
    secret: &str,
) -> Result<(), PipelineError> {
    let Some(signature) = signature else {
        return Err(PipelineError::WebhookSignature(
            "missing signature header".into(),
        ));
    };
    let payload = std::str::from_utf8(body)
        .map_err(|e| PipelineError::MalformedPayload(format!("body is not utf-8: {e}")))?;

    match stripe::Webhook::construct_event(payload, signature, secret) {
        Ok(_) => Ok(()),
        Err(stripe::WebhookError::BadParse(e)) => {
            match serde_json::from_str::<serde_json::Value>(payload) {
                Ok(value) if value.is_object() => {
                    tracing::debug!(error = %e, "signed card event not modelled by the sdk");
                    Ok(())
                }
                _ => Err(PipelineError::MalformedPayload(e.to_string())),
            }
        }
        Err(e) => Err(PipelineError::WebhookSignature(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";

    #[test]
    fn accepts_matching_signature() {
        let body = br#"{"transaction_tracking_id":"tx1"}"#;
        let sig = sign_hmac_sha256(SECRET, body).unwrap();
        assert!(verify_hmac_sha256(Some(SECRET), body, Some(&sig)));
    }

    #[test]
    fn accepts_upper_case_hex() {
        let body = b"{}";
        let sig = sign_hmac_sha256(SECRET, body).unwrap().to_uppercase();
        assert!(verify_hmac_sha256(Some(SECRET), body, Some(&sig)));
    }

    #[test]
    fn rejects_tampered_body() {
        let sig = sign_hmac_sha256(SECRET, br#"{"amount":"1.00"}"#).unwrap();
        assert!(!verify_hmac_sha256(
            Some(SECRET),
            br#"{"amount":"9.00"}"#,
            Some(&sig)
        ));
    }

    #[test]
    fn fails_closed_without_secret_or_header() {
        let body = b"{}";
        let sig = sign_hmac_sha256(SECRET, body).unwrap();
        assert!(!verify_hmac_sha256(None, body, Some(&sig)));
        assert!(!verify_hmac_sha256(Some(""), body, Some(&sig)));
        assert!(!verify_hmac_sha256(Some(SECRET), body, None));
        assert!(!verify_hmac_sha256(Some(SECRET), body, Some("not-hex")));
        assert!(!verify_hmac_sha256(Some(SECRET), body, Some("abcd")));
    }

    fn stripe_header(secret: &str, payload: &str, timestamp: i64) -> String {
        let signed = format!("{timestamp}.{payload}");
        format!("t={timestamp},v1={}", sign_hmac_sha256(secret, signed.as_bytes()).unwrap())
    }

    #[test]
    fn card_signature_mismatch_is_signature_error() {
        let payload = r#"{"id":"evt_1"}"#;
        let header = stripe_header("whsec_other", payload, chrono::Utc::now().timestamp());
        let err = verify_card_event(payload.as_bytes(), Some(&header), SECRET).unwrap_err();
        assert!(matches!(err, PipelineError::WebhookSignature(_)), "{err:?}");
    }

    #[test]
    fn card_missing_header_is_signature_error() {
        let err = verify_card_event(b"{}", None, SECRET).unwrap_err();
        assert!(matches!(err, PipelineError::WebhookSignature(_)));
    }

    #[test]
    fn card_garbage_header_is_signature_error() {
        let err = verify_card_event(b"{}", Some("garbage"), SECRET).unwrap_err();
        assert!(matches!(err, PipelineError::WebhookSignature(_)));
    }

    #[test]
    fn card_signed_event_unknown_to_sdk_is_accepted() {
        let payload = r#"{"id":"evt_2","type":"some.future_event","data":{"object":{"object":"some_future_object"}}}"#;
        let header = stripe_header(SECRET, payload, chrono::Utc::now().timestamp());
        assert!(verify_card_event(payload.as_bytes(), Some(&header), SECRET).is_ok());

        let minimal = r#"{"type":"payment_intent.succeeded","data":{"object":{"id":"pi_1","amount_received":1050}}}"#;
        let header = stripe_header(SECRET, minimal, chrono::Utc::now().timestamp());
        assert!(verify_card_event(minimal.as_bytes(), Some(&header), SECRET).is_ok());
    }

    #[test]
    fn card_unknown_event_with_wrong_secret_is_still_rejected() {
        let payload = r#"{"type":"some.future_event","data":{"object":{}}}"#;
        let header = stripe_header("whsec_other", payload, chrono::Utc::now().timestamp());
        let err = verify_card_event(payload.as_bytes(), Some(&header), SECRET).unwrap_err();
        assert!(matches!(err, PipelineError::WebhookSignature(_)), "{err:?}");
    }

    #[test]
    fn card_signed_json_array_is_malformed() {
        let payload = "[1,2,3]";
        let header = stripe_header(SECRET, payload, chrono::Utc::now().timestamp());
        let err = verify_card_event(payload.as_bytes(), Some(&header), SECRET).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedPayload(_)), "{err:?}");
    }

    #[test]
    fn card_valid_signature_over_junk_is_malformed() {
        let payload = "this is not json";
        let header = stripe_header(SECRET, payload, chrono::Utc::now().timestamp());
        let err = verify_card_event(payload.as_bytes(), Some(&header), SECRET).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedPayload(_)), "{err:?}");
    }
}
