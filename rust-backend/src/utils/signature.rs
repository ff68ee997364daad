//! HMAC check for the X-RR-SIG / X-RR-TIMESTAMP command headers.
//!
//! Signature = hex(HMAC-SHA256(secret, timestamp_str || body)), timestamp in
//! unix seconds, accepted within ±`MAX_SKEW_SECS` of the server clock.

use actix_web::http::header::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

pub const SIG_HEADER: &str = "X-RR-SIG";
pub const TS_HEADER: &str = "X-RR-TIMESTAMP";

/// Maximum allowed clock skew (seconds)
const MAX_SKEW_SECS: i64 = 10;

type HmacSha = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("{0} header missing")]
    MissingHeader(&'static str),
    #[error("{0} header malformed")]
    Malformed(&'static str),
    #[error("timestamp out of allowed skew (got {got}, now {now})")]
    Skew { got: i64, now: i64 },
    #[error("HMAC signature mismatch")]
    Mismatch,
}

fn mac_over(secret: &str, parts: &[&[u8]]) -> Vec<u8> {
    let mut mac = HmacSha::new_from_slice(secret.as_bytes()).expect("HMAC can take key bits of any size");
    for p in parts {
        mac.update(p);
    }
    mac.finalize().into_bytes().to_vec()
}

/// What a well-behaved client puts in `X-RR-SIG`.
pub fn sign(secret: &str, timestamp: &str, body: &[u8]) -> String {
    hex::encode(mac_over(secret, &[timestamp.as_bytes(), body]))
}

fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, SignatureError> {
    headers
        .get(name)
        .ok_or(SignatureError::MissingHeader(name))?
        .to_str()
        .map_err(|_| SignatureError::Malformed(name))
}

pub fn verify_hmac(
    headers: &HeaderMap,
    body: &[u8],
    secret: &str,
    now_secs: i64,
) -> Result<(), SignatureError> {
    let sig = header(headers, SIG_HEADER)?;
    if sig.len() != 64 {
        return Err(SignatureError::Malformed(SIG_HEADER));
    }
    let ts_str = header(headers, TS_HEADER)?;
    let ts: i64 = ts_str
        .parse()
        .map_err(|_| SignatureError::Malformed(TS_HEADER))?;
    if (ts - now_secs).abs() > MAX_SKEW_SECS {
        return Err(SignatureError::Skew { got: ts, now: now_secs });
    }

    let mut signed = Vec::with_capacity(ts_str.len() + body.len());
    signed.extend_from_slice(ts_str.as_bytes());
    signed.extend_from_slice(body);
    if verify_hmac_bytes(&signed, secret, sig) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Constant-time check of a hex signature over raw bytes.
pub fn verify_hmac_bytes(body: &[u8], secret: &str, sig_hex: &str) -> bool {
    if sig_hex.len() != 64 {
        return false;
    }
    let calc = mac_over(secret, &[body]);
    match hex::decode(sig_hex) {
        Ok(given) => calc.ct_eq(&given).into(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::header::{HeaderName, HeaderValue};

    const SECRET: &str = "operator-secret";
    const NOW: i64 = 1_700_000_000;

    fn headers(sig: &str, ts: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(HeaderName::from_static("x-rr-sig"), HeaderValue::from_str(sig).unwrap());
        h.insert(HeaderName::from_static("x-rr-timestamp"), HeaderValue::from_str(ts).unwrap());
        h
    }

    #[test]
    fn valid_signature_passes() {
        let body = br#"{"caller_id":1,"command":"status"}"#;
        let ts = NOW.to_string();
        let h = headers(&sign(SECRET, &ts, body), &ts);
        assert_eq!(verify_hmac(&h, body, SECRET, NOW + 3), Ok(()));
    }

    #[test]
    fn tampered_body_or_wrong_secret_fails() {
        let ts = NOW.to_string();
        let h = headers(&sign(SECRET, &ts, b"a"), &ts);
        assert_eq!(verify_hmac(&h, b"b", SECRET, NOW), Err(SignatureError::Mismatch));
        assert_eq!(verify_hmac(&h, b"a", "other", NOW), Err(SignatureError::Mismatch));
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let ts = (NOW - 11).to_string();
        let h = headers(&sign(SECRET, &ts, b""), &ts);
        assert!(matches!(
            verify_hmac(&h, b"", SECRET, NOW),
            Err(SignatureError::Skew { .. })
        ));
    }

    #[test]
    fn missing_or_malformed_headers() {
        assert_eq!(
            verify_hmac(&HeaderMap::new(), b"", SECRET, NOW),
            Err(SignatureError::MissingHeader(SIG_HEADER))
        );
        let h = headers("abc", "1");
        assert_eq!(
            verify_hmac(&h, b"", SECRET, NOW),
            Err(SignatureError::Malformed(SIG_HEADER))
        );
        let h = headers(&"0".repeat(64), "yesterday");
        assert_eq!(
            verify_hmac(&h, b"", SECRET, NOW),
            Err(SignatureError::Malformed(TS_HEADER))
        );
    }

    #[test]
    fn bytes_variant_rejects_non_hex() {
        assert!(!verify_hmac_bytes(b"x", SECRET, &"z".repeat(64)));
        let sig = hex::encode(mac_over(SECRET, &[b"x"]));
        assert!(verify_hmac_bytes(b"x", SECRET, &sig));
    }
}
