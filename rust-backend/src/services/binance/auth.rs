// src/services/binance/auth.rs

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Millisecond timestamp
pub fn current_timestamp() -> i64 {
    Utc::now().timestamp_millis()
}

/// Sign a USDⓈ-M futures request: HMAC SHA-256 over the query string, hex encoded.
pub fn sign_query(secret: &str, query: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key bits of any size");
    mac.update(query.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// `k=v&k=v` without percent-encoding; every value we send is already URL safe.
pub fn encode_params(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}
