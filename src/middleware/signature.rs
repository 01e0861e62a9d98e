//! Partner message authentication.
//!
//! The partner signs webhook bodies with base64 HMAC-SHA256 and OAuth
//! callbacks with hex HMAC-SHA256 over the sorted query string. The two
//! encodings are the partner's convention and are kept separate.

use base64::{engine::general_purpose, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::errors::SignatureError;

type HmacSha256 = Hmac<Sha256>;

/// Query parameter carrying the OAuth callback signature.
pub const OAUTH_HMAC_PARAM: &str = "hmac";

fn mac_for(secret: &str) -> Result<HmacSha256, SignatureError> {
    if secret.is_empty() {
        return Err(SignatureError::EmptySecret);
    }
    Ok(HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size"))
}

fn ct_str_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).unwrap_u8() == 1
}

/// Base64 HMAC-SHA256 of the exact body bytes.
pub fn compute_webhook_signature(raw_body: &[u8], secret: &str) -> Result<String, SignatureError> {
    let mut mac = mac_for(secret)?;
    mac.update(raw_body);
    Ok(general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

/// `raw_body` must be the bytes as received; a re-serialized body will not match.
pub fn verify_webhook_signature(
    raw_body: &[u8],
    received_signature: &str,
    secret: &str,
) -> Result<bool, SignatureError> {
    let expected = compute_webhook_signature(raw_body, secret)?;
    Ok(ct_str_eq(&expected, received_signature.trim()))
}

/// Canonical message for OAuth callbacks: every pair except `hmac`, sorted
/// by key, joined as `key=value` with `&`.
pub fn oauth_message<K, V>(params: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut pairs: Vec<(&str, &str)> = params
        .iter()
        .map(|(k, v)| (k.as_ref(), v.as_ref()))
        .filter(|(k, _)| *k != OAUTH_HMAC_PARAM)
        .collect();
    // stable: duplicate keys keep their received order
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Hex HMAC-SHA256 of [`oauth_message`].
pub fn compute_oauth_hmac<K, V>(params: &[(K, V)], secret: &str) -> Result<String, SignatureError>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut mac = mac_for(secret)?;
    mac.update(oauth_message(params).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub fn verify_oauth_callback<K, V>(
    params: &[(K, V)],
    secret: &str,
    received_hmac: &str,
) -> Result<bool, SignatureError>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let expected = compute_oauth_hmac(params, secret)?;
    Ok(ct_str_eq(&expected, received_hmac.trim()))
}
