//! Security utilities: API key hashing, HMAC signing and tier passes.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use rand::distr::Alphanumeric;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use mint_types::{DomainError, TierPass};

type HmacSha256 = Hmac<Sha256>;

/// Hashes an API key using SHA-256.
pub fn hash_api_key(key: &str) -> String {
    let hash = Sha256::digest(key.as_bytes());
    hex::encode(hash)
}

/// Generates a new raw API key, `sk_` followed by 32 alphanumerics.
pub fn generate_api_key() -> String {
    let raw_key: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    format!("sk_{}", raw_key)
}

/// Random suffix for payment references.
pub fn reference_entropy() -> u32 {
    rand::rng().random()
}

/// Signs a payload using HMAC-SHA256, hex encoded.
pub fn sign_payload(payload: &[u8], secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a hex HMAC-SHA256 signature using constant-time comparison.
pub fn verify_signature(payload: &[u8], signature: &str, secret: &str) -> bool {
    let expected = sign_payload(payload, secret);
    let signature = signature.trim().to_ascii_lowercase();
    expected.as_bytes().ct_eq(signature.as_bytes()).into()
}

/// Issues a signed tier pass token: `{tier}:{expires_unix}:{session_id}:{sig}`.
pub fn sign_tier_pass(pass: &TierPass, secret: &str) -> String {
    let payload = pass.payload();
    let signature = sign_payload(payload.as_bytes(), secret);
    format!("{}:{}", payload, signature)
}

/// Checks a tier pass token's signature and expiry.
pub fn verify_tier_pass(
    token: &str,
    secret: &str,
    now: DateTime<Utc>,
) -> Result<TierPass, DomainError> {
    let (pass, signature) = TierPass::parse(token)?;

    if !verify_signature(pass.payload().as_bytes(), &signature, secret) {
        return Err(DomainError::InvalidTierPass("signature mismatch".into()));
    }
    if pass.is_expired(now) {
        return Err(DomainError::InvalidTierPass("tier pass expired".into()));
    }

    Ok(pass)
}
