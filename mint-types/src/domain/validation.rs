//! Input validation for purchase requests and game results.
//!
//! All checks are shape checks: an address that passes here may still be
//! unspendable, and an RGB invoice is only checked for its envelope.

use super::tier::Tier;
use crate::error::DomainError;

pub const RGB_INVOICE_MIN_LEN: usize = 20;
pub const RGB_INVOICE_MAX_LEN: usize = 500;

pub const MIN_GAME_DURATION_SECS: u32 = 5;
pub const MAX_GAME_DURATION_SECS: u32 = 120;
/// Faster scoring than this is treated as a cheated result.
pub const MAX_POINTS_PER_SECOND: u32 = 10;

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

fn invalid(msg: impl Into<String>) -> DomainError {
    DomainError::ValidationError(msg.into())
}

pub fn validate_rgb_invoice(rgb_invoice: &str) -> Result<(), DomainError> {
    if rgb_invoice.trim().is_empty() {
        return Err(invalid("RGB invoice is required"));
    }
    if !rgb_invoice.starts_with("rgb:") || !rgb_invoice.contains("utxob:") {
        return Err(invalid(
            "Invalid RGB invoice format. Must start with \"rgb:\" and contain \"utxob:\"",
        ));
    }
    if rgb_invoice.len() < RGB_INVOICE_MIN_LEN {
        return Err(invalid("RGB invoice too short"));
    }
    if rgb_invoice.len() > RGB_INVOICE_MAX_LEN {
        return Err(invalid("RGB invoice too long"));
    }
    Ok(())
}

/// Accepts bech32 (`bc1`, `tb1`, `bcrt1`) and base58 (`1`, `3`, `m`, `n`, `2`) addresses.
pub fn validate_wallet_address(address: &str) -> Result<(), DomainError> {
    if address.is_empty() {
        return Err(invalid("Bitcoin address is required"));
    }

    let lower = address.to_ascii_lowercase();
    let bech32_hrp = ["bcrt1", "bc1", "tb1"]
        .into_iter()
        .find(|hrp| lower.starts_with(hrp));

    let valid = match bech32_hrp {
        Some(_) => {
            // Mixed case is not allowed in bech32.
            let single_case = address == lower || address == address.to_ascii_uppercase();
            single_case
                && (14..=90).contains(&address.len())
                && lower.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => {
            matches!(address.chars().next(), Some('1' | '3' | 'm' | 'n' | '2'))
                && (26..=35).contains(&address.len())
                && address.chars().all(|c| BASE58_ALPHABET.contains(c))
        }
    };

    if !valid {
        return Err(invalid("Invalid Bitcoin address format"));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), DomainError> {
    let err = || invalid("Invalid email format");

    if email.chars().any(char::is_whitespace) {
        return Err(err());
    }
    let (local, domain) = email.split_once('@').ok_or_else(err)?;
    if local.is_empty() || domain.contains('@') {
        return Err(err());
    }
    let (host, tld) = domain.rsplit_once('.').ok_or_else(err)?;
    if host.is_empty() || tld.is_empty() {
        return Err(err());
    }
    Ok(())
}

/// Checks a purchase size against the buyer's tier. No tier means the mint is locked.
pub fn validate_batch_count(batch_count: i64, tier: Option<Tier>) -> Result<(), DomainError> {
    let tier = tier.ok_or(DomainError::MintLocked)?;

    if batch_count < 1 {
        return Err(DomainError::InvalidBatchCount(
            "Minimum 1 batch required".into(),
        ));
    }
    let max = tier.max_batches() as i64;
    if batch_count > max {
        return Err(DomainError::InvalidBatchCount(format!(
            "Maximum {} batches allowed for {} tier",
            max, tier
        )));
    }
    Ok(())
}

pub fn validate_game_session(session_id: &str) -> Result<(), DomainError> {
    let ok = (32..=64).contains(&session_id.len())
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !ok {
        return Err(invalid("Invalid game session id"));
    }
    Ok(())
}

/// Rejects game results that could not have been played by a human.
pub fn validate_game_score(score: u32, duration_secs: u32) -> Result<(), DomainError> {
    if !(MIN_GAME_DURATION_SECS..=MAX_GAME_DURATION_SECS).contains(&duration_secs) {
        return Err(invalid("Invalid game duration"));
    }
    if score > duration_secs.saturating_mul(MAX_POINTS_PER_SECOND) {
        return Err(invalid("Score is not plausible for the game duration"));
    }
    Ok(())
}

/// BOLT11 prefix check for payment requests returned by the gateway.
pub fn validate_lightning_invoice(payment_request: &str) -> Result<(), DomainError> {
    let lower = payment_request.to_ascii_lowercase();
    let rest = ["lnbcrt", "lntbs", "lnbc", "lntb"]
        .into_iter()
        .find_map(|prefix| lower.strip_prefix(prefix));
    match rest {
        Some(rest) if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric()) => Ok(()),
        _ => Err(invalid("Invalid Lightning invoice format")),
    }
}

/// Payment hashes are 32 bytes, hex encoded.
pub fn validate_payment_hash(hash: &str) -> Result<(), DomainError> {
    if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid("Invalid payment hash format"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RGB: &str = "rgb:2bFVTT$W-utxob:egXsFnw-5Eud7WKYn-7DVQvcPbc-rR69YmgmG-veacwmUFo";

    #[test]
    fn test_rgb_invoice() {
        assert!(validate_rgb_invoice(RGB).is_ok());
        assert!(validate_rgb_invoice("").is_err());
        assert!(validate_rgb_invoice("utxob:rgb:abcdefghijklmnop").is_err());
        assert!(validate_rgb_invoice("rgb:no-blinded-utxo-here").is_err());
        assert!(validate_rgb_invoice("rgb:utxob:short").is_err());
        let long = format!("rgb:utxob:{}", "a".repeat(500));
        assert!(validate_rgb_invoice(&long).is_err());
    }

    #[test]
    fn test_wallet_address() {
        assert!(validate_wallet_address("bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq").is_ok());
        assert!(validate_wallet_address("tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx").is_ok());
        assert!(validate_wallet_address("1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2").is_ok());
        assert!(validate_wallet_address("3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy").is_ok());

        assert!(validate_wallet_address("").is_err());
        assert!(validate_wallet_address("bc1QAR0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq").is_err());
        assert!(validate_wallet_address("0BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2").is_err());
        // 'O' is not in the base58 alphabet
        assert!(validate_wallet_address("1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVNO").is_err());
        assert!(validate_wallet_address("bc1q").is_err());
    }

    #[test]
    fn test_email() {
        assert!(validate_email("cat@lightcat.xyz").is_ok());
        assert!(validate_email("cat@lightcat").is_err());
        assert!(validate_email("@lightcat.xyz").is_err());
        assert!(validate_email("cat @lightcat.xyz").is_err());
        assert!(validate_email("cat@@lightcat.xyz").is_err());
    }

    #[test]
    fn test_batch_count_against_tier() {
        assert!(matches!(
            validate_batch_count(1, None),
            Err(DomainError::MintLocked)
        ));
        assert!(validate_batch_count(10, Some(Tier::Bronze)).is_ok());
        assert!(validate_batch_count(11, Some(Tier::Bronze)).is_err());
        assert!(validate_batch_count(30, Some(Tier::Gold)).is_ok());
        assert!(matches!(
            validate_batch_count(0, Some(Tier::Gold)),
            Err(DomainError::InvalidBatchCount(_))
        ));
    }

    #[test]
    fn test_game_session() {
        assert!(validate_game_session(&"a1-".repeat(11)).is_ok());
        assert!(validate_game_session("short").is_err());
        assert!(validate_game_session(&format!("{}!", "a".repeat(40))).is_err());
    }

    #[test]
    fn test_game_score_anti_cheat() {
        assert!(validate_game_score(28, 30).is_ok());
        assert!(validate_game_score(50, 5).is_ok());
        assert!(validate_game_score(51, 5).is_err());
        assert!(validate_game_score(10, 4).is_err());
        assert!(validate_game_score(10, 121).is_err());
    }

    #[test]
    fn test_lightning_invoice_and_hash() {
        assert!(validate_lightning_invoice("lnbc20u1pjxyz").is_ok());
        assert!(validate_lightning_invoice("lntb1500n1abc").is_ok());
        assert!(validate_lightning_invoice("bitcoin:bc1q").is_err());
        assert!(validate_lightning_invoice("lnbc").is_err());
        assert!(validate_payment_hash(&"ab".repeat(32)).is_ok());
        assert!(validate_payment_hash("abc").is_err());
    }
}
