//! Satoshi amounts.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;

/// Satoshis in one bitcoin.
pub const SATS_PER_BTC: i64 = 100_000_000;

/// A non-negative amount of satoshis.
///
/// Sale prices, invoice amounts and revenue figures are all carried in sats
/// to avoid floating-point BTC values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sats(i64);

impl Sats {
    /// Creates a new amount. Negative values are rejected.
    pub fn new(amount: i64) -> Result<Self, DomainError> {
        if amount < 0 {
            return Err(DomainError::NegativeAmount);
        }
        Ok(Self(amount))
    }

    pub const fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in satoshis.
    pub fn get(&self) -> i64 {
        self.0
    }

    pub fn checked_add(&self, other: Sats) -> Result<Sats, DomainError> {
        self.0
            .checked_add(other.0)
            .map(Sats)
            .ok_or(DomainError::AmountOverflow)
    }

    /// Multiplies by a count (e.g. price per batch × batches).
    pub fn checked_mul(&self, count: i64) -> Result<Sats, DomainError> {
        if count < 0 {
            return Err(DomainError::NegativeAmount);
        }
        self.0
            .checked_mul(count)
            .map(Sats)
            .ok_or(DomainError::AmountOverflow)
    }

    /// BTC decimal string with 8 places, e.g. `0.00002000`.
    pub fn to_btc_string(&self) -> String {
        format!("{}.{:08}", self.0 / SATS_PER_BTC, self.0 % SATS_PER_BTC)
    }
}

impl fmt::Display for Sats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sats", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_sats_fails() {
        assert!(matches!(Sats::new(-1), Err(DomainError::NegativeAmount)));
    }

    #[test]
    fn test_checked_mul() {
        let price = Sats::new(2_000).unwrap();
        assert_eq!(price.checked_mul(30).unwrap().get(), 60_000);
    }

    #[test]
    fn test_overflow_is_an_error() {
        let big = Sats::new(i64::MAX).unwrap();
        assert!(matches!(
            big.checked_add(Sats::new(1).unwrap()),
            Err(DomainError::AmountOverflow)
        ));
        assert!(matches!(big.checked_mul(2), Err(DomainError::AmountOverflow)));
    }

    #[test]
    fn test_btc_string() {
        assert_eq!(Sats::new(2_000).unwrap().to_btc_string(), "0.00002000");
        assert_eq!(Sats::new(123_456_789).unwrap().to_btc_string(), "1.23456789");
    }
}
