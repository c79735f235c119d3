//! Reference BTC → fiat rates for display estimates.
//!
//! Sale prices are denominated in satoshis. The storefront and the admin
//! dashboard still want a rough fiat figure next to them, so this crate keeps
//! a small table of hardcoded BTC prices. Nothing here is used for settlement.
//!
//! # Adding a New Currency
//! Add a line to the `define_fiat!` invocation:
//! ```ignore
//! define_fiat! {
//!     // ... existing currencies ...
//!     JPY => ("JPY", "¥", 1, 15_000_000),
//! }
//! ```
//!
//! # Example
//! ```
//! use fiat_rates::{FiatCode, sats_to_fiat};
//!
//! let estimate = sats_to_fiat(2_000, FiatCode::USD);
//! assert_eq!(estimate.code, FiatCode::USD);
//! println!("{}", estimate); // $1.30
//! ```

use std::fmt;

/// Satoshis in one bitcoin.
pub const SATS_PER_BTC: i64 = 100_000_000;

/// Defines the supported fiat currencies and their BTC price table.
///
/// # Syntax
/// ```ignore
/// define_fiat! {
///     Name => ("CODE", "SYMBOL", minor_units_per_major, btc_price_in_minor_units),
/// }
/// ```
#[macro_export]
macro_rules! define_fiat {
    (
        $(
            $name:ident => ($code:literal, $symbol:literal, $minor_per_major:expr, $btc_price:expr)
        ),* $(,)?
    ) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
        #[serde(rename_all = "UPPERCASE")]
        pub enum FiatCode {
            $($name),*
        }

        impl FiatCode {
            pub fn code(&self) -> &'static str {
                match self {
                    $(FiatCode::$name => $code),*
                }
            }

            pub fn symbol(&self) -> &'static str {
                match self {
                    $(FiatCode::$name => $symbol),*
                }
            }

            pub fn minor_units_per_major(&self) -> i64 {
                match self {
                    $(FiatCode::$name => $minor_per_major),*
                }
            }

            /// Price of one BTC in this currency's minor units.
            pub fn btc_price_minor(&self) -> i64 {
                match self {
                    $(FiatCode::$name => $btc_price),*
                }
            }

            pub fn all() -> &'static [FiatCode] {
                &[$(FiatCode::$name),*]
            }
        }

        impl std::str::FromStr for FiatCode {
            type Err = String;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_uppercase().as_str() {
                    $($code => Ok(FiatCode::$name),)*
                    _ => Err(format!("Unknown currency: {}", s)),
                }
            }
        }
    };
}

define_fiat! {
    USD => ("USD", "$", 100, 6_500_000),
    EUR => ("EUR", "€", 100, 6_000_000),
    GBP => ("GBP", "£", 100, 5_150_000),
}

impl fmt::Display for FiatCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// An approximate fiat amount in minor units (cents, pence).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct FiatAmount {
    #[schema(example = 130)]
    pub minor: i64,
    pub code: FiatCode,
}

impl fmt::Display for FiatAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let per_major = self.code.minor_units_per_major();
        let major = self.minor / per_major;
        let minor = (self.minor % per_major).abs();
        write!(f, "{}{}.{:02}", self.code.symbol(), major, minor)
    }
}

/// Converts satoshis to an approximate fiat amount, rounded to the nearest minor unit.
pub fn sats_to_fiat(sats: i64, code: FiatCode) -> FiatAmount {
    let scaled = sats as i128 * code.btc_price_minor() as i128;
    let half = SATS_PER_BTC as i128 / 2;
    let minor = if scaled >= 0 {
        (scaled + half) / SATS_PER_BTC as i128
    } else {
        (scaled - half) / SATS_PER_BTC as i128
    };
    FiatAmount {
        minor: minor as i64,
        code,
    }
}

/// Formats satoshis as a BTC decimal string with 8 places.
pub fn format_btc(sats: i64) -> String {
    let sign = if sats < 0 { "-" } else { "" };
    let abs = sats.unsigned_abs();
    format!(
        "{}{}.{:08}",
        sign,
        abs / SATS_PER_BTC as u64,
        abs % SATS_PER_BTC as u64
    )
}
