//! Game tiers and tier passes.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::DomainError;

/// Purchase tier unlocked by playing the game.
///
/// Without a tier the mint is locked for that buyer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Bronze,
    Silver,
    Gold,
}

impl Tier {
    pub const BRONZE_MIN_SCORE: u32 = 11;
    pub const SILVER_MIN_SCORE: u32 = 18;
    pub const GOLD_MIN_SCORE: u32 = 28;

    /// Maps a game score to the tier it unlocks.
    pub fn from_score(score: u32) -> Option<Tier> {
        match score {
            s if s >= Self::GOLD_MIN_SCORE => Some(Tier::Gold),
            s if s >= Self::SILVER_MIN_SCORE => Some(Tier::Silver),
            s if s >= Self::BRONZE_MIN_SCORE => Some(Tier::Bronze),
            _ => None,
        }
    }

    /// Maximum batches a single wallet may hold at this tier.
    pub fn max_batches(&self) -> u32 {
        match self {
            Tier::Bronze => 10,
            Tier::Silver => 20,
            Tier::Gold => 30,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Bronze => "bronze",
            Tier::Silver => "silver",
            Tier::Gold => "gold",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Tier {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bronze" => Ok(Tier::Bronze),
            "silver" => Ok(Tier::Silver),
            "gold" => Ok(Tier::Gold),
            other => Err(DomainError::ValidationError(format!("Unknown tier: {}", other))),
        }
    }
}

/// The claims carried by a tier pass token.
///
/// Wire form: `{tier}:{expires_unix}:{session_id}:{signature_hex}`. The
/// signature covers everything before the last colon and is produced and
/// checked by the repository's security helpers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierPass {
    pub tier: Tier,
    pub expires_at: DateTime<Utc>,
    pub session_id: String,
}

impl TierPass {
    /// The signed portion of the token.
    pub fn payload(&self) -> String {
        format!(
            "{}:{}:{}",
            self.tier,
            self.expires_at.timestamp(),
            self.session_id
        )
    }

    /// Splits a token into its claims and signature without checking the signature.
    pub fn parse(token: &str) -> Result<(TierPass, String), DomainError> {
        let invalid = || DomainError::InvalidTierPass("malformed tier pass".into());

        let mut parts = token.trim().splitn(4, ':');
        let tier = parts.next().ok_or_else(invalid)?.parse::<Tier>()?;
        let expires = parts
            .next()
            .ok_or_else(invalid)?
            .parse::<i64>()
            .map_err(|_| invalid())?;
        let session_id = parts.next().ok_or_else(invalid)?.to_string();
        let signature = parts.next().ok_or_else(invalid)?.to_string();

        if session_id.is_empty() || signature.is_empty() {
            return Err(invalid());
        }

        let expires_at = Utc.timestamp_opt(expires, 0).single().ok_or_else(invalid)?;

        Ok((
            TierPass {
                tier,
                expires_at,
                session_id,
            },
            signature,
        ))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_from_score() {
        assert_eq!(Tier::from_score(0), None);
        assert_eq!(Tier::from_score(10), None);
        assert_eq!(Tier::from_score(11), Some(Tier::Bronze));
        assert_eq!(Tier::from_score(17), Some(Tier::Bronze));
        assert_eq!(Tier::from_score(18), Some(Tier::Silver));
        assert_eq!(Tier::from_score(27), Some(Tier::Silver));
        assert_eq!(Tier::from_score(28), Some(Tier::Gold));
        assert_eq!(Tier::from_score(500), Some(Tier::Gold));
    }

    #[test]
    fn test_tier_limits() {
        assert_eq!(Tier::Bronze.max_batches(), 10);
        assert_eq!(Tier::Silver.max_batches(), 20);
        assert_eq!(Tier::Gold.max_batches(), 30);
    }

    #[test]
    fn test_tier_parse_is_case_insensitive() {
        assert_eq!("GOLD".parse::<Tier>().unwrap(), Tier::Gold);
        assert!("platinum".parse::<Tier>().is_err());
    }

    #[test]
    fn test_tier_pass_parse() {
        let (pass, sig) = TierPass::parse("silver:1900000000:session-abc:deadbeef").unwrap();
        assert_eq!(pass.tier, Tier::Silver);
        assert_eq!(pass.expires_at.timestamp(), 1_900_000_000);
        assert_eq!(pass.session_id, "session-abc");
        assert_eq!(sig, "deadbeef");
        assert_eq!(pass.payload(), "silver:1900000000:session-abc");
    }

    #[test]
    fn test_tier_pass_parse_rejects_garbage() {
        assert!(TierPass::parse("").is_err());
        assert!(TierPass::parse("gold:notanumber:s:sig").is_err());
        assert!(TierPass::parse("gold:1900000000:session").is_err());
        assert!(TierPass::parse("gold:1900000000::sig").is_err());
    }
}
