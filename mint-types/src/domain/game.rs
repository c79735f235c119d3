//! Game score records, the leaderboard and banned wallets.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::tier::Tier;
use crate::error::DomainError;

/// Score submissions one client address may make per hour.
pub const DEFAULT_SCORES_PER_HOUR: i64 = 50;

/// Largest leaderboard a caller may ask for.
pub const MAX_LEADERBOARD_SIZE: i64 = 100;

/// A recorded game, kept whether or not it unlocked a tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameScore {
    pub id: Uuid,
    pub session_id: String,
    pub score: u32,
    pub duration_secs: u32,
    pub tier: Option<Tier>,
    /// Forwarded client address, used for throttling
    pub client_ip: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl GameScore {
    pub fn new(
        session_id: impl Into<String>,
        score: u32,
        duration_secs: u32,
        client_ip: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            score,
            duration_secs,
            tier: Tier::from_score(score),
            client_ip,
            created_at,
        }
    }
}

/// How far back the leaderboard looks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardPeriod {
    #[default]
    Daily,
    Weekly,
    AllTime,
}

impl LeaderboardPeriod {
    /// Oldest score that still counts, `None` for all time.
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            LeaderboardPeriod::Daily => Some(now - Duration::days(1)),
            LeaderboardPeriod::Weekly => Some(now - Duration::weeks(1)),
            LeaderboardPeriod::AllTime => None,
        }
    }
}

/// A wallet the operator has barred from buying.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BannedWallet {
    #[schema(example = "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq")]
    pub wallet_address: String,
    #[schema(example = "Chargeback abuse")]
    pub reason: String,
    pub banned_at: DateTime<Utc>,
}

impl BannedWallet {
    pub fn new(
        wallet_address: impl Into<String>,
        reason: &str,
        banned_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(DomainError::ValidationError("Ban reason is required".into()));
        }
        Ok(Self {
            wallet_address: wallet_address.into(),
            reason: reason.to_string(),
            banned_at,
        })
    }
}
