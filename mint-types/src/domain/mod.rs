//! Domain models for the mint service.

pub mod api_key;
pub mod game;
pub mod invoice;
pub mod notification;
pub mod sale;
pub mod sats;
pub mod tier;
pub mod validation;

pub use api_key::{ApiKey, ApiKeyId};
pub use game::{
    BannedWallet, DEFAULT_SCORES_PER_HOUR, GameScore, LeaderboardPeriod, MAX_LEADERBOARD_SIZE,
};
pub use invoice::{
    Invoice, InvoiceId, InvoiceStatus, NewInvoice, TransitionUpdate, payment_reference,
};
pub use notification::{
    DeliveryStatus, MAX_NOTIFICATION_ATTEMPTS, MAX_RETRY_DELAY, Notification, NotificationKind,
    retry_delay,
};
pub use sale::{Quote, SaleParams, SalesStats};
pub use sats::Sats;
pub use tier::{Tier, TierPass};
