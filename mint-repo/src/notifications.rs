use crate::Repo;
use crate::security::sign_payload;
use chrono::Utc;
use mint_types::domain::{MAX_NOTIFICATION_ATTEMPTS, retry_delay};
use mint_types::{DeliveryStatus, Notification};
use serde::Serialize;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Header carrying the hex HMAC-SHA256 of the request body.
pub const SIGNATURE_HEADER: &str = "X-Mint-Signature";

const BATCH_SIZE: i64 = 10;

/// Delay before the first retry; later retries double it.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// Body POSTed to the relay for each notification.
#[derive(Debug, Serialize)]
struct RelayEnvelope<'a> {
    id: uuid::Uuid,
    kind: &'a str,
    recipient: &'a str,
    invoice_id: mint_types::InvoiceId,
    payload: &'a serde_json::Value,
}

/// Drains the notification outbox into an HTTP relay.
pub struct NotificationWorker {
    repo: Repo,
    client: reqwest::Client,
    relay_url: Option<String>,
    secret: Option<String>,
    poll_interval: Duration,
    retry_backoff: Duration,
}

impl NotificationWorker {
    pub fn new(repo: Repo, relay_url: Option<String>, secret: Option<String>) -> Self {
        Self {
            repo,
            client: reqwest::Client::new(),
            relay_url,
            secret,
            poll_interval: Duration::from_secs(1),
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }

    #[instrument(skip(self))]
    pub async fn run(self) {
        match &self.relay_url {
            Some(url) => info!("Starting notification worker relaying to {}", url),
            None => warn!("NOTIFY_RELAY_URL not set, notifications will only be logged"),
        }
        loop {
            if let Err(e) = self.tick().await {
                error!("Failed to fetch notifications: {}", e);
            }
            sleep(self.poll_interval).await;
        }
    }

    /// Processes one batch of pending notifications, returning how many were handled.
    pub async fn tick(&self) -> Result<usize, mint_types::RepoError> {
        let notifications = self
            .repo
            .get_pending_notifications(BATCH_SIZE, Utc::now())
            .await?;
        let count = notifications.len();
        if count > 0 {
            info!("Processing {} pending notifications", count);
            for notification in notifications {
                self.process(notification).await;
            }
        }
        Ok(count)
    }

    #[instrument(skip(self, notification), fields(notification_id = %notification.id, kind = %notification.kind))]
    async fn process(&self, notification: Notification) {
        let (status, last_error, next_attempt_at) = match self.deliver(&notification).await {
            Ok(()) => (DeliveryStatus::Completed, None, None),
            Err(reason) => {
                // attempts counts deliveries made before this one
                let attempts = notification.attempts + 1;
                if attempts >= MAX_NOTIFICATION_ATTEMPTS {
                    error!(
                        "Giving up on notification after {} attempts: {}",
                        MAX_NOTIFICATION_ATTEMPTS, reason
                    );
                    (DeliveryStatus::Failed, Some(reason), None)
                } else {
                    let delay = retry_delay(attempts, self.retry_backoff);
                    warn!(
                        "Notification delivery failed, retrying in {:?}: {}",
                        delay, reason
                    );
                    let next = chrono::Duration::from_std(delay)
                        .ok()
                        .map(|d| Utc::now() + d);
                    (DeliveryStatus::Pending, Some(reason), next)
                }
            }
        };

        if let Err(e) = self
            .repo
            .update_notification_status(notification.id, status, last_error, next_attempt_at)
            .await
        {
            error!("Failed to update notification status: {}", e);
        }
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), String> {
        let Some(url) = &self.relay_url else {
            debug!(
                recipient = %notification.recipient,
                payload = %notification.payload,
                "No relay configured, dropping notification"
            );
            return Ok(());
        };

        let envelope = RelayEnvelope {
            id: notification.id,
            kind: notification.kind.as_ref(),
            recipient: &notification.recipient,
            invoice_id: notification.invoice_id,
            payload: &notification.payload,
        };
        let body = serde_json::to_vec(&envelope).map_err(|e| e.to_string())?;

        let mut request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(secret) = &self.secret {
            request = request.header(SIGNATURE_HEADER, sign_payload(&body, secret));
        }

        let resp = request.body(body).send().await.map_err(|e| e.to_string())?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(format!("HTTP {}", resp.status()))
        }
    }
}
