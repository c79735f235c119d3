//! Background payment watcher.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info, instrument};

use mint_types::InvoiceRepository;

use crate::MintService;

/// Periodically expires stale invoices and polls the gateway for pending ones.
///
/// Webhooks are the fast path; this loop catches anything they missed.
pub struct PaymentWatcher<R: InvoiceRepository> {
    service: Arc<MintService<R>>,
    interval: Duration,
}

impl<R: InvoiceRepository> PaymentWatcher<R> {
    pub fn new(service: Arc<MintService<R>>, interval: Duration) -> Self {
        Self { service, interval }
    }

    #[instrument(skip(self))]
    pub async fn run(self) {
        info!("Starting payment watcher every {:?}", self.interval);
        loop {
            match self.service.reconcile_pending().await {
                Ok(0) => {}
                Ok(changed) => debug!("Payment watcher updated {} invoices", changed),
                Err(e) => error!("Payment watcher pass failed: {}", e),
            }
            sleep(self.interval).await;
        }
    }
}
