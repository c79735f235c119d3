//! SQLite repository integration tests.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::body::Bytes;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use chrono::{Duration, Utc};
    use mint_types::domain::MAX_NOTIFICATION_ATTEMPTS;
    use mint_types::{
        BannedWallet, DeliveryStatus, DomainError, GameScore, InvoiceFilter, InvoiceId,
        InvoiceRepository, InvoiceStatus, NewInvoice, Notification, NotificationKind, RepoError,
        Sats, Tier, TransitionUpdate,
    };
    use serde_json::json;
    use tempfile::TempDir;

    use crate::notifications::{NotificationWorker, SIGNATURE_HEADER};
    use crate::security::{hash_api_key, verify_signature};
    use crate::{Repo, SqliteRepo};

    const TOTAL_BATCHES: i64 = 27_900;

    async fn setup_repo() -> SqliteRepo {
        SqliteRepo::new("sqlite::memory:").await.unwrap()
    }

    fn new_invoice(wallet: &str, batches: i64, tier: Tier) -> NewInvoice {
        let now = Utc::now();
        let id = InvoiceId::new();
        NewInvoice {
            id,
            reference: format!("LCAT-TEST-{}", id),
            wallet_address: wallet.to_string(),
            rgb_invoice: "rgb:utxob:2dUzpnJ8EfZEd1YEWx2ZUGAUUDSHqRdrwuZ7h8D".to_string(),
            email: None,
            tier,
            batch_count: batches,
            token_amount: batches * 700,
            amount_sats: Sats::new(batches * 2_000).unwrap(),
            payment_request: format!("lnbc{}n1ptest", batches * 20_000),
            payment_hash: format!("{:0>64}", id.as_uuid().simple()),
            created_at: now,
            expires_at: now + Duration::minutes(15),
        }
    }

    fn overdue(mut invoice: NewInvoice) -> NewInvoice {
        invoice.created_at = Utc::now() - Duration::minutes(30);
        invoice.expires_at = Utc::now() - Duration::minutes(15);
        invoice
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Invoices
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_create_and_get_invoice() {
        let repo = setup_repo().await;

        let created = repo
            .create_invoice(new_invoice("bc1qbuyer0000000000", 5, Tier::Gold), TOTAL_BATCHES)
            .await
            .unwrap();

        assert_eq!(created.status, InvoiceStatus::Pending);
        assert_eq!(created.batch_count, 5);

        let fetched = repo.get_invoice(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.tier, Tier::Gold);
        assert_eq!(fetched.amount_sats.get(), 10_000);
        assert_eq!(fetched.token_amount, 3_500);
        assert_eq!(fetched.status, InvoiceStatus::Pending);
        assert!(fetched.paid_at.is_none());
    }

    #[tokio::test]
    async fn test_get_invoice_not_found() {
        let repo = setup_repo().await;

        let result = repo.get_invoice(InvoiceId::new()).await.unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_find_by_payment_hash() {
        let repo = setup_repo().await;
        let invoice = new_invoice("bc1qbuyer0000000000", 1, Tier::Bronze);
        let hash = invoice.payment_hash.clone();
        let created = repo.create_invoice(invoice, TOTAL_BATCHES).await.unwrap();

        let found = repo.find_by_payment_hash(&hash).await.unwrap().unwrap();
        assert_eq!(found.id, created.id);

        assert!(repo.find_by_payment_hash("00").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_payment_hash_conflicts() {
        let repo = setup_repo().await;
        let first = new_invoice("bc1qbuyer0000000000", 1, Tier::Bronze);
        let mut second = new_invoice("bc1qother0000000000", 1, Tier::Bronze);
        second.payment_hash = first.payment_hash.clone();

        repo.create_invoice(first, TOTAL_BATCHES).await.unwrap();
        let result = repo.create_invoice(second, TOTAL_BATCHES).await;

        assert!(matches!(result, Err(RepoError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_create_invoice_respects_supply() {
        let repo = setup_repo().await;

        repo.create_invoice(new_invoice("bc1qbuyer0000000001", 8, Tier::Gold), 10)
            .await
            .unwrap();

        let result = repo
            .create_invoice(new_invoice("bc1qbuyer0000000002", 3, Tier::Gold), 10)
            .await;

        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::InsufficientSupply {
                available: 2,
                requested: 3
            }))
        ));

        // Exactly the remainder still fits.
        repo.create_invoice(new_invoice("bc1qbuyer0000000002", 2, Tier::Gold), 10)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_expired_reservations_release_supply() {
        let repo = setup_repo().await;

        repo.create_invoice(
            overdue(new_invoice("bc1qbuyer0000000001", 8, Tier::Gold)),
            10,
        )
        .await
        .unwrap();

        // The overdue invoice no longer holds its batches.
        repo.create_invoice(new_invoice("bc1qbuyer0000000002", 10, Tier::Gold), 10)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_invoice_respects_wallet_limit() {
        let repo = setup_repo().await;
        let wallet = "bc1qbuyer0000000000";

        repo.create_invoice(new_invoice(wallet, 6, Tier::Bronze), TOTAL_BATCHES)
            .await
            .unwrap();

        let result = repo
            .create_invoice(new_invoice(wallet, 5, Tier::Bronze), TOTAL_BATCHES)
            .await;

        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::WalletLimitExceeded {
                limit: 10,
                held: 6,
                requested: 5
            }))
        ));

        // A higher tier lifts the cap for the same wallet.
        repo.create_invoice(new_invoice(wallet, 5, Tier::Silver), TOTAL_BATCHES)
            .await
            .unwrap();

        // Other wallets are unaffected.
        repo.create_invoice(new_invoice("bc1qother0000000000", 10, Tier::Bronze), TOTAL_BATCHES)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_closed_mint_rejects_invoices() {
        let repo = setup_repo().await;

        repo.set_mint_closed(true).await.unwrap();
        let result = repo
            .create_invoice(new_invoice("bc1qbuyer0000000000", 1, Tier::Bronze), TOTAL_BATCHES)
            .await;
        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::MintClosed))
        ));

        repo.set_mint_closed(false).await.unwrap();
        repo.create_invoice(new_invoice("bc1qbuyer0000000000", 1, Tier::Bronze), TOTAL_BATCHES)
            .await
            .unwrap();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transitions
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_transition_is_compare_and_set() {
        let repo = setup_repo().await;
        let invoice = repo
            .create_invoice(new_invoice("bc1qbuyer0000000000", 2, Tier::Bronze), TOTAL_BATCHES)
            .await
            .unwrap();
        let paid_at = Utc::now();

        let paid = repo
            .transition(invoice.id, InvoiceStatus::Paid, TransitionUpdate::paid(paid_at))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(paid.status, InvoiceStatus::Paid);
        assert!(paid.paid_at.is_some());

        // A second settlement loses the race.
        let again = repo
            .transition(invoice.id, InvoiceStatus::Paid, TransitionUpdate::paid(Utc::now()))
            .await
            .unwrap();
        assert!(again.is_none());

        // Paid invoices cannot expire.
        let expired = repo
            .transition(invoice.id, InvoiceStatus::Expired, TransitionUpdate::default())
            .await
            .unwrap();
        assert!(expired.is_none());
    }

    #[tokio::test]
    async fn test_transition_unknown_invoice() {
        let repo = setup_repo().await;

        let result = repo
            .transition(InvoiceId::new(), InvoiceStatus::Paid, TransitionUpdate::paid(Utc::now()))
            .await
            .unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_failed_distribution_retry_then_delivery() {
        let repo = setup_repo().await;
        let invoice = repo
            .create_invoice(new_invoice("bc1qbuyer0000000000", 2, Tier::Bronze), TOTAL_BATCHES)
            .await
            .unwrap();

        let paid = repo
            .transition(invoice.id, InvoiceStatus::Paid, TransitionUpdate::paid(Utc::now()))
            .await
            .unwrap()
            .unwrap();
        let first_paid_at = paid.paid_at;

        let failed = repo
            .transition(
                invoice.id,
                InvoiceStatus::DistributionFailed,
                TransitionUpdate::failed("rgb node unreachable"),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(failed.failure_reason.as_deref(), Some("rgb node unreachable"));

        // Retry keeps the original payment time.
        let retried = repo
            .transition(invoice.id, InvoiceStatus::Paid, TransitionUpdate::paid(Utc::now()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(retried.paid_at, first_paid_at);

        let delivered = repo
            .transition(
                invoice.id,
                InvoiceStatus::Delivered,
                TransitionUpdate::delivered(Utc::now(), "transfer-1".into(), "cafebabe".into()),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivered.status, InvoiceStatus::Delivered);
        assert_eq!(delivered.consignment.as_deref(), Some("cafebabe"));
        assert_eq!(delivered.transfer_id.as_deref(), Some("transfer-1"));
        assert!(delivered.failure_reason.is_none());
        assert!(delivered.delivered_at.is_some());
    }

    #[tokio::test]
    async fn test_refund_records_reason() {
        let repo = setup_repo().await;
        let invoice = repo
            .create_invoice(new_invoice("bc1qbuyer0000000000", 2, Tier::Bronze), TOTAL_BATCHES)
            .await
            .unwrap();

        // Pending invoices cannot be refunded.
        assert!(
            repo.transition(
                invoice.id,
                InvoiceStatus::Refunded,
                TransitionUpdate::refunded("customer request")
            )
            .await
            .unwrap()
            .is_none()
        );

        repo.transition(invoice.id, InvoiceStatus::Paid, TransitionUpdate::paid(Utc::now()))
            .await
            .unwrap()
            .unwrap();
        let refunded = repo
            .transition(
                invoice.id,
                InvoiceStatus::Refunded,
                TransitionUpdate::refunded("customer request"),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(refunded.status, InvoiceStatus::Refunded);
        assert_eq!(refunded.refund_reason.as_deref(), Some("customer request"));
    }

    #[tokio::test]
    async fn test_expire_overdue() {
        let repo = setup_repo().await;
        let stale = repo
            .create_invoice(
                overdue(new_invoice("bc1qbuyer0000000001", 1, Tier::Bronze)),
                TOTAL_BATCHES,
            )
            .await
            .unwrap();
        let fresh = repo
            .create_invoice(new_invoice("bc1qbuyer0000000002", 1, Tier::Bronze), TOTAL_BATCHES)
            .await
            .unwrap();

        let expired = repo.expire_overdue(Utc::now()).await.unwrap();

        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, stale.id);
        assert_eq!(expired[0].status, InvoiceStatus::Expired);

        let fresh = repo.get_invoice(fresh.id).await.unwrap().unwrap();
        assert_eq!(fresh.status, InvoiceStatus::Pending);

        // Nothing left to expire.
        assert!(repo.expire_overdue(Utc::now()).await.unwrap().is_empty());

        // Late settlement of an expired invoice is honoured.
        let late = repo
            .transition(stale.id, InvoiceStatus::Paid, TransitionUpdate::paid(Utc::now()))
            .await
            .unwrap();
        assert!(late.is_some());
    }

    #[tokio::test]
    async fn test_list_pending() {
        let repo = setup_repo().await;
        let a = repo
            .create_invoice(new_invoice("bc1qbuyer0000000001", 1, Tier::Bronze), TOTAL_BATCHES)
            .await
            .unwrap();
        let b = repo
            .create_invoice(new_invoice("bc1qbuyer0000000002", 1, Tier::Bronze), TOTAL_BATCHES)
            .await
            .unwrap();
        repo.transition(b.id, InvoiceStatus::Cancelled, TransitionUpdate::default())
            .await
            .unwrap()
            .unwrap();

        let pending = repo.list_pending(10).await.unwrap();

        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, a.id);
    }

    #[tokio::test]
    async fn test_list_invoices_filters() {
        let repo = setup_repo().await;
        let wallet = "bc1qbuyer0000000000";

        let first = repo
            .create_invoice(new_invoice(wallet, 1, Tier::Gold), TOTAL_BATCHES)
            .await
            .unwrap();
        repo.create_invoice(new_invoice(wallet, 2, Tier::Gold), TOTAL_BATCHES)
            .await
            .unwrap();
        repo.create_invoice(new_invoice("bc1qother0000000000", 3, Tier::Gold), TOTAL_BATCHES)
            .await
            .unwrap();
        repo.transition(first.id, InvoiceStatus::Paid, TransitionUpdate::paid(Utc::now()))
            .await
            .unwrap()
            .unwrap();

        let all = repo.list_invoices(&InvoiceFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);

        let mine = repo
            .list_invoices(&InvoiceFilter::for_wallet(wallet))
            .await
            .unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|i| i.wallet_address == wallet));

        let paid = repo
            .list_invoices(&InvoiceFilter {
                status: Some(InvoiceStatus::Paid),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(paid.len(), 1);
        assert_eq!(paid[0].id, first.id);

        let page = repo
            .list_invoices(&InvoiceFilter {
                limit: Some(2),
                offset: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
    }

    #[tokio::test]
    async fn test_sales_stats() {
        let repo = setup_repo().await;

        let sold = repo
            .create_invoice(new_invoice("bc1qbuyer0000000001", 2, Tier::Bronze), TOTAL_BATCHES)
            .await
            .unwrap();
        repo.create_invoice(new_invoice("bc1qbuyer0000000002", 3, Tier::Bronze), TOTAL_BATCHES)
            .await
            .unwrap();
        repo.create_invoice(
            overdue(new_invoice("bc1qbuyer0000000003", 4, Tier::Bronze)),
            TOTAL_BATCHES,
        )
        .await
        .unwrap();
        repo.transition(sold.id, InvoiceStatus::Paid, TransitionUpdate::paid(Utc::now()))
            .await
            .unwrap()
            .unwrap();

        let stats = repo.sales_stats(Utc::now()).await.unwrap();

        assert_eq!(stats.batches_sold, 2);
        assert_eq!(stats.batches_reserved, 3);
        assert_eq!(stats.tokens_sold, 1_400);
        assert_eq!(stats.sats_received, 4_000);
        assert_eq!(stats.unique_buyers, 1);
        assert!(stats.last_sale_at.is_some());
        assert!(!stats.mint_closed);
    }

    #[tokio::test]
    async fn test_sales_stats_empty() {
        let repo = setup_repo().await;

        let stats = repo.sales_stats(Utc::now()).await.unwrap();

        assert_eq!(stats.batches_sold, 0);
        assert_eq!(stats.unique_buyers, 0);
        assert!(stats.last_sale_at.is_none());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Notification outbox
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_notification_claim_and_retry() {
        let repo = setup_repo().await;
        let invoice = repo
            .create_invoice(new_invoice("bc1qbuyer0000000000", 1, Tier::Bronze), TOTAL_BATCHES)
            .await
            .unwrap();

        repo.enqueue_notification(Notification::new(
            invoice.id,
            NotificationKind::InvoiceCreated,
            "buyer@example.com",
            json!({ "reference": invoice.reference }),
        ))
        .await
        .unwrap();

        let claimed = repo.get_pending_notifications(10, Utc::now()).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].status, DeliveryStatus::Processing);
        assert_eq!(claimed[0].kind, NotificationKind::InvoiceCreated);
        assert_eq!(claimed[0].payload["reference"], invoice.reference.as_str());

        // Claimed rows are not handed out twice.
        assert!(
            repo.get_pending_notifications(10, Utc::now())
                .await
                .unwrap()
                .is_empty()
        );

        repo.update_notification_status(
            claimed[0].id,
            DeliveryStatus::Pending,
            Some("HTTP 503".into()),
            None,
        )
        .await
        .unwrap();

        let retried = repo.get_pending_notifications(10, Utc::now()).await.unwrap();
        assert_eq!(retried.len(), 1);
        assert_eq!(retried[0].attempts, 1);
        assert_eq!(retried[0].last_error.as_deref(), Some("HTTP 503"));
    }

    #[tokio::test]
    async fn test_notification_worker_without_relay_completes() {
        let repo = Repo::Sqlite(setup_repo().await);
        let invoice = repo
            .create_invoice(new_invoice("bc1qbuyer0000000000", 1, Tier::Bronze), TOTAL_BATCHES)
            .await
            .unwrap();
        repo.enqueue_notification(Notification::new(
            invoice.id,
            NotificationKind::PaymentConfirmed,
            "buyer@example.com",
            json!({}),
        ))
        .await
        .unwrap();

        let worker = NotificationWorker::new(repo.clone(), None, None);

        assert_eq!(worker.tick().await.unwrap(), 1);
        assert_eq!(worker.tick().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_notification_backoff_holds_retry() {
        let repo = setup_repo().await;
        let invoice = repo
            .create_invoice(new_invoice("bc1qbuyer0000000000", 1, Tier::Bronze), TOTAL_BATCHES)
            .await
            .unwrap();
        repo.enqueue_notification(Notification::new(
            invoice.id,
            NotificationKind::PaymentConfirmed,
            "buyer@example.com",
            json!({}),
        ))
        .await
        .unwrap();

        let now = Utc::now();
        let claimed = repo.get_pending_notifications(10, now).await.unwrap();
        repo.update_notification_status(
            claimed[0].id,
            DeliveryStatus::Pending,
            Some("HTTP 500".into()),
            Some(now + Duration::minutes(10)),
        )
        .await
        .unwrap();

        assert!(
            repo.get_pending_notifications(10, now + Duration::minutes(5))
                .await
                .unwrap()
                .is_empty()
        );
        let due = repo
            .get_pending_notifications(10, now + Duration::minutes(11))
            .await
            .unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].attempts, 1);
    }

    /// Local relay that fails its first `failures` deliveries.
    struct Relay {
        failures: usize,
        calls: AtomicUsize,
        signed: AtomicUsize,
    }

    const RELAY_SECRET: &str = "relay_secret";

    async fn relay_handler(
        State(relay): State<Arc<Relay>>,
        headers: HeaderMap,
        body: Bytes,
    ) -> StatusCode {
        let call = relay.calls.fetch_add(1, Ordering::SeqCst);
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if verify_signature(&body, signature, RELAY_SECRET) {
            relay.signed.fetch_add(1, Ordering::SeqCst);
        }
        if call < relay.failures {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::OK
        }
    }

    async fn spawn_relay(failures: usize) -> (String, Arc<Relay>) {
        let relay = Arc::new(Relay {
            failures,
            calls: AtomicUsize::new(0),
            signed: AtomicUsize::new(0),
        });
        let app = axum::Router::new()
            .route("/notify", axum::routing::post(relay_handler))
            .with_state(relay.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/notify"), relay)
    }

    async fn outbox_row(repo: &SqliteRepo, id: uuid::Uuid) -> (String, i32) {
        sqlx::query_as::<_, (String, i32)>("SELECT status, attempts FROM notifications WHERE id = ?")
            .bind(id)
            .fetch_one(repo.pool())
            .await
            .unwrap()
    }

    async fn enqueue_one(repo: &SqliteRepo) -> uuid::Uuid {
        let invoice = repo
            .create_invoice(new_invoice("bc1qbuyer0000000000", 1, Tier::Bronze), TOTAL_BATCHES)
            .await
            .unwrap();
        let notification = Notification::new(
            invoice.id,
            NotificationKind::TokensDelivered,
            "buyer@example.com",
            json!({ "reference": invoice.reference }),
        );
        let id = notification.id;
        repo.enqueue_notification(notification).await.unwrap();
        id
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_relay_retries_then_delivers_signed() {
        let sqlite = setup_repo().await;
        let id = enqueue_one(&sqlite).await;
        let (url, relay) = spawn_relay(1).await;

        let worker = NotificationWorker::new(
            Repo::Sqlite(sqlite.clone()),
            Some(url),
            Some(RELAY_SECRET.into()),
        )
        .with_retry_backoff(std::time::Duration::ZERO);

        assert_eq!(worker.tick().await.unwrap(), 1);
        assert_eq!(outbox_row(&sqlite, id).await, ("PENDING".to_string(), 1));

        assert_eq!(worker.tick().await.unwrap(), 1);
        assert_eq!(outbox_row(&sqlite, id).await, ("COMPLETED".to_string(), 2));
        assert_eq!(worker.tick().await.unwrap(), 0);

        assert_eq!(relay.calls.load(Ordering::SeqCst), 2);
        assert_eq!(relay.signed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_relay_failure_backs_off() {
        let sqlite = setup_repo().await;
        let id = enqueue_one(&sqlite).await;
        let (url, relay) = spawn_relay(usize::MAX).await;

        let worker = NotificationWorker::new(Repo::Sqlite(sqlite.clone()), Some(url), None)
            .with_retry_backoff(std::time::Duration::from_secs(3600));

        assert_eq!(worker.tick().await.unwrap(), 1);
        // The retry is scheduled an hour out, so nothing is due yet.
        assert_eq!(worker.tick().await.unwrap(), 0);
        assert_eq!(outbox_row(&sqlite, id).await, ("PENDING".to_string(), 1));
        assert_eq!(relay.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_relay_gives_up_after_max_attempts() {
        let sqlite = setup_repo().await;
        let id = enqueue_one(&sqlite).await;
        let (url, relay) = spawn_relay(usize::MAX).await;

        let worker = NotificationWorker::new(Repo::Sqlite(sqlite.clone()), Some(url), None)
            .with_retry_backoff(std::time::Duration::ZERO);

        for _ in 0..MAX_NOTIFICATION_ATTEMPTS {
            assert_eq!(worker.tick().await.unwrap(), 1);
        }
        assert_eq!(worker.tick().await.unwrap(), 0);

        assert_eq!(
            outbox_row(&sqlite, id).await,
            ("FAILED".to_string(), MAX_NOTIFICATION_ATTEMPTS)
        );
        assert_eq!(
            relay.calls.load(Ordering::SeqCst),
            MAX_NOTIFICATION_ATTEMPTS as usize
        );
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Late payments and stalled distributions
    // ─────────────────────────────────────────────────────────────────────────

    async fn expired_invoice(repo: &SqliteRepo, wallet: &str, batches: i64, total: i64) -> InvoiceId {
        let invoice = repo
            .create_invoice(overdue(new_invoice(wallet, batches, Tier::Gold)), total)
            .await
            .unwrap();
        repo.expire_overdue(Utc::now()).await.unwrap();
        invoice.id
    }

    #[tokio::test]
    async fn test_settle_expired_when_supply_remains() {
        let repo = setup_repo().await;
        let id = expired_invoice(&repo, "bc1qbuyer0000000001", 5, 10).await;
        let paid_at = Utc::now();

        let settled = repo.settle_expired(id, paid_at, 10).await.unwrap().unwrap();

        assert_eq!(settled.status, InvoiceStatus::Paid);
        assert!(settled.paid_at.is_some());
        assert!(settled.failure_reason.is_none());

        // Only an expired invoice can be settled this way.
        assert!(repo.settle_expired(id, paid_at, 10).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_settle_expired_after_supply_resold_needs_refund() {
        let repo = setup_repo().await;
        let late = expired_invoice(&repo, "bc1qbuyer0000000001", 6, 10).await;

        // Another buyer takes the released batches.
        let other = repo
            .create_invoice(new_invoice("bc1qbuyer0000000002", 5, Tier::Gold), 10)
            .await
            .unwrap();
        repo.transition(
            other.id,
            InvoiceStatus::Paid,
            TransitionUpdate::paid(Utc::now()),
        )
        .await
        .unwrap()
        .unwrap();

        let settled = repo
            .settle_expired(late, Utc::now(), 10)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(settled.status, InvoiceStatus::RefundDue);
        assert!(settled.paid_at.is_some());
        assert!(
            settled
                .failure_reason
                .as_deref()
                .unwrap()
                .starts_with("Paid after expiry")
        );

        let stats = repo.sales_stats(Utc::now()).await.unwrap();
        assert_eq!(stats.batches_sold, 5);
        assert!(stats.batches_sold <= 10);
    }

    #[tokio::test]
    async fn test_settle_expired_respects_wallet_limit() {
        let repo = setup_repo().await;
        let wallet = "bc1qbuyer0000000001";
        let invoice = repo
            .create_invoice(overdue(new_invoice(wallet, 6, Tier::Bronze)), TOTAL_BATCHES)
            .await
            .unwrap();
        repo.expire_overdue(Utc::now()).await.unwrap();

        // The wallet bought its full allowance while the first invoice was expired.
        repo.create_invoice(new_invoice(wallet, 10, Tier::Bronze), TOTAL_BATCHES)
            .await
            .unwrap();

        let settled = repo
            .settle_expired(invoice.id, Utc::now(), TOTAL_BATCHES)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(settled.status, InvoiceStatus::RefundDue);
    }

    #[tokio::test]
    async fn test_claim_stalled_paid() {
        let repo = setup_repo().await;
        let invoice = repo
            .create_invoice(new_invoice("bc1qbuyer0000000001", 2, Tier::Gold), TOTAL_BATCHES)
            .await
            .unwrap();
        repo.transition(
            invoice.id,
            InvoiceStatus::Paid,
            TransitionUpdate::paid(Utc::now()),
        )
        .await
        .unwrap()
        .unwrap();

        // Freshly paid invoices are still being distributed.
        let recent = repo
            .claim_stalled_paid(Utc::now() - Duration::minutes(10), 10)
            .await
            .unwrap();
        assert!(recent.is_empty());

        let stalled = repo
            .claim_stalled_paid(Utc::now() + Duration::seconds(1), 10)
            .await
            .unwrap();
        assert_eq!(stalled.len(), 1);
        assert_eq!(stalled[0].id, invoice.id);

        // Claiming bumps updated_at, so a second sweep with an older cutoff skips it.
        let again = repo
            .claim_stalled_paid(stalled[0].updated_at - Duration::seconds(1), 10)
            .await
            .unwrap();
        assert!(again.is_empty());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Concurrent reservations on a file-backed database
    // ─────────────────────────────────────────────────────────────────────────

    async fn file_repo() -> (TempDir, SqliteRepo) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("mint.db").display());
        let repo = SqliteRepo::new(&url).await.unwrap();
        (dir, repo)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reservations_never_oversell() {
        let (_dir, repo) = file_repo().await;

        let handles: Vec<_> = (0..12)
            .map(|i| {
                let repo = repo.clone();
                tokio::spawn(async move {
                    repo.create_invoice(
                        new_invoice(&format!("bc1qbuyer00000000{i:02}"), 3, Tier::Gold),
                        20,
                    )
                    .await
                })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(RepoError::Domain(DomainError::InsufficientSupply { .. })) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(created, 6);
        let stats = repo.sales_stats(Utc::now()).await.unwrap();
        assert_eq!(stats.batches_reserved, 18);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reservations_respect_wallet_limit() {
        let (_dir, repo) = file_repo().await;
        let wallet = "bc1qbuyer0000000001";

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let repo = repo.clone();
                tokio::spawn(async move {
                    repo.create_invoice(new_invoice(wallet, 2, Tier::Bronze), TOTAL_BATCHES)
                        .await
                })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(RepoError::Domain(DomainError::WalletLimitExceeded { .. })) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(created, 5);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Bans, scores and export
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_banned_wallet_cannot_buy() {
        let repo = setup_repo().await;
        let wallet = "bc1qbuyer0000000001";

        let ban = BannedWallet::new(wallet, "chargeback", Utc::now()).unwrap();
        repo.ban_wallet(ban).await.unwrap();
        // Banning again replaces the reason.
        let ban = BannedWallet::new(wallet, "fraud", Utc::now()).unwrap();
        repo.ban_wallet(ban).await.unwrap();

        let bans = repo.list_banned_wallets().await.unwrap();
        assert_eq!(bans.len(), 1);
        assert_eq!(bans[0].reason, "fraud");

        let result = repo
            .create_invoice(new_invoice(wallet, 1, Tier::Gold), TOTAL_BATCHES)
            .await;
        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::WalletBanned(_)))
        ));

        assert!(repo.unban_wallet(wallet).await.unwrap());
        assert!(!repo.unban_wallet(wallet).await.unwrap());
        repo.create_invoice(new_invoice(wallet, 1, Tier::Gold), TOTAL_BATCHES)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_scores_count_and_rank() {
        let repo = setup_repo().await;
        let now = Utc::now();
        let ip = Some("203.0.113.7".to_string());

        for (score, age_hours) in [(12, 0), (30, 0), (21, 30), (5, 200)] {
            let created_at = now - Duration::hours(age_hours);
            repo.record_score(&GameScore::new("s", score, 30, ip.clone(), created_at))
                .await
                .unwrap();
        }
        repo.record_score(&GameScore::new("s", 25, 30, Some("198.51.100.1".into()), now))
            .await
            .unwrap();

        let recent = repo
            .count_scores_since("203.0.113.7", now - Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(recent, 2);

        let daily = repo
            .top_scores(Some(now - Duration::days(1)), 10)
            .await
            .unwrap();
        let scores: Vec<u32> = daily.iter().map(|s| s.score).collect();
        assert_eq!(scores, vec![30, 25, 12]);
        assert_eq!(daily[0].tier, Some(Tier::Gold));

        let all_time = repo.top_scores(None, 2).await.unwrap();
        assert_eq!(all_time.len(), 2);
        assert_eq!(all_time[0].score, 30);
    }

    #[tokio::test]
    async fn test_export_invoices_window() {
        let repo = setup_repo().await;
        let old = repo
            .create_invoice(overdue(new_invoice("bc1qbuyer0000000001", 1, Tier::Gold)), TOTAL_BATCHES)
            .await
            .unwrap();
        let fresh = repo
            .create_invoice(new_invoice("bc1qbuyer0000000002", 1, Tier::Gold), TOTAL_BATCHES)
            .await
            .unwrap();

        let all = repo.export_invoices(None, None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, old.id);

        let since = repo
            .export_invoices(Some(Utc::now() - Duration::minutes(5)), None)
            .await
            .unwrap();
        assert_eq!(since.len(), 1);
        assert_eq!(since[0].id, fresh.id);

        let until = repo
            .export_invoices(None, Some(Utc::now() - Duration::minutes(5)))
            .await
            .unwrap();
        assert_eq!(until.len(), 1);
        assert_eq!(until[0].id, old.id);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // API keys
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_api_key_lifecycle() {
        let repo = setup_repo().await;
        assert_eq!(repo.count_api_keys().await.unwrap(), 0);

        let (key, raw) = repo.create_api_key("admin").await.unwrap();
        assert!(raw.starts_with("sk_"));
        assert_eq!(repo.count_api_keys().await.unwrap(), 1);

        let verified = repo
            .verify_api_key_hash(&hash_api_key(&raw))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(verified.id, key.id);
        assert!(verified.last_used_at.is_some());

        assert!(
            repo.verify_api_key_hash(&hash_api_key("sk_wrong"))
                .await
                .unwrap()
                .is_none()
        );

        let keys = repo.list_api_keys().await.unwrap();
        assert_eq!(keys.len(), 1);

        assert!(repo.delete_api_key(key.id).await.unwrap());
        assert!(!repo.delete_api_key(key.id).await.unwrap());
        assert_eq!(repo.count_api_keys().await.unwrap(), 0);
        assert!(
            repo.verify_api_key_hash(&hash_api_key(&raw))
                .await
                .unwrap()
                .is_none()
        );
    }
}
