use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::mail::{Mailer, OutboundEmail};
use crate::ports::{OutboxRepository, RepositoryResult};

/// Delivery schedule for outbox rows. Attempts are counted when a row is claimed.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    pub backoff: chrono::Duration,
    pub lease: chrono::Duration,
    pub batch_size: i64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: chrono::Duration::seconds(3),
            lease: chrono::Duration::seconds(60),
            batch_size: 20,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: usize,
    pub retried: usize,
    pub failed: usize,
}

impl DispatchReport {
    pub fn processed(&self) -> usize {
        self.sent + self.retried + self.failed
    }
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    outbox: Arc<dyn OutboxRepository>,
    mailer: Arc<dyn Mailer>,
    policy: RetryPolicy,
    signal: Arc<Notify>,
}

impl NotificationDispatcher {
    pub fn new(outbox: Arc<dyn OutboxRepository>, mailer: Arc<dyn Mailer>, policy: RetryPolicy) -> Self {
        Self {
            outbox,
            mailer,
            policy,
            signal: Arc::new(Notify::new()),
        }
    }

    /// Handle the transaction engine uses to wake this dispatcher.
    pub fn signal(&self) -> Arc<Notify> {
        self.signal.clone()
    }

    /// Runs until the task is dropped. Wakes on the signal or every `poll_interval`,
    /// whichever comes first, and drains the due rows before sleeping again.
    pub async fn run(&self, poll_interval: Duration) {
        info!("Notification dispatcher started");

        loop {
            loop {
                match self.dispatch_due_at(Utc::now()).await {
                    Ok(report) if report.processed() > 0 => {
                        debug!(?report, "Dispatched outbox batch");
                    }
                    Ok(_) => break,
                    Err(e) => {
                        error!("Outbox batch error: {}", e);
                        break;
                    }
                }
            }

            tokio::select! {
                _ = self.signal.notified() => {}
                _ = sleep(poll_interval) => {}
            }
        }
    }

    pub async fn dispatch_due(&self) -> RepositoryResult<DispatchReport> {
        self.dispatch_due_at(Utc::now()).await
    }

    pub async fn dispatch_due_at(&self, now: DateTime<Utc>) -> RepositoryResult<DispatchReport> {
        let claimed = self
            .outbox
            .claim_due(now, self.policy.batch_size, self.policy.lease)
            .await?;

        let mut report = DispatchReport::default();

        for message in claimed {
            let email = OutboundEmail {
                to: message.recipient.clone(),
                template_id: message.template_id.clone(),
                dynamic_fields: message.dynamic_fields.clone(),
            };

            match self.mailer.send(&email).await {
                Ok(()) => {
                    self.outbox.mark_sent(message.id).await?;
                    report.sent += 1;
                }
                Err(e) if message.attempts >= self.policy.max_attempts => {
                    error!(
                        outbox_id = %message.id,
                        attempts = message.attempts,
                        "Giving up on notification: {}", e
                    );
                    self.outbox.mark_failed(message.id, &e.to_string()).await?;
                    report.failed += 1;
                }
                Err(e) => {
                    warn!(
                        outbox_id = %message.id,
                        attempts = message.attempts,
                        "Notification delivery failed, retrying: {}", e
                    );
                    self.outbox
                        .reschedule(message.id, now + self.policy.backoff, &e.to_string())
                        .await?;
                    report.retried += 1;
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryLedgerRepository;
    use crate::db::models::OutboxMessage;
    use crate::domain::NotificationStatus;
    use crate::mail::MailError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Fails the first `failures` sends, then succeeds.
    struct FlakyMailer {
        failures: usize,
        calls: AtomicUsize,
        delivered: Mutex<Vec<OutboundEmail>>,
    }

    impl FlakyMailer {
        fn new(failures: usize) -> Self {
            Self {
                failures,
                calls: AtomicUsize::new(0),
                delivered: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Mailer for FlakyMailer {
        async fn send(&self, email: &OutboundEmail) -> Result<(), MailError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(MailError::CircuitBreakerOpen("provider down".to_string()));
            }
            self.delivered.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    async fn setup(failures: usize) -> (Arc<InMemoryLedgerRepository>, Arc<FlakyMailer>, NotificationDispatcher) {
        let repo = Arc::new(InMemoryLedgerRepository::new());
        repo.enqueue(OutboxMessage::new(
            "alice@example.com".to_string(),
            "transfer-otp".to_string(),
            serde_json::json!({"firstName": "Alice", "otp": "654321"}),
        ))
        .await;
        let mailer = Arc::new(FlakyMailer::new(failures));
        let dispatcher = NotificationDispatcher::new(repo.clone(), mailer.clone(), RetryPolicy::default());
        (repo, mailer, dispatcher)
    }

    #[tokio::test]
    async fn delivers_and_scrubs_payload() {
        let (repo, mailer, dispatcher) = setup(0).await;

        let report = dispatcher.dispatch_due_at(Utc::now()).await.unwrap();
        assert_eq!(report, DispatchReport { sent: 1, retried: 0, failed: 0 });

        let delivered = mailer.delivered.lock().unwrap().clone();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].to, "alice@example.com");
        assert_eq!(delivered[0].dynamic_fields["otp"], "654321");

        let stored = repo.outbox_messages().await;
        assert_eq!(stored[0].status, NotificationStatus::Sent);
        assert_eq!(stored[0].attempts, 1);
        assert!(stored[0].dynamic_fields.get("otp").is_none());
    }

    #[tokio::test]
    async fn retries_after_fixed_backoff() {
        let (repo, _mailer, dispatcher) = setup(1).await;
        let start = Utc::now();

        let first = dispatcher.dispatch_due_at(start).await.unwrap();
        assert_eq!(first.retried, 1);

        // Not due until the backoff elapses.
        let early = dispatcher
            .dispatch_due_at(start + chrono::Duration::seconds(2))
            .await
            .unwrap();
        assert_eq!(early.processed(), 0);

        let second = dispatcher
            .dispatch_due_at(start + chrono::Duration::seconds(3))
            .await
            .unwrap();
        assert_eq!(second.sent, 1);

        let stored = repo.outbox_messages().await;
        assert_eq!(stored[0].status, NotificationStatus::Sent);
        assert_eq!(stored[0].attempts, 2);
    }

    #[tokio::test]
    async fn gives_up_after_third_attempt() {
        let (repo, mailer, dispatcher) = setup(usize::MAX).await;
        let mut now = Utc::now();

        for _ in 0..3 {
            dispatcher.dispatch_due_at(now).await.unwrap();
            now += chrono::Duration::seconds(3);
        }

        let stored = repo.outbox_messages().await;
        assert_eq!(stored[0].status, NotificationStatus::Failed);
        assert_eq!(stored[0].attempts, 3);
        assert!(stored[0].last_error.is_some());
        assert_eq!(stored[0].dynamic_fields, serde_json::json!({}));
        assert_eq!(mailer.calls.load(Ordering::SeqCst), 3);

        let after = dispatcher
            .dispatch_due_at(now + chrono::Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(after.processed(), 0);
    }

    #[tokio::test]
    async fn signal_wakes_running_dispatcher() {
        let repo = Arc::new(InMemoryLedgerRepository::new());
        let mailer = Arc::new(FlakyMailer::new(0));
        let dispatcher = NotificationDispatcher::new(repo.clone(), mailer.clone(), RetryPolicy::default());
        let signal = dispatcher.signal();

        let worker = dispatcher.clone();
        let handle = tokio::spawn(async move { worker.run(Duration::from_secs(3600)).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        repo.enqueue(OutboxMessage::new(
            "bob@example.com".to_string(),
            "transfer-otp".to_string(),
            serde_json::json!({"otp": "111111"}),
        ))
        .await;
        signal.notify_one();

        let mut delivered = 0;
        for _ in 0..50 {
            delivered = mailer.delivered.lock().unwrap().len();
            if delivered == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handle.abort();

        assert_eq!(delivered, 1);
    }
}
