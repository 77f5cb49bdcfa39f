//! Mutex-guarded ledger used by unit tests and local tooling.
//!
//! Every port method takes the single state lock for its whole duration, which gives each
//! call the same all-or-nothing visibility the Postgres transaction provides.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::BigDecimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::models::{OutboxMessage, Transaction, WalletWithOwner};
use crate::domain::{Currency, NotificationStatus, TransactionStatus};
use crate::ports::{
    CreditOutcome, DebitOutcome, LedgerRepository, OutboxRepository, RepositoryError,
    RepositoryResult,
};

#[derive(Default)]
struct LedgerState {
    wallets: HashMap<Uuid, WalletWithOwner>,
    transactions: HashMap<Uuid, Transaction>,
    outbox: Vec<OutboxMessage>,
}

#[derive(Default)]
pub struct InMemoryLedgerRepository {
    state: Mutex<LedgerState>,
}

impl InMemoryLedgerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_wallet(
        &self,
        user_id: Uuid,
        currency: Currency,
        balance: BigDecimal,
        first_name: &str,
        last_name: &str,
        email: &str,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let wallet = WalletWithOwner {
            id,
            user_id,
            currency,
            balance,
            owner_first_name: first_name.to_string(),
            owner_last_name: last_name.to_string(),
            owner_email: email.to_string(),
        };
        self.state.lock().await.wallets.insert(id, wallet);
        id
    }

    pub async fn wallet_balance(&self, id: Uuid) -> Option<BigDecimal> {
        self.state
            .lock()
            .await
            .wallets
            .get(&id)
            .map(|wallet| wallet.balance.clone())
    }

    pub async fn outbox_messages(&self) -> Vec<OutboxMessage> {
        self.state.lock().await.outbox.clone()
    }

    pub async fn enqueue(&self, message: OutboxMessage) {
        self.state.lock().await.outbox.push(message);
    }

    /// Moves a transaction's OTP expiry, e.g. into the past.
    pub async fn set_otp_expiry(&self, id: Uuid, expires_at: DateTime<Utc>) -> bool {
        match self.state.lock().await.transactions.get_mut(&id) {
            Some(tx) => {
                tx.otp_expires_at = expires_at;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl LedgerRepository for InMemoryLedgerRepository {
    async fn find_wallet(&self, id: Uuid) -> RepositoryResult<Option<WalletWithOwner>> {
        Ok(self.state.lock().await.wallets.get(&id).cloned())
    }

    async fn find_transaction(&self, id: Uuid) -> RepositoryResult<Option<Transaction>> {
        Ok(self.state.lock().await.transactions.get(&id).cloned())
    }

    async fn open_transfer(
        &self,
        tx: &Transaction,
        notification: &OutboxMessage,
    ) -> RepositoryResult<DebitOutcome> {
        let mut state = self.state.lock().await;

        let sender = state.wallets.get_mut(&tx.sender_wallet_id).ok_or_else(|| {
            RepositoryError::Inconsistent(format!("wallet {} is missing", tx.sender_wallet_id))
        })?;

        if sender.balance < tx.amount {
            return Ok(DebitOutcome::InsufficientFunds);
        }

        sender.balance = &sender.balance - &tx.amount;
        let sender_balance = sender.balance.clone();

        state.transactions.insert(tx.id, tx.clone());
        state.outbox.push(notification.clone());

        Ok(DebitOutcome::Debited { sender_balance })
    }

    async fn complete_transfer(&self, id: Uuid) -> RepositoryResult<CreditOutcome> {
        let mut state = self.state.lock().await;

        let (receiver_id, amount) = match state.transactions.get(&id) {
            Some(tx) if tx.status.is_pending() => (tx.receiver_wallet_id, tx.amount.clone()),
            _ => return Ok(CreditOutcome::NotPending),
        };

        let receiver = state.wallets.get_mut(&receiver_id).ok_or_else(|| {
            RepositoryError::Inconsistent(format!("receiver wallet {} is missing", receiver_id))
        })?;
        receiver.balance = &receiver.balance + &amount;
        let receiver_balance = receiver.balance.clone();

        let transaction = match state.transactions.get_mut(&id) {
            Some(tx) => {
                tx.status = TransactionStatus::Completed;
                tx.updated_at = Utc::now();
                tx.clone()
            }
            None => return Err(RepositoryError::Inconsistent(format!("transaction {} vanished", id))),
        };

        Ok(CreditOutcome::Credited {
            transaction,
            receiver_balance,
        })
    }
}

#[async_trait]
impl OutboxRepository for InMemoryLedgerRepository {
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        lease: chrono::Duration,
    ) -> RepositoryResult<Vec<OutboxMessage>> {
        let mut state = self.state.lock().await;
        let limit = usize::try_from(limit).unwrap_or(0);

        let mut due: Vec<&mut OutboxMessage> = state
            .outbox
            .iter_mut()
            .filter(|m| m.status == NotificationStatus::Pending && m.next_attempt_at <= now)
            .collect();
        due.sort_by_key(|m| m.next_attempt_at);

        Ok(due
            .into_iter()
            .take(limit)
            .map(|message| {
                message.attempts += 1;
                message.next_attempt_at = now + lease;
                message.updated_at = now;
                message.clone()
            })
            .collect())
    }

    async fn mark_sent(&self, id: Uuid) -> RepositoryResult<()> {
        let mut state = self.state.lock().await;
        if let Some(message) = state.outbox.iter_mut().find(|m| m.id == id) {
            message.status = NotificationStatus::Sent;
            message.dynamic_fields = serde_json::json!({});
            message.last_error = None;
            message.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn reschedule(&self, id: Uuid, at: DateTime<Utc>, error: &str) -> RepositoryResult<()> {
        let mut state = self.state.lock().await;
        if let Some(message) = state
            .outbox
            .iter_mut()
            .find(|m| m.id == id && m.status == NotificationStatus::Pending)
        {
            message.next_attempt_at = at;
            message.last_error = Some(error.to_string());
            message.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> RepositoryResult<()> {
        let mut state = self.state.lock().await;
        if let Some(message) = state.outbox.iter_mut().find(|m| m.id == id) {
            message.status = NotificationStatus::Failed;
            message.dynamic_fields = serde_json::json!({});
            message.last_error = Some(error.to_string());
            message.updated_at = Utc::now();
        }
        Ok(())
    }
}
