//! Storage ports used by the transaction engine and the notification dispatcher.
//!
//! Every method that moves money is a single atomic unit on the store side. Callers never
//! read a balance and write it back; they hand the store a relative adjustment and learn
//! from the outcome whether the guarded update applied.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::BigDecimal;
use thiserror::Error;
use uuid::Uuid;

use crate::db::models::{OutboxMessage, Transaction, WalletWithOwner};

pub const WALLET_USER_CURRENCY_CONSTRAINT: &str = "wallets_user_currency_key";

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("inconsistent ledger state: {0}")]
    Inconsistent(String),
}

impl RepositoryError {
    /// Maps Postgres unique violations (SQLSTATE 23505) to `UniqueViolation` so callers can
    /// surface them as conflicts.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown").to_string();
                return RepositoryError::UniqueViolation(constraint);
            }
        }
        RepositoryError::Database(err)
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Outcome of the debit leg.
#[derive(Debug, Clone, PartialEq)]
pub enum DebitOutcome {
    /// Row inserted, sender debited and notification queued.
    Debited { sender_balance: BigDecimal },
    /// The guarded debit matched no row; nothing was written.
    InsufficientFunds,
}

/// Outcome of the credit leg.
#[derive(Debug, Clone)]
pub enum CreditOutcome {
    /// Status flipped to COMPLETED and receiver credited.
    Credited {
        transaction: Transaction,
        receiver_balance: BigDecimal,
    },
    /// The transaction was no longer PENDING when the status update ran; nothing was written.
    NotPending,
}

#[async_trait]
pub trait LedgerRepository: Send + Sync {
    async fn find_wallet(&self, id: Uuid) -> RepositoryResult<Option<WalletWithOwner>>;

    async fn find_transaction(&self, id: Uuid) -> RepositoryResult<Option<Transaction>>;

    /// Debits the sender by `tx.amount` if and only if its balance covers it, inserts the
    /// PENDING row and enqueues `notification`, all in one atomic unit.
    async fn open_transfer(
        &self,
        tx: &Transaction,
        notification: &OutboxMessage,
    ) -> RepositoryResult<DebitOutcome>;

    /// Moves the transaction from PENDING to COMPLETED and credits the receiver in one atomic
    /// unit. Only one concurrent caller can observe PENDING.
    async fn complete_transfer(&self, id: Uuid) -> RepositoryResult<CreditOutcome>;
}

#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Claims up to `limit` PENDING rows due at `now`. Claiming increments `attempts` and
    /// pushes `next_attempt_at` to `now + lease` so a crashed worker's rows become due again.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        lease: chrono::Duration,
    ) -> RepositoryResult<Vec<OutboxMessage>>;

    /// Marks a row SENT and clears its payload.
    async fn mark_sent(&self, id: Uuid) -> RepositoryResult<()>;

    async fn reschedule(&self, id: Uuid, at: DateTime<Utc>, error: &str) -> RepositoryResult<()>;

    /// Marks a row FAILED and clears its payload.
    async fn mark_failed(&self, id: Uuid, error: &str) -> RepositoryResult<()>;
}
