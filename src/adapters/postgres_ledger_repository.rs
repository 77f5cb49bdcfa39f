//! Postgres implementation of the ledger and outbox ports.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::BigDecimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::{OutboxMessage, Transaction, WalletWithOwner};
use crate::ports::{
    CreditOutcome, DebitOutcome, LedgerRepository, OutboxRepository, RepositoryError,
    RepositoryResult,
};

pub(crate) const TRANSACTION_COLUMNS: &str = r#"id, user_id, sender_wallet_id, receiver_wallet_id, currency, amount,
    "type", status, ref_number, otp_hash, otp_expires_at, created_at, updated_at"#;

pub(crate) const OUTBOX_COLUMNS: &str = "id, recipient, template_id, dynamic_fields, status, attempts, \
    last_error, next_attempt_at, created_at, updated_at";

/// Postgres-backed ledger. Money moves only through conditional updates executed inside a
/// single `sqlx` transaction together with the row they accompany.
#[derive(Clone)]
pub struct PostgresLedgerRepository {
    pool: PgPool,
}

impl PostgresLedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerRepository for PostgresLedgerRepository {
    async fn find_wallet(&self, id: Uuid) -> RepositoryResult<Option<WalletWithOwner>> {
        sqlx::query_as::<_, WalletWithOwner>(
            r#"
            SELECT w.id, w.user_id, w.currency, w.balance,
                   u.first_name AS owner_first_name,
                   u.last_name AS owner_last_name,
                   u.email AS owner_email
            FROM wallets w
            JOIN users u ON u.id = w.user_id
            WHERE w.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)
    }

    async fn find_transaction(&self, id: Uuid) -> RepositoryResult<Option<Transaction>> {
        sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {} FROM transactions WHERE id = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)
    }

    async fn open_transfer(
        &self,
        tx: &Transaction,
        notification: &OutboxMessage,
    ) -> RepositoryResult<DebitOutcome> {
        let mut db_tx = self.pool.begin().await.map_err(RepositoryError::from_sqlx)?;

        // The row lock taken here serializes concurrent debits of the same wallet.
        let sender_balance: Option<BigDecimal> = sqlx::query_scalar(
            r#"
            UPDATE wallets
            SET balance = balance - $1, updated_at = NOW()
            WHERE id = $2 AND balance >= $1
            RETURNING balance
            "#,
        )
        .bind(&tx.amount)
        .bind(tx.sender_wallet_id)
        .fetch_optional(&mut *db_tx)
        .await
        .map_err(RepositoryError::from_sqlx)?;

        let Some(sender_balance) = sender_balance else {
            db_tx.rollback().await.map_err(RepositoryError::from_sqlx)?;
            return Ok(DebitOutcome::InsufficientFunds);
        };

        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, user_id, sender_wallet_id, receiver_wallet_id, currency, amount,
                "type", status, ref_number, otp_hash, otp_expires_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(tx.id)
        .bind(tx.user_id)
        .bind(tx.sender_wallet_id)
        .bind(tx.receiver_wallet_id)
        .bind(tx.currency)
        .bind(&tx.amount)
        .bind(tx.kind)
        .bind(tx.status)
        .bind(&tx.ref_number)
        .bind(&tx.otp_hash)
        .bind(tx.otp_expires_at)
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .execute(&mut *db_tx)
        .await
        .map_err(RepositoryError::from_sqlx)?;

        sqlx::query(
            r#"
            INSERT INTO notification_outbox (
                id, recipient, template_id, dynamic_fields, status, attempts,
                last_error, next_attempt_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(notification.id)
        .bind(&notification.recipient)
        .bind(&notification.template_id)
        .bind(&notification.dynamic_fields)
        .bind(notification.status)
        .bind(notification.attempts)
        .bind(&notification.last_error)
        .bind(notification.next_attempt_at)
        .bind(notification.created_at)
        .bind(notification.updated_at)
        .execute(&mut *db_tx)
        .await
        .map_err(RepositoryError::from_sqlx)?;

        db_tx.commit().await.map_err(RepositoryError::from_sqlx)?;

        Ok(DebitOutcome::Debited { sender_balance })
    }

    async fn complete_transfer(&self, id: Uuid) -> RepositoryResult<CreditOutcome> {
        let mut db_tx = self.pool.begin().await.map_err(RepositoryError::from_sqlx)?;

        let completed = sqlx::query_as::<_, Transaction>(&format!(
            r#"
            UPDATE transactions
            SET status = 'COMPLETED', updated_at = NOW()
            WHERE id = $1 AND status = 'PENDING'
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *db_tx)
        .await
        .map_err(RepositoryError::from_sqlx)?;

        let Some(transaction) = completed else {
            db_tx.rollback().await.map_err(RepositoryError::from_sqlx)?;
            return Ok(CreditOutcome::NotPending);
        };

        let receiver_balance: Option<BigDecimal> = sqlx::query_scalar(
            r#"
            UPDATE wallets
            SET balance = balance + $1, updated_at = NOW()
            WHERE id = $2
            RETURNING balance
            "#,
        )
        .bind(&transaction.amount)
        .bind(transaction.receiver_wallet_id)
        .fetch_optional(&mut *db_tx)
        .await
        .map_err(RepositoryError::from_sqlx)?;

        let Some(receiver_balance) = receiver_balance else {
            db_tx.rollback().await.map_err(RepositoryError::from_sqlx)?;
            return Err(RepositoryError::Inconsistent(format!(
                "receiver wallet {} of transaction {} is missing",
                transaction.receiver_wallet_id, transaction.id
            )));
        };

        db_tx.commit().await.map_err(RepositoryError::from_sqlx)?;

        Ok(CreditOutcome::Credited {
            transaction,
            receiver_balance,
        })
    }
}

#[async_trait]
impl OutboxRepository for PostgresLedgerRepository {
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        lease: chrono::Duration,
    ) -> RepositoryResult<Vec<OutboxMessage>> {
        // SKIP LOCKED lets several dispatchers share the table without blocking each other.
        sqlx::query_as::<_, OutboxMessage>(&format!(
            r#"
            UPDATE notification_outbox
            SET attempts = attempts + 1, next_attempt_at = $2, updated_at = NOW()
            WHERE id IN (
                SELECT id FROM notification_outbox
                WHERE status = 'PENDING' AND next_attempt_at <= $1
                ORDER BY next_attempt_at ASC
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {}
            "#,
            OUTBOX_COLUMNS
        ))
        .bind(now)
        .bind(now + lease)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)
    }

    async fn mark_sent(&self, id: Uuid) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            UPDATE notification_outbox
            SET status = 'SENT', dynamic_fields = '{}'::jsonb, last_error = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)?;
        Ok(())
    }

    async fn reschedule(&self, id: Uuid, at: DateTime<Utc>, error: &str) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            UPDATE notification_outbox
            SET next_attempt_at = $2, last_error = $3, updated_at = NOW()
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(id)
        .bind(at)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)?;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            UPDATE notification_outbox
            SET status = 'FAILED', dynamic_fields = '{}'::jsonb, last_error = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)?;
        Ok(())
    }
}
