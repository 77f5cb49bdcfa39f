use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Result};
use uuid::Uuid;

use crate::adapters::postgres_ledger_repository::{OUTBOX_COLUMNS, TRANSACTION_COLUMNS};
use crate::db::models::{
    OutboxMessage, SuggestedWallet, Transaction, WalletOwner, WalletProfile, WalletSummary,
};
use crate::domain::Currency;
use crate::ports::{RepositoryError, RepositoryResult};

// --- User Queries ---

/// Users normally come from the authentication service; this exists for seeding.
pub async fn insert_user(pool: &PgPool, first_name: &str, last_name: &str, email: &str) -> Result<Uuid> {
    sqlx::query_scalar(
        r#"
        INSERT INTO users (id, first_name, last_name, email)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(first_name)
    .bind(last_name)
    .bind(email)
    .fetch_one(pool)
    .await
}

// --- Wallet Queries ---

pub async fn find_user_wallet_by_currency(
    pool: &PgPool,
    user_id: Uuid,
    currency: Currency,
) -> Result<Option<WalletSummary>> {
    sqlx::query_as::<_, WalletSummary>(
        "SELECT id, balance, currency FROM wallets WHERE user_id = $1 AND currency = $2",
    )
    .bind(user_id)
    .bind(currency)
    .fetch_optional(pool)
    .await
}

pub async fn insert_wallet(
    pool: &PgPool,
    user_id: Uuid,
    currency: Currency,
) -> RepositoryResult<WalletSummary> {
    sqlx::query_as::<_, WalletSummary>(
        r#"
        INSERT INTO wallets (id, user_id, currency)
        VALUES ($1, $2, $3)
        RETURNING id, balance, currency
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(currency)
    .fetch_one(pool)
    .await
    .map_err(RepositoryError::from_sqlx)
}

pub async fn list_user_wallets(pool: &PgPool, user_id: Uuid) -> Result<Vec<WalletSummary>> {
    sqlx::query_as::<_, WalletSummary>(
        "SELECT id, balance, currency FROM wallets WHERE user_id = $1 ORDER BY created_at ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

#[derive(FromRow)]
struct WalletProfileRow {
    id: Uuid,
    currency: Currency,
    owner_id: Uuid,
    first_name: String,
    last_name: String,
}

pub async fn get_wallet_profile(pool: &PgPool, wallet_id: Uuid) -> Result<Option<WalletProfile>> {
    let row = sqlx::query_as::<_, WalletProfileRow>(
        r#"
        SELECT w.id, w.currency, u.id AS owner_id, u.first_name, u.last_name
        FROM wallets w
        JOIN users u ON u.id = w.user_id
        WHERE w.id = $1
        "#,
    )
    .bind(wallet_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| WalletProfile {
        id: r.id,
        currency: r.currency,
        owner: WalletOwner {
            id: r.owner_id,
            first_name: r.first_name,
            last_name: r.last_name,
        },
    }))
}

pub async fn wallet_belongs_to_user(pool: &PgPool, wallet_id: Uuid, user_id: Uuid) -> Result<bool> {
    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM wallets WHERE id = $1 AND user_id = $2)")
        .bind(wallet_id)
        .bind(user_id)
        .fetch_one(pool)
        .await
}

// --- History Queries ---

/// Which side of a transfer a wallet is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
}

impl Direction {
    fn wallet_column(self) -> &'static str {
        match self {
            Direction::Outgoing => "sender_wallet_id",
            Direction::Incoming => "receiver_wallet_id",
        }
    }
}

pub async fn list_completed_for_wallet(
    pool: &PgPool,
    wallet_id: Uuid,
    direction: Direction,
    limit: i64,
    offset: i64,
) -> Result<Vec<Transaction>> {
    sqlx::query_as::<_, Transaction>(&format!(
        r#"
        SELECT {}
        FROM transactions
        WHERE {} = $1 AND status = 'COMPLETED'
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
        TRANSACTION_COLUMNS,
        direction.wallet_column()
    ))
    .bind(wallet_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn count_completed_for_wallet(
    pool: &PgPool,
    wallet_id: Uuid,
    direction: Direction,
) -> Result<i64> {
    sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM transactions WHERE {} = $1 AND status = 'COMPLETED'",
        direction.wallet_column()
    ))
    .bind(wallet_id)
    .fetch_one(pool)
    .await
}

pub async fn list_completed_for_user(
    pool: &PgPool,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<Transaction>> {
    sqlx::query_as::<_, Transaction>(&format!(
        r#"
        SELECT {}
        FROM transactions
        WHERE user_id = $1 AND status = 'COMPLETED'
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
        TRANSACTION_COLUMNS
    ))
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn count_completed_for_user(pool: &PgPool, user_id: Uuid) -> Result<i64> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM transactions WHERE user_id = $1 AND status = 'COMPLETED'",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
}

pub async fn top_receivers(
    pool: &PgPool,
    wallet_id: Uuid,
    since: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<SuggestedWallet>> {
    sqlx::query_as::<_, SuggestedWallet>(
        r#"
        SELECT t.receiver_wallet_id AS wallet_id,
               u.first_name, u.last_name, u.email,
               COUNT(*) AS transfer_count
        FROM transactions t
        JOIN wallets w ON w.id = t.receiver_wallet_id
        JOIN users u ON u.id = w.user_id
        WHERE t.sender_wallet_id = $1
          AND t.status = 'COMPLETED'
          AND t.created_at >= $2
        GROUP BY t.receiver_wallet_id, u.first_name, u.last_name, u.email
        ORDER BY transfer_count DESC, MAX(t.created_at) DESC
        LIMIT $3
        "#,
    )
    .bind(wallet_id)
    .bind(since)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn completed_touching_wallet_since(
    pool: &PgPool,
    wallet_id: Uuid,
    since: DateTime<Utc>,
) -> Result<Vec<Transaction>> {
    sqlx::query_as::<_, Transaction>(&format!(
        r#"
        SELECT {}
        FROM transactions
        WHERE (sender_wallet_id = $1 OR receiver_wallet_id = $1)
          AND status = 'COMPLETED'
          AND created_at >= $2
        ORDER BY created_at DESC
        "#,
        TRANSACTION_COLUMNS
    ))
    .bind(wallet_id)
    .bind(since)
    .fetch_all(pool)
    .await
}

/// PENDING transfers whose OTP window closed before `cutoff`. Their debit stays in place.
pub async fn stale_pending_transactions(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Transaction>> {
    sqlx::query_as::<_, Transaction>(&format!(
        r#"
        SELECT {}
        FROM transactions
        WHERE status = 'PENDING' AND otp_expires_at < $1
        ORDER BY created_at ASC
        "#,
        TRANSACTION_COLUMNS
    ))
    .bind(cutoff)
    .fetch_all(pool)
    .await
}

// --- Outbox Administration ---

pub async fn list_failed_notifications(pool: &PgPool, limit: i64) -> Result<Vec<OutboxMessage>> {
    sqlx::query_as::<_, OutboxMessage>(&format!(
        r#"
        SELECT {}
        FROM notification_outbox
        WHERE status = 'FAILED'
        ORDER BY updated_at DESC
        LIMIT $1
        "#,
        OUTBOX_COLUMNS
    ))
    .bind(limit)
    .fetch_all(pool)
    .await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeueOutcome {
    Requeued,
    /// The row is FAILED but its payload was already cleared, so a resend would carry no code.
    PayloadScrubbed,
    NotFailed,
}

/// Puts a FAILED row back in the queue with a fresh attempt budget, unless its payload
/// was scrubbed.
pub async fn requeue_notification(pool: &PgPool, id: Uuid) -> Result<RequeueOutcome> {
    let result = sqlx::query(
        r#"
        UPDATE notification_outbox
        SET status = 'PENDING', attempts = 0, next_attempt_at = NOW(), updated_at = NOW()
        WHERE id = $1 AND status = 'FAILED' AND dynamic_fields <> '{}'::jsonb
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 1 {
        return Ok(RequeueOutcome::Requeued);
    }

    let scrubbed: Option<bool> = sqlx::query_scalar(
        "SELECT dynamic_fields = '{}'::jsonb FROM notification_outbox WHERE id = $1 AND status = 'FAILED'",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(match scrubbed {
        Some(true) => RequeueOutcome::PayloadScrubbed,
        _ => RequeueOutcome::NotFailed,
    })
}
