use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::BigDecimal;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::{Currency, NotificationStatus, TransactionStatus, TransactionType};

/// Wallet joined with the minimal owner profile needed for notification payloads.
#[derive(Debug, Clone, FromRow)]
pub struct WalletWithOwner {
    pub id: Uuid,
    pub user_id: Uuid,
    pub currency: Currency,
    pub balance: BigDecimal,
    pub owner_first_name: String,
    pub owner_last_name: String,
    pub owner_email: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct WalletSummary {
    pub id: Uuid,
    #[schema(value_type = String)]
    pub balance: BigDecimal,
    pub currency: Currency,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WalletOwner {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
}

/// Public view of a wallet: never carries the balance.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WalletProfile {
    pub id: Uuid,
    pub currency: Currency,
    pub owner: WalletOwner,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub sender_wallet_id: Uuid,
    pub receiver_wallet_id: Uuid,
    pub currency: Currency,
    #[schema(value_type = String)]
    pub amount: BigDecimal,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub status: TransactionStatus,
    pub ref_number: String,
    #[serde(skip_serializing, default)]
    pub otp_hash: String,
    pub otp_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new_pending(
        user_id: Uuid,
        sender_wallet_id: Uuid,
        receiver_wallet_id: Uuid,
        currency: Currency,
        amount: BigDecimal,
        kind: TransactionType,
        otp_hash: String,
        otp_expires_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            sender_wallet_id,
            receiver_wallet_id,
            currency,
            amount,
            kind,
            status: TransactionStatus::Pending,
            ref_number: format!("{}-{}", kind, sender_wallet_id),
            otp_hash,
            otp_expires_at,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A notification intent written in the same database transaction as the ledger change
/// that produced it.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub id: Uuid,
    pub recipient: String,
    pub template_id: String,
    pub dynamic_fields: serde_json::Value,
    pub status: NotificationStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub next_attempt_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OutboxMessage {
    pub fn new(recipient: String, template_id: String, dynamic_fields: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            recipient,
            template_id,
            dynamic_fields,
            status: NotificationStatus::Pending,
            attempts: 0,
            last_error: None,
            next_attempt_at: now,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct SuggestedWallet {
    pub wallet_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub transfer_count: i64,
}

/// Paginated response envelope for history queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total: i64, page: i64, limit: i64) -> Self {
        let total_pages = if limit > 0 { (total + limit - 1) / limit } else { 0 };
        Self {
            data,
            total,
            page,
            limit,
            total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn reference_number_is_type_and_sender() {
        let sender = Uuid::new_v4();
        let tx = Transaction::new_pending(
            Uuid::new_v4(),
            sender,
            Uuid::new_v4(),
            Currency::Usd,
            BigDecimal::from_str("40.00").unwrap(),
            TransactionType::Interwallet,
            "hash".to_string(),
            Utc::now(),
        );

        assert_eq!(tx.ref_number, format!("INTERWALLET-{}", sender));
        assert_eq!(tx.status, TransactionStatus::Pending);
    }

    #[test]
    fn otp_hash_is_never_serialized() {
        let tx = Transaction::new_pending(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Currency::Usd,
            BigDecimal::from(1),
            TransactionType::Interwallet,
            "$argon2id$secret".to_string(),
            Utc::now(),
        );

        let json = serde_json::to_value(&tx).unwrap();
        assert!(json.get("otp_hash").is_none());
        assert_eq!(json["type"], "INTERWALLET");
        assert_eq!(json["status"], "PENDING");
    }

    #[test]
    fn page_counts_partial_last_page() {
        let page: Page<u8> = Page::new(vec![1, 2], 21, 3, 10);
        assert_eq!(page.total_pages, 3);

        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["totalPages"], 3);

        let empty: Page<u8> = Page::new(vec![], 0, 1, 10);
        assert_eq!(empty.total_pages, 0);
    }
}
