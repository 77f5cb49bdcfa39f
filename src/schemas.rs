//! Request and response bodies of the HTTP API.

use serde::{Deserialize, Serialize};
use sqlx::types::BigDecimal;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::domain::{Currency, TransactionStatus, TransactionType};

fn default_transaction_type() -> TransactionType {
    TransactionType::Interwallet
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateTransactionRequest {
    #[schema(value_type = String, example = "40.00")]
    pub amount: BigDecimal,
    pub currency: Currency,
    #[serde(rename = "type", default = "default_transaction_type")]
    pub kind: TransactionType,
    pub sender_wallet_id: Uuid,
    pub receiver_wallet_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ConfirmTransactionRequest {
    #[schema(example = "123456")]
    pub otp: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateWalletRequest {
    pub currency: Currency,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaginationQuery {
    /// Page number, defaults to 1
    pub page: Option<i64>,
    /// Items per page, defaults to 10
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InitiatedTransaction {
    pub id: Uuid,
    #[schema(value_type = String)]
    pub amount: BigDecimal,
    pub currency: Currency,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub sender_wallet_id: Uuid,
    pub receiver_wallet_id: Uuid,
    pub ref_number: String,
    pub status: TransactionStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConfirmedTransaction {
    pub id: Uuid,
    pub status: TransactionStatus,
    #[schema(value_type = String)]
    pub new_wallet_balance: BigDecimal,
}

/// `{ "message": ..., "data": ... }` envelope used by every successful response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub message: String,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn new(message: impl Into<String>, data: T) -> Self {
        Self {
            message: message.into(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_request_defaults_type() {
        let body = format!(
            r#"{{"amount":"40.00","currency":"USD","sender_wallet_id":"{}","receiver_wallet_id":"{}"}}"#,
            Uuid::new_v4(),
            Uuid::new_v4()
        );
        let parsed: CreateTransactionRequest = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed.kind, TransactionType::Interwallet);
        assert_eq!(parsed.currency, Currency::Usd);
    }

    #[test]
    fn transaction_request_rejects_unknown_fields() {
        let body = format!(
            r#"{{"amount":"1","currency":"USD","sender_wallet_id":"{}","receiver_wallet_id":"{}","status":"COMPLETED"}}"#,
            Uuid::new_v4(),
            Uuid::new_v4()
        );
        assert!(serde_json::from_str::<CreateTransactionRequest>(&body).is_err());
    }

    #[test]
    fn transaction_request_rejects_unknown_currency() {
        let body = format!(
            r#"{{"amount":"1","currency":"JPY","sender_wallet_id":"{}","receiver_wallet_id":"{}"}}"#,
            Uuid::new_v4(),
            Uuid::new_v4()
        );
        assert!(serde_json::from_str::<CreateTransactionRequest>(&body).is_err());
    }
}
