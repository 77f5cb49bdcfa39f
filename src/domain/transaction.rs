//! Transfer lifecycle: a transaction is created PENDING together with the sender debit and
//! becomes COMPLETED together with the receiver credit. There are no other transitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "transaction_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
}

impl TransactionStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Pending => f.write_str("PENDING"),
            TransactionStatus::Completed => f.write_str("COMPLETED"),
        }
    }
}

/// Transfer type tag. It prefixes the reference number of every transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "transaction_type", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Interwallet,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::Interwallet => f.write_str("INTERWALLET"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pending_is_pending() {
        assert!(TransactionStatus::Pending.is_pending());
        assert!(!TransactionStatus::Completed.is_pending());
    }

    #[test]
    fn type_tag_matches_wire_format() {
        assert_eq!(TransactionType::Interwallet.to_string(), "INTERWALLET");
        assert_eq!(
            serde_json::to_value(TransactionType::Interwallet).unwrap(),
            "INTERWALLET"
        );
    }
}
