//! Read side: completed transfer history, suggested recipients and the monthly statement.

use chrono::{Duration, Months, Utc};
use csv::Writer;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::{Page, SuggestedWallet, Transaction};
use crate::db::queries::{self, Direction};
use crate::error::AppError;
use crate::validation::Pagination;

pub const SUGGESTED_WALLETS_LIMIT: i64 = 3;
pub const SUGGESTION_WINDOW_MONTHS: u32 = 3;
pub const STATEMENT_WINDOW_DAYS: i64 = 30;

#[derive(Clone)]
pub struct HistoryService {
    pool: PgPool,
}

impl HistoryService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn wallet_transactions(
        &self,
        user_id: Uuid,
        wallet_id: Uuid,
        direction: Direction,
        pagination: Pagination,
    ) -> Result<Page<Transaction>, AppError> {
        self.ensure_owned(user_id, wallet_id).await?;

        let data = queries::list_completed_for_wallet(
            &self.pool,
            wallet_id,
            direction,
            pagination.limit,
            pagination.offset(),
        )
        .await?;
        let total = queries::count_completed_for_wallet(&self.pool, wallet_id, direction).await?;

        Ok(Page::new(data, total, pagination.page, pagination.limit))
    }

    pub async fn user_transactions(
        &self,
        user_id: Uuid,
        pagination: Pagination,
    ) -> Result<Page<Transaction>, AppError> {
        let data = queries::list_completed_for_user(
            &self.pool,
            user_id,
            pagination.limit,
            pagination.offset(),
        )
        .await?;
        let total = queries::count_completed_for_user(&self.pool, user_id).await?;

        Ok(Page::new(data, total, pagination.page, pagination.limit))
    }

    pub async fn suggested_wallets(
        &self,
        user_id: Uuid,
        wallet_id: Uuid,
    ) -> Result<Vec<SuggestedWallet>, AppError> {
        self.ensure_owned(user_id, wallet_id).await?;

        let now = Utc::now();
        let since = now
            .checked_sub_months(Months::new(SUGGESTION_WINDOW_MONTHS))
            .unwrap_or(now);

        Ok(queries::top_receivers(&self.pool, wallet_id, since, SUGGESTED_WALLETS_LIMIT).await?)
    }

    /// CSV of the wallet's completed transfers over the last 30 days, newest first.
    pub async fn monthly_statement(&self, user_id: Uuid, wallet_id: Uuid) -> Result<Vec<u8>, AppError> {
        self.ensure_owned(user_id, wallet_id).await?;

        let since = Utc::now() - Duration::days(STATEMENT_WINDOW_DAYS);
        let transactions =
            queries::completed_touching_wallet_since(&self.pool, wallet_id, since).await?;

        render_statement(wallet_id, &transactions)
    }

    async fn ensure_owned(&self, user_id: Uuid, wallet_id: Uuid) -> Result<(), AppError> {
        if !queries::wallet_belongs_to_user(&self.pool, wallet_id, user_id).await? {
            return Err(AppError::NotFound(
                "Wallet not found or does not belong to user".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn statement_filename(wallet_id: Uuid) -> String {
    format!("wallet_statement_{}.csv", wallet_id)
}

#[derive(Serialize)]
struct StatementRow {
    reference: String,
    date: String,
    time: String,
    #[serde(rename = "type")]
    kind: String,
    direction: &'static str,
    amount: String,
    currency: String,
}

pub fn render_statement(wallet_id: Uuid, transactions: &[Transaction]) -> Result<Vec<u8>, AppError> {
    let mut writer = Writer::from_writer(Vec::new());

    for tx in transactions {
        let direction = if tx.sender_wallet_id == wallet_id {
            "DEBIT"
        } else {
            "CREDIT"
        };

        writer
            .serialize(StatementRow {
                reference: tx.ref_number.clone(),
                date: tx.created_at.format("%Y-%m-%d").to_string(),
                time: tx.created_at.format("%H:%M:%S").to_string(),
                kind: tx.kind.to_string(),
                direction,
                amount: tx.amount.to_string(),
                currency: tx.currency.to_string(),
            })
            .map_err(|e| AppError::Internal(format!("statement serialization failed: {}", e)))?;
    }

    // serialize() only writes headers with the first row.
    if transactions.is_empty() {
        writer
            .write_record(["reference", "date", "time", "type", "direction", "amount", "currency"])
            .map_err(|e| AppError::Internal(format!("statement serialization failed: {}", e)))?;
    }

    writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("statement flush failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Currency, TransactionStatus, TransactionType};
    use chrono::TimeZone;
    use sqlx::types::BigDecimal;
    use std::str::FromStr;

    fn completed(sender: Uuid, receiver: Uuid, amount: &str) -> Transaction {
        let mut tx = Transaction::new_pending(
            Uuid::new_v4(),
            sender,
            receiver,
            Currency::Rwf,
            BigDecimal::from_str(amount).unwrap(),
            TransactionType::Interwallet,
            String::new(),
            Utc::now(),
        );
        tx.status = TransactionStatus::Completed;
        tx.created_at = Utc.with_ymd_and_hms(2024, 6, 3, 14, 5, 9).unwrap();
        tx
    }

    #[test]
    fn statement_marks_direction_per_wallet() {
        let wallet = Uuid::new_v4();
        let other = Uuid::new_v4();
        let rows = vec![completed(wallet, other, "12.50"), completed(other, wallet, "3.00")];

        let csv = String::from_utf8(render_statement(wallet, &rows).unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], "reference,date,time,type,direction,amount,currency");
        assert_eq!(
            lines[1],
            format!("INTERWALLET-{},2024-06-03,14:05:09,INTERWALLET,DEBIT,12.50,RWF", wallet)
        );
        assert!(lines[2].contains(",CREDIT,3.00,RWF"));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn empty_statement_still_has_header() {
        let csv = String::from_utf8(render_statement(Uuid::new_v4(), &[]).unwrap()).unwrap();
        assert_eq!(csv.trim_end(), "reference,date,time,type,direction,amount,currency");
    }

    #[test]
    fn statement_filename_embeds_wallet_id() {
        let id = Uuid::new_v4();
        assert_eq!(statement_filename(id), format!("wallet_statement_{}.csv", id));
    }
}
