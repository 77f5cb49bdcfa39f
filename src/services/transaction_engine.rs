//! Two-phase, OTP-confirmed transfers between wallets.
//!
//! `initiate` debits the sender and parks the transfer in PENDING; `confirm` checks the
//! one-time code and credits the receiver. Both financial writes go through the
//! [`LedgerRepository`] as single atomic units, and the OTP notification is queued in the
//! same unit as the debit so delivery can never roll it back.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::types::BigDecimal;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::db::models::{OutboxMessage, Transaction};
use crate::domain::{Currency, TransactionType};
use crate::error::AppError;
use crate::otp::{GeneratedOtp, OtpGenerator};
use crate::ports::{CreditOutcome, DebitOutcome, LedgerRepository};
use crate::schemas::{ApiResponse, ConfirmedTransaction, InitiatedTransaction};
use crate::validation::{validate_amount_precision, validate_positive_amount};

pub const OTP_SENT_MESSAGE: &str =
    "We have sent you an OTP to confirm transaction. OTP expires in 5 min";
pub const TRANSACTION_COMPLETED_MESSAGE: &str = "Transaction completed successfully";
const INSUFFICIENT_FUNDS_MESSAGE: &str =
    "Insufficient funds, please load more funds on your wallet and try again";
const INVALID_OTP_MESSAGE: &str = "Invalid OTP or OTP has expired";

/// A transfer request. `initiate` re-checks the amount, since sub-cent amounts would be
/// rounded differently on the debit and on the stored row.
#[derive(Debug, Clone)]
pub struct InitiateTransfer {
    pub amount: BigDecimal,
    pub currency: Currency,
    pub kind: TransactionType,
    pub sender_wallet_id: Uuid,
    pub receiver_wallet_id: Uuid,
}

#[derive(Clone)]
pub struct TransactionEngine {
    ledger: Arc<dyn LedgerRepository>,
    otp: OtpGenerator,
    otp_template_id: String,
    outbox_signal: Option<Arc<Notify>>,
}

impl TransactionEngine {
    pub fn new(ledger: Arc<dyn LedgerRepository>, otp_template_id: impl Into<String>) -> Self {
        Self {
            ledger,
            otp: OtpGenerator::new(),
            otp_template_id: otp_template_id.into(),
            outbox_signal: None,
        }
    }

    /// Wakes the notification dispatcher after every committed debit.
    pub fn with_outbox_signal(mut self, signal: Arc<Notify>) -> Self {
        self.outbox_signal = Some(signal);
        self
    }

    pub async fn initiate(
        &self,
        initiator_id: Uuid,
        request: InitiateTransfer,
    ) -> Result<ApiResponse<InitiatedTransaction>, AppError> {
        validate_positive_amount(&request.amount)?;
        validate_amount_precision(&request.amount)?;

        let sender_not_found =
            || AppError::NotFound(format!("Sender wallet {} not found", request.sender_wallet_id));

        // Someone else's wallet is indistinguishable from a missing one.
        let sender = self
            .ledger
            .find_wallet(request.sender_wallet_id)
            .await?
            .filter(|wallet| wallet.user_id == initiator_id)
            .ok_or_else(sender_not_found)?;

        if sender.currency != request.currency {
            return Err(AppError::InvalidRequest(format!(
                "Sender wallet {} does not support currency {}",
                sender.id, request.currency
            )));
        }

        let receiver = self
            .ledger
            .find_wallet(request.receiver_wallet_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Receiver wallet {} not found",
                    request.receiver_wallet_id
                ))
            })?;

        if receiver.currency != request.currency {
            return Err(AppError::InvalidRequest(format!(
                "Receiver wallet {} does not support currency {}",
                receiver.id, request.currency
            )));
        }

        if sender.balance < request.amount {
            return Err(AppError::InsufficientFunds(
                INSUFFICIENT_FUNDS_MESSAGE.to_string(),
            ));
        }

        let otp = self.generate_otp().await?;

        let transaction = Transaction::new_pending(
            initiator_id,
            sender.id,
            receiver.id,
            request.currency,
            request.amount.clone(),
            request.kind,
            otp.hash.clone(),
            otp.expires_at,
        );

        let notification = OutboxMessage::new(
            sender.owner_email.clone(),
            self.otp_template_id.clone(),
            json!({
                "firstName": sender.owner_first_name,
                "receiverName": receiver.owner_first_name,
                "otp": otp.code.to_string(),
            }),
        );

        // The balance read above is advisory; the guarded debit is the authority.
        let sender_balance = match self.ledger.open_transfer(&transaction, &notification).await? {
            DebitOutcome::Debited { sender_balance } => sender_balance,
            DebitOutcome::InsufficientFunds => {
                tracing::info!(
                    sender_wallet_id = %sender.id,
                    amount = %request.amount,
                    "Debit lost to a concurrent transfer"
                );
                return Err(AppError::InsufficientFunds(
                    INSUFFICIENT_FUNDS_MESSAGE.to_string(),
                ));
            }
        };

        tracing::info!(
            transaction_id = %transaction.id,
            sender_wallet_id = %transaction.sender_wallet_id,
            receiver_wallet_id = %transaction.receiver_wallet_id,
            amount = %transaction.amount,
            sender_balance = %sender_balance,
            "Transfer initiated, awaiting OTP confirmation"
        );

        if let Some(signal) = &self.outbox_signal {
            signal.notify_one();
        }

        Ok(ApiResponse::new(
            OTP_SENT_MESSAGE,
            InitiatedTransaction {
                id: transaction.id,
                amount: transaction.amount,
                currency: transaction.currency,
                kind: transaction.kind,
                sender_wallet_id: transaction.sender_wallet_id,
                receiver_wallet_id: transaction.receiver_wallet_id,
                ref_number: transaction.ref_number,
                status: transaction.status,
            },
        ))
    }

    pub async fn confirm(
        &self,
        transaction_id: Uuid,
        otp: &str,
    ) -> Result<ApiResponse<ConfirmedTransaction>, AppError> {
        self.confirm_at(transaction_id, otp, Utc::now()).await
    }

    pub async fn confirm_at(
        &self,
        transaction_id: Uuid,
        otp: &str,
        now: DateTime<Utc>,
    ) -> Result<ApiResponse<ConfirmedTransaction>, AppError> {
        let transaction = self
            .ledger
            .find_transaction(transaction_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Transaction with id {} not found", transaction_id))
            })?;

        if !transaction.status.is_pending() {
            return Err(not_pending(transaction_id));
        }

        // Both conditions are always evaluated and collapse into one error.
        let code_matches = self.verify_otp(otp, &transaction.otp_hash).await?;
        let unexpired = now <= transaction.otp_expires_at;
        if !(code_matches && unexpired) {
            tracing::warn!(
                transaction_id = %transaction_id,
                "Rejected transfer confirmation"
            );
            return Err(AppError::Unauthorized(INVALID_OTP_MESSAGE.to_string()));
        }

        let (completed, receiver_balance) =
            match self.ledger.complete_transfer(transaction_id).await? {
                CreditOutcome::Credited {
                    transaction,
                    receiver_balance,
                } => (transaction, receiver_balance),
                CreditOutcome::NotPending => {
                    tracing::warn!(
                        transaction_id = %transaction_id,
                        "Confirmation lost to a concurrent confirmation"
                    );
                    return Err(not_pending(transaction_id));
                }
            };

        tracing::info!(
            transaction_id = %completed.id,
            receiver_wallet_id = %completed.receiver_wallet_id,
            amount = %completed.amount,
            "Transfer completed"
        );

        Ok(ApiResponse::new(
            TRANSACTION_COMPLETED_MESSAGE,
            ConfirmedTransaction {
                id: completed.id,
                status: completed.status,
                new_wallet_balance: receiver_balance,
            },
        ))
    }

    async fn generate_otp(&self) -> Result<GeneratedOtp, AppError> {
        let generator = self.otp.clone();
        tokio::task::spawn_blocking(move || generator.generate())
            .await
            .map_err(|e| AppError::Internal(format!("OTP task failed: {}", e)))?
            .map_err(|e| AppError::Internal(e.to_string()))
    }

    async fn verify_otp(&self, candidate: &str, hash: &str) -> Result<bool, AppError> {
        let generator = self.otp.clone();
        let candidate = candidate.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || generator.verify(&candidate, &hash))
            .await
            .map_err(|e| AppError::Internal(format!("OTP task failed: {}", e)))
    }
}

fn not_pending(transaction_id: Uuid) -> AppError {
    AppError::Forbidden(format!("Transaction with id {} is not pending", transaction_id))
}
