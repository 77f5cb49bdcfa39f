//! Boundary validation. Each operation has exactly one entry point returning either the
//! validated input or the first field that failed.

use sqlx::types::BigDecimal;
use std::fmt;

use crate::schemas::{ConfirmTransactionRequest, CreateTransactionRequest, PaginationQuery};
use crate::services::transaction_engine::InitiateTransfer;

pub const MAX_AMOUNT_SCALE: i64 = 2;
pub const AMOUNT_UPPER_BOUND: i64 = 1_000_000_000_000_000;
pub const OTP_LENGTH: usize = 6;
pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
}

impl Pagination {
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

pub fn validate_positive_amount(amount: &BigDecimal) -> ValidationResult {
    if amount <= &BigDecimal::from(0) {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }

    Ok(())
}

pub fn validate_amount_precision(amount: &BigDecimal) -> ValidationResult {
    if &amount.with_scale(MAX_AMOUNT_SCALE) != amount {
        return Err(ValidationError::new(
            "amount",
            format!("must have at most {} decimal places", MAX_AMOUNT_SCALE),
        ));
    }

    if amount >= &BigDecimal::from(AMOUNT_UPPER_BOUND) {
        return Err(ValidationError::new(
            "amount",
            format!("must be less than {}", AMOUNT_UPPER_BOUND),
        ));
    }

    Ok(())
}

pub fn validate_otp_format(otp: &str) -> ValidationResult {
    if otp.len() != OTP_LENGTH || !otp.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(ValidationError::new(
            "otp",
            format!("must be exactly {} digits", OTP_LENGTH),
        ));
    }

    Ok(())
}

pub fn validate_initiate(request: CreateTransactionRequest) -> Result<InitiateTransfer, ValidationError> {
    validate_positive_amount(&request.amount)?;
    validate_amount_precision(&request.amount)?;

    if request.sender_wallet_id == request.receiver_wallet_id {
        return Err(ValidationError::new(
            "receiver_wallet_id",
            "must differ from sender_wallet_id",
        ));
    }

    Ok(InitiateTransfer {
        amount: request.amount,
        currency: request.currency,
        kind: request.kind,
        sender_wallet_id: request.sender_wallet_id,
        receiver_wallet_id: request.receiver_wallet_id,
    })
}

pub fn validate_confirm(request: ConfirmTransactionRequest) -> Result<String, ValidationError> {
    let otp = request.otp.trim().to_string();
    validate_otp_format(&otp)?;
    Ok(otp)
}

pub fn validate_pagination(query: &PaginationQuery) -> Result<Pagination, ValidationError> {
    let page = query.page.unwrap_or(DEFAULT_PAGE);
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);

    if page < 1 {
        return Err(ValidationError::new("page", "must be at least 1"));
    }
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(ValidationError::new(
            "limit",
            format!("must be between 1 and {}", MAX_LIMIT),
        ));
    }

    Ok(Pagination { page, limit })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Currency, TransactionType};
    use std::str::FromStr;
    use uuid::Uuid;

    fn request(amount: &str) -> CreateTransactionRequest {
        CreateTransactionRequest {
            amount: BigDecimal::from_str(amount).expect("valid decimal"),
            currency: Currency::Usd,
            kind: TransactionType::Interwallet,
            sender_wallet_id: Uuid::new_v4(),
            receiver_wallet_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn validates_positive_amount() {
        let positive = BigDecimal::from_str("1.23").expect("valid decimal");
        let zero = BigDecimal::from(0);
        let negative = BigDecimal::from(-1);

        assert!(validate_positive_amount(&positive).is_ok());
        assert!(validate_positive_amount(&zero).is_err());
        assert!(validate_positive_amount(&negative).is_err());
    }

    #[test]
    fn validates_amount_precision() {
        assert!(validate_amount_precision(&BigDecimal::from_str("10.25").unwrap()).is_ok());
        assert!(validate_amount_precision(&BigDecimal::from_str("10.2500").unwrap()).is_ok());
        assert!(validate_amount_precision(&BigDecimal::from_str("100").unwrap()).is_ok());
        assert!(validate_amount_precision(&BigDecimal::from_str("10.255").unwrap()).is_err());
        assert!(validate_amount_precision(&BigDecimal::from(AMOUNT_UPPER_BOUND)).is_err());
    }

    #[test]
    fn initiate_accepts_well_formed_request() {
        let req = request("40.00");
        let sender = req.sender_wallet_id;
        let valid = validate_initiate(req).expect("valid");
        assert_eq!(valid.sender_wallet_id, sender);
        assert_eq!(valid.amount, BigDecimal::from(40));
    }

    #[test]
    fn initiate_rejects_zero_amount() {
        let err = validate_initiate(request("0")).unwrap_err();
        assert_eq!(err.field, "amount");
    }

    #[test]
    fn initiate_rejects_self_transfer() {
        let mut req = request("5");
        req.receiver_wallet_id = req.sender_wallet_id;
        let err = validate_initiate(req).unwrap_err();
        assert_eq!(err.field, "receiver_wallet_id");
    }

    #[test]
    fn confirm_requires_six_digits() {
        let ok = ConfirmTransactionRequest {
            otp: " 123456 ".to_string(),
        };
        assert_eq!(validate_confirm(ok).unwrap(), "123456");

        for bad in ["12345", "1234567", "12a456", ""] {
            let req = ConfirmTransactionRequest {
                otp: bad.to_string(),
            };
            assert!(validate_confirm(req).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn pagination_defaults_and_bounds() {
        let defaults = validate_pagination(&PaginationQuery::default()).unwrap();
        assert_eq!(defaults, Pagination { page: 1, limit: 10 });
        assert_eq!(defaults.offset(), 0);

        let third = validate_pagination(&PaginationQuery {
            page: Some(3),
            limit: Some(20),
        })
        .unwrap();
        assert_eq!(third.offset(), 40);

        assert!(validate_pagination(&PaginationQuery {
            page: Some(0),
            limit: None
        })
        .is_err());
        assert!(validate_pagination(&PaginationQuery {
            page: None,
            limit: Some(101)
        })
        .is_err());
    }
}
