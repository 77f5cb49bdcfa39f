//! Ledger domain types shared by the engine, the store adapters and the HTTP layer.

pub mod notification;
pub mod transaction;
pub mod wallet;

pub use notification::NotificationStatus;
pub use transaction::{TransactionStatus, TransactionType};
pub use wallet::Currency;
