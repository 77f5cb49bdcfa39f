pub mod history;
pub mod notification_dispatcher;
pub mod transaction_engine;
pub mod wallet;

pub use history::HistoryService;
pub use notification_dispatcher::{DispatchReport, NotificationDispatcher, RetryPolicy};
pub use transaction_engine::{InitiateTransfer, TransactionEngine};
pub use wallet::WalletService;
