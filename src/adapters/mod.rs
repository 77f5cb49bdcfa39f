pub mod in_memory_ledger_repository;
pub mod postgres_ledger_repository;

pub use in_memory_ledger_repository::InMemoryLedgerRepository;
pub use postgres_ledger_repository::PostgresLedgerRepository;
