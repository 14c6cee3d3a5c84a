//! Infrastructure layer: ledger engine, transactions and storage backends.

pub mod engine;
pub mod service;
pub mod store;

pub use engine::{
    CreateExpense, LedgerEngine, LedgerError, LedgerResult, RegisterUser, UpdateExpense,
};
pub use service::LedgerService;
pub use store::{InMemoryLedgerStore, LedgerStore, LedgerTx, PostgresLedgerStore, StoreError};
