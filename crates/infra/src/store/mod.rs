//! Persistence boundary for the ledger.
//!
//! The engine never talks to a database directly. It receives a [`LedgerTx`]
//! opened from a [`LedgerStore`] and performs every read and write of one
//! operation through it. Whoever opened the transaction decides whether to
//! commit or roll back.
//!
//! ## Transaction semantics
//!
//! Implementations must guarantee:
//! - **Atomicity**: either every write of a transaction becomes visible on
//!   `commit`, or none does (`rollback`, or dropping the transaction).
//! - **Write serialisation**: rows read with `lock = true` and balance rows
//!   touched through `accumulate_balance` stay locked until the transaction
//!   ends, so concurrent updates/settlements of the same expense cannot
//!   interleave.
//! - **Isolation**: at least read-committed.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use splitledger_core::{ExpenseId, UserId};
use splitledger_expenses::{Balance, Currency, Expense, ExpenseSplit, User};

pub use in_memory::{InMemoryLedgerStore, InMemoryTx};
pub use postgres::{PostgresLedgerStore, PostgresTx};

/// Storage operation error.
///
/// These are **infrastructure errors** as opposed to domain errors (policy
/// violations, invariants).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend failed (connection, IO, unexpected database error).
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A uniqueness or serialisation conflict reported by the backend.
    #[error("storage conflict: {0}")]
    Conflict(String),

    /// Stored data could not be decoded into domain types.
    #[error("corrupt stored data: {0}")]
    Corrupt(String),
}

/// Factory for ledger transactions.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    type Tx: LedgerTx;

    /// Open a new transaction.
    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

#[async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    type Tx = S::Tx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        (**self).begin().await
    }
}

/// One open unit of work against the ledger tables.
///
/// Expense rows carry their splits: `load_expense`, `expenses_for_user`
/// return them populated, while `insert_expense`/`save_expense` write only the
/// expense row itself (splits go through `insert_splits`/`save_split`).
#[async_trait]
pub trait LedgerTx: Send {
    async fn insert_user(&mut self, user: &User) -> Result<(), StoreError>;

    async fn find_user(&mut self, id: UserId) -> Result<Option<User>, StoreError>;

    /// Case-insensitive lookup.
    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError>;

    /// The subset of `ids` that belong to registered users.
    async fn existing_users(&mut self, ids: &[UserId]) -> Result<Vec<UserId>, StoreError>;

    async fn insert_expense(&mut self, expense: &Expense) -> Result<(), StoreError>;

    /// Load an expense with its splits; `lock` takes a write lock on the row.
    async fn load_expense(
        &mut self,
        id: ExpenseId,
        lock: bool,
    ) -> Result<Option<Expense>, StoreError>;

    /// Overwrite the mutable columns of an existing expense row.
    async fn save_expense(&mut self, expense: &Expense) -> Result<(), StoreError>;

    async fn insert_splits(&mut self, splits: &[ExpenseSplit]) -> Result<(), StoreError>;

    /// Hard-delete every split of an expense.
    async fn delete_splits(&mut self, expense_id: ExpenseId) -> Result<(), StoreError>;

    async fn find_split(
        &mut self,
        expense_id: ExpenseId,
        user_id: UserId,
        lock: bool,
    ) -> Result<Option<ExpenseSplit>, StoreError>;

    async fn save_split(&mut self, split: &ExpenseSplit) -> Result<(), StoreError>;

    async fn count_unsettled(&mut self, expense_id: ExpenseId) -> Result<u64, StoreError>;

    /// Add `delta` to the `(user, currency)` balance, creating it at zero
    /// first if needed. Returns the updated row.
    async fn accumulate_balance(
        &mut self,
        user_id: UserId,
        currency: &Currency,
        delta: Decimal,
    ) -> Result<Balance, StoreError>;

    async fn balances_for_user(&mut self, user_id: UserId) -> Result<Vec<Balance>, StoreError>;

    /// Expenses having at least one split for the user, splits populated.
    async fn expenses_for_user(&mut self, user_id: UserId) -> Result<Vec<Expense>, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}
