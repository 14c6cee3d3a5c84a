//! Transactional execution of ledger operations.
//!
//! `LedgerService` is the only place that opens, commits and rolls back
//! transactions:
//!
//! ```text
//! call
//!   ↓
//! 1. begin transaction
//!   ↓
//! 2. run the engine operation against it
//!   ↓
//! 3. Ok  → commit
//!    Err → rollback (nothing the operation wrote survives)
//! ```

use tracing::{instrument, warn};

use splitledger_core::{ExpenseId, UserId};
use splitledger_expenses::{Balance, Expense, ExpenseSplit, User};

use crate::engine::{
    CreateExpense, LedgerEngine, LedgerResult, RegisterUser, UpdateExpense,
};
use crate::store::{LedgerStore, LedgerTx};

/// Runs each ledger operation in its own transaction.
#[derive(Debug, Clone)]
pub struct LedgerService<S> {
    store: S,
}

impl<S> LedgerService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: LedgerStore> LedgerService<S> {
    #[instrument(skip_all, fields(email = %cmd.email))]
    pub async fn register_user(&self, cmd: RegisterUser) -> LedgerResult<User> {
        let mut tx = self.store.begin().await?;
        let result = LedgerEngine::register_user(&mut tx, cmd).await;
        finish(tx, result).await
    }

    pub async fn get_user(&self, user_id: UserId) -> LedgerResult<User> {
        let mut tx = self.store.begin().await?;
        let result = LedgerEngine::get_user(&mut tx, user_id).await;
        finish(tx, result).await
    }

    #[instrument(skip_all, fields(created_by = %cmd.created_by, policy = %cmd.policy))]
    pub async fn create_expense(&self, cmd: CreateExpense) -> LedgerResult<Expense> {
        let mut tx = self.store.begin().await?;
        let result = LedgerEngine::create_expense(&mut tx, cmd).await;
        finish(tx, result).await
    }

    #[instrument(skip_all, fields(expense_id = %cmd.expense_id, requested_by = %cmd.requested_by))]
    pub async fn update_expense(&self, cmd: UpdateExpense) -> LedgerResult<Expense> {
        let mut tx = self.store.begin().await?;
        let result = LedgerEngine::update_expense(&mut tx, cmd).await;
        finish(tx, result).await
    }

    #[instrument(skip(self))]
    pub async fn settle_expense(
        &self,
        expense_id: ExpenseId,
        participant: UserId,
    ) -> LedgerResult<ExpenseSplit> {
        let mut tx = self.store.begin().await?;
        let result = LedgerEngine::settle_expense(&mut tx, expense_id, participant).await;
        finish(tx, result).await
    }

    pub async fn user_balances(&self, user_id: UserId) -> LedgerResult<Vec<Balance>> {
        let mut tx = self.store.begin().await?;
        let result = LedgerEngine::user_balances(&mut tx, user_id).await;
        finish(tx, result).await
    }

    pub async fn user_expenses(&self, user_id: UserId) -> LedgerResult<Vec<Expense>> {
        let mut tx = self.store.begin().await?;
        let result = LedgerEngine::user_expenses(&mut tx, user_id).await;
        finish(tx, result).await
    }
}

/// Commit on success, roll back on failure.
///
/// A failed rollback is logged and the original error is returned; a failed
/// commit replaces the result with the commit error.
async fn finish<T: LedgerTx, R>(tx: T, result: LedgerResult<R>) -> LedgerResult<R> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}
