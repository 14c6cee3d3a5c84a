use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use splitledger_core::{Entity, ExpenseId, UserId};
use splitledger_expenses::{Balance, Currency, Expense, ExpenseSplit, User};

use super::{LedgerStore, LedgerTx, StoreError};

#[derive(Debug, Clone, Default)]
struct LedgerState {
    users: HashMap<UserId, User>,
    /// Expense rows (without splits) in insertion order.
    expenses: Vec<Expense>,
    splits: Vec<ExpenseSplit>,
    balances: HashMap<(UserId, Currency), Balance>,
}

fn position_of<E: Entity>(rows: &[E], id: &E::Id) -> Option<usize> {
    rows.iter().position(|row| row.id() == id)
}

impl LedgerState {
    fn expense_index(&self, id: ExpenseId) -> Option<usize> {
        position_of(&self.expenses, &id)
    }

    fn with_splits(&self, expense: &Expense) -> Expense {
        let mut expense = expense.clone();
        expense.splits = self
            .splits
            .iter()
            .filter(|s| s.expense_id == expense.id)
            .cloned()
            .collect();
        expense
    }
}

/// In-memory ledger store.
///
/// Intended for tests/dev. A transaction holds the store-wide lock from
/// `begin` until it ends, so transactions run strictly one after another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryTx { guard, working })
    }
}

/// Transaction over [`InMemoryLedgerStore`].
///
/// Writes go to a private copy of the state which replaces the shared state on
/// `commit`. Dropping the transaction discards the copy.
#[derive(Debug)]
pub struct InMemoryTx {
    guard: OwnedMutexGuard<LedgerState>,
    working: LedgerState,
}

#[async_trait]
impl LedgerTx for InMemoryTx {
    async fn insert_user(&mut self, user: &User) -> Result<(), StoreError> {
        if self.working.users.contains_key(&user.id) {
            return Err(StoreError::Conflict(format!("user {} already exists", user.id)));
        }
        self.working.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user(&mut self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.working.users.get(&id).cloned())
    }

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .working
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn existing_users(&mut self, ids: &[UserId]) -> Result<Vec<UserId>, StoreError> {
        Ok(ids
            .iter()
            .copied()
            .filter(|id| self.working.users.contains_key(id))
            .collect())
    }

    async fn insert_expense(&mut self, expense: &Expense) -> Result<(), StoreError> {
        if self.working.expense_index(expense.id).is_some() {
            return Err(StoreError::Conflict(format!(
                "expense {} already exists",
                expense.id
            )));
        }
        let mut row = expense.clone();
        row.splits.clear();
        self.working.expenses.push(row);
        Ok(())
    }

    async fn load_expense(
        &mut self,
        id: ExpenseId,
        _lock: bool,
    ) -> Result<Option<Expense>, StoreError> {
        Ok(self
            .working
            .expense_index(id)
            .map(|idx| self.working.with_splits(&self.working.expenses[idx])))
    }

    async fn save_expense(&mut self, expense: &Expense) -> Result<(), StoreError> {
        let idx = self
            .working
            .expense_index(expense.id)
            .ok_or_else(|| StoreError::Backend(format!("expense {} does not exist", expense.id)))?;
        let mut row = expense.clone();
        row.splits.clear();
        self.working.expenses[idx] = row;
        Ok(())
    }

    async fn insert_splits(&mut self, splits: &[ExpenseSplit]) -> Result<(), StoreError> {
        self.working.splits.extend_from_slice(splits);
        Ok(())
    }

    async fn delete_splits(&mut self, expense_id: ExpenseId) -> Result<(), StoreError> {
        self.working.splits.retain(|s| s.expense_id != expense_id);
        Ok(())
    }

    async fn find_split(
        &mut self,
        expense_id: ExpenseId,
        user_id: UserId,
        _lock: bool,
    ) -> Result<Option<ExpenseSplit>, StoreError> {
        Ok(self
            .working
            .splits
            .iter()
            .find(|s| s.expense_id == expense_id && s.user_id == user_id)
            .cloned())
    }

    async fn save_split(&mut self, split: &ExpenseSplit) -> Result<(), StoreError> {
        let idx = position_of(&self.working.splits, &split.id)
            .ok_or_else(|| StoreError::Backend(format!("split {} does not exist", split.id)))?;
        self.working.splits[idx] = split.clone();
        Ok(())
    }

    async fn count_unsettled(&mut self, expense_id: ExpenseId) -> Result<u64, StoreError> {
        Ok(self
            .working
            .splits
            .iter()
            .filter(|s| s.expense_id == expense_id && !s.settled)
            .count() as u64)
    }

    async fn accumulate_balance(
        &mut self,
        user_id: UserId,
        currency: &Currency,
        delta: Decimal,
    ) -> Result<Balance, StoreError> {
        let balance = self
            .working
            .balances
            .entry((user_id, currency.clone()))
            .or_insert_with(|| Balance::zero(user_id, currency.clone()));
        balance.amount = balance.amount.checked_add(delta).ok_or_else(|| {
            StoreError::Backend(format!("balance overflow for user {user_id} in {currency}"))
        })?;
        Ok(balance.clone())
    }

    async fn balances_for_user(&mut self, user_id: UserId) -> Result<Vec<Balance>, StoreError> {
        let mut out: Vec<Balance> = self
            .working
            .balances
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.currency.cmp(&b.currency));
        Ok(out)
    }

    async fn expenses_for_user(&mut self, user_id: UserId) -> Result<Vec<Expense>, StoreError> {
        let state = &self.working;
        Ok(state
            .expenses
            .iter()
            .map(|e| state.with_splits(e))
            .filter(|e| e.involves(user_id))
            .collect())
    }

    async fn commit(self) -> Result<(), StoreError> {
        let InMemoryTx { mut guard, working } = self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}
