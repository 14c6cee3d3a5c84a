//! Ledger consistency engine.
//!
//! Every operation receives the transaction it runs in (`tx`) and performs all
//! of its reads and writes through it. The engine never commits: the caller
//! (normally [`crate::service::LedgerService`]) commits on `Ok` and rolls back
//! on `Err`, so a failed operation leaves no partial balance mutation.
//!
//! ```text
//! create:  policy.calculate ─▶ reconcile with total ─▶ persist expense + splits ─▶ apply postings
//! update:  lock expense ─▶ apply reversal(old postings) ─▶ delete splits ─▶ create steps with new values
//! settle:  lock expense ─▶ lock split ─▶ mark settled ─▶ credit participant ─▶ maybe mark expense settled
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info};

use splitledger_core::{DomainError, ExpenseId, UserId};
use splitledger_expenses::{
    Balance, BalancePosting, Currency, Expense, ExpenseSplit, ParticipantShare, SplitPolicy,
    User, checked_sum, reversal, within_tolerance,
};

use crate::store::{LedgerTx, StoreError};

/// Error returned by ledger operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Command: record a new expense paid upfront by `created_by`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateExpense {
    pub created_by: UserId,
    pub description: String,
    pub currency: Currency,
    pub amount: Decimal,
    pub policy: SplitPolicy,
    pub shares: Vec<ParticipantShare>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: rewrite an expense. Only its creator may do this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateExpense {
    pub expense_id: ExpenseId,
    pub requested_by: UserId,
    pub description: String,
    pub currency: Currency,
    pub amount: Decimal,
    pub policy: SplitPolicy,
    pub shares: Vec<ParticipantShare>,
}

/// Command: register a participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterUser {
    pub name: String,
    pub email: String,
}

/// Stateless ledger operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct LedgerEngine;

impl LedgerEngine {
    pub async fn register_user<T: LedgerTx>(tx: &mut T, cmd: RegisterUser) -> LedgerResult<User> {
        let user = User::new(cmd.name.trim(), cmd.email.trim())?;

        if tx.find_user_by_email(&user.email).await?.is_some() {
            return Err(DomainError::conflict("email already registered").into());
        }
        tx.insert_user(&user).await?;

        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    pub async fn get_user<T: LedgerTx>(tx: &mut T, user_id: UserId) -> LedgerResult<User> {
        tx.find_user(user_id)
            .await?
            .ok_or_else(|| DomainError::not_found("user not found").into())
    }

    pub async fn create_expense<T: LedgerTx>(
        tx: &mut T,
        cmd: CreateExpense,
    ) -> LedgerResult<Expense> {
        if tx.find_user(cmd.created_by).await?.is_none() {
            return Err(DomainError::not_found("expense creator unknown").into());
        }

        let mut expense = Expense::new(
            cmd.created_by,
            cmd.description,
            cmd.currency,
            cmd.amount,
            cmd.policy,
            cmd.occurred_at,
        );
        tx.insert_expense(&expense).await?;
        record_splits(tx, &mut expense, &cmd.shares).await?;

        info!(
            expense_id = %expense.id,
            created_by = %expense.created_by,
            currency = %expense.currency,
            amount = %expense.amount,
            policy = %expense.policy,
            participants = expense.splits.len(),
            "expense created"
        );
        Ok(expense)
    }

    pub async fn update_expense<T: LedgerTx>(
        tx: &mut T,
        cmd: UpdateExpense,
    ) -> LedgerResult<Expense> {
        let mut expense = tx
            .load_expense(cmd.expense_id, true)
            .await?
            .filter(|e| e.created_by == cmd.requested_by)
            .ok_or_else(|| DomainError::not_found("expense not found or not authorized"))?;

        // Undo what the current splits applied, in the old currency and amount.
        let undo = reversal(&expense.postings());
        apply_postings(tx, &expense.currency, &undo).await?;
        tx.delete_splits(expense.id).await?;

        expense.description = cmd.description;
        expense.currency = cmd.currency;
        expense.amount = cmd.amount;
        expense.policy = cmd.policy;
        expense.settled = false;
        expense.splits.clear();
        tx.save_expense(&expense).await?;

        record_splits(tx, &mut expense, &cmd.shares).await?;

        info!(
            expense_id = %expense.id,
            currency = %expense.currency,
            amount = %expense.amount,
            policy = %expense.policy,
            participants = expense.splits.len(),
            "expense updated"
        );
        Ok(expense)
    }

    pub async fn settle_expense<T: LedgerTx>(
        tx: &mut T,
        expense_id: ExpenseId,
        participant: UserId,
    ) -> LedgerResult<ExpenseSplit> {
        // Expense row before split rows, the same order update takes them in.
        let mut expense = tx
            .load_expense(expense_id, true)
            .await?
            .ok_or_else(|| DomainError::not_found("expense not found"))?;

        let mut split = tx
            .find_split(expense_id, participant, true)
            .await?
            .ok_or_else(|| DomainError::not_found("expense split not found"))?;
        if split.settled {
            return Err(DomainError::AlreadySettled.into());
        }

        split.settled = true;
        tx.save_split(&split).await?;

        // Only the settling participant's balance moves; the creator's is untouched.
        tx.accumulate_balance(participant, &expense.currency, split.amount_owed)
            .await?;

        if tx.count_unsettled(expense_id).await? == 0 {
            expense.settled = true;
            tx.save_expense(&expense).await?;
            info!(expense_id = %expense_id, "expense fully settled");
        }

        info!(
            expense_id = %expense_id,
            participant = %participant,
            amount = %split.amount_owed,
            "split settled"
        );
        Ok(split)
    }

    pub async fn user_balances<T: LedgerTx>(tx: &mut T, user_id: UserId) -> LedgerResult<Vec<Balance>> {
        Ok(tx.balances_for_user(user_id).await?)
    }

    pub async fn user_expenses<T: LedgerTx>(tx: &mut T, user_id: UserId) -> LedgerResult<Vec<Expense>> {
        Ok(tx.expenses_for_user(user_id).await?)
    }
}

/// Compute, validate, persist and post the splits of `expense`.
///
/// Shared by create and update (steps 2–6 of recording an expense).
async fn record_splits<T: LedgerTx>(
    tx: &mut T,
    expense: &mut Expense,
    shares: &[ParticipantShare],
) -> LedgerResult<()> {
    let participants: Vec<UserId> = shares.iter().map(|s| s.user_id).collect();
    let known = tx.existing_users(&participants).await?;
    if participants.iter().any(|id| !known.contains(id)) {
        return Err(DomainError::not_found("one or more participants unknown").into());
    }
    if !participants.contains(&expense.created_by) {
        return Err(DomainError::policy("expense creator must be one of the participants").into());
    }

    let obligations = expense.policy.calculate(expense.amount, shares)?;

    let owed_total = checked_sum(obligations.iter().map(|o| o.amount))?;
    if !within_tolerance(owed_total, expense.amount) {
        return Err(DomainError::invariant("splits do not sum to total").into());
    }

    expense.splits = obligations
        .into_iter()
        .map(|o| ExpenseSplit::open(expense.id, o))
        .collect();
    tx.insert_splits(&expense.splits).await?;

    apply_postings(tx, &expense.currency, &expense.postings()).await
}

async fn apply_postings<T: LedgerTx>(
    tx: &mut T,
    currency: &Currency,
    postings: &[BalancePosting],
) -> LedgerResult<()> {
    for posting in postings {
        let balance = tx
            .accumulate_balance(posting.user_id, currency, posting.delta)
            .await?;
        debug!(
            user_id = %posting.user_id,
            currency = %currency,
            delta = %posting.delta,
            balance = %balance.amount,
            "balance posted"
        );
    }
    Ok(())
}
