use rust_decimal::Decimal;
use serde::Deserialize;

use splitledger_core::{DomainResult, UserId};
use splitledger_expenses::{Balance, Currency, Expense, ExpenseSplit, ParticipantShare, SplitPolicy, User};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterUserRequest {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct SplitRequest {
    pub user_id: String,
    /// Percentage or absolute amount depending on `split_type`; absent for equal splits.
    pub amount_owed: Option<Decimal>,
}

/// Body of both create and update.
#[derive(Debug, Deserialize)]
pub struct ExpenseRequest {
    pub description: String,
    pub currency: String,
    pub amount: Decimal,
    pub split_type: String,
    pub splits: Vec<SplitRequest>,
}

/// Validated, typed form of an [`ExpenseRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpenseInput {
    pub description: String,
    pub currency: Currency,
    pub amount: Decimal,
    pub policy: SplitPolicy,
    pub shares: Vec<ParticipantShare>,
}

impl ExpenseRequest {
    pub fn into_input(self) -> DomainResult<ExpenseInput> {
        let policy = SplitPolicy::from_tag(&self.split_type)?;
        let currency = Currency::new(self.currency.trim())?;
        let shares = self
            .splits
            .into_iter()
            .map(|s| {
                let user_id: UserId = s.user_id.trim().parse()?;
                Ok(ParticipantShare {
                    user_id,
                    hint: s.amount_owed,
                })
            })
            .collect::<DomainResult<Vec<_>>>()?;

        Ok(ExpenseInput {
            description: self.description,
            currency,
            amount: self.amount,
            policy,
            shares,
        })
    }
}

// -------------------------
// Response mapping
// -------------------------

pub fn user_to_json(u: &User) -> serde_json::Value {
    serde_json::json!({
        "id": u.id.to_string(),
        "name": u.name,
        "email": u.email,
    })
}

pub fn split_to_json(s: &ExpenseSplit) -> serde_json::Value {
    serde_json::json!({
        "id": s.id.to_string(),
        "expense_id": s.expense_id.to_string(),
        "user_id": s.user_id.to_string(),
        "amount_owed": s.amount_owed.to_string(),
        "is_settled": s.settled,
    })
}

pub fn expense_to_json(e: &Expense) -> serde_json::Value {
    serde_json::json!({
        "id": e.id.to_string(),
        "description": e.description,
        "currency": e.currency.as_str(),
        "amount": e.amount.to_string(),
        "created_by": e.created_by.to_string(),
        "split_type": e.policy.as_tag(),
        "created_at": e.created_at.to_rfc3339(),
        "is_settled": e.settled,
        "splits": e.splits.iter().map(split_to_json).collect::<Vec<_>>(),
    })
}

pub fn balance_to_json(b: &Balance) -> serde_json::Value {
    serde_json::json!({
        "currency": b.currency.as_str(),
        "amount": b.amount.to_string(),
    })
}
