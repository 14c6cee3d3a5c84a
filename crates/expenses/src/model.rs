use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use splitledger_core::{
    BalanceId, DomainError, DomainResult, Entity, ExpenseId, SplitId, UserId, ValueObject,
};

use crate::posting::{self, BalancePosting};
use crate::split_policy::{Obligation, SplitPolicy, checked_sum};

/// Currency code (e.g. "USD").
///
/// Opaque: codes are never converted or normalised, each one is its own
/// balance bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn new(code: impl Into<String>) -> DomainResult<Self> {
        let code = code.into();
        if code.trim().is_empty() {
            return Err(DomainError::validation("currency must not be empty"));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for Currency {}

impl TryFrom<String> for Currency {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

impl core::fmt::Display for Currency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registered participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> DomainResult<Self> {
        let name = name.into();
        let email = email.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("name must not be empty"));
        }
        if email.trim().is_empty() {
            return Err(DomainError::validation("email must not be empty"));
        }
        Ok(Self {
            id: UserId::new(),
            name,
            email,
        })
    }
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// One participant's owed share of one expense.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseSplit {
    pub id: SplitId,
    pub expense_id: ExpenseId,
    pub user_id: UserId,
    pub amount_owed: Decimal,
    pub settled: bool,
}

impl ExpenseSplit {
    /// New unsettled split for an obligation.
    pub fn open(expense_id: ExpenseId, obligation: Obligation) -> Self {
        Self {
            id: SplitId::new(),
            expense_id,
            user_id: obligation.user_id,
            amount_owed: obligation.amount,
            settled: false,
        }
    }
}

impl Entity for ExpenseSplit {
    type Id = SplitId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// A shared expense, paid upfront by its creator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub description: String,
    pub currency: Currency,
    pub amount: Decimal,
    pub created_by: UserId,
    pub policy: SplitPolicy,
    pub created_at: DateTime<Utc>,
    /// True iff every split is settled.
    pub settled: bool,
    pub splits: Vec<ExpenseSplit>,
}

impl Expense {
    /// New, unsettled expense without splits.
    pub fn new(
        created_by: UserId,
        description: impl Into<String>,
        currency: Currency,
        amount: Decimal,
        policy: SplitPolicy,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ExpenseId::new(),
            description: description.into(),
            currency,
            amount,
            created_by,
            policy,
            created_at,
            settled: false,
            splits: Vec::new(),
        }
    }

    pub fn split_for(&self, user_id: UserId) -> Option<&ExpenseSplit> {
        self.splits.iter().find(|s| s.user_id == user_id)
    }

    pub fn involves(&self, user_id: UserId) -> bool {
        self.split_for(user_id).is_some()
    }

    /// Sum of all owed amounts.
    pub fn owed_total(&self) -> DomainResult<Decimal> {
        checked_sum(self.splits.iter().map(|s| s.amount_owed))
    }

    pub fn all_settled(&self) -> bool {
        self.splits.iter().all(|s| s.settled)
    }

    /// Balance deltas this expense applied when its splits were recorded.
    pub fn postings(&self) -> Vec<BalancePosting> {
        posting::postings(
            self.created_by,
            self.amount,
            self.splits.iter().map(|s| (s.user_id, s.amount_owed)),
        )
    }
}

impl Entity for Expense {
    type Id = ExpenseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Net signed position of a user in one currency.
///
/// Positive means the user is owed money, negative means the user owes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub id: BalanceId,
    pub user_id: UserId,
    pub currency: Currency,
    pub amount: Decimal,
}

impl Balance {
    pub fn zero(user_id: UserId, currency: Currency) -> Self {
        Self {
            id: BalanceId::new(),
            user_id,
            currency,
            amount: Decimal::ZERO,
        }
    }
}

impl Entity for Balance {
    type Id = BalanceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
