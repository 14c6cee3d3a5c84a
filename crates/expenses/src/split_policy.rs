use std::collections::HashSet;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use splitledger_core::{DomainError, DomainResult, UserId, ValueObject};

/// Allowed gap between the sum of split amounts and the expense total.
pub const SPLIT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Returns true when `a` and `b` differ by at most [`SPLIT_TOLERANCE`].
pub fn within_tolerance(a: Decimal, b: Decimal) -> bool {
    (a - b).abs() <= SPLIT_TOLERANCE
}

/// Rule for dividing an expense total among its participants.
///
/// The set of policies is closed; the wire/storage tag is the lowercase name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitPolicy {
    /// Everybody owes the same quotient of the total.
    Equal,
    /// Hints are percentages of the total and must sum to exactly 100.
    Percentage,
    /// Hints are absolute amounts and must add up to the total.
    Unequal,
}

/// One participant of an expense, with the optional per-participant hint
/// (a percentage or an absolute amount depending on the policy).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantShare {
    pub user_id: UserId,
    pub hint: Option<Decimal>,
}

impl ParticipantShare {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id, hint: None }
    }

    pub fn with_hint(user_id: UserId, hint: Decimal) -> Self {
        Self {
            user_id,
            hint: Some(hint),
        }
    }
}

/// Amount a participant owes toward an expense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Obligation {
    pub user_id: UserId,
    pub amount: Decimal,
}

impl ValueObject for Obligation {}

impl SplitPolicy {
    pub const ALL: [SplitPolicy; 3] = [
        SplitPolicy::Equal,
        SplitPolicy::Percentage,
        SplitPolicy::Unequal,
    ];

    /// Resolve a policy from its tag (`equal`, `percentage`, `unequal`).
    pub fn from_tag(tag: &str) -> DomainResult<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "equal" => Ok(SplitPolicy::Equal),
            "percentage" => Ok(SplitPolicy::Percentage),
            "unequal" => Ok(SplitPolicy::Unequal),
            other => Err(DomainError::policy(format!(
                "unknown split policy '{other}' (expected one of: equal, percentage, unequal)"
            ))),
        }
    }

    pub fn as_tag(self) -> &'static str {
        match self {
            SplitPolicy::Equal => "equal",
            SplitPolicy::Percentage => "percentage",
            SplitPolicy::Unequal => "unequal",
        }
    }

    /// Compute what each participant owes.
    ///
    /// The result covers every participant exactly once, in input order.
    pub fn calculate(
        self,
        total: Decimal,
        shares: &[ParticipantShare],
    ) -> DomainResult<Vec<Obligation>> {
        check_participants(total, shares)?;

        match self {
            SplitPolicy::Equal => split_equal(total, shares),
            SplitPolicy::Percentage => split_percentage(total, shares),
            SplitPolicy::Unequal => split_unequal(total, shares),
        }
    }
}

impl FromStr for SplitPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s)
    }
}

impl core::fmt::Display for SplitPolicy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_tag())
    }
}

fn check_participants(total: Decimal, shares: &[ParticipantShare]) -> DomainResult<()> {
    if total <= Decimal::ZERO {
        return Err(DomainError::policy("expense amount must be positive"));
    }
    if shares.is_empty() {
        return Err(DomainError::policy("splits must be provided"));
    }

    let mut seen = HashSet::with_capacity(shares.len());
    for share in shares {
        if !seen.insert(share.user_id) {
            return Err(DomainError::policy(format!(
                "participant {} is listed more than once",
                share.user_id
            )));
        }
    }
    Ok(())
}

fn split_equal(total: Decimal, shares: &[ParticipantShare]) -> DomainResult<Vec<Obligation>> {
    if shares.iter().any(|s| s.hint.is_some()) {
        return Err(DomainError::policy(
            "equal split must not supply explicit amounts",
        ));
    }

    // Same quotient for everyone; no remainder redistribution.
    let per_person = total / Decimal::from(shares.len());
    Ok(shares
        .iter()
        .map(|s| Obligation {
            user_id: s.user_id,
            amount: per_person,
        })
        .collect())
}

fn split_percentage(total: Decimal, shares: &[ParticipantShare]) -> DomainResult<Vec<Obligation>> {
    let hints = required_hints(shares)?;

    for (user_id, pct) in &hints {
        if *pct < Decimal::ZERO || *pct > Decimal::ONE_HUNDRED {
            return Err(DomainError::policy(format!(
                "percentage for participant {user_id} must be between 0 and 100"
            )));
        }
    }

    let total_pct = checked_sum(hints.iter().map(|(_, pct)| *pct))?;
    if total_pct != Decimal::ONE_HUNDRED {
        return Err(DomainError::policy("total percentage must sum up to 100"));
    }

    hints
        .into_iter()
        .map(|(user_id, pct)| {
            let amount = total
                .checked_mul(pct)
                .ok_or_else(|| DomainError::policy("expense amount is out of range"))?
                / Decimal::ONE_HUNDRED;
            Ok(Obligation { user_id, amount })
        })
        .collect()
}

fn split_unequal(total: Decimal, shares: &[ParticipantShare]) -> DomainResult<Vec<Obligation>> {
    let hints = required_hints(shares)?;

    if let Some((user_id, _)) = hints.iter().find(|(_, amount)| *amount < Decimal::ZERO) {
        return Err(DomainError::policy(format!(
            "amount owed by participant {user_id} must not be negative"
        )));
    }

    let sum = checked_sum(hints.iter().map(|(_, amount)| *amount))?;
    if !within_tolerance(sum, total) {
        return Err(DomainError::policy(
            "total split amounts do not sum up to total amount",
        ));
    }

    Ok(hints
        .into_iter()
        .map(|(user_id, amount)| Obligation { user_id, amount })
        .collect())
}

fn required_hints(shares: &[ParticipantShare]) -> DomainResult<Vec<(UserId, Decimal)>> {
    shares
        .iter()
        .map(|s| {
            s.hint.map(|h| (s.user_id, h)).ok_or_else(|| {
                DomainError::policy(format!(
                    "amount_owed must be provided for participant {} in percentage and unequal splits",
                    s.user_id
                ))
            })
        })
        .collect()
}

/// Overflow-checked sum; overflow is a policy violation.
pub fn checked_sum(mut values: impl Iterator<Item = Decimal>) -> DomainResult<Decimal> {
    values.try_fold(Decimal::ZERO, |acc, v| {
        acc.checked_add(v)
            .ok_or_else(|| DomainError::policy("split amounts are out of range"))
    })
}
