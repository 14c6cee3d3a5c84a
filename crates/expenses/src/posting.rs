//! Balance postings: the per-participant deltas an expense applies to balances.
//!
//! Recording an expense and reversing it go through the same functions, so the
//! reversal is always the exact algebraic inverse of the application.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use splitledger_core::{DomainResult, UserId, ValueObject};

use crate::split_policy::checked_sum;

/// Signed change to one participant's balance in the expense currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalancePosting {
    pub user_id: UserId,
    pub delta: Decimal,
}

impl ValueObject for BalancePosting {}

/// Deltas for an expense of `amount` fronted by `created_by`.
///
/// The creator is credited with everything except their own share
/// (`amount - owed`); every other participant is debited their share. Only
/// participants are posted to, so the creator must be one of them for the
/// deltas to net to zero.
pub fn postings(
    created_by: UserId,
    amount: Decimal,
    owed: impl IntoIterator<Item = (UserId, Decimal)>,
) -> Vec<BalancePosting> {
    owed.into_iter()
        .map(|(user_id, owed)| BalancePosting {
            user_id,
            delta: if user_id == created_by { amount - owed } else { -owed },
        })
        .collect()
}

/// Exact inverse of `postings`.
pub fn reversal(postings: &[BalancePosting]) -> Vec<BalancePosting> {
    postings
        .iter()
        .map(|p| BalancePosting {
            user_id: p.user_id,
            delta: -p.delta,
        })
        .collect()
}

/// Sum of all deltas.
pub fn net(postings: &[BalancePosting]) -> DomainResult<Decimal> {
    checked_sum(postings.iter().map(|p| p.delta))
}
