//! Expense-splitting domain (split policies, expenses, balances).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns. The
//! orchestration that applies these rules to stored balances lives in
//! `splitledger-infra`.

pub mod model;
pub mod posting;
pub mod split_policy;

pub use model::{Balance, Currency, Expense, ExpenseSplit, User};
pub use posting::{BalancePosting, net, postings, reversal};
pub use split_policy::{
    Obligation, ParticipantShare, SPLIT_TOLERANCE, SplitPolicy, checked_sum, within_tolerance,
};
