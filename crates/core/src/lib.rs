//! `splitledger-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the entity/value-object vocabulary and the domain error model
//! shared by every other crate in the workspace.

pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{BalanceId, ExpenseId, SplitId, UserId};
pub use value_object::ValueObject;
