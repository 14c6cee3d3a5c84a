//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Expenses, splits and balances are entities: an expense keeps its identity
/// while its amount, currency and splits are rewritten by an update.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
