//! Value object trait: equality by value, not identity.
//!
//! Value objects have **no identity**; they are defined entirely by their
//! attribute values. In this ledger a currency code and a balance posting are
//! value objects, while an expense or a balance row is an entity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. To "modify" one,
/// build a new one.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct Currency(String);
///
/// impl ValueObject for Currency {}
///
/// assert_eq!(Currency("USD".into()), Currency("USD".into()));
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
