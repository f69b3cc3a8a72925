//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Catalog items and ledger entries are entities: they are looked up and
/// referenced by id, whatever their other fields say.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
