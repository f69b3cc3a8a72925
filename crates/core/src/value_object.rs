//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects carry no identity: two `Quantity` values of `12.5` are the same
/// quantity, whereas two catalog items with the same name are still distinct
/// entities. Value objects are immutable; "changing" one means building a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
