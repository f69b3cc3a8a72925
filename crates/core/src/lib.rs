//! `mixledger-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the bounded-precision `Quantity`, the domain error model and the
//! authorization seam consumed by the service layer.

pub mod access;
pub mod entity;
pub mod error;
pub mod id;
pub mod quantity;
pub mod value_object;

pub use access::{AccessCheck, AccessDenied, AllowAll, Capability, StaticGrants};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{DocumentId, ItemId, LedgerEntryId, OperatorId};
pub use quantity::{round_to_scale, Quantity, QUANTITY_SCALE};
pub use value_object::ValueObject;
