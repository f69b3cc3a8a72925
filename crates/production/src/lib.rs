//! Production planning module: PG/VG ratio rule and bill-of-materials expansion.
//!
//! Pure, deterministic planning logic (no IO). Stock availability is attached by
//! `mixledger-infra`, which owns the stores.

pub mod bom;
pub mod formula;
pub mod ratio;

pub use bom::{BomLine, BomPlan, BomPlanner, BomRequirement, BomRole, PlannedLine, Resolution};
pub use formula::{DiluentMatchers, Formula, FormulaMaterial, MaterialMatcher};
pub use ratio::{PgVgRatio, RatioCalculator, DEFAULT_RATIO_THRESHOLD};
