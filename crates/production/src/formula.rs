use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use mixledger_core::{DomainError, DomainResult};
use mixledger_inventory::{CatalogItem, CatalogLookup, ItemKind, ItemRef};

/// Fixed per-unit bill-of-materials line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormulaMaterial {
    pub item: ItemRef,
    /// Quantity of this input per unit of finished product.
    pub per_unit_quantity: Decimal,
    pub unit: String,
}

impl FormulaMaterial {
    pub fn new(item: ItemRef, per_unit_quantity: Decimal, unit: impl Into<String>) -> Self {
        Self {
            item,
            per_unit_quantity,
            unit: unit.into(),
        }
    }
}

/// Product formula: fragrance share plus fixed materials.
///
/// PG and VG are not listed: their shares are derived from
/// `fragrance_percentage` and their items are resolved from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formula {
    pub fragrance: ItemRef,
    pub fragrance_percentage: Decimal,
    /// Unit of the production target; used for ratio lines that do not resolve.
    pub base_unit: String,
    pub common_materials: Vec<FormulaMaterial>,
    pub specific_materials: Vec<FormulaMaterial>,
}

impl Formula {
    pub fn new(fragrance: ItemRef, fragrance_percentage: Decimal, base_unit: impl Into<String>) -> Self {
        Self {
            fragrance,
            fragrance_percentage,
            base_unit: base_unit.into(),
            common_materials: Vec::new(),
            specific_materials: Vec::new(),
        }
    }

    pub fn with_common_material(mut self, material: FormulaMaterial) -> Self {
        self.common_materials.push(material);
        self
    }

    pub fn with_specific_material(mut self, material: FormulaMaterial) -> Self {
        self.specific_materials.push(material);
        self
    }

    /// Common materials first, then product-specific ones.
    pub fn materials(&self) -> impl Iterator<Item = &FormulaMaterial> {
        self.common_materials.iter().chain(self.specific_materials.iter())
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.fragrance.kind != ItemKind::Fragrance {
            return Err(DomainError::validation(format!(
                "formula fragrance {} is not a fragrance item",
                self.fragrance
            )));
        }
        for (idx, m) in self.materials().enumerate() {
            if m.per_unit_quantity < Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "material line {} ({}) has a negative per-unit quantity",
                    idx + 1,
                    m.item
                )));
            }
        }
        Ok(())
    }
}

/// Code and name patterns that identify one raw material in the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialMatcher {
    pub codes: Vec<String>,
    pub names: Vec<String>,
}

impl MaterialMatcher {
    pub fn new<C, N>(codes: C, names: N) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        N: IntoIterator,
        N::Item: Into<String>,
    {
        Self {
            codes: codes.into_iter().map(Into::into).collect(),
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// First catalog hit, trying code patterns before name patterns.
    pub fn resolve(&self, catalog: &impl CatalogLookup) -> Option<CatalogItem> {
        self.codes
            .iter()
            .chain(self.names.iter())
            .filter(|q| !q.trim().is_empty())
            .find_map(|q| catalog.find_item_by_code_or_name(ItemKind::Material, q))
    }

    /// Short label for unresolved lines.
    pub fn label(&self) -> String {
        self.codes
            .first()
            .or_else(|| self.names.first())
            .cloned()
            .unwrap_or_default()
    }
}

/// Matchers for the two diluents whose shares come from the ratio rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiluentMatchers {
    pub propylene_glycol: MaterialMatcher,
    pub vegetable_glycerin: MaterialMatcher,
}

impl Default for DiluentMatchers {
    fn default() -> Self {
        Self {
            propylene_glycol: MaterialMatcher::new(["PG"], ["丙二醇"]),
            vegetable_glycerin: MaterialMatcher::new(["VG"], ["甘油", "丙三醇"]),
        }
    }
}
