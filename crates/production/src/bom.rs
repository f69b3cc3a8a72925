//! Bill-of-materials expansion.
//!
//! Planning is split in two steps so the pure part stays free of any store:
//! [`BomPlanner::plan`] turns a target quantity and a [`Formula`] into required
//! quantities per input, and [`BomRequirement::from_plan`] attaches available
//! stock to each line.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use mixledger_core::{DomainError, DomainResult, Quantity};
use mixledger_inventory::{CatalogItem, CatalogLookup, ItemRef, StockAdjustment};

use crate::formula::{DiluentMatchers, Formula, MaterialMatcher};
use crate::ratio::{PgVgRatio, RatioCalculator};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BomRole {
    Fragrance,
    PropyleneGlycol,
    VegetableGlycerin,
    Material,
}

/// Whether a line was matched to a catalog item.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Resolved,
    Unresolved,
}

/// A requirement line before availability is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedLine {
    pub role: BomRole,
    pub item: Option<CatalogItem>,
    /// Code of the resolved item, or the pattern / reference that failed to resolve.
    pub label: String,
    pub unit: String,
    pub required_quantity: Quantity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BomPlan {
    pub target_quantity: Quantity,
    pub ratios: PgVgRatio,
    pub lines: Vec<PlannedLine>,
}

#[derive(Debug, Clone, Default)]
pub struct BomPlanner {
    ratios: RatioCalculator,
    diluents: DiluentMatchers,
}

impl BomPlanner {
    pub fn new(ratios: RatioCalculator, diluents: DiluentMatchers) -> Self {
        Self { ratios, diluents }
    }

    pub fn ratio_calculator(&self) -> &RatioCalculator {
        &self.ratios
    }

    /// Expand `target_quantity` units of `formula` into input requirements.
    ///
    /// Lines come out as fragrance, PG, VG, then common and specific materials.
    /// Inputs missing from the catalog keep their line with no item attached.
    /// A formula material that is the resolved PG or VG item is sized by the
    /// ratio rule alone and gets no line of its own.
    pub fn plan(
        &self,
        target_quantity: Quantity,
        formula: &Formula,
        catalog: &impl CatalogLookup,
    ) -> DomainResult<BomPlan> {
        if target_quantity <= Quantity::ZERO {
            return Err(DomainError::validation(format!(
                "target quantity must be positive, got {target_quantity}"
            )));
        }
        formula.validate()?;
        let ratios = self.ratios.calculate_ratios(formula.fragrance_percentage)?;

        let mut lines = Vec::with_capacity(
            3 + formula.common_materials.len() + formula.specific_materials.len(),
        );

        let fragrance = catalog.get_item(&formula.fragrance);
        lines.push(PlannedLine {
            role: BomRole::Fragrance,
            label: label_for(fragrance.as_ref(), &formula.fragrance),
            unit: fragrance
                .as_ref()
                .map(|i| i.unit.clone())
                .unwrap_or_else(|| formula.base_unit.clone()),
            required_quantity: percent_of(target_quantity, formula.fragrance_percentage)?,
            item: fragrance,
        });

        lines.push(self.diluent_line(
            BomRole::PropyleneGlycol,
            &self.diluents.propylene_glycol,
            percent_of(target_quantity, ratios.pg_ratio)?,
            formula,
            catalog,
        ));
        lines.push(self.diluent_line(
            BomRole::VegetableGlycerin,
            &self.diluents.vegetable_glycerin,
            percent_of(target_quantity, ratios.vg_ratio)?,
            formula,
            catalog,
        ));

        let diluents: Vec<ItemRef> = lines[1..]
            .iter()
            .filter_map(|l| l.item.as_ref().map(CatalogItem::item_ref))
            .collect();

        for material in formula.materials() {
            if diluents.contains(&material.item) {
                continue;
            }
            let required = target_quantity
                .checked_mul(material.per_unit_quantity)
                .ok_or_else(|| {
                    DomainError::validation(format!(
                        "requirement for {} overflows",
                        material.item
                    ))
                })?;
            let item = catalog.get_item(&material.item);
            lines.push(PlannedLine {
                role: BomRole::Material,
                label: label_for(item.as_ref(), &material.item),
                unit: material.unit.clone(),
                required_quantity: required,
                item,
            });
        }

        Ok(BomPlan {
            target_quantity,
            ratios,
            lines,
        })
    }

    fn diluent_line(
        &self,
        role: BomRole,
        matcher: &MaterialMatcher,
        required_quantity: Quantity,
        formula: &Formula,
        catalog: &impl CatalogLookup,
    ) -> PlannedLine {
        match matcher.resolve(catalog) {
            Some(item) => PlannedLine {
                role,
                label: item.code.clone(),
                unit: item.unit.clone(),
                required_quantity,
                item: Some(item),
            },
            None => PlannedLine {
                role,
                label: matcher.label(),
                unit: formula.base_unit.clone(),
                required_quantity,
                item: None,
            },
        }
    }
}

fn percent_of(target: Quantity, percent: Decimal) -> DomainResult<Quantity> {
    target
        .percent(percent)
        .ok_or_else(|| DomainError::validation(format!("{percent}% of {target} overflows")))
}

fn label_for(item: Option<&CatalogItem>, reference: &ItemRef) -> String {
    item.map(|i| i.code.clone())
        .unwrap_or_else(|| reference.to_string())
}

/// One requirement line with availability attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomLine {
    pub role: BomRole,
    pub item: Option<ItemRef>,
    pub code: String,
    pub name: Option<String>,
    pub unit: String,
    pub required_quantity: Quantity,
    pub available_stock: Quantity,
    pub is_sufficient: bool,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomRequirement {
    pub target_quantity: Quantity,
    pub pg_ratio: Decimal,
    pub vg_ratio: Decimal,
    pub lines: Vec<BomLine>,
}

impl BomRequirement {
    /// Attach availability to a plan.
    ///
    /// `available` returns the on-hand quantity of a resolved item; `None` is
    /// treated like an unresolved line (available 0, insufficient).
    pub fn from_plan<F>(plan: BomPlan, mut available: F) -> DomainResult<Self>
    where
        F: FnMut(&ItemRef) -> DomainResult<Option<Quantity>>,
    {
        let mut lines = Vec::with_capacity(plan.lines.len());
        for planned in plan.lines {
            let line = match planned.item {
                Some(item) => {
                    let item_ref = item.item_ref();
                    match available(&item_ref)? {
                        Some(stock) => BomLine {
                            role: planned.role,
                            item: Some(item_ref),
                            code: item.code,
                            name: Some(item.name),
                            unit: planned.unit,
                            is_sufficient: stock >= planned.required_quantity,
                            required_quantity: planned.required_quantity,
                            available_stock: stock,
                            resolution: Resolution::Resolved,
                        },
                        None => unresolved(planned.role, planned.label, planned.unit, planned.required_quantity),
                    }
                }
                None => unresolved(planned.role, planned.label, planned.unit, planned.required_quantity),
            };
            lines.push(line);
        }

        Ok(Self {
            target_quantity: plan.target_quantity,
            pg_ratio: plan.ratios.pg_ratio,
            vg_ratio: plan.ratios.vg_ratio,
            lines,
        })
    }

    pub fn is_fully_sufficient(&self) -> bool {
        self.lines.iter().all(|l| l.is_sufficient)
    }

    pub fn shortages(&self) -> impl Iterator<Item = &BomLine> {
        self.lines.iter().filter(|l| !l.is_sufficient)
    }

    /// Depleting adjustments for consuming this requirement.
    ///
    /// Lines for the same item are merged in first-seen order. Lines requiring
    /// nothing are skipped; any other unresolved line is a `NotFound`.
    pub fn consumption_adjustments(&self) -> DomainResult<Vec<StockAdjustment>> {
        let mut merged: Vec<(ItemRef, Quantity)> = Vec::new();
        for line in &self.lines {
            if line.required_quantity.is_zero() {
                continue;
            }
            let Some(item) = line.item.filter(|_| line.resolution == Resolution::Resolved) else {
                return Err(DomainError::not_found(format!(
                    "catalog item for BOM line '{}'",
                    line.code
                )));
            };
            match merged.iter_mut().find(|(r, _)| *r == item) {
                Some((_, total)) => {
                    *total = total.checked_add(line.required_quantity).ok_or_else(|| {
                        DomainError::validation(format!("consumption of {item} overflows"))
                    })?;
                }
                None => merged.push((item, line.required_quantity)),
            }
        }

        if merged.is_empty() {
            return Err(DomainError::validation("nothing to consume"));
        }

        Ok(merged
            .into_iter()
            .map(|(item, quantity)| StockAdjustment::deplete(item, quantity))
            .collect())
    }
}

fn unresolved(role: BomRole, label: String, unit: String, required: Quantity) -> BomLine {
    BomLine {
        role,
        item: None,
        code: label,
        name: None,
        unit,
        required_quantity: required,
        available_stock: Quantity::ZERO,
        is_sufficient: false,
        resolution: Resolution::Unresolved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::FormulaMaterial;
    use mixledger_inventory::ItemKind;
    use rust_decimal_macros::dec;

    struct FixedCatalog(Vec<CatalogItem>);

    impl CatalogLookup for FixedCatalog {
        fn get_item(&self, item: &ItemRef) -> Option<CatalogItem> {
            self.0.iter().find(|i| i.item_ref() == *item).cloned()
        }

        fn find_item_by_code_or_name(&self, kind: ItemKind, query: &str) -> Option<CatalogItem> {
            self.0
                .iter()
                .find(|i| i.kind == kind && i.matches_code_or_name(query))
                .cloned()
        }
    }

    fn item(kind: ItemKind, code: &str, name: &str, stock: i64) -> CatalogItem {
        CatalogItem::new(kind, code, name, "kg")
            .unwrap()
            .with_opening_stock(Quantity::from_i64(stock))
            .unwrap()
    }

    fn from_catalog(catalog: &FixedCatalog) -> impl FnMut(&ItemRef) -> DomainResult<Option<Quantity>> + '_ {
        move |r| Ok(catalog.get_item(r).map(|i| i.current_stock))
    }

    #[test]
    fn fragrance_line_short_when_stock_below_requirement() {
        let mint = item(ItemKind::Fragrance, "F-MINT", "Mint", 20);
        let pg = item(ItemKind::Material, "PG-01", "丙二醇", 500);
        let vg = item(ItemKind::Material, "VG-01", "甘油", 500);
        let catalog = FixedCatalog(vec![mint.clone(), pg, vg]);
        let formula = Formula::new(mint.item_ref(), dec!(26), "kg");

        let plan = BomPlanner::default()
            .plan(Quantity::from_i64(100), &formula, &catalog)
            .unwrap();
        let req = BomRequirement::from_plan(plan, from_catalog(&catalog)).unwrap();

        let fragrance = &req.lines[0];
        assert_eq!(fragrance.role, BomRole::Fragrance);
        assert_eq!(fragrance.required_quantity, Quantity::from_i64(26));
        assert_eq!(fragrance.available_stock, Quantity::from_i64(20));
        assert!(!fragrance.is_sufficient);

        assert_eq!(req.lines[1].required_quantity, Quantity::from_i64(34));
        assert_eq!(req.lines[2].required_quantity, Quantity::from_i64(40));
        assert!(req.lines[1].is_sufficient && req.lines[2].is_sufficient);
        assert_eq!(req.shortages().count(), 1);
    }

    #[test]
    fn materials_scale_by_target_and_keep_formula_unit() {
        let mint = item(ItemKind::Fragrance, "F-MINT", "Mint", 100);
        let bottle = CatalogItem::new(ItemKind::Material, "BTL-10", "10ml bottle", "pcs").unwrap();
        let catalog = FixedCatalog(vec![mint.clone(), bottle.clone()]);
        let formula = Formula::new(mint.item_ref(), dec!(10), "kg")
            .with_specific_material(FormulaMaterial::new(bottle.item_ref(), dec!(2.5), "pcs"));

        let plan = BomPlanner::default()
            .plan(Quantity::new(dec!(3.333)), &formula, &catalog)
            .unwrap();
        let line = plan.lines.last().unwrap();
        assert_eq!(line.role, BomRole::Material);
        assert_eq!(line.unit, "pcs");
        assert_eq!(line.required_quantity, Quantity::new(dec!(8.333)));
    }

    #[test]
    fn unresolved_diluents_are_kept_and_block_consumption() {
        let mint = item(ItemKind::Fragrance, "F-MINT", "Mint", 100);
        let catalog = FixedCatalog(vec![mint.clone()]);
        let formula = Formula::new(mint.item_ref(), dec!(20), "kg");

        let plan = BomPlanner::default()
            .plan(Quantity::from_i64(10), &formula, &catalog)
            .unwrap();
        let req = BomRequirement::from_plan(plan, from_catalog(&catalog)).unwrap();

        assert_eq!(req.lines.len(), 3);
        let pg = &req.lines[1];
        assert_eq!(pg.resolution, Resolution::Unresolved);
        assert_eq!(pg.code, "PG");
        assert_eq!(pg.available_stock, Quantity::ZERO);
        assert!(!pg.is_sufficient);

        assert!(matches!(
            req.consumption_adjustments(),
            Err(DomainError::NotFound(_))
        ));
    }

    #[test]
    fn consumption_merges_lines_for_the_same_item() {
        let mint = item(ItemKind::Fragrance, "F-MINT", "Mint", 100);
        // One item matches both the PG code and the VG name.
        let blend = item(ItemKind::Material, "PG-VG-MIX", "甘油 blend", 100);
        let catalog = FixedCatalog(vec![mint.clone(), blend.clone()]);
        let formula = Formula::new(mint.item_ref(), dec!(20), "kg");

        let plan = BomPlanner::default()
            .plan(Quantity::from_i64(10), &formula, &catalog)
            .unwrap();
        let req = BomRequirement::from_plan(plan, from_catalog(&catalog)).unwrap();
        let adjustments = req.consumption_adjustments().unwrap();

        assert_eq!(adjustments.len(), 2);
        assert_eq!(adjustments[0].item, mint.item_ref());
        assert_eq!(adjustments[0].quantity_change, Quantity::from_i64(-2));
        assert_eq!(adjustments[1].item, blend.item_ref());
        assert_eq!(adjustments[1].quantity_change, Quantity::from_i64(-8));
        assert!(!adjustments[1].allow_negative);
    }

    #[test]
    fn zero_pg_line_is_kept_but_not_consumed() {
        let strong = item(ItemKind::Fragrance, "F-STRONG", "Strong", 100);
        let vg = item(ItemKind::Material, "VG-01", "Glycerin", 100);
        let catalog = FixedCatalog(vec![strong.clone(), vg.clone()]);
        let formula = Formula::new(strong.item_ref(), dec!(70), "kg");

        let plan = BomPlanner::default()
            .plan(Quantity::from_i64(10), &formula, &catalog)
            .unwrap();
        let req = BomRequirement::from_plan(plan, from_catalog(&catalog)).unwrap();
        assert_eq!(req.lines[1].required_quantity, Quantity::ZERO);

        let adjustments = req.consumption_adjustments().unwrap();
        assert_eq!(adjustments.len(), 2);
        assert_eq!(adjustments[1].quantity_change, Quantity::from_i64(-3));
    }

    #[test]
    fn diluent_listed_as_material_is_sized_by_ratio_only() {
        let mint = item(ItemKind::Fragrance, "F-MINT", "Mint", 100);
        let pg = item(ItemKind::Material, "PG-01", "丙二醇", 500);
        let vg = item(ItemKind::Material, "VG-01", "甘油", 500);
        let catalog = FixedCatalog(vec![mint.clone(), pg.clone(), vg.clone()]);
        let formula = Formula::new(mint.item_ref(), dec!(26), "kg")
            .with_common_material(FormulaMaterial::new(pg.item_ref(), dec!(0.34), "kg"));

        let plan = BomPlanner::default()
            .plan(Quantity::from_i64(100), &formula, &catalog)
            .unwrap();
        assert_eq!(plan.lines.len(), 3);
        let pg_lines: Vec<_> = plan
            .lines
            .iter()
            .filter(|l| l.item.as_ref().map(CatalogItem::item_ref) == Some(pg.item_ref()))
            .collect();
        assert_eq!(pg_lines.len(), 1);
        assert_eq!(pg_lines[0].role, BomRole::PropyleneGlycol);
        assert_eq!(pg_lines[0].required_quantity, Quantity::from_i64(34));

        let req = BomRequirement::from_plan(plan, from_catalog(&catalog)).unwrap();
        let adjustments = req.consumption_adjustments().unwrap();
        let pg_total: Quantity = adjustments
            .iter()
            .filter(|a| a.item == pg.item_ref())
            .map(|a| a.quantity_change)
            .sum();
        assert_eq!(pg_total, Quantity::from_i64(-34));
    }

    #[test]
    fn merged_consumption_overflow_is_a_validation_error() {
        let bulk = item(ItemKind::Material, "BULK", "Bulk", 0);
        let line = BomLine {
            role: BomRole::Material,
            item: Some(bulk.item_ref()),
            code: bulk.code.clone(),
            name: Some(bulk.name.clone()),
            unit: "kg".into(),
            required_quantity: Quantity::new(Decimal::MAX),
            available_stock: Quantity::ZERO,
            is_sufficient: false,
            resolution: Resolution::Resolved,
        };
        let req = BomRequirement {
            target_quantity: Quantity::from_i64(1),
            pg_ratio: Decimal::ZERO,
            vg_ratio: Decimal::ZERO,
            lines: vec![line.clone(), line],
        };

        assert!(matches!(
            req.consumption_adjustments(),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn non_positive_target_is_rejected() {
        let mint = item(ItemKind::Fragrance, "F-MINT", "Mint", 100);
        let catalog = FixedCatalog(vec![mint.clone()]);
        let formula = Formula::new(mint.item_ref(), dec!(20), "kg");
        let err = BomPlanner::default()
            .plan(Quantity::ZERO, &formula, &catalog)
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
