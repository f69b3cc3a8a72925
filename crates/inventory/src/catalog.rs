use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use mixledger_core::{DomainError, DomainResult, Entity, ItemId, Quantity};

/// Kind of stock-tracked catalog item.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Material,
    Fragrance,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Material => "material",
            ItemKind::Fragrance => "fragrance",
        }
    }
}

impl core::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "material" => Ok(ItemKind::Material),
            "fragrance" => Ok(ItemKind::Fragrance),
            other => Err(DomainError::validation(format!("unknown item type '{other}'"))),
        }
    }
}

/// Reference to a catalog item: kind + id.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemRef {
    pub kind: ItemKind,
    pub id: ItemId,
}

impl ItemRef {
    pub fn new(kind: ItemKind, id: ItemId) -> Self {
        Self { kind, id }
    }

    pub fn material(id: ItemId) -> Self {
        Self::new(ItemKind::Material, id)
    }

    pub fn fragrance(id: ItemId) -> Self {
        Self::new(ItemKind::Fragrance, id)
    }
}

impl core::fmt::Display for ItemRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// A material or fragrance with a tracked on-hand quantity.
///
/// `current_stock` is owned by the stock ledger: catalog maintenance creates and
/// renames items, but only the adjustment engine changes their stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: ItemId,
    pub kind: ItemKind,
    /// Human-readable code, unique within `kind`.
    pub code: String,
    pub name: String,
    pub unit: String,
    pub current_stock: Quantity,
    pub safety_stock_level: Quantity,
    pub cost_per_unit: Decimal,
}

impl CatalogItem {
    /// New item with zero stock and no safety level.
    pub fn new(
        kind: ItemKind,
        code: impl Into<String>,
        name: impl Into<String>,
        unit: impl Into<String>,
    ) -> DomainResult<Self> {
        let code = code.into();
        let name = name.into();
        if code.trim().is_empty() {
            return Err(DomainError::validation("item code cannot be empty"));
        }
        if name.trim().is_empty() {
            return Err(DomainError::validation("item name cannot be empty"));
        }

        Ok(Self {
            id: ItemId::new(),
            kind,
            code,
            name,
            unit: unit.into(),
            current_stock: Quantity::ZERO,
            safety_stock_level: Quantity::ZERO,
            cost_per_unit: Decimal::ZERO,
        })
    }

    /// Opening balance for an item that has not been stored yet.
    pub fn with_opening_stock(mut self, stock: Quantity) -> DomainResult<Self> {
        if stock.is_negative() {
            return Err(DomainError::validation(format!(
                "opening stock for '{}' cannot be negative",
                self.code
            )));
        }
        self.current_stock = stock;
        Ok(self)
    }

    pub fn with_safety_stock(mut self, level: Quantity) -> Self {
        self.safety_stock_level = level;
        self
    }

    pub fn with_cost_per_unit(mut self, cost: Decimal) -> Self {
        self.cost_per_unit = cost;
        self
    }

    pub fn item_ref(&self) -> ItemRef {
        ItemRef::new(self.kind, self.id)
    }

    pub fn is_below_safety_level(&self) -> bool {
        self.current_stock <= self.safety_stock_level
    }

    /// On-hand value at unit cost.
    pub fn stock_value(&self) -> Decimal {
        self.current_stock.value() * self.cost_per_unit
    }

    /// Case-insensitive code substring or exact-case name substring match.
    pub fn matches_code_or_name(&self, query: &str) -> bool {
        let query = query.trim();
        if query.is_empty() {
            return false;
        }
        self.code.to_uppercase().contains(&query.to_uppercase()) || self.name.contains(query)
    }
}

impl Entity for CatalogItem {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Catalog reads used by production planning.
pub trait CatalogLookup {
    /// Exact lookup of a referenced item.
    fn get_item(&self, item: &ItemRef) -> Option<CatalogItem>;

    /// Search used to resolve formula raw materials (PG, VG, ...).
    fn find_item_by_code_or_name(&self, kind: ItemKind, query: &str) -> Option<CatalogItem>;
}

impl<L> CatalogLookup for std::sync::Arc<L>
where
    L: CatalogLookup + ?Sized,
{
    fn get_item(&self, item: &ItemRef) -> Option<CatalogItem> {
        (**self).get_item(item)
    }

    fn find_item_by_code_or_name(&self, kind: ItemKind, query: &str) -> Option<CatalogItem> {
        (**self).find_item_by_code_or_name(kind, query)
    }
}

impl<L> CatalogLookup for &L
where
    L: CatalogLookup + ?Sized,
{
    fn get_item(&self, item: &ItemRef) -> Option<CatalogItem> {
        (**self).get_item(item)
    }

    fn find_item_by_code_or_name(&self, kind: ItemKind, query: &str) -> Option<CatalogItem> {
        (**self).find_item_by_code_or_name(kind, query)
    }
}
